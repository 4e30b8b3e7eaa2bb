//! Call contract for the external traffic obfuscation engine.
//!
//! proxagg never implements the transformations itself. An engine is
//! plugged in through [`ObfuscationEngine`] and always driven through a
//! [`SecuritySession`], which brackets use with init/shutdown, passes empty
//! input straight through and turns bare failure statuses into
//! [`SecurityError`]s carrying the engine's last error message.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use tracing::warn;

use crate::error::SecurityError;

#[cfg(test)]
use mockall::automock;

pub const FRAGMENT_RANGE: RangeInclusive<u16> = 100..=500;
pub const DELAY_RANGE: RangeInclusive<u16> = 10..=100;
pub const RANDOMIZATION_RANGE: RangeInclusive<u8> = 1..=5;

/// Options passed with every outgoing-traffic call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityOptions {
    /// Fragment size in bytes (100-500)
    pub fragmentation_bytes: u16,
    /// Delay between fragments in milliseconds (10-100)
    pub delay_ms: u16,
    /// Randomization level (1-5)
    pub randomization_level: u8,
    pub enable_sni_obfuscation: bool,
    pub enable_tls_fragmentation: bool,
}

impl Default for SecurityOptions {
    fn default() -> Self {
        Self {
            fragmentation_bytes: 200,
            delay_ms: 50,
            randomization_level: 3,
            enable_sni_obfuscation: true,
            enable_tls_fragmentation: true,
        }
    }
}

impl SecurityOptions {
    pub fn validate(&self) -> Result<(), SecurityError> {
        if !FRAGMENT_RANGE.contains(&self.fragmentation_bytes) {
            return Err(SecurityError::InvalidOption(format!(
                "fragmentation_bytes {} outside 100-500",
                self.fragmentation_bytes
            )));
        }
        if !DELAY_RANGE.contains(&self.delay_ms) {
            return Err(SecurityError::InvalidOption(format!(
                "delay_ms {} outside 10-100",
                self.delay_ms
            )));
        }
        if !RANDOMIZATION_RANGE.contains(&self.randomization_level) {
            return Err(SecurityError::InvalidOption(format!(
                "randomization_level {} outside 1-5",
                self.randomization_level
            )));
        }
        Ok(())
    }
}

/// Bare failure status returned by an engine call.
///
/// The message is retrieved separately through [`ObfuscationEngine::last_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineFailure;

/// Byte-buffer transforms provided by an external engine.
#[cfg_attr(test, automock)]
pub trait ObfuscationEngine: Send + Sync {
    fn init(&self) -> Result<(), EngineFailure>;

    fn shutdown(&self) -> Result<(), EngineFailure>;

    fn process_outgoing(
        &self,
        data: &[u8],
        options: &SecurityOptions,
    ) -> Result<Vec<u8>, EngineFailure>;

    fn process_incoming(&self, data: &[u8]) -> Result<Vec<u8>, EngineFailure>;

    fn fragment_handshake(
        &self,
        handshake: &[u8],
        fragment_size: u16,
    ) -> Result<Vec<u8>, EngineFailure>;

    fn obfuscate_sni(&self, sni: &str) -> Result<String, EngineFailure>;

    fn rotate_pattern(&self, packet: &[u8]) -> Result<Vec<u8>, EngineFailure>;

    /// Message describing the most recent failure, if any.
    fn last_error(&self) -> Option<String>;
}

/// Engine that returns every buffer unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughEngine;

impl ObfuscationEngine for PassthroughEngine {
    fn init(&self) -> Result<(), EngineFailure> {
        Ok(())
    }

    fn shutdown(&self) -> Result<(), EngineFailure> {
        Ok(())
    }

    fn process_outgoing(&self, data: &[u8], _: &SecurityOptions) -> Result<Vec<u8>, EngineFailure> {
        Ok(data.to_vec())
    }

    fn process_incoming(&self, data: &[u8]) -> Result<Vec<u8>, EngineFailure> {
        Ok(data.to_vec())
    }

    fn fragment_handshake(&self, handshake: &[u8], _: u16) -> Result<Vec<u8>, EngineFailure> {
        Ok(handshake.to_vec())
    }

    fn obfuscate_sni(&self, sni: &str) -> Result<String, EngineFailure> {
        Ok(sni.to_string())
    }

    fn rotate_pattern(&self, packet: &[u8]) -> Result<Vec<u8>, EngineFailure> {
        Ok(packet.to_vec())
    }

    fn last_error(&self) -> Option<String> {
        None
    }
}

/// An initialized engine. Shut down explicitly with [`SecuritySession::close`],
/// or on drop.
pub struct SecuritySession<E: ObfuscationEngine> {
    engine: E,
    open: bool,
}

impl<E: ObfuscationEngine> SecuritySession<E> {
    /// Initialize `engine` and wrap it.
    pub fn open(engine: E) -> Result<Self, SecurityError> {
        engine.init().map_err(|_| SecurityError::InitFailed)?;
        Ok(Self { engine, open: true })
    }

    /// Shut the engine down.
    pub fn close(mut self) -> Result<(), SecurityError> {
        self.open = false;
        self.engine
            .shutdown()
            .map_err(|_| SecurityError::ShutdownFailed)
    }

    pub fn process_outgoing(
        &self,
        data: &[u8],
        options: &SecurityOptions,
    ) -> Result<Vec<u8>, SecurityError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        options.validate()?;
        self.engine
            .process_outgoing(data, options)
            .map_err(|_| self.failure("process_outgoing"))
    }

    pub fn process_incoming(&self, data: &[u8]) -> Result<Vec<u8>, SecurityError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        self.engine
            .process_incoming(data)
            .map_err(|_| self.failure("process_incoming"))
    }

    /// Fragment a TLS handshake. The size hint is clamped to 100-500.
    pub fn fragment_handshake(
        &self,
        handshake: &[u8],
        fragment_size: u16,
    ) -> Result<Vec<u8>, SecurityError> {
        if handshake.is_empty() {
            return Ok(Vec::new());
        }
        let size = fragment_size.clamp(*FRAGMENT_RANGE.start(), *FRAGMENT_RANGE.end());
        self.engine
            .fragment_handshake(handshake, size)
            .map_err(|_| self.failure("fragment_handshake"))
    }

    pub fn obfuscate_sni(&self, sni: &str) -> Result<String, SecurityError> {
        if sni.is_empty() {
            return Ok(String::new());
        }
        let out = self
            .engine
            .obfuscate_sni(sni)
            .map_err(|_| self.failure("obfuscate_sni"))?;
        if out.is_empty() {
            return Err(SecurityError::Operation {
                operation: "obfuscate_sni",
                message: "engine produced empty output".to_string(),
            });
        }
        Ok(out)
    }

    pub fn rotate_pattern(&self, packet: &[u8]) -> Result<Vec<u8>, SecurityError> {
        if packet.is_empty() {
            return Ok(Vec::new());
        }
        self.engine
            .rotate_pattern(packet)
            .map_err(|_| self.failure("rotate_pattern"))
    }

    fn failure(&self, operation: &'static str) -> SecurityError {
        SecurityError::Operation {
            operation,
            message: self
                .engine
                .last_error()
                .unwrap_or_else(|| "unknown error".to_string()),
        }
    }
}

impl<E: ObfuscationEngine> Drop for SecuritySession<E> {
    fn drop(&mut self) {
        if self.open && self.engine.shutdown().is_err() {
            warn!("Security engine shutdown failed on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_valid() {
        assert!(SecurityOptions::default().validate().is_ok());
    }

    #[test]
    fn test_options_out_of_range() {
        let opts = SecurityOptions {
            fragmentation_bytes: 50,
            ..Default::default()
        };
        assert!(opts.validate().is_err());

        let opts = SecurityOptions {
            delay_ms: 101,
            ..Default::default()
        };
        assert!(opts.validate().is_err());

        let opts = SecurityOptions {
            randomization_level: 0,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_passthrough_session() {
        let session = SecuritySession::open(PassthroughEngine).unwrap();
        let opts = SecurityOptions::default();
        assert_eq!(session.process_outgoing(b"abc", &opts).unwrap(), b"abc");
        assert_eq!(session.process_incoming(b"abc").unwrap(), b"abc");
        assert_eq!(session.obfuscate_sni("h.example").unwrap(), "h.example");
        assert!(session.close().is_ok());
    }

    #[test]
    fn test_empty_input_never_reaches_engine() {
        let mut engine = MockObfuscationEngine::new();
        engine.expect_init().times(1).returning(|| Ok(()));
        engine.expect_shutdown().times(1).returning(|| Ok(()));
        engine.expect_process_outgoing().never();
        engine.expect_process_incoming().never();
        engine.expect_fragment_handshake().never();
        engine.expect_obfuscate_sni().never();
        engine.expect_rotate_pattern().never();

        let session = SecuritySession::open(engine).unwrap();
        let opts = SecurityOptions::default();
        assert!(session.process_outgoing(&[], &opts).unwrap().is_empty());
        assert!(session.process_incoming(&[]).unwrap().is_empty());
        assert!(session.fragment_handshake(&[], 200).unwrap().is_empty());
        assert!(session.obfuscate_sni("").unwrap().is_empty());
        assert!(session.rotate_pattern(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_failure_reports_last_error() {
        let mut engine = MockObfuscationEngine::new();
        engine.expect_init().returning(|| Ok(()));
        engine.expect_shutdown().returning(|| Ok(()));
        engine
            .expect_process_incoming()
            .returning(|_| Err(EngineFailure));
        engine
            .expect_last_error()
            .returning(|| Some("buffer too small".to_string()));

        let session = SecuritySession::open(engine).unwrap();
        let err = session.process_incoming(b"payload").unwrap_err();
        assert_eq!(
            err,
            SecurityError::Operation {
                operation: "process_incoming",
                message: "buffer too small".to_string(),
            }
        );
    }

    #[test]
    fn test_fragment_size_clamped() {
        let mut engine = MockObfuscationEngine::new();
        engine.expect_init().returning(|| Ok(()));
        engine.expect_shutdown().returning(|| Ok(()));
        engine
            .expect_fragment_handshake()
            .withf(|_, size| *size == 500)
            .times(1)
            .returning(|data, _| Ok(data.to_vec()));
        engine
            .expect_fragment_handshake()
            .withf(|_, size| *size == 100)
            .times(1)
            .returning(|data, _| Ok(data.to_vec()));

        let session = SecuritySession::open(engine).unwrap();
        assert!(session.fragment_handshake(b"hello", 9000).is_ok());
        assert!(session.fragment_handshake(b"hello", 1).is_ok());
    }

    #[test]
    fn test_init_failure() {
        let mut engine = MockObfuscationEngine::new();
        engine.expect_init().returning(|| Err(EngineFailure));
        engine.expect_shutdown().never();
        assert_eq!(
            SecuritySession::open(engine).err(),
            Some(SecurityError::InitFailed)
        );
    }

    #[test]
    fn test_invalid_options_rejected_before_engine() {
        let mut engine = MockObfuscationEngine::new();
        engine.expect_init().returning(|| Ok(()));
        engine.expect_shutdown().returning(|| Ok(()));
        engine.expect_process_outgoing().never();

        let session = SecuritySession::open(engine).unwrap();
        let opts = SecurityOptions {
            randomization_level: 9,
            ..Default::default()
        };
        assert!(matches!(
            session.process_outgoing(b"data", &opts),
            Err(SecurityError::InvalidOption(_))
        ));
    }

    #[test]
    fn test_empty_sni_output_is_error() {
        let mut engine = MockObfuscationEngine::new();
        engine.expect_init().returning(|| Ok(()));
        engine.expect_shutdown().returning(|| Ok(()));
        engine
            .expect_obfuscate_sni()
            .returning(|_| Ok(String::new()));

        let session = SecuritySession::open(engine).unwrap();
        assert!(session.obfuscate_sni("h.example").is_err());
    }
}
