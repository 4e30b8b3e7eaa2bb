//! Error types for proxagg.
//!
//! Errors are scoped to the unit of work they abort: one input item
//! ([`ParseError`]), one source ([`SourceFetchError`]), the generation step
//! ([`GenerationError`]) or the whole run ([`PipelineError`]). None of them
//! carries credential material.

use thiserror::Error;

/// Failure to turn one raw config item into a [`crate::record::Record`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unsupported config format")]
    UnsupportedFormat,

    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("{protocol} missing {field}")]
    MissingField {
        protocol: &'static str,
        field: &'static str,
    },

    #[error("invalid {protocol} URI: {reason}")]
    InvalidUri {
        protocol: &'static str,
        reason: &'static str,
    },

    #[error("invalid port {port} for {protocol}")]
    InvalidPort { protocol: &'static str, port: i64 },

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Failure to retrieve or decode one source.
#[derive(Error, Debug)]
pub enum SourceFetchError {
    #[error("request to {source_name} failed: {message}")]
    Network {
        source_name: String,
        message: String,
    },

    #[error("request to {source_name} timed out")]
    Timeout { source_name: String },

    #[error("unexpected status from {source_name}: {status}")]
    Status { source_name: String, status: u16 },

    #[error("response from {source_name} too large: {size} bytes (max: {max} bytes)")]
    TooLarge {
        source_name: String,
        size: usize,
        max: usize,
    },

    #[error("failed to decode {source_name}: {message}")]
    Decode {
        source_name: String,
        message: String,
    },

    #[error("fetch of {source_name} cancelled")]
    Cancelled { source_name: String },
}

impl SourceFetchError {
    /// Name of the source this error belongs to.
    pub fn source_name(&self) -> &str {
        match self {
            Self::Network { source_name, .. }
            | Self::Timeout { source_name }
            | Self::Status { source_name, .. }
            | Self::TooLarge { source_name, .. }
            | Self::Decode { source_name, .. }
            | Self::Cancelled { source_name } => source_name,
        }
    }
}

/// Failure to render a subscription.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("serialization failed: {0}")]
    Serialize(String),
}

/// Run-level failure surfaced once the pipeline has finished.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no enabled sources")]
    NoSources,

    #[error("all {failed} sources failed")]
    AllSourcesFailed { failed: usize },
}

/// Failure reported by the external obfuscation engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("security engine initialization failed")]
    InitFailed,

    #[error("security engine shutdown failed")]
    ShutdownFailed,

    #[error("{operation} failed: {message}")]
    Operation {
        operation: &'static str,
        message: String,
    },

    #[error("invalid security option: {0}")]
    InvalidOption(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_message() {
        let err = ParseError::MissingField {
            protocol: "Trojan",
            field: "password",
        };
        assert_eq!(err.to_string(), "Trojan missing password");
    }

    #[test]
    fn test_source_name_accessor() {
        let err = SourceFetchError::Status {
            source_name: "mirror".to_string(),
            status: 404,
        };
        assert_eq!(err.source_name(), "mirror");
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn test_generation_error_names_format() {
        let err = GenerationError::UnsupportedFormat("quantumult".to_string());
        assert_eq!(err.to_string(), "unsupported format: quantumult");
    }
}
