//! Normalized proxy endpoint model.
//!
//! Every supported encoding collapses onto [`Record`]. Protocol specific
//! fields live in [`ProtocolSettings`], one variant per protocol, so a
//! Trojan record can never carry a VMess alter id and vice versa.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Credential material (UUIDs, passwords).
///
/// Memory is zeroed on drop and `Debug` never prints the value.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Protocol tag of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "vmess")]
    Vmess,
    #[serde(rename = "vless")]
    Vless,
    #[serde(rename = "trojan")]
    Trojan,
    #[serde(rename = "ss", alias = "shadowsocks")]
    Shadowsocks,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [
        Protocol::Vmess,
        Protocol::Vless,
        Protocol::Trojan,
        Protocol::Shadowsocks,
    ];

    /// Short tag used in identities, rules and raw links.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Trojan => "trojan",
            Protocol::Shadowsocks => "ss",
        }
    }

    /// Human readable name used in synthesized display names and errors.
    pub fn display_name(&self) -> &'static str {
        match self {
            Protocol::Vmess => "VMess",
            Protocol::Vless => "VLESS",
            Protocol::Trojan => "Trojan",
            Protocol::Shadowsocks => "SS",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Shadowsocks => 8388,
            _ => 443,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vmess" => Ok(Protocol::Vmess),
            "vless" | "reality" | "xhttp" => Ok(Protocol::Vless),
            "trojan" => Ok(Protocol::Trojan),
            "ss" | "ssr" | "shadowsocks" | "shadowsocksr" => Ok(Protocol::Shadowsocks),
            other => Err(format!("unknown protocol '{}'", other)),
        }
    }
}

/// REALITY ("secure-channel") option group of a VLESS record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RealityOpts {
    pub public_key: String,
    pub short_id: String,
    pub server_name: String,
}

/// XHTTP ("http-transport") option group of a VLESS record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XhttpOpts {
    pub method: String,
    pub host: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmessSettings {
    pub uuid: Secret,
    pub alter_id: u32,
    pub cipher: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VlessSettings {
    pub uuid: Secret,
    pub flow: Option<String>,
    pub security: Option<String>,
    pub server_name: Option<String>,
    pub reality: Option<RealityOpts>,
    pub xhttp: Option<XhttpOpts>,
}

impl VlessSettings {
    /// REALITY group, only when its public key is present.
    pub fn reality(&self) -> Option<&RealityOpts> {
        self.reality.as_ref().filter(|r| !r.public_key.is_empty())
    }

    /// XHTTP group, only when its method is present.
    pub fn xhttp(&self) -> Option<&XhttpOpts> {
        self.xhttp.as_ref().filter(|x| !x.method.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrojanSettings {
    pub password: Secret,
    pub server_name: Option<String>,
    pub tls_server_name: Option<String>,
    pub allow_insecure: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowsocksSettings {
    pub method: String,
    pub password: Secret,
}

/// Protocol dependent attributes of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolSettings {
    Vmess(VmessSettings),
    Vless(VlessSettings),
    Trojan(TrojanSettings),
    Shadowsocks(ShadowsocksSettings),
}

impl ProtocolSettings {
    pub fn protocol(&self) -> Protocol {
        match self {
            ProtocolSettings::Vmess(_) => Protocol::Vmess,
            ProtocolSettings::Vless(_) => Protocol::Vless,
            ProtocolSettings::Trojan(_) => Protocol::Trojan,
            ProtocolSettings::Shadowsocks(_) => Protocol::Shadowsocks,
        }
    }
}

/// Deduplication key: `(server, port, protocol)`.
pub type EndpointKey = (String, u16, Protocol);

/// One normalized proxy endpoint.
///
/// The identity is computed at construction from `(protocol, server, port)`
/// and cannot change afterwards.
#[derive(Debug, Clone)]
pub struct Record {
    id: String,
    name: String,
    server: String,
    port: u16,
    settings: ProtocolSettings,
    source: String,
    country: Option<String>,
    raw: String,
    created_at: DateTime<Utc>,
    metadata: BTreeMap<String, String>,
}

impl Record {
    pub fn new(
        name: impl Into<String>,
        server: impl Into<String>,
        port: u16,
        settings: ProtocolSettings,
        source: impl Into<String>,
    ) -> Self {
        // hostnames are case-insensitive; one spelling keeps dedup and rules in step
        let server = server.into().to_ascii_lowercase();
        let id = config_id(settings.protocol(), &server, port);
        let raw = format!("{}:{}", server, port);
        Self {
            id,
            name: name.into(),
            server,
            port,
            settings,
            source: source.into(),
            country: None,
            raw,
            created_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a geographic origin tag (set by an external enrichment step).
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// Attach a free-form metadata entry.
    pub fn attach_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn protocol(&self) -> Protocol {
        self.settings.protocol()
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn key(&self) -> EndpointKey {
        (self.server.clone(), self.port, self.protocol())
    }
}

/// Deterministic identity for `(protocol, server, port)`.
///
/// Rolling hash `h = h * 31 + c` over the characters of
/// `"<protocol>:<server>:<port>"` with 32-bit wrapping, reduced modulo
/// 1,000,000 and rendered in lowercase hex.
pub fn config_id(protocol: Protocol, server: &str, port: u16) -> String {
    let key = format!("{}:{}:{}", protocol.as_str(), server, port);
    let hash = key
        .chars()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32));
    format!("{}-{:x}", protocol.as_str(), hash.rem_euclid(1_000_000))
}
