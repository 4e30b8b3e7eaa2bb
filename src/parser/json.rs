//! JSON shaped config items.
//!
//! Objects carry an explicit `protocol` discriminator selecting one typed
//! shape per protocol. Unknown keys are ignored.

use serde::Deserialize;
use serde_json::Value;

use super::{
    check_port, first_non_empty, port_from_text, synthesized_name, unsupported_protocol,
};
use crate::error::ParseError;
use crate::record::{
    Protocol, ProtocolSettings, Record, Secret, ShadowsocksSettings, TrojanSettings,
    VlessSettings, VmessSettings,
};

const VMESS_DEFAULT_NAME: &str = "VMess Config";
const SS_DEFAULT_METHOD: &str = "chacha20-ietf-poly1305";

/// Parse a JSON object (or a one-element array holding one).
pub fn parse_json(text: &str, source: &str) -> Result<Record, ParseError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ParseError::Malformed(format!("invalid JSON: {}", e)))?;
    parse_value(value, source)
}

/// Parse an already decoded JSON value.
pub fn parse_value(value: Value, source: &str) -> Result<Record, ParseError> {
    let value = match value {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        Value::Array(_) => {
            return Err(ParseError::Malformed(
                "expected a single JSON config object".to_string(),
            ))
        }
        other => other,
    };

    let protocol = match value.get("protocol").and_then(Value::as_str) {
        Some(p) => p.to_string(),
        None => {
            return Err(ParseError::Malformed(
                "JSON config has no protocol field".to_string(),
            ))
        }
    };

    if !matches!(
        protocol.as_str(),
        "vmess" | "vless" | "trojan" | "shadowsocks" | "ss"
    ) {
        return Err(unsupported_protocol(&protocol));
    }

    let config: JsonConfig = serde_json::from_value(value)
        .map_err(|e| ParseError::Malformed(json_failure(&protocol, &e)))?;

    match config {
        JsonConfig::Vmess(obj) => obj.into_record(source),
        JsonConfig::Vless(obj) => obj.into_record(source),
        JsonConfig::Trojan(obj) => obj.into_record(source),
        JsonConfig::Shadowsocks(obj) => obj.into_record(source),
    }
}

#[derive(Deserialize)]
#[serde(tag = "protocol")]
enum JsonConfig {
    #[serde(rename = "vmess")]
    Vmess(VmessObject),
    #[serde(rename = "vless")]
    Vless(VlessObject),
    #[serde(rename = "trojan")]
    Trojan(TrojanObject),
    #[serde(rename = "shadowsocks", alias = "ss")]
    Shadowsocks(ShadowsocksObject),
}

/// Ports and counters show up both as numbers and as numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

fn resolve_port(protocol: Protocol, value: Option<Numeric>) -> Result<u16, ParseError> {
    match value {
        Some(Numeric::Number(n)) => check_port(protocol, n as i64),
        Some(Numeric::Text(t)) => port_from_text(protocol, Some(&t)),
        None => Ok(protocol.default_port()),
    }
}

/// Describe a JSON failure by category and position only; serde messages
/// for type mismatches quote the offending value.
pub(crate) fn json_failure(what: &str, e: &serde_json::Error) -> String {
    use serde_json::error::Category;
    match e.classify() {
        Category::Data => format!("{} has a field of the wrong type", what),
        _ => format!("{} is not valid JSON (line {}, column {})", what, e.line(), e.column()),
    }
}

fn required(
    value: Option<String>,
    protocol: &'static str,
    field: &'static str,
) -> Result<String, ParseError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ParseError::MissingField { protocol, field })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// VMess payload: the JSON inside `vmess://` and the `"protocol":"vmess"` object.
#[derive(Deserialize, Default)]
#[serde(default)]
pub(crate) struct VmessObject {
    ps: Option<String>,
    add: Option<String>,
    port: Option<Numeric>,
    id: Option<String>,
    aid: Option<Numeric>,
    cipher: Option<String>,
}

impl VmessObject {
    pub(crate) fn into_record(self, source: &str) -> Result<Record, ParseError> {
        let server = required(self.add, "VMess", "server address")?;
        let uuid = required(self.id, "VMess", "UUID")?;
        let port = resolve_port(Protocol::Vmess, self.port)?;

        let alter_id = match self.aid {
            Some(Numeric::Number(n)) if n >= 0.0 => n as u32,
            Some(Numeric::Text(t)) => t.trim().parse().unwrap_or(0),
            _ => 0,
        };

        let name = first_non_empty([self.ps.as_deref()])
            .unwrap_or_else(|| VMESS_DEFAULT_NAME.to_string());

        let settings = VmessSettings {
            uuid: Secret::new(uuid),
            alter_id,
            cipher: non_empty(self.cipher).unwrap_or_else(|| "auto".to_string()),
        };

        Ok(Record::new(
            name,
            server,
            port,
            ProtocolSettings::Vmess(settings),
            source,
        ))
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct VlessObject {
    server: Option<String>,
    port: Option<Numeric>,
    uuid: Option<String>,
    name: Option<String>,
    sni: Option<String>,
    security: Option<String>,
    flow: Option<String>,
}

impl VlessObject {
    fn into_record(self, source: &str) -> Result<Record, ParseError> {
        let server = required(self.server, "VLESS", "server")?;
        let uuid = required(self.uuid, "VLESS", "UUID")?;
        let port = resolve_port(Protocol::Vless, self.port)?;
        let name = first_non_empty([self.name.as_deref()])
            .unwrap_or_else(|| synthesized_name(Protocol::Vless, &server));

        let settings = VlessSettings {
            uuid: Secret::new(uuid),
            flow: non_empty(self.flow),
            security: non_empty(self.security),
            server_name: non_empty(self.sni),
            reality: None,
            xhttp: None,
        };

        Ok(Record::new(
            name,
            server,
            port,
            ProtocolSettings::Vless(settings),
            source,
        ))
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct TrojanObject {
    server: Option<String>,
    port: Option<Numeric>,
    password: Option<String>,
    name: Option<String>,
    sni: Option<String>,
}

impl TrojanObject {
    fn into_record(self, source: &str) -> Result<Record, ParseError> {
        let server = required(self.server, "Trojan", "server")?;
        let password = required(self.password, "Trojan", "password")?;
        let port = resolve_port(Protocol::Trojan, self.port)?;
        let name = first_non_empty([self.name.as_deref()])
            .unwrap_or_else(|| synthesized_name(Protocol::Trojan, &server));

        let settings = TrojanSettings {
            password: Secret::new(password),
            server_name: None,
            tls_server_name: non_empty(self.sni),
            allow_insecure: false,
        };

        Ok(Record::new(
            name,
            server,
            port,
            ProtocolSettings::Trojan(settings),
            source,
        ))
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ShadowsocksObject {
    server: Option<String>,
    port: Option<Numeric>,
    password: Option<String>,
    method: Option<String>,
    remarks: Option<String>,
}

impl ShadowsocksObject {
    fn into_record(self, source: &str) -> Result<Record, ParseError> {
        let server = required(self.server, "Shadowsocks", "server")?;
        let password = required(self.password, "Shadowsocks", "password")?;
        let port = resolve_port(Protocol::Shadowsocks, self.port)?;
        let name = first_non_empty([self.remarks.as_deref()])
            .unwrap_or_else(|| synthesized_name(Protocol::Shadowsocks, &server));

        let settings = ShadowsocksSettings {
            method: non_empty(self.method).unwrap_or_else(|| SS_DEFAULT_METHOD.to_string()),
            password: Secret::new(password),
        };

        Ok(Record::new(
            name,
            server,
            port,
            ProtocolSettings::Shadowsocks(settings),
            source,
        ))
    }
}
