//! Protocol parser.
//!
//! Turns one raw config item into a [`Record`]. Detection order, first
//! match wins:
//!
//! 1. `scheme://...` URIs ([`uri`]), where `scheme` is a short scheme token
//! 2. base64 text that decodes to a URI
//! 3. JSON objects carrying a `protocol` discriminator ([`json`])
//!
//! Anything else is [`ParseError::UnsupportedFormat`].

pub mod json;
pub mod uri;

use base64::engine::general_purpose;
use base64::Engine;
use percent_encoding::percent_decode_str;

use crate::error::ParseError;
use crate::record::{Protocol, Record};

/// Parse one config item from `source` into a record.
pub fn parse(item: &str, source: &str) -> Result<Record, ParseError> {
    let item = item.trim();
    if item.is_empty() {
        return Err(ParseError::UnsupportedFormat);
    }

    if split_scheme(item).is_some() {
        return uri::parse_uri(item, source);
    }

    if let Some(decoded) = decode_base64_text(item) {
        let decoded = decoded.trim();
        if split_scheme(decoded).is_some() {
            return uri::parse_uri(decoded, source);
        }
    }

    if item.starts_with('{') || item.starts_with('[') {
        return json::parse_json(item, source);
    }

    Err(ParseError::UnsupportedFormat)
}

const MAX_SCHEME_LEN: usize = 16;

/// Split `scheme://rest` when the prefix is a URI scheme token: a letter
/// followed by letters, digits, `+`, `-` or `.`, at most 16 characters.
///
/// Text such as a JSON object whose string fields contain a URL is not a
/// URI, and its prefix must never be echoed back in an error.
pub(crate) fn split_scheme(item: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = item.split_once("://")?;
    is_scheme_token(scheme).then_some((scheme, rest))
}

fn is_scheme_token(name: &str) -> bool {
    let mut chars = name.chars();
    name.len() <= MAX_SCHEME_LEN
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Error for an unknown protocol name; names that are not scheme tokens
/// are not echoed.
pub(crate) fn unsupported_protocol(name: &str) -> ParseError {
    if is_scheme_token(name) {
        ParseError::UnsupportedProtocol(name.to_string())
    } else {
        ParseError::UnsupportedFormat
    }
}

/// Decode base64 text, accepting the standard and URL-safe alphabets with
/// or without padding. Whitespace is ignored.
///
/// Returns `None` unless the result is valid UTF-8.
pub fn decode_base64_text(text: &str) -> Option<String> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let padded = match cleaned.len() % 4 {
        0 => cleaned,
        1 => return None,
        rem => format!("{}{}", cleaned, "=".repeat(4 - rem)),
    };

    [&general_purpose::STANDARD, &general_purpose::URL_SAFE]
        .into_iter()
        .find_map(|engine| engine.decode(&padded).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
}

/// Percent-decode `s`, keeping the input as-is if the result is not UTF-8.
pub(crate) fn percent_decode(s: &str) -> String {
    match percent_decode_str(s).decode_utf8() {
        Ok(cow) => cow.into_owned(),
        Err(_) => s.to_string(),
    }
}

/// Range-check a numeric port.
pub(crate) fn check_port(protocol: Protocol, port: i64) -> Result<u16, ParseError> {
    match u16::try_from(port) {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(ParseError::InvalidPort {
            protocol: protocol.display_name(),
            port,
        }),
    }
}

/// Resolve a textual port: absent or non-numeric falls back to the protocol
/// default, numeric values must be in range.
pub(crate) fn port_from_text(protocol: Protocol, text: Option<&str>) -> Result<u16, ParseError> {
    match text.map(str::trim).filter(|t| !t.is_empty()) {
        None => Ok(protocol.default_port()),
        Some(t) => match t.parse::<i64>() {
            Ok(port) => check_port(protocol, port),
            Err(_) => Ok(protocol.default_port()),
        },
    }
}

/// Name used when an item carries no display name.
pub(crate) fn synthesized_name(protocol: Protocol, server: &str) -> String {
    format!("{}-{}", protocol.display_name(), server)
}

/// First non-empty candidate, trimmed.
pub(crate) fn first_non_empty<'a, I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ProtocolSettings;

    const VLESS: &str = "vless://11111111-1111-1111-1111-111111111111@h.example:443?remark=X&security=tls&sni=h.example";

    fn encode(s: &str) -> String {
        general_purpose::STANDARD.encode(s)
    }

    #[test]
    fn test_parse_vless_example() {
        let record = parse(VLESS, "src").unwrap();
        assert_eq!(record.protocol(), Protocol::Vless);
        assert_eq!(record.server(), "h.example");
        assert_eq!(record.port(), 443);
        assert_eq!(record.name(), "X");
        assert_eq!(record.source(), "src");
        assert!(record.id().starts_with("vless-"));
        match record.settings() {
            ProtocolSettings::Vless(v) => {
                assert_eq!(v.security.as_deref(), Some("tls"));
                assert_eq!(v.server_name.as_deref(), Some("h.example"));
            }
            other => panic!("unexpected settings {:?}", other),
        }
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let record = parse(&format!("  {}\n", VLESS), "src").unwrap();
        assert_eq!(record.server(), "h.example");
    }

    #[test]
    fn test_parse_base64_wrapped_uri() {
        let direct = parse(VLESS, "a").unwrap();
        let wrapped = parse(&encode(VLESS), "b").unwrap();
        assert_eq!(direct.id(), wrapped.id());
        assert_eq!(wrapped.protocol(), Protocol::Vless);
    }

    #[test]
    fn test_parse_json_object() {
        let json = r#"{"protocol":"trojan","server":"h.example","port":443,"password":"pw"}"#;
        let record = parse(json, "src").unwrap();
        assert_eq!(record.protocol(), Protocol::Trojan);
    }

    #[test]
    fn test_identity_same_across_encodings() {
        let uri = parse("trojan://pw@h.example:443", "a").unwrap();
        let json = parse(
            r#"{"protocol":"trojan","server":"h.example","port":443,"password":"other"}"#,
            "b",
        )
        .unwrap();
        let b64 = parse(&encode("trojan://pw@h.example:443?sni=x"), "c").unwrap();
        assert_eq!(uri.id(), json.id());
        assert_eq!(uri.id(), b64.id());
    }

    #[test]
    fn test_parse_unsupported_format() {
        for item in ["hello world", "", "   "] {
            assert_eq!(parse(item, "s").unwrap_err(), ParseError::UnsupportedFormat);
        }
    }

    #[test]
    fn test_parse_unknown_scheme() {
        assert_eq!(
            parse("hysteria2://pw@h.example:443", "s").unwrap_err(),
            ParseError::UnsupportedProtocol("hysteria2".to_string())
        );
    }

    #[test]
    fn test_split_scheme() {
        assert_eq!(split_scheme("vless://u@h"), Some(("vless", "u@h")));
        assert_eq!(split_scheme("svn+ssh://h"), Some(("svn+ssh", "h")));
        assert_eq!(split_scheme("://h"), None);
        assert_eq!(split_scheme("1abc://h"), None);
        assert_eq!(split_scheme("see https://t.me/x"), None);
        assert_eq!(split_scheme(&format!("{}://h", "a".repeat(17))), None);
    }

    #[test]
    fn test_json_with_url_in_field_is_not_a_uri() {
        let json = r#"{"protocol":"trojan","server":"h.example","password":"hunter2-secret","name":"see https://t.me/x"}"#;
        let record = parse(json, "s").unwrap();
        assert_eq!(record.protocol(), Protocol::Trojan);
        assert_eq!(record.name(), "see https://t.me/x");
    }

    #[test]
    fn test_unknown_scheme_prefix_never_echoed() {
        let item = r#"password=hunter2-secret note=https://t.me/x"#;
        let err = parse(item, "s").unwrap_err();
        assert_eq!(err, ParseError::UnsupportedFormat);
        assert!(!err.to_string().contains("hunter2"));

        let err = uri::parse_uri(item, "s").unwrap_err();
        assert_eq!(err, ParseError::UnsupportedFormat);
    }

    #[test]
    fn test_decode_base64_text_variants() {
        assert_eq!(decode_base64_text("aGVsbG8=").as_deref(), Some("hello"));
        assert_eq!(decode_base64_text("aGVsbG8").as_deref(), Some("hello"));
        assert_eq!(decode_base64_text("aGVs\nbG8=").as_deref(), Some("hello"));
        assert_eq!(decode_base64_text("Pj4_").as_deref(), Some(">>?"));
        assert_eq!(decode_base64_text("Pj4/").as_deref(), Some(">>?"));
        // decodes, but not to UTF-8
        assert!(decode_base64_text("-_8").is_none());
        assert!(decode_base64_text("not base64!").is_none());
        assert!(decode_base64_text("a").is_none());
    }

    #[test]
    fn test_port_from_text() {
        assert_eq!(port_from_text(Protocol::Vless, None), Ok(443));
        assert_eq!(port_from_text(Protocol::Shadowsocks, Some("")), Ok(8388));
        assert_eq!(port_from_text(Protocol::Vless, Some("8443")), Ok(8443));
        assert_eq!(port_from_text(Protocol::Trojan, Some("abc")), Ok(443));
        assert!(matches!(
            port_from_text(Protocol::Trojan, Some("70000")),
            Err(ParseError::InvalidPort { port: 70000, .. })
        ));
        assert!(port_from_text(Protocol::Trojan, Some("0")).is_err());
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("a%20b"), "a b");
        assert_eq!(percent_decode("%E4%BD%A0"), "你");
        assert_eq!(percent_decode("%FF"), "%FF");
    }

    #[test]
    fn test_first_non_empty() {
        assert_eq!(
            first_non_empty([None, Some("  "), Some(" x "), Some("y")]),
            Some("x".to_string())
        );
        assert_eq!(first_non_empty([None, Some("")]), None);
    }
}
