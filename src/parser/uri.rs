//! URI shaped config items: `vmess://`, `vless://`, `trojan://`, `ss://`.

use std::collections::HashMap;

use url::form_urlencoded;

use super::{
    decode_base64_text, first_non_empty, percent_decode, port_from_text, split_scheme,
    synthesized_name,
};
use crate::error::ParseError;
use crate::record::{
    Protocol, ProtocolSettings, RealityOpts, Record, Secret, ShadowsocksSettings, TrojanSettings,
    VlessSettings, XhttpOpts,
};

type Params = HashMap<String, String>;

/// Dispatch a `scheme://...` item to its scheme parser.
pub fn parse_uri(uri: &str, source: &str) -> Result<Record, ParseError> {
    let (scheme, rest) = split_scheme(uri).ok_or(ParseError::UnsupportedFormat)?;

    match scheme.to_ascii_lowercase().as_str() {
        "vmess" => parse_vmess(rest, source),
        "vless" => parse_vless(rest, source),
        "trojan" => parse_trojan(rest, source),
        "ss" | "ssr" => parse_shadowsocks(rest, source),
        _ => Err(ParseError::UnsupportedProtocol(scheme.to_string())),
    }
}

/// `vmess://base64(json)`, falling back to percent-encoded JSON.
fn parse_vmess(payload: &str, source: &str) -> Result<Record, ParseError> {
    let payload = payload.trim();
    let text = match decode_base64_text(payload) {
        Some(text) => text,
        None => percent_encoding::percent_decode_str(payload)
            .decode_utf8()
            .map_err(|_| ParseError::InvalidUri {
                protocol: "VMess",
                reason: "payload is neither base64 nor percent-encoded text",
            })?
            .into_owned(),
    };

    let object: super::json::VmessObject = serde_json::from_str(&text)
        .map_err(|e| ParseError::Malformed(super::json::json_failure("VMess payload", &e)))?;
    object.into_record(source)
}

/// `vless://uuid@host:port?params#name`
fn parse_vless(rest: &str, source: &str) -> Result<Record, ParseError> {
    let parts = UriParts::split(rest, Protocol::Vless)?;
    let params = &parts.params;

    let name = first_non_empty([param(params, "remark"), parts.fragment.as_deref()])
        .unwrap_or_else(|| synthesized_name(Protocol::Vless, &parts.server));

    let reality = (param(params, "type") == Some("tcp") && param(params, "reality") == Some("yes"))
        .then(|| RealityOpts {
            public_key: param_string(params, "pbk"),
            short_id: param_string(params, "sid"),
            server_name: param_string(params, "sni"),
        });

    let xhttp = (param(params, "type") == Some("http") && param(params, "xhttp") == Some("yes"))
        .then(|| XhttpOpts {
            method: param_string(params, "method"),
            host: param_string(params, "host"),
            path: param_string(params, "path"),
        });

    let settings = VlessSettings {
        uuid: parts.credential,
        flow: optional(params, "flow"),
        security: optional(params, "security"),
        server_name: optional(params, "sni"),
        reality,
        xhttp,
    };

    Ok(Record::new(
        name,
        parts.server,
        parts.port,
        ProtocolSettings::Vless(settings),
        source,
    ))
}

/// `trojan://password@host:port?params#name`
fn parse_trojan(rest: &str, source: &str) -> Result<Record, ParseError> {
    let parts = UriParts::split(rest, Protocol::Trojan)?;
    let params = &parts.params;

    let name = first_non_empty([param(params, "name"), parts.fragment.as_deref()])
        .unwrap_or_else(|| synthesized_name(Protocol::Trojan, &parts.server));

    let sni = optional(params, "sni");
    let allow_insecure = param(params, "allowinsecure")
        .or_else(|| param(params, "allowInsecure"))
        == Some("1");

    let settings = TrojanSettings {
        password: parts.credential,
        server_name: sni.clone(),
        tls_server_name: sni,
        allow_insecure,
    };

    Ok(Record::new(
        name,
        parts.server,
        parts.port,
        ProtocolSettings::Trojan(settings),
        source,
    ))
}

/// `ss://method:password@host:port`, `ss://base64(method:password@host:port)`
/// or SIP002 `ss://base64(method:password)@host:port`.
fn parse_shadowsocks(rest: &str, source: &str) -> Result<Record, ParseError> {
    const PROTOCOL: &str = "Shadowsocks";

    let (rest, fragment) = split_fragment(rest);
    let (body, params) = split_query(rest);

    // The whole remainder may be one base64 blob
    let body = match decode_base64_text(body) {
        Some(decoded) if decoded.contains('@') => decoded,
        _ => body.to_string(),
    };

    let (userinfo, address) = split_userinfo(&body, PROTOCOL)?;

    let userinfo = if userinfo.contains(':') {
        percent_decode(userinfo)
    } else {
        decode_base64_text(&percent_decode(userinfo)).ok_or(ParseError::InvalidUri {
            protocol: PROTOCOL,
            reason: "expected method:password",
        })?
    };

    let (method, password) = userinfo.split_once(':').ok_or(ParseError::InvalidUri {
        protocol: PROTOCOL,
        reason: "expected method:password",
    })?;
    if method.trim().is_empty() {
        return Err(ParseError::MissingField {
            protocol: PROTOCOL,
            field: "method",
        });
    }
    if password.is_empty() {
        return Err(ParseError::MissingField {
            protocol: PROTOCOL,
            field: "password",
        });
    }

    let (server, port) = split_host_port(address, Protocol::Shadowsocks)?;

    let name = first_non_empty([param(&params, "remark"), fragment.as_deref()])
        .unwrap_or_else(|| synthesized_name(Protocol::Shadowsocks, &server));

    let settings = ShadowsocksSettings {
        method: method.trim().to_string(),
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

/// Pieces shared by the `credential@host:port?params#fragment` schemes.
struct UriParts {
    credential: Secret,
    server: String,
    port: u16,
    params: Params,
    fragment: Option<String>,
}

impl UriParts {
    fn split(rest: &str, protocol: Protocol) -> Result<Self, ParseError> {
        let name = protocol.display_name();
        let (rest, fragment) = split_fragment(rest);
        let (body, params) = split_query(rest);
        let (credential, address) = split_userinfo(body, name)?;

        let credential = percent_decode(credential);
        if credential.is_empty() {
            let field = match protocol {
                Protocol::Vless | Protocol::Vmess => "UUID",
                _ => "password",
            };
            return Err(ParseError::MissingField {
                protocol: name,
                field,
            });
        }

        let (server, port) = split_host_port(address, protocol)?;

        Ok(Self {
            credential: Secret::new(credential),
            server,
            port,
            params,
            fragment,
        })
    }
}

fn split_fragment(rest: &str) -> (&str, Option<String>) {
    match rest.split_once('#') {
        Some((head, fragment)) => (head, Some(percent_decode(fragment))),
        None => (rest, None),
    }
}

fn split_query(rest: &str) -> (&str, Params) {
    match rest.split_once('?') {
        Some((head, query)) => (head, parse_query(query)),
        None => (rest, Params::new()),
    }
}

fn split_userinfo<'a>(
    body: &'a str,
    protocol: &'static str,
) -> Result<(&'a str, &'a str), ParseError> {
    match body.split_once('@') {
        Some((user, address)) if !address.contains('@') => Ok((user, address)),
        _ => Err(ParseError::InvalidUri {
            protocol,
            reason: "expected credential@host:port",
        }),
    }
}

/// Split `host:port`, `host` or `[v6]:port`. Trailing slashes are ignored.
fn split_host_port(address: &str, protocol: Protocol) -> Result<(String, u16), ParseError> {
    let address = address.trim().trim_end_matches('/');

    let (host, port) = if let Some(v6) = address.strip_prefix('[') {
        let (host, tail) = v6.split_once(']').ok_or(ParseError::InvalidUri {
            protocol: protocol.display_name(),
            reason: "unterminated IPv6 address",
        })?;
        (host, tail.strip_prefix(':'))
    } else {
        match address.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (address, None),
        }
    };

    let host = host.trim();
    if host.is_empty() {
        return Err(ParseError::MissingField {
            protocol: protocol.display_name(),
            field: "server",
        });
    }

    let port = port_from_text(protocol, port)?;
    Ok((host.to_string(), port))
}

/// Split `k=v&k2=v2` with form-urlencoded decoding (`+` is a space);
/// pairs without `=` are skipped.
pub(crate) fn parse_query(query: &str) -> Params {
    query
        .split('&')
        .filter(|pair| pair.contains('='))
        .flat_map(|pair| form_urlencoded::parse(pair.as_bytes()))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

fn param<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).map(String::as_str)
}

fn param_string(params: &Params, key: &str) -> String {
    params.get(key).cloned().unwrap_or_default()
}

fn optional(params: &Params, key: &str) -> Option<String> {
    params.get(key).filter(|v| !v.is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose;
    use base64::Engine;

    fn b64(s: &str) -> String {
        general_purpose::STANDARD.encode(s)
    }

    fn vless(record: &Record) -> &VlessSettings {
        match record.settings() {
            ProtocolSettings::Vless(v) => v,
            other => panic!("expected vless, got {:?}", other),
        }
    }

    fn trojan(record: &Record) -> &TrojanSettings {
        match record.settings() {
            ProtocolSettings::Trojan(t) => t,
            other => panic!("expected trojan, got {:?}", other),
        }
    }

    fn shadowsocks(record: &Record) -> &ShadowsocksSettings {
        match record.settings() {
            ProtocolSettings::Shadowsocks(s) => s,
            other => panic!("expected ss, got {:?}", other),
        }
    }

    #[test]
    fn test_vmess_uri() {
        let json = r#"{"v":"2","ps":"Node 1","add":"v.example","port":"8443","id":"abc-uuid","aid":2,"cipher":"aes-128-gcm"}"#;
        let record = parse_uri(&format!("vmess://{}", b64(json)), "src").unwrap();
        assert_eq!(record.protocol(), Protocol::Vmess);
        assert_eq!(record.name(), "Node 1");
        assert_eq!(record.server(), "v.example");
        assert_eq!(record.port(), 8443);
        match record.settings() {
            ProtocolSettings::Vmess(v) => {
                assert_eq!(v.uuid.expose(), "abc-uuid");
                assert_eq!(v.alter_id, 2);
                assert_eq!(v.cipher, "aes-128-gcm");
            }
            other => panic!("expected vmess, got {:?}", other),
        }
    }

    #[test]
    fn test_vmess_uri_defaults() {
        let json = r#"{"add":"v.example","id":"abc"}"#;
        let record = parse_uri(&format!("vmess://{}", b64(json)), "src").unwrap();
        assert_eq!(record.name(), "VMess Config");
        assert_eq!(record.port(), 443);
        match record.settings() {
            ProtocolSettings::Vmess(v) => {
                assert_eq!(v.alter_id, 0);
                assert_eq!(v.cipher, "auto");
            }
            other => panic!("expected vmess, got {:?}", other),
        }
    }

    #[test]
    fn test_vmess_uri_percent_encoded_json() {
        let uri = "vmess://%7B%22add%22%3A%22v.example%22%2C%22id%22%3A%22abc%22%7D";
        let record = parse_uri(uri, "src").unwrap();
        assert_eq!(record.server(), "v.example");
    }

    #[test]
    fn test_vmess_uri_missing_fields() {
        let no_server = format!("vmess://{}", b64(r#"{"id":"abc"}"#));
        assert_eq!(
            parse_uri(&no_server, "s").unwrap_err().to_string(),
            "VMess missing server address"
        );
        let no_id = format!("vmess://{}", b64(r#"{"add":"v.example"}"#));
        assert_eq!(
            parse_uri(&no_id, "s").unwrap_err().to_string(),
            "VMess missing UUID"
        );
    }

    #[test]
    fn test_vmess_uri_invalid_json() {
        let uri = format!("vmess://{}", b64("not json"));
        assert!(matches!(
            parse_uri(&uri, "s"),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_vless_reality_variant() {
        let uri = "vless://uuid-1@r.example:443?type=tcp&reality=yes&pbk=PUBKEY&sid=ab12&sni=www.example.com&flow=xtls-rprx-vision&security=reality";
        let record = parse_uri(uri, "src").unwrap();
        let v = vless(&record);
        let reality = v.reality().unwrap();
        assert_eq!(reality.public_key, "PUBKEY");
        assert_eq!(reality.short_id, "ab12");
        assert_eq!(reality.server_name, "www.example.com");
        assert_eq!(v.flow.as_deref(), Some("xtls-rprx-vision"));
        assert!(v.xhttp().is_none());
        assert_eq!(record.name(), "VLESS-r.example");
    }

    #[test]
    fn test_vless_reality_requires_flag() {
        let uri = "vless://uuid-1@r.example:443?type=tcp&pbk=PUBKEY";
        let record = parse_uri(uri, "src").unwrap();
        assert!(vless(&record).reality().is_none());
    }

    #[test]
    fn test_vless_xhttp_variant() {
        let uri = "vless://uuid-1@x.example:8080?type=http&xhttp=yes&method=POST&host=cdn.example&path=%2Fapi";
        let record = parse_uri(uri, "src").unwrap();
        let xhttp = vless(&record).xhttp().unwrap();
        assert_eq!(xhttp.method, "POST");
        assert_eq!(xhttp.host, "cdn.example");
        assert_eq!(xhttp.path, "/api");
        assert_eq!(record.port(), 8080);
    }

    #[test]
    fn test_vless_fragment_name_and_default_port() {
        let record = parse_uri("vless://uuid-1@h.example#My%20Node", "src").unwrap();
        assert_eq!(record.name(), "My Node");
        assert_eq!(record.port(), 443);
    }

    #[test]
    fn test_vless_remark_preferred_over_fragment() {
        let record = parse_uri("vless://u@h.example:443?remark=R#F", "src").unwrap();
        assert_eq!(record.name(), "R");
    }

    #[test]
    fn test_vless_trailing_slash_and_ipv6() {
        let record = parse_uri("vless://u@h.example:2053/?security=tls", "src").unwrap();
        assert_eq!(record.port(), 2053);
        let record = parse_uri("vless://u@[2001:db8::1]:443", "src").unwrap();
        assert_eq!(record.server(), "2001:db8::1");
    }

    #[test]
    fn test_vless_structure_errors() {
        assert!(matches!(
            parse_uri("vless://h.example:443", "s"),
            Err(ParseError::InvalidUri { .. })
        ));
        assert_eq!(
            parse_uri("vless://@h.example:443", "s").unwrap_err().to_string(),
            "VLESS missing UUID"
        );
        assert_eq!(
            parse_uri("vless://u@:443", "s").unwrap_err().to_string(),
            "VLESS missing server"
        );
        assert!(matches!(
            parse_uri("vless://u@h.example:99999", "s"),
            Err(ParseError::InvalidPort { port: 99999, .. })
        ));
    }

    #[test]
    fn test_trojan_uri() {
        let uri = "trojan://secret@t.example:8443?sni=front.example&allowinsecure=1&name=T1";
        let record = parse_uri(uri, "src").unwrap();
        assert_eq!(record.protocol(), Protocol::Trojan);
        assert_eq!(record.name(), "T1");
        assert_eq!(record.port(), 8443);
        let t = trojan(&record);
        assert_eq!(t.password.expose(), "secret");
        assert_eq!(t.server_name.as_deref(), Some("front.example"));
        assert_eq!(t.tls_server_name.as_deref(), Some("front.example"));
        assert!(t.allow_insecure);
    }

    #[test]
    fn test_trojan_defaults() {
        let record = parse_uri("trojan://p%40ss@t.example", "src").unwrap();
        assert_eq!(record.name(), "Trojan-t.example");
        assert_eq!(record.port(), 443);
        let t = trojan(&record);
        assert_eq!(t.password.expose(), "p@ss");
        assert!(!t.allow_insecure);
        assert!(t.tls_server_name.is_none());
    }

    #[test]
    fn test_ss_plain_form() {
        let record = parse_uri("ss://aes-256-gcm:pw@s.example:8389?remark=S1", "src").unwrap();
        assert_eq!(record.protocol(), Protocol::Shadowsocks);
        assert_eq!(record.name(), "S1");
        assert_eq!(record.port(), 8389);
        let s = shadowsocks(&record);
        assert_eq!(s.method, "aes-256-gcm");
        assert_eq!(s.password.expose(), "pw");
    }

    #[test]
    fn test_ss_whole_base64_form() {
        let uri = format!("ss://{}", b64("chacha20-ietf-poly1305:pw@s.example"));
        let record = parse_uri(&uri, "src").unwrap();
        assert_eq!(record.port(), 8388);
        assert_eq!(record.name(), "SS-s.example");
        assert_eq!(shadowsocks(&record).method, "chacha20-ietf-poly1305");
    }

    #[test]
    fn test_ss_sip002_form() {
        let userinfo = general_purpose::URL_SAFE_NO_PAD.encode("aes-128-gcm:p:w");
        let uri = format!("ss://{}@s.example:8390#Tokyo%201", userinfo);
        let record = parse_uri(&uri, "src").unwrap();
        assert_eq!(record.name(), "Tokyo 1");
        assert_eq!(record.port(), 8390);
        let s = shadowsocks(&record);
        assert_eq!(s.method, "aes-128-gcm");
        assert_eq!(s.password.expose(), "p:w");
    }

    #[test]
    fn test_ssr_routed_to_shadowsocks() {
        let record = parse_uri("ssr://rc4-md5:pw@s.example:9000", "src").unwrap();
        assert_eq!(record.protocol(), Protocol::Shadowsocks);
    }

    #[test]
    fn test_ss_errors() {
        assert!(matches!(
            parse_uri("ss://s.example:8388", "s"),
            Err(ParseError::InvalidUri { .. })
        ));
        assert_eq!(
            parse_uri("ss://aes-256-gcm:@s.example:8388", "s")
                .unwrap_err()
                .to_string(),
            "Shadowsocks missing password"
        );
    }

    #[test]
    fn test_errors_do_not_leak_credentials() {
        let err = parse_uri("trojan://topsecret@t.example:70000", "s").unwrap_err();
        assert!(!err.to_string().contains("topsecret"));
        let err = parse_uri("ss://aes:topsecret@:1", "s").unwrap_err();
        assert!(!err.to_string().contains("topsecret"));
    }

    #[test]
    fn test_parse_query() {
        let params = parse_query("a=1&b=x%20y&flag&c=k=v");
        assert_eq!(params.get("a").map(String::as_str), Some("1"));
        assert_eq!(params.get("b").map(String::as_str), Some("x y"));
        assert_eq!(params.get("c").map(String::as_str), Some("k=v"));
        assert!(!params.contains_key("flag"));
    }

    #[test]
    fn test_query_plus_is_space() {
        let params = parse_query("remark=My+Node&path=%2Fws%3Fed%3D2048&k%20x=1");
        assert_eq!(params.get("remark").map(String::as_str), Some("My Node"));
        assert_eq!(params.get("path").map(String::as_str), Some("/ws?ed=2048"));
        assert_eq!(params.get("k x").map(String::as_str), Some("1"));

        let plus = parse_uri("vless://u@h.example:443?remark=My+Node", "src").unwrap();
        let encoded = parse_uri("vless://u@h.example:443?remark=My%20Node", "src").unwrap();
        assert_eq!(plus.name(), "My Node");
        assert_eq!(encoded.name(), "My Node");
    }
}
