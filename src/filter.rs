//! Rule based admission of records.
//!
//! User rules are evaluated in declaration order and the first enabled rule
//! matching the record decides; no match means include. The Iran network
//! policy is applied independently of the rules and can only reject.

use std::fmt;

use crate::config::{FilterRule, RuleAction, RuleKind};
use crate::record::{Protocol, Record};

/// Why a record was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Excluded by the named user rule
    Rule(String),
    /// Failed the network policy
    Policy(PolicyViolation),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Rule(name) => write!(f, "excluded by rule '{}'", name),
            Rejection::Policy(v) => write!(f, "policy: {}", v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyViolation {
    UnsupportedProtocol(Protocol),
    BlockedPort(u16),
    EmptyServer,
    PortOutOfRange(u16),
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyViolation::UnsupportedProtocol(p) => write!(f, "protocol {} not supported", p),
            PolicyViolation::BlockedPort(port) => write!(f, "port {} is unreliable", port),
            PolicyViolation::EmptyServer => f.write_str("empty server address"),
            PolicyViolation::PortOutOfRange(port) => write!(f, "port {} out of range", port),
        }
    }
}

/// Network requirements for endpoints used from inside Iran.
#[derive(Debug, Clone)]
pub struct IranPolicy {
    supported: Vec<Protocol>,
    blocked_ports: Vec<u16>,
}

impl Default for IranPolicy {
    fn default() -> Self {
        Self {
            supported: Protocol::ALL.to_vec(),
            // ssh, rdp, mongodb
            blocked_ports: vec![22, 3389, 27017],
        }
    }
}

impl IranPolicy {
    pub fn check(&self, record: &Record) -> Result<(), PolicyViolation> {
        let protocol = record.protocol();
        if !self.supported.contains(&protocol) {
            return Err(PolicyViolation::UnsupportedProtocol(protocol));
        }
        let port = record.port();
        if self.blocked_ports.contains(&port) {
            return Err(PolicyViolation::BlockedPort(port));
        }
        if record.server().trim().is_empty() {
            return Err(PolicyViolation::EmptyServer);
        }
        if port == 0 {
            return Err(PolicyViolation::PortOutOfRange(port));
        }
        Ok(())
    }
}

/// Ordered user rules plus the optional network policy.
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    rules: Vec<FilterRule>,
    policy: Option<IranPolicy>,
}

impl FilterEngine {
    /// Engine with the given rules and the Iran policy enabled.
    pub fn new(rules: Vec<FilterRule>) -> Self {
        Self {
            rules,
            policy: Some(IranPolicy::default()),
        }
    }

    /// Engine evaluating user rules only.
    pub fn rules_only(rules: Vec<FilterRule>) -> Self {
        Self {
            rules,
            policy: None,
        }
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    pub fn admit(&self, record: &Record) -> bool {
        self.evaluate(record).is_ok()
    }

    /// Admission decision with the reason for a rejection.
    pub fn evaluate(&self, record: &Record) -> Result<(), Rejection> {
        if let Some(policy) = &self.policy {
            policy.check(record).map_err(Rejection::Policy)?;
        }

        let decisive = self
            .rules
            .iter()
            .filter(|rule| rule.enabled)
            .find(|rule| rule_matches(rule, record));

        match decisive {
            Some(rule) if rule.action == RuleAction::Exclude => {
                Err(Rejection::Rule(rule.name.clone()))
            }
            _ => Ok(()),
        }
    }
}

fn rule_matches(rule: &FilterRule, record: &Record) -> bool {
    let pattern = rule.pattern.trim();
    match rule.kind {
        RuleKind::Protocol => pattern.eq_ignore_ascii_case(record.protocol().as_str()),
        RuleKind::Country => record
            .country()
            .is_some_and(|c| pattern.eq_ignore_ascii_case(c)),
        RuleKind::Domain => pattern.eq_ignore_ascii_case(record.server()),
    }
}
