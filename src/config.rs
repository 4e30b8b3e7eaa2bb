//! Configuration management for proxagg.
//!
//! Three files drive a run: the settings file (YAML), the source list
//! (YAML) and the filter rules (JSON). All three are loaded once and are
//! read-only afterwards.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use url::Url;

use crate::record::Secret;
use crate::security::SecurityOptions;

/// Allowed per-source timeout range in seconds
const TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=300;

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Source list (YAML)
    pub sources_file: PathBuf,

    /// Filter rules (JSON)
    pub rules_file: PathBuf,

    /// Maximum number of admitted records
    pub max_configs: usize,

    /// Output format (clash, singbox, v2ray, raw)
    pub format: String,

    /// Output subscription file
    pub output: PathBuf,

    /// How long a fetched source stays cached
    pub cache_ttl_secs: u64,

    /// Interval between cache expiry sweeps
    pub cache_sweep_secs: u64,

    /// Options handed to the obfuscation engine
    pub security: SecurityOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sources_file: PathBuf::from("config/sources.yaml"),
            rules_file: PathBuf::from("config/iran_rules.json"),
            max_configs: 5000,
            format: "clash".to_string(),
            output: PathBuf::from("subscriptions/main.txt"),
            cache_ttl_secs: 3600,
            cache_sweep_secs: 300,
            security: SecurityOptions::default(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file.
    ///
    /// Relative paths inside the file are resolved against its directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;
        let mut settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {:?}", path))?;

        if let Some(base) = path.parent() {
            settings.sources_file = resolve(base, &settings.sources_file);
            settings.rules_file = resolve(base, &settings.rules_file);
            settings.output = resolve(base, &settings.output);
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Load settings if the file exists, defaults otherwise.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate settings values
    pub fn validate(&self) -> Result<()> {
        if self.max_configs == 0 {
            anyhow::bail!("max_configs must be greater than 0");
        }

        if self.cache_sweep_secs == 0 {
            anyhow::bail!("cache_sweep_secs must be greater than 0");
        }

        self.security
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid security options: {}", e))?;

        Ok(())
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Payload encoding of a source
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Whole payload is base64 of a plain list
    Base64,
    /// JSON array (or single object) of config items
    Json,
    /// One config item per line
    #[default]
    Plain,
}

/// One remote list of proxy configs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub url: String,
    #[serde(rename = "type", default)]
    pub kind: SourceType,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Sent verbatim as the Authorization header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Secret>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Refresh interval in seconds
    #[serde(default = "default_interval")]
    pub interval: u64,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, url: impl Into<String>, kind: SourceType) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            kind,
            enabled: true,
            auth: None,
            timeout: default_timeout(),
            interval: default_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_interval() -> u64 {
    360
}

/// Source files come either as a bare list or under a `sources:` key
#[derive(Deserialize)]
#[serde(untagged)]
enum SourcesFile {
    List(Vec<SourceDescriptor>),
    Wrapped { sources: Vec<SourceDescriptor> },
}

/// Load source descriptors from YAML
pub fn load_sources<P: AsRef<Path>>(path: P) -> Result<Vec<SourceDescriptor>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sources file: {:?}", path))?;
    parse_sources(&content).with_context(|| format!("Failed to parse sources file: {:?}", path))
}

pub fn parse_sources(content: &str) -> Result<Vec<SourceDescriptor>> {
    let file: SourcesFile = serde_yaml::from_str(content)?;
    Ok(match file {
        SourcesFile::List(sources) | SourcesFile::Wrapped { sources } => sources,
    })
}

/// Validate source descriptors
pub fn validate_sources(sources: &[SourceDescriptor]) -> Result<()> {
    let mut names = HashSet::new();

    for source in sources {
        if source.name.trim().is_empty() {
            anyhow::bail!("Source with URL {} has an empty name", source.url);
        }

        if !names.insert(source.name.as_str()) {
            anyhow::bail!("Duplicate source name '{}'", source.name);
        }

        if !source.enabled {
            continue;
        }

        let url = Url::parse(&source.url)
            .with_context(|| format!("Source '{}' has an invalid URL", source.name))?;
        if url.scheme() != "https" {
            anyhow::bail!(
                "Source '{}' URL must use HTTPS: {}",
                source.name,
                source.url
            );
        }

        if !TIMEOUT_RANGE.contains(&source.timeout) {
            anyhow::bail!(
                "Source '{}' timeout {}s outside {}-{}s",
                source.name,
                source.timeout,
                TIMEOUT_RANGE.start(),
                TIMEOUT_RANGE.end()
            );
        }
    }

    Ok(())
}

/// Enabled sources in declaration order
pub fn enabled_sources(sources: &[SourceDescriptor]) -> Vec<&SourceDescriptor> {
    sources.iter().filter(|s| s.enabled).collect()
}

/// Record attribute a rule binds to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Protocol tag (vmess, vless, trojan, ss)
    Protocol,
    /// Geographic origin tag
    Country,
    /// Exact server address
    Domain,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Include,
    Exclude,
}

/// One filter rule; rules are evaluated in declaration order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRule {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RuleKind,
    pub pattern: String,
    pub action: RuleAction,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Load filter rules from JSON
pub fn load_rules<P: AsRef<Path>>(path: P) -> Result<Vec<FilterRule>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rules file: {:?}", path))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse rules file: {:?}", path))
}

/// Validate filter rules
pub fn validate_rules(rules: &[FilterRule]) -> Result<()> {
    for (i, rule) in rules.iter().enumerate() {
        if rule.enabled && rule.pattern.trim().is_empty() {
            anyhow::bail!("Rule {} ('{}') has an empty pattern", i, rule.name);
        }
    }
    Ok(())
}
