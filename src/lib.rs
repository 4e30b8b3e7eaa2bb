//! # proxagg - Proxy Subscription Aggregator
//!
//! Fetches public lists of proxy configs, normalizes every entry into one
//! record model, filters and deduplicates them, and re-publishes the result
//! as a subscription for Clash, sing-box or V2Ray clients.
//!
//! ## Features
//!
//! - **Concurrent Fetching** - One task per source, bounded queue, TTL cache
//! - **Tolerant Parsing** - `vmess://`, `vless://` (REALITY, XHTTP), `trojan://`,
//!   `ss://` (plain, base64, SIP002), base64-wrapped URIs and bare JSON objects
//! - **Deterministic Identity** - Records keyed by protocol, server and port
//! - **Ordered Rules** - First matching rule wins, plus an Iran network policy
//! - **Faithful Output** - Protocol option groups appear only when present
//! - **Early Stop** - In-flight fetches are cancelled once the cap is reached
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        proxagg                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: generate, fetch, validate, version         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml, serde_json)                            │
//! │    └── Settings, source descriptors, filter rules           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Fetcher (reqwest + rustls)                                 │
//! │    ├── TtlCache (parking_lot, sweeper task)                 │
//! │    └── plain / base64 / json payload decoding               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Parser                                                     │
//! │    └── URI schemes, base64-wrapped URIs, JSON objects       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Aggregator (tokio mpsc + JoinSet)                          │
//! │    └── FilterEngine → dedup → cap → cancel                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Subscription                                               │
//! │    └── clash (YAML), singbox (JSON), v2ray, raw             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use proxagg::aggregator;
//! use proxagg::config::{load_rules, load_sources, Settings};
//! use proxagg::fetcher::{Fetcher, SourceCache};
//! use proxagg::filter::FilterEngine;
//! use proxagg::signal::ShutdownToken;
//! use proxagg::subscription::{generate, Format};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load("config/settings.yaml")?;
//!     let sources = load_sources(&settings.sources_file)?;
//!     let rules = load_rules(&settings.rules_file)?;
//!
//!     let fetcher = Arc::new(Fetcher::new(Arc::new(SourceCache::default()))?);
//!     let result = aggregator::run(
//!         fetcher,
//!         &sources,
//!         FilterEngine::new(rules),
//!         settings.max_configs,
//!         ShutdownToken::new(),
//!     )
//!     .await?;
//!
//!     let text = generate(&result.records, Format::Clash)?;
//!     std::fs::write(&settings.output, text)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Security
//!
//! - **Credential Protection** - UUIDs and passwords are redacted in `Debug`
//!   output and zeroed on drop; parse errors never echo them
//! - **Download Limits** - Source payloads are size-limited (10MB/source)
//! - **HTTPS Only** - Enabled sources must use HTTPS
//! - **No Endpoint Contact** - Proxy servers themselves are never connected to
//!
//! ## Modules
//!
//! - [`aggregator`] - Filtering, deduplication, cap and the pipeline driver
//! - [`cache`] - TTL cache with background expiry sweep
//! - [`cli`] - Command-line interface definitions
//! - [`commands`] - CLI command implementations
//! - [`config`] - Settings, sources and rules loading and validation
//! - [`error`] - Typed errors
//! - [`fetcher`] - HTTP client for downloading sources
//! - [`filter`] - Filter rules and the Iran network policy
//! - [`parser`] - Config item parsing
//! - [`record`] - Normalized proxy record
//! - [`security`] - Obfuscation engine call contract
//! - [`signal`] - Cancellation token and signal handling
//! - [`subscription`] - Output format rendering
//! - [`utils`] - Common utility functions (formatting, truncation)

pub mod aggregator;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod filter;
pub mod parser;
pub mod record;
pub mod security;
pub mod signal;
pub mod subscription;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Settings;
pub use record::{Protocol, Record};
