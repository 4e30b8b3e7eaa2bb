//! HTTP fetcher for proxy config sources.
//!
//! Each enabled source is fetched in its own task. A source is served from
//! the cache when a live entry exists, otherwise downloaded with retries,
//! decoded according to its declared type and parsed item by item. Parsed
//! records are pushed into a shared bounded queue.

use anyhow::{Context, Result};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::config::{SourceDescriptor, SourceType};
use crate::error::SourceFetchError;
use crate::parser;
use crate::record::Record;
use crate::signal::ShutdownToken;
use crate::utils::format_count;

pub const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 1000;

/// Maximum payload size per source (10 MB)
pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Parsed records per source name
pub type SourceCache = TtlCache<Vec<Record>>;

/// Outcome of one successful source fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub source: String,
    pub records: usize,
    pub parse_failures: usize,
    pub from_cache: bool,
    /// Payload size, 0 when served from cache
    pub bytes: usize,
}

/// HTTP client for fetching sources
pub struct Fetcher {
    client: Client,
    cache: Arc<SourceCache>,
    retry_delay: Duration,
    max_payload: usize,
}

impl Fetcher {
    pub fn new(cache: Arc<SourceCache>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("proxagg/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            cache,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
            max_payload: MAX_PAYLOAD_SIZE,
        })
    }

    /// Base delay before the first retry; doubles on each further attempt.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_max_payload(mut self, bytes: usize) -> Self {
        self.max_payload = bytes;
        self
    }

    pub fn cache(&self) -> &Arc<SourceCache> {
        &self.cache
    }

    /// Fetch one source, cache-first.
    pub async fn fetch_source(
        &self,
        source: &SourceDescriptor,
        token: &ShutdownToken,
    ) -> Result<(Vec<Record>, FetchReport), SourceFetchError> {
        if let Some(records) = self.cache.get(&source.name) {
            info!(
                "Cache hit for {} - {} configs",
                source.name,
                format_count(records.len())
            );
            let report = FetchReport {
                source: source.name.clone(),
                records: records.len(),
                parse_failures: 0,
                from_cache: true,
                bytes: 0,
            };
            return Ok((records, report));
        }

        info!("Fetching {}...", source.name);
        let body = self.fetch_with_retry(source, token).await?;

        let items =
            decode_payload(source.kind, &body).map_err(|message| SourceFetchError::Decode {
                source_name: source.name.clone(),
                message,
            })?;
        let (records, parse_failures) = parse_items(&items, &source.name);

        self.cache.set(source.name.clone(), records.clone());

        info!(
            "Fetched {} - {} configs ({} unparseable)",
            source.name,
            format_count(records.len()),
            parse_failures
        );

        let report = FetchReport {
            source: source.name.clone(),
            records: records.len(),
            parse_failures,
            from_cache: false,
            bytes: body.len(),
        };
        Ok((records, report))
    }

    /// Spawn one task per source. Each task pushes its records into `tx`;
    /// the queue closes once every task has finished.
    pub fn spawn_all(
        self: &Arc<Self>,
        sources: &[SourceDescriptor],
        tx: mpsc::Sender<Record>,
        token: &ShutdownToken,
    ) -> JoinSet<Result<FetchReport, SourceFetchError>> {
        let mut tasks = JoinSet::new();

        for source in sources.iter().filter(|s| s.enabled).cloned() {
            let fetcher = Arc::clone(self);
            let tx = tx.clone();
            let token = token.clone();

            tasks.spawn(async move {
                let (records, report) = fetcher.fetch_source(&source, &token).await?;
                for record in records {
                    if token.is_cancelled() || tx.send(record).await.is_err() {
                        debug!("Intake closed, {} stops emitting", source.name);
                        break;
                    }
                }
                Ok(report)
            });
        }

        tasks
    }

    /// Download a payload with retry logic and size validation.
    async fn fetch_with_retry(
        &self,
        source: &SourceDescriptor,
        token: &ShutdownToken,
    ) -> Result<String, SourceFetchError> {
        let cancelled = || SourceFetchError::Cancelled {
            source_name: source.name.clone(),
        };
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = self.retry_delay * (1 << (attempt - 1));
                debug!("Retry {} after {:?} for {}", attempt, delay, source.name);
                tokio::select! {
                    _ = token.cancelled() => return Err(cancelled()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            if token.is_cancelled() {
                return Err(cancelled());
            }

            match self.download(source).await {
                Ok(body) => return Ok(body),
                Err(e @ SourceFetchError::TooLarge { .. }) => return Err(e),
                Err(e) => {
                    debug!("Attempt {} for {} failed: {}", attempt + 1, source.name, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(cancelled))
    }

    async fn download(&self, source: &SourceDescriptor) -> Result<String, SourceFetchError> {
        let name = &source.name;
        let mut request = self
            .client
            .get(&source.url)
            .timeout(Duration::from_secs(source.timeout));
        if let Some(auth) = &source.auth {
            request = request.header(AUTHORIZATION, auth.expose());
        }

        let mut response = request
            .send()
            .await
            .map_err(|e| request_error(name, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceFetchError::Status {
                source_name: name.clone(),
                status: status.as_u16(),
            });
        }

        if let Some(length) = response.content_length() {
            if length as usize > self.max_payload {
                return Err(SourceFetchError::TooLarge {
                    source_name: name.clone(),
                    size: length as usize,
                    max: self.max_payload,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| request_error(name, e))? {
            if body.len() + chunk.len() > self.max_payload {
                return Err(SourceFetchError::TooLarge {
                    source_name: name.clone(),
                    size: body.len() + chunk.len(),
                    max: self.max_payload,
                });
            }
            body.extend_from_slice(&chunk);
        }

        String::from_utf8(body).map_err(|_| SourceFetchError::Decode {
            source_name: name.clone(),
            message: "payload is not valid UTF-8".to_string(),
        })
    }
}

// Note: Default is intentionally not implemented for Fetcher
// because new() can fail and we want explicit error handling.

fn request_error(source_name: &str, e: reqwest::Error) -> SourceFetchError {
    if e.is_timeout() {
        SourceFetchError::Timeout {
            source_name: source_name.to_string(),
        }
    } else {
        // URLs may carry access tokens
        SourceFetchError::Network {
            source_name: source_name.to_string(),
            message: e.without_url().to_string(),
        }
    }
}

/// Split a payload into config items according to the source type.
pub fn decode_payload(kind: SourceType, payload: &str) -> Result<Vec<String>, String> {
    match kind {
        SourceType::Plain => {
            // Subscriptions served as one base64 blob despite a plain declaration
            if !payload.contains("://") {
                if let Some(decoded) = parser::decode_base64_text(payload) {
                    if decoded.contains("://") {
                        return Ok(split_lines(&decoded));
                    }
                }
            }
            Ok(split_lines(payload))
        }
        SourceType::Base64 => parser::decode_base64_text(payload)
            .map(|text| split_lines(&text))
            .ok_or_else(|| "payload is not valid base64".to_string()),
        SourceType::Json => {
            let value: Value =
                serde_json::from_str(payload).map_err(|e| format!("invalid JSON: {}", e))?;
            match value {
                Value::Array(items) => Ok(items.into_iter().map(item_text).collect()),
                Value::Object(_) => Ok(vec![value.to_string()]),
                _ => Err("expected a JSON array or object".to_string()),
            }
        }
    }
}

fn item_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Parse every item, dropping failures. Returns the records and the
/// number of items that failed to parse.
pub fn parse_items<S: AsRef<str>>(items: &[S], source: &str) -> (Vec<Record>, usize) {
    let mut records = Vec::with_capacity(items.len());
    let mut failures = 0;

    for item in items {
        match parser::parse(item.as_ref(), source) {
            Ok(record) => records.push(record),
            Err(e) => {
                failures += 1;
                debug!("Skipping item from {}: {}", source, e);
            }
        }
    }

    if failures > 0 && records.is_empty() {
        warn!("No parseable configs in {} ({} items)", source, failures);
    }

    (records, failures)
}
