//! Deduplicating, capped aggregation of fetched records.
//!
//! The [`Aggregator`] is the only writer of the admitted set. [`run`] wires
//! it to the fetch tasks through a bounded queue and stops everything once
//! the cap is reached.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SourceDescriptor;
use crate::error::{PipelineError, SourceFetchError};
use crate::fetcher::{FetchReport, Fetcher};
use crate::filter::{FilterEngine, Rejection};
use crate::record::{EndpointKey, Record};
use crate::signal::ShutdownToken;

/// Capacity of the queue between fetch tasks and the aggregator
pub const QUEUE_CAPACITY: usize = 1000;

/// Default maximum number of admitted records
pub const DEFAULT_MAX_CONFIGS: usize = 5000;

/// What happened to one offered record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer {
    Admitted,
    Rejected(Rejection),
    Duplicate,
    /// The cap was already reached; the record was not considered
    Full,
}

/// Counters over everything offered to an aggregator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub offered: usize,
    pub admitted: usize,
    pub rejected: usize,
    pub duplicates: usize,
}

/// Filters, deduplicates by `(server, port, protocol)` and caps records,
/// keeping first-admitted order.
pub struct Aggregator {
    engine: FilterEngine,
    max: usize,
    seen: HashSet<EndpointKey>,
    admitted: Vec<Record>,
    stats: AggregateStats,
}

impl Aggregator {
    pub fn new(engine: FilterEngine, max: usize) -> Self {
        Self {
            engine,
            max,
            seen: HashSet::new(),
            admitted: Vec::new(),
            stats: AggregateStats::default(),
        }
    }

    /// Offer one record. Filtering happens before deduplication, so a
    /// rejected record never claims its key.
    pub fn offer(&mut self, record: Record) -> Offer {
        if self.is_full() {
            return Offer::Full;
        }
        self.stats.offered += 1;

        if let Err(rejection) = self.engine.evaluate(&record) {
            debug!("Rejected {} ({}): {}", record.id(), record.source(), rejection);
            self.stats.rejected += 1;
            return Offer::Rejected(rejection);
        }

        if !self.seen.insert(record.key()) {
            self.stats.duplicates += 1;
            return Offer::Duplicate;
        }

        self.admitted.push(record);
        self.stats.admitted += 1;
        Offer::Admitted
    }

    pub fn is_full(&self) -> bool {
        self.admitted.len() >= self.max
    }

    pub fn len(&self) -> usize {
        self.admitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.admitted
    }

    pub fn stats(&self) -> &AggregateStats {
        &self.stats
    }

    pub fn into_records(self) -> Vec<Record> {
        self.admitted
    }
}

/// Aggregate an in-memory batch of records.
pub fn aggregate<I>(records: I, engine: FilterEngine, max: usize) -> Vec<Record>
where
    I: IntoIterator<Item = Record>,
{
    let mut aggregator = Aggregator::new(engine, max);
    for record in records {
        if aggregator.offer(record) == Offer::Full {
            break;
        }
    }
    aggregator.into_records()
}

/// Result of one pipeline run
#[derive(Debug)]
pub struct RunResult {
    pub records: Vec<Record>,
    pub reports: Vec<FetchReport>,
    pub failures: Vec<SourceFetchError>,
    pub stats: AggregateStats,
    pub cap_reached: bool,
}

/// Fetch every enabled source concurrently and aggregate the records.
///
/// Once `max` records are admitted the token is cancelled, intake stops and
/// in-flight fetch tasks are aborted. Per-source failures are collected; an
/// error is returned only when there was nothing to fetch or every source
/// failed.
pub async fn run(
    fetcher: Arc<Fetcher>,
    sources: &[SourceDescriptor],
    engine: FilterEngine,
    max: usize,
    token: ShutdownToken,
) -> Result<RunResult, PipelineError> {
    let enabled = sources.iter().filter(|s| s.enabled).count();
    if enabled == 0 {
        return Err(PipelineError::NoSources);
    }
    info!("Fetching {} sources", enabled);

    let (tx, mut rx) = mpsc::channel(QUEUE_CAPACITY);
    let mut tasks = fetcher.spawn_all(sources, tx, &token);
    let mut aggregator = Aggregator::new(engine, max);
    let mut cap_reached = aggregator.is_full();

    while !cap_reached {
        let record = tokio::select! {
            _ = token.cancelled() => {
                warn!("Cancelled, stopping intake");
                break;
            }
            next = rx.recv() => match next {
                Some(record) => record,
                None => break,
            },
        };

        aggregator.offer(record);
        if aggregator.is_full() {
            info!("Reached maximum of {} configs, stopping fetches", max);
            cap_reached = true;
        }
    }

    if cap_reached || token.is_cancelled() {
        token.cancel();
        tasks.abort_all();
    }
    drop(rx);

    let mut reports = Vec::new();
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(report)) => reports.push(report),
            Ok(Err(SourceFetchError::Cancelled { source_name })) => {
                debug!("Fetch of {} cancelled", source_name);
            }
            Ok(Err(e)) => {
                warn!("Source {} failed: {}", e.source_name(), e);
                failures.push(e);
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!("Fetch task failed: {}", e),
        }
    }

    if reports.is_empty() && !failures.is_empty() && !cap_reached {
        return Err(PipelineError::AllSourcesFailed {
            failed: failures.len(),
        });
    }

    let stats = aggregator.stats().clone();
    info!(
        "Admitted {} configs ({} rejected, {} duplicates)",
        stats.admitted, stats.rejected, stats.duplicates
    );

    Ok(RunResult {
        records: aggregator.into_records(),
        reports,
        failures,
        stats,
        cap_reached,
    })
}
