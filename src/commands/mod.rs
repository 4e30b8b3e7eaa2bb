//! CLI command implementations.

pub mod fetch;
pub mod generate;
pub mod validate;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::aggregator::{self, RunResult};
use crate::config::{
    load_rules, load_sources, validate_rules, validate_sources, FilterRule, Settings,
    SourceDescriptor,
};
use crate::fetcher::{Fetcher, SourceCache};
use crate::filter::FilterEngine;
use crate::signal::{ShutdownGuard, ShutdownToken};

/// Everything a pipeline run needs, loaded and validated
pub(crate) struct Inputs {
    pub settings: Settings,
    pub sources: Vec<SourceDescriptor>,
    pub rules: Vec<FilterRule>,
}

/// Load settings, sources and rules.
///
/// A missing settings file means defaults; a missing rules file means no
/// rules. The sources file is required.
pub(crate) fn load_inputs(config_path: &Path) -> Result<Inputs> {
    let settings = Settings::load_or_default(config_path)
        .with_context(|| format!("Failed to load settings from {:?}", config_path))?;

    let sources = load_sources(&settings.sources_file)?;
    validate_sources(&sources)?;

    let rules = if settings.rules_file.exists() {
        let rules = load_rules(&settings.rules_file)?;
        validate_rules(&rules)?;
        rules
    } else {
        warn!(
            "Rules file {:?} not found, no filter rules applied",
            settings.rules_file
        );
        Vec::new()
    };

    Ok(Inputs {
        settings,
        sources,
        rules,
    })
}

/// Run the fetch/filter/dedup pipeline once.
///
/// SIGINT/SIGTERM cancel in-flight fetches; records admitted so far are kept.
pub(crate) async fn run_pipeline(inputs: Inputs, max: usize) -> Result<RunResult> {
    let Inputs {
        settings,
        sources,
        rules,
    } = inputs;

    let cache = Arc::new(SourceCache::new(Duration::from_secs(settings.cache_ttl_secs)));
    let sweeper = cache.spawn_sweeper(Duration::from_secs(settings.cache_sweep_secs));
    let fetcher = Arc::new(Fetcher::new(cache)?);
    let guard = ShutdownGuard::new(ShutdownToken::new());

    info!(
        "Running pipeline: {} sources, {} rules, max {} configs",
        sources.len(),
        rules.len(),
        max
    );

    let result = aggregator::run(fetcher, &sources, FilterEngine::new(rules), max, guard.token())
        .await
        .context("Pipeline run failed");

    sweeper.abort();
    result
}
