//! Fetch command implementation.

use anyhow::Result;
use std::path::Path;

use crate::utils::{format_bytes, format_count_with_separator, truncate};

/// Run the fetch command
pub async fn run(max: Option<usize>, config_path: &Path) -> Result<()> {
    let inputs = super::load_inputs(config_path)?;
    let max = max.unwrap_or(inputs.settings.max_configs);

    let result = super::run_pipeline(inputs, max).await?;

    println!();
    println!("{:<28} {:>8} {:>8} {:>10}", "SOURCE", "CONFIGS", "FAILED", "SIZE");
    for report in &result.reports {
        let size = if report.from_cache {
            "cached".to_string()
        } else {
            format_bytes(report.bytes as u64)
        };
        println!(
            "{:<28} {:>8} {:>8} {:>10}",
            truncate(&report.source, 28),
            format_count_with_separator(report.records),
            report.parse_failures,
            size
        );
    }
    for failure in &result.failures {
        println!("{:<28} error: {}", truncate(failure.source_name(), 28), failure);
    }

    println!();
    println!(
        "Admitted {} configs ({} rejected, {} duplicates){}",
        format_count_with_separator(result.stats.admitted),
        result.stats.rejected,
        result.stats.duplicates,
        if result.cap_reached { ", cap reached" } else { "" }
    );

    Ok(())
}
