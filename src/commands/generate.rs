//! Generate command implementation.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use crate::subscription::{encode_base64, generate, Format};
use crate::utils::{format_bytes, format_count_with_separator, format_elapsed};

/// Run the generate command
pub async fn run(
    format: Option<String>,
    output: Option<PathBuf>,
    max: Option<usize>,
    base64: bool,
    config_path: &Path,
) -> Result<()> {
    let started = Instant::now();
    let inputs = super::load_inputs(config_path)?;

    // unknown formats fail before anything is fetched
    let format: Format = format
        .as_deref()
        .unwrap_or(inputs.settings.format.as_str())
        .parse()?;
    let output = output.unwrap_or_else(|| inputs.settings.output.clone());
    let max = max.unwrap_or(inputs.settings.max_configs);

    let result = super::run_pipeline(inputs, max).await?;

    let mut text = generate(&result.records, format)?;
    if base64 {
        text = encode_base64(&text);
    }

    write_output(&output, &text)?;
    info!("Wrote {} subscription to {:?}", format, output);

    println!();
    println!(
        "Generated {} subscription with {} configs",
        format,
        format_count_with_separator(result.records.len())
    );
    println!(
        "  Sources:  {} ok, {} failed",
        result.reports.len(),
        result.failures.len()
    );
    println!(
        "  Filtered: {} rejected, {} duplicates",
        result.stats.rejected, result.stats.duplicates
    );
    println!(
        "  Output:   {} ({}{})",
        output.display(),
        format_bytes(text.len() as u64),
        if base64 { ", base64" } else { "" }
    );
    println!("  Elapsed:  {}", format_elapsed(started.elapsed()));

    Ok(())
}

fn write_output(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {:?}", parent))?;
    }
    std::fs::write(path, text).with_context(|| format!("Failed to write {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_output_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscriptions").join("main.txt");
        write_output(&path, "proxies: []\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "proxies: []\n");
    }

    #[test]
    fn test_write_output_bare_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_output(&path, "x").unwrap();
        assert!(path.exists());
    }
}
