//! Validate command implementation.

use anyhow::Result;
use std::path::Path;

use crate::config::enabled_sources;

/// Run the validate command
pub async fn run(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        println!("Settings file {:?} not found, using defaults", config_path);
    }

    let inputs = super::load_inputs(config_path)?;
    let settings = &inputs.settings;

    println!("Configuration OK");
    println!(
        "  Sources:  {} ({} enabled)",
        inputs.sources.len(),
        enabled_sources(&inputs.sources).len()
    );
    println!(
        "  Rules:    {} ({} enabled)",
        inputs.rules.len(),
        inputs.rules.iter().filter(|r| r.enabled).count()
    );
    println!("  Format:   {}", settings.format);
    println!("  Max:      {}", settings.max_configs);
    println!(
        "  Security: fragment {}B, delay {}ms, randomization {}",
        settings.security.fragmentation_bytes,
        settings.security.delay_ms,
        settings.security.randomization_level
    );

    Ok(())
}
