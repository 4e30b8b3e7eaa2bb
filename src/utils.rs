//! Formatting helpers for log lines and command summaries.
//!
//! - [`format_count`] - counts with K/M suffix (1.5K, 2.3M)
//! - [`format_count_with_separator`] - counts with thousands separator (1,234,567)
//! - [`format_bytes`] - payload sizes (KB, MB, GB)
//! - [`format_elapsed`] - run durations (850ms, 2.4s)
//! - [`truncate`] - shorten names for table output

use std::time::Duration;

/// Format a count with K/M suffix for compact display.
///
/// # Examples
/// ```
/// use proxagg::utils::format_count;
/// assert_eq!(format_count(500), "500");
/// assert_eq!(format_count(1500), "1.5K");
/// assert_eq!(format_count(1_500_000), "1.5M");
/// ```
pub fn format_count(count: usize) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}

/// Format a number with thousands separators.
///
/// ```
/// use proxagg::utils::format_count_with_separator;
/// assert_eq!(format_count_with_separator(5000), "5,000");
/// ```
pub fn format_count_with_separator(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format a byte count in human-readable form.
///
/// # Examples
/// ```
/// use proxagg::utils::format_bytes;
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(10 * 1024 * 1024), "10.0 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a run duration: milliseconds below one second, else seconds.
pub fn format_elapsed(elapsed: Duration) -> String {
    if elapsed < Duration::from_secs(1) {
        format!("{}ms", elapsed.as_millis())
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}

/// Truncate to at most `max_chars` characters, ending in "..." if shortened.
///
/// Counts characters, not bytes, so names in any script are cut safely.
///
/// ```
/// use proxagg::utils::truncate;
/// assert_eq!(truncate("free-configs", 20), "free-configs");
/// assert_eq!(truncate("free-configs-mirror", 10), "free-co...");
/// ```
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars <= 3 {
        return "...".to_string();
    }
    let kept: String = s.chars().take(max_chars - 3).collect();
    format!("{}...", kept)
}
