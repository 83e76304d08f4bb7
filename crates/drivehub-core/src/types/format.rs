//! Human-readable renderings of byte counts and durations.

/// Render a byte count with two decimals and a binary unit suffix,
/// e.g. `1.50 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Render a remaining-time estimate as `1h 3m 5s`, dropping leading zero
/// components. `None` renders as `N/A`.
pub fn format_eta(seconds: Option<u64>) -> String {
    let Some(total) = seconds else {
        return "N/A".to_string();
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}
