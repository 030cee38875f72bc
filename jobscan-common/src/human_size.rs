//! Human-readable byte size formatting
//!
//! Used for selection statistics and validation messages so every surface
//! shows sizes the same way.

/// Binary unit step
const UNIT_STEP: f64 = 1024.0;

/// Unit labels, smallest first
const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Format a byte count with binary units and at most two decimals.
///
/// Trailing zeros are dropped, so whole values print without a fraction.
/// Values beyond the largest unit stay in GB.
///
/// # Examples
///
/// ```
/// use jobscan_common::human_size::format_file_size;
///
/// assert_eq!(format_file_size(0), "0 Bytes");
/// assert_eq!(format_file_size(512), "512 Bytes");
/// assert_eq!(format_file_size(1536), "1.5 KB");
/// assert_eq!(format_file_size(16 * 1024 * 1024), "16 MB");
/// assert_eq!(format_file_size(6 * 1024 * 1024), "6 MB");
/// ```
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    // Integer walk avoids log() rounding at exact unit boundaries
    let mut exponent = 0usize;
    let mut scaled = bytes;
    while scaled >= 1024 && exponent < UNITS.len() - 1 {
        scaled /= 1024;
        exponent += 1;
    }
    let value = bytes as f64 / UNIT_STEP.powi(exponent as i32);

    format!("{} {}", trim_decimals(value), UNITS[exponent])
}

/// Render with two decimals, then strip trailing zeros and a dangling point
fn trim_decimals(value: f64) -> String {
    let fixed = format!("{:.2}", value);
    if fixed.contains('.') {
        fixed.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        fixed
    }
}
