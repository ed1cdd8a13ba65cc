//! Second-granularity `HH:MM:SS` timecodes used in reports and clip requests.

/// Formats seconds as `HH:MM:SS`, truncating the fractional part.
///
/// Negative input formats as `00:00:00`. Hours are not wrapped at 24.
pub fn format_hms(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.trunc() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

/// Parses `HH:MM:SS` into whole seconds.
pub fn parse_hms(text: &str) -> Result<u64, String> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.len() != 3 {
        return Err(format!("Expected HH:MM:SS, got '{text}'"));
    }
    let mut fields = [0u64; 3];
    for (slot, part) in fields.iter_mut().zip(&parts) {
        *slot = part
            .parse::<u64>()
            .map_err(|_| format!("Expected HH:MM:SS, got '{text}'"))?;
    }
    let [hours, minutes, secs] = fields;
    if minutes >= 60 || secs >= 60 {
        return Err(format!("Minutes and seconds must be below 60 in '{text}'"));
    }
    Ok(hours * 3600 + minutes * 60 + secs)
}
