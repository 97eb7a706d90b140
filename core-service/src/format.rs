//! Time display formatting
//!
//! Position and run-length values travel through the core as seconds; the
//! UI shows them as `m:ss`, or `h:mm:ss` once a track crosses the hour.

/// Format a second count for display.
///
/// Negative and non-finite inputs render as `0:00`.
pub fn format_time(secs: f64) -> String {
    if !secs.is_finite() || secs <= 0.0 {
        return "0:00".to_string();
    }

    let total = secs as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
