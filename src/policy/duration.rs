use crate::config::ConfigError;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Longest approval or grant window a policy may ask for
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Parse a policy duration like `30s`, `15m`, `1h`, `2d` or `500ms`.
///
/// A bare number is read as seconds. Zero is rejected, as is anything longer
/// than [`MAX_DURATION`].
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);

    let amount = digits
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue(format!("Invalid duration: {:?}", input)))?;

    let duration = match unit.trim() {
        "ms" => Duration::from_millis(amount),
        "" | "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount.saturating_mul(60)),
        "h" => Duration::from_secs(amount.saturating_mul(60 * 60)),
        "d" => Duration::from_secs(amount.saturating_mul(24 * 60 * 60)),
        other => {
            return Err(ConfigError::InvalidValue(format!(
                "Unknown duration unit {:?} in {:?} (use ms, s, m, h or d)",
                other, input
            )));
        }
    };

    if duration.is_zero() {
        return Err(ConfigError::InvalidValue(format!(
            "Duration must be greater than 0: {:?}",
            input
        )));
    }

    if duration > MAX_DURATION {
        return Err(ConfigError::InvalidValue(format!(
            "Duration must be at most 365d: {:?}",
            input
        )));
    }

    Ok(duration)
}

/// `start + window`, with the window capped at [`MAX_DURATION`]
pub fn deadline(start: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let window = chrono::Duration::from_std(window.min(MAX_DURATION))
        .unwrap_or_else(|_| chrono::Duration::days(365));
    start
        .checked_add_signed(window)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Render a duration in the largest unit that divides it exactly
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }

    let secs = duration.as_secs();
    for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60)] {
        if secs >= size && secs % size == 0 {
            return format!("{}{}", secs / size, unit);
        }
    }
    format!("{}s", secs)
}
