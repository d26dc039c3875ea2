//! Time formatting and parsing utilities for UPnP renderers.
//!
//! UPnP AVTransport expresses positions and durations as `H+:MM:SS`, some
//! renderers adding a fractional part (`0:03:25.500`). Internally every
//! position is carried in milliseconds.

use crate::errors::ControlPointError;

/// Formats a duration in seconds as HH:MM:SS.
///
/// # Examples
/// ```
/// # use pmocontrol::time_utils::format_hhmmss;
/// assert_eq!(format_hhmmss(0), "00:00:00");
/// assert_eq!(format_hhmmss(61), "00:01:01");
/// assert_eq!(format_hhmmss(3661), "01:01:01");
/// ```
pub fn format_hhmmss(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// Formats a position in milliseconds as a Seek `REL_TIME` target.
///
/// Sub-second precision is dropped, as most renderers reject fractions.
pub fn format_rel_time_ms(position_ms: u64) -> String {
    format_hhmmss(position_ms / 1000)
}

/// Parses `H+:MM:SS[.fff]`, `MM:SS` or `SS` into milliseconds.
///
/// # Examples
/// ```
/// # use pmocontrol::time_utils::parse_time_ms;
/// assert_eq!(parse_time_ms("0:03:25").unwrap(), 205_000);
/// assert_eq!(parse_time_ms("00:00:01.250").unwrap(), 1_250);
/// assert!(parse_time_ms("NOT_IMPLEMENTED").is_err());
/// ```
///
/// # Errors
/// Returns an error if the input has more than 3 parts, any part is not
/// numeric, or the value does not fit in a `u64` of milliseconds.
pub fn parse_time_ms(input: &str) -> Result<u64, ControlPointError> {
    let overflow = || {
        ControlPointError::InvalidTimeFormat(format!("Time value '{}' is out of range", input))
    };
    let trimmed = input.trim();
    let parts: Vec<&str> = trimmed.split(':').collect();

    if trimmed.is_empty() || parts.len() > 3 {
        return Err(ControlPointError::InvalidTimeFormat(format!(
            "Invalid time format '{}': expected HH:MM:SS, MM:SS, or SS",
            input
        )));
    }

    let (whole, last) = parts.split_at(parts.len() - 1);
    let mut total_seconds = 0u64;
    for part in whole {
        let value = part.parse::<u64>().map_err(|_| {
            ControlPointError::InvalidTimeFormat(format!(
                "Invalid numeric value '{}' in time string '{}'",
                part, input
            ))
        })?;
        total_seconds = accumulate(total_seconds, value).ok_or_else(overflow)?;
    }

    let (secs, fraction) = match last[0].split_once('.') {
        Some((secs, fraction)) => (secs, Some(fraction)),
        None => (last[0], None),
    };
    let secs = secs.parse::<u64>().map_err(|_| {
        ControlPointError::InvalidTimeFormat(format!(
            "Invalid seconds '{}' in time string '{}'",
            last[0], input
        ))
    })?;
    total_seconds = accumulate(total_seconds, secs).ok_or_else(overflow)?;

    let millis = match fraction {
        Some(fraction) => parse_fraction_ms(fraction).ok_or_else(|| {
            ControlPointError::InvalidTimeFormat(format!(
                "Invalid fraction '{}' in time string '{}'",
                fraction, input
            ))
        })?,
        None => 0,
    };

    total_seconds
        .checked_mul(1000)
        .and_then(|ms| ms.checked_add(millis))
        .ok_or_else(overflow)
}

/// `total * 60 + value`, `None` on overflow.
fn accumulate(total: u64, value: u64) -> Option<u64> {
    total.checked_mul(60)?.checked_add(value)
}

/// ".5" → 500, ".25" → 250, ".1234" → 123
fn parse_fraction_ms(fraction: &str) -> Option<u64> {
    if fraction.is_empty() || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let digits: String = fraction.chars().chain("000".chars()).take(3).collect();
    digits.parse().ok()
}
