//! Lenient parsing of loosely-typed inputs.
//!
//! Values reach the engine as strings (query parameters, key/value event
//! parameters, catalog cells of unknown affinity). These helpers never fail:
//! unparsable input falls back to the caller-supplied default, and the
//! numeric normalizers keep NaN/Inf out of the engine.

use std::collections::BTreeSet;

/// Parses a float, accepting `,` as the decimal separator.
#[must_use]
pub fn parse_f64_or(text: &str, default: f64) -> f64 {
    let normalized = text.trim().replace(',', ".");
    match normalized.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => default,
    }
}

/// Parses an integer, falling back to `default`.
#[must_use]
pub fn parse_i64_or(text: &str, default: i64) -> i64 {
    text.trim().parse::<i64>().unwrap_or(default)
}

/// Parses a boolean flag the way HTML forms send them.
#[must_use]
pub fn parse_flag(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "1" | "on" | "oui" | "true" | "yes"
    )
}

/// Parses a comma-separated id list: `"3, 1,x,3"` → `[3, 1]`.
///
/// Only plain non-negative integers are kept; duplicates are dropped and the
/// first-seen order is preserved.
#[must_use]
pub fn parse_id_list(text: &str) -> Vec<i64> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for part in text.split(',') {
        let part = part.trim();
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let Ok(id) = part.parse::<i64>() else {
            continue;
        };
        if seen.insert(id) {
            out.push(id);
        }
    }
    out
}

/// Joins ids back into the comma-separated form.
#[must_use]
pub fn format_id_list<I, T>(ids: I) -> String
where
    I: IntoIterator<Item = T>,
    T: Into<i64>,
{
    ids.into_iter()
        .map(|id| id.into().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Clamps to `[0, 1]`; NaN becomes 0.
#[must_use]
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Replaces non-finite values with `default`.
#[must_use]
pub fn finite_or(value: f64, default: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        default
    }
}

/// Floors at zero; non-finite values become zero.
#[must_use]
pub fn floor_zero(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

/// A multiplicative coefficient that must stay strictly positive.
///
/// Zero, negative and non-finite coefficients are treated as "no effect".
#[must_use]
pub fn positive_coefficient(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        1.0
    }
}

/// Rounds to cents for display.
#[must_use]
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
