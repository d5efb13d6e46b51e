//! Helpers for reading loosely-shaped JSON tool payloads.
//!
//! Backend tools return plain dictionaries without a published schema, so
//! readers look up nested fields by path and fall back to zero.

use serde_json::Value;

/// Walk `path` through nested objects.
pub fn value_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(*key))
}

/// Read a number at `path`, accepting numeric strings. Absent or
/// non-numeric fields read as `0.0`.
pub fn number_at(value: &Value, path: &[&str]) -> f64 {
    match value_at(value, path) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// First path in `paths` that resolves to a number, else `0.0`.
pub fn first_number(value: &Value, paths: &[&[&str]]) -> f64 {
    paths
        .iter()
        .find_map(|p| match value_at(value, p) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        })
        .unwrap_or(0.0)
}

/// Format an amount as `$1,234,567.89`.
pub fn format_money(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let frac = cents % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{frac:02}")
}
