use std::time::Duration;

/// Parses a duration written as bare seconds (`"5"`) or with a unit suffix
/// (`"500ms"`, `"5s"`, `"2m"`).
///
/// Returns `None` for empty, negative, or otherwise malformed input.
#[must_use]
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits.parse().ok()?;

    match unit.trim() {
        "" | "s" => Some(Duration::from_secs(value)),
        "ms" => Some(Duration::from_millis(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs),
        _ => None,
    }
}
