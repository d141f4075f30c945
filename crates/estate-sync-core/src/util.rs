//! Shared utility functions used across multiple modules.

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Normalize a device identifier into the key used by device-scoped lookups.
///
/// Returns `None` for blank identifiers.
pub fn normalize_device_id(value: &str) -> Option<String> {
    normalize_text_option(Some(value.to_string()))
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Next write timestamp for a row last written at `previous`.
///
/// Always strictly greater than `previous`, so two writes landing in the same
/// millisecond still order correctly for conflict detection.
pub fn next_write_timestamp(previous: i64) -> i64 {
    now_millis().max(previous.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_device_id_trims_value() {
        assert_eq!(
            normalize_device_id("  device-a \n"),
            Some("device-a".to_string())
        );
        assert_eq!(normalize_device_id(" \t"), None);
    }

    #[test]
    fn next_write_timestamp_is_strictly_increasing() {
        let far_future = now_millis() + 60_000;
        assert_eq!(next_write_timestamp(far_future), far_future + 1);
        assert!(next_write_timestamp(0) > 0);
    }

    #[test]
    fn compact_text_truncates() {
        let long = "x".repeat(500);
        assert_eq!(compact_text(&long).len(), 180);
    }
}
