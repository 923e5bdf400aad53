//! Small text helpers shared by config and the HTTP clients.

/// Trim optional text, mapping blank input to `None`.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Trimmed `http(s)://` base URL without a trailing slash.
pub fn normalize_http_base_url(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.starts_with("http://") || value.starts_with("https://") {
        Some(value.trim_end_matches('/').to_string())
    } else {
        None
    }
}

/// First 180 characters of a response body, for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Milliseconds since the Unix epoch
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_becomes_none() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some(" \t ".to_string())), None);
        assert_eq!(
            normalize_text_option(Some(" focus ".to_string())),
            Some("focus".to_string())
        );
    }

    #[test]
    fn base_url_needs_scheme_and_loses_trailing_slash() {
        assert_eq!(
            normalize_http_base_url(" https://api.example.com// "),
            Some("https://api.example.com".to_string())
        );
        assert_eq!(
            normalize_http_base_url("http://localhost:54321"),
            Some("http://localhost:54321".to_string())
        );
        assert_eq!(normalize_http_base_url("ftp://example.com"), None);
        assert_eq!(normalize_http_base_url("api.example.com"), None);
    }

    #[test]
    fn compact_text_caps_length() {
        assert_eq!(compact_text(&"x".repeat(500)).len(), 180);
        assert_eq!(compact_text("  short  "), "short");
    }
}
