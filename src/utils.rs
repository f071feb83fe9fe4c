/// Title normalization utilities
pub mod title {
    use regex::Regex;
    use std::sync::LazyLock;

    static RE_STRIP: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"[:'"!?.,™®©’]"#).unwrap());
    static RE_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s\-_]+").unwrap());

    /// Normalize a title to its slug key: lowercase, punctuation stripped,
    /// separator runs collapsed to a single underscore.
    pub fn normalize_key(title: &str) -> String {
        let lowered = title.to_lowercase();
        let stripped = RE_STRIP.replace_all(lowered.trim(), "");
        let collapsed = RE_SEPARATORS.replace_all(&stripped, "_");
        collapsed.trim_matches('_').to_string()
    }

    /// Derive a human-readable title from a slug key by replacing the filler
    /// character and capitalizing each word.
    pub fn display_from_key(key: &str) -> String {
        key.replace('_', " ")
            .split_whitespace()
            .map(capitalize)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// A title still containing the filler character is low quality and never
    /// preferred over a higher-fidelity source's title.
    pub fn has_filler(title: &str) -> bool {
        title.contains('_')
    }

    fn capitalize(word: &str) -> String {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }
}

/// Release date normalization utilities
pub mod date {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

    const DISPLAY_FORMAT: &str = "%d %B %Y";

    /// Normalize a raw date value to the `DD Month YYYY` display form.
    /// Unparseable values pass through unchanged.
    pub fn display(raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return String::new();
        }

        if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
            return parsed.format(DISPLAY_FORMAT).to_string();
        }
        for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
            if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
                return parsed.format(DISPLAY_FORMAT).to_string();
            }
        }
        for format in ["%Y-%m-%d", "%d.%m.%Y", "%B %d, %Y", "%d %B %Y"] {
            if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, format) {
                return parsed.format(DISPLAY_FORMAT).to_string();
            }
        }

        trimmed.to_string()
    }

    /// Display form for a Unix timestamp; empty for out-of-range values.
    pub fn display_from_timestamp(timestamp: i64) -> String {
        Utc.timestamp_opt(timestamp, 0)
            .single()
            .map(|parsed| parsed.format(DISPLAY_FORMAT).to_string())
            .unwrap_or_default()
    }
}
