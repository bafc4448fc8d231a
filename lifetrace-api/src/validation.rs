//! Request input validation.
//!
//! Person names reach a third-party search API and end up in cache keys,
//! so they are checked before anything else runs.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ApiError, ApiResult};

/// Longest accepted name, in characters.
pub const MAX_NAME_CHARS: usize = 50;

/// Longest accepted name written only in CJK characters.
pub const MAX_CJK_NAME_CHARS: usize = 20;

/// Markup, script URLs, SQL comment sequences, path traversal, and
/// control characters.
static DANGEROUS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"[<>"/\\;`]"#,
        r"(?i)(java|vb)script\s*:",
        r"(?i)\bscript\b",
        r"--|/\*|\*/",
        r"\.\.",
        r"[\x00-\x1f\x7f-\x9f]",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c) || c == '·'
}

fn is_latin_letter(c: char) -> bool {
    c.is_ascii_alphabetic() || (('\u{00c0}'..='\u{017f}').contains(&c) && c != '×' && c != '÷')
}

fn is_name_char(c: char) -> bool {
    is_cjk(c) || is_latin_letter(c) || matches!(c, ' ' | '-' | '\'' | '.')
}

/// Validate and normalize a person name.
///
/// Surrounding whitespace is trimmed and inner runs collapse to one space.
pub fn validate_person_name(raw: &str) -> ApiResult<String> {
    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    if name.is_empty() {
        return Err(ApiError::invalid_field("name", "Name must not be empty"));
    }

    let length = name.chars().count();
    if length > MAX_NAME_CHARS {
        return Err(ApiError::invalid_field(
            "name",
            format!("Name must be at most {} characters", MAX_NAME_CHARS),
        ));
    }

    if DANGEROUS_PATTERNS.iter().any(|pattern| pattern.is_match(&name)) {
        tracing::warn!(name = %name, "Rejected name with disallowed content");
        return Err(ApiError::invalid_field("name", "Name contains disallowed characters"));
    }

    if !name.chars().all(is_name_char) {
        return Err(ApiError::invalid_field(
            "name",
            "Name may only contain Chinese or Latin letters, spaces, and · . - '",
        ));
    }

    if !name.chars().any(|c| is_latin_letter(c) || (is_cjk(c) && c != '·')) {
        return Err(ApiError::invalid_field("name", "Name must contain at least one letter"));
    }

    let cjk_only = name.chars().all(is_cjk);
    if cjk_only && length > MAX_CJK_NAME_CHARS {
        return Err(ApiError::invalid_field(
            "name",
            format!("Chinese names must be at most {} characters", MAX_CJK_NAME_CHARS),
        ));
    }

    Ok(name)
}

/// Validate a language tag such as `zh` or `en`.
pub fn validate_language(raw: &str) -> ApiResult<String> {
    let language = raw.trim().to_ascii_lowercase();
    let well_formed = (2..=10).contains(&language.len())
        && language.chars().all(|c| c.is_ascii_lowercase() || c == '-')
        && !language.starts_with('-');
    if well_formed {
        Ok(language)
    } else {
        Err(ApiError::invalid_field("language", format!("Unsupported language '{}'", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_accepts_common_names() {
        for name in [
            "苏轼",
            "Su Shi",
            "Jean-Paul Sartre",
            "Sinéad O'Connor",
            "J. R. R. Tolkien",
            "列奥纳多·达·芬奇",
        ] {
            assert!(validate_person_name(name).is_ok(), "{name} should be accepted");
        }
    }

    #[test]
    fn test_normalizes_whitespace() {
        assert_eq!(
            validate_person_name("  Su \t  Shi ").expect("should be valid"),
            "Su Shi"
        );
    }

    #[test]
    fn test_rejects_empty_and_long() {
        assert!(validate_person_name("   ").is_err());
        assert!(validate_person_name(&"a".repeat(MAX_NAME_CHARS + 1)).is_err());
        assert!(validate_person_name(&"苏".repeat(MAX_CJK_NAME_CHARS + 1)).is_err());
        assert!(validate_person_name(&"苏".repeat(MAX_CJK_NAME_CHARS)).is_ok());
    }

    #[test]
    fn test_rejects_dangerous_input() {
        for name in [
            "<script>alert(1)</script>",
            "javascript: void",
            "Robert -- drop",
            "../etc/passwd",
            "a/b",
            "Su;Shi",
            "Su\u{0007}Shi",
            "\"quoted\"",
        ] {
            let err = validate_person_name(name).expect_err("should be rejected");
            assert_eq!(err.code, ErrorCode::InvalidInput);
            assert_eq!(err.details, Some(json!({ "field": "name" })));
        }
    }

    #[test]
    fn test_rejects_names_without_letters() {
        assert!(validate_person_name("12345").is_err());
        assert!(validate_person_name("- . '").is_err());
        assert!(validate_person_name("···").is_err());
    }

    #[test]
    fn test_language_tags() {
        assert_eq!(validate_language(" ZH ").expect("should be valid"), "zh");
        assert_eq!(validate_language("zh-hans").expect("should be valid"), "zh-hans");
        assert!(validate_language("z").is_err());
        assert!(validate_language("en/../").is_err());
    }

    proptest! {
        #[test]
        fn prop_accepted_names_are_normalized(raw in "[a-zA-Z ]{0,60}") {
            if let Ok(name) = validate_person_name(&raw) {
                prop_assert_eq!(name.trim(), name.as_str());
                prop_assert!(!name.contains("  "));
                prop_assert!(name.chars().count() <= MAX_NAME_CHARS);
            }
        }
    }
}
