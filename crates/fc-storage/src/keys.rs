//! Storage key derivation.
//!
//! Keys are a pure function of attachment identity and sanitized filename,
//! so re-saving an attachment overwrites the same object instead of leaking
//! a new one per save.

use fc_core::Id;

/// Sanitize a filename for use inside storage keys and on disk.
///
/// Only ASCII alphanumerics, dots, hyphens and underscores survive; anything
/// else becomes an underscore. An empty or dot-only name falls back to
/// "unnamed".
pub fn sanitize_filename(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.chars().all(|c| c == '.') {
        "unnamed".to_string()
    } else {
        sanitized
    }
}

/// Derive the storage key for an attachment.
///
/// Format: `[prefix/]{id}/{sanitized_filename}`.
pub fn storage_key(prefix: &str, id: Id, filename: &str) -> String {
    let sanitized = sanitize_filename(filename);
    if prefix.is_empty() {
        format!("{}/{}", id, sanitized)
    } else {
        format!("{}/{}/{}", prefix.trim_matches('/'), id, sanitized)
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn sanitized_filenames_only_contain_safe_chars(filename in ".*") {
            let sanitized = sanitize_filename(&filename);
            for c in sanitized.chars() {
                let is_safe = c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_';
                prop_assert!(is_safe, "unexpected character: {}", c);
            }
        }

        #[test]
        fn keys_have_id_and_filename_segments(
            id in 1i64..1_000_000,
            filename in "[a-zA-Z0-9_-]{1,30}\\.[a-z]{2,4}",
        ) {
            let key = storage_key("attachments", id, &filename);
            let parts: Vec<&str> = key.split('/').collect();
            prop_assert_eq!(parts.len(), 3);
            prop_assert_eq!(parts[0], "attachments");
            prop_assert_eq!(parts[1], id.to_string());
            prop_assert_eq!(parts[2], filename);
        }
    }
}
