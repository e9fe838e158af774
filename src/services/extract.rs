//! Identifier extraction from raw listing payloads.
//!
//! The listing endpoint embeds typed references (`"Video:80121192"`) deep
//! inside a graph-shaped response. Rather than modelling that structure, the
//! payload is scanned for references, which keeps extraction working when
//! the surrounding shape changes.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::bytes::Regex;

/// Type prefix carried by title references.
pub const VIDEO_PREFIX: &str = "Video:";

fn video_ref_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"Video:(\d+)").ok())
        .as_ref()
}

/// Extract unique title ids from a listing payload, in first-seen order.
///
/// Empty or unrecognised payloads yield an empty list; callers use that as
/// the end-of-pagination signal.
pub fn extract_ids(payload: &[u8]) -> Vec<String> {
    let Some(pattern) = video_ref_pattern() else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for caps in pattern.captures_iter(payload) {
        let Some(digits) = caps.get(1) else { continue };
        let Ok(id) = std::str::from_utf8(digits.as_bytes()) else {
            continue;
        };
        if seen.insert(id) {
            ids.push(id.to_string());
        }
    }
    ids
}

/// Strip the reference prefix from an upstream entity id.
pub fn normalize_id(raw: &str) -> &str {
    raw.strip_prefix(VIDEO_PREFIX).unwrap_or(raw).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload() {
        assert!(extract_ids(b"").is_empty());
        assert!(extract_ids(br#"{"some": "json"}"#).is_empty());
    }

    #[test]
    fn test_duplicates_collapse_in_first_seen_order() {
        let ids = extract_ids(br#"{"videos": ["Video:12345", "Video:12345", "Video:67890"]}"#);
        assert_eq!(ids, vec!["12345", "67890"]);
    }

    #[test]
    fn test_repeated_id_returned_once() {
        let payload = "Video:7 ".repeat(50);
        assert_eq!(extract_ids(payload.as_bytes()), vec!["7"]);
    }

    #[test]
    fn test_ignores_surrounding_structure() {
        let payload = br#"{"jsonGraph":{"genres":{"1365":{"su":{"0":{"$type":"ref","value":["videos","80121192"]},
            "1":["Video:80121192"]}}},"videos":{"x":"Video:81743369","y":"some text","z":"Video:"}}}"#;
        assert_eq!(extract_ids(payload), vec!["80121192", "81743369"]);
    }

    #[test]
    fn test_non_utf8_payload() {
        let mut payload = vec![0xff, 0xfe];
        payload.extend_from_slice(b"Video:42");
        payload.push(0xff);
        assert_eq!(extract_ids(&payload), vec!["42"]);
    }

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id("Video:123"), "123");
        assert_eq!(normalize_id("123"), "123");
    }
}
