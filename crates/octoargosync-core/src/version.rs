//! Version parsing and ordering for release selection.
//!
//! Container tags are rarely strict semver: `v` prefixes and partial
//! versions like `1.2` are everywhere. [`parse_relaxed`] accepts those by
//! zero-padding the numeric core, so tag ordering and the
//! "target revision is a version" check behave the way operators expect.

use chrono::{DateTime, Utc};
use semver::Version;
use std::cmp::Ordering;

/// Parses a version string, tolerating a leading `v`/`V` and a partial
/// numeric core (`1` or `1.2`). Pre-release and build parts survive the
/// padding. Returns `None` for anything else.
pub fn parse_relaxed(input: &str) -> Option<Version> {
    let trimmed = input.trim();
    let bare = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);

    if let Ok(version) = Version::parse(bare) {
        return Some(version);
    }

    let core_end = bare.find(['-', '+']).unwrap_or(bare.len());
    let (core, rest) = bare.split_at(core_end);
    if core.is_empty()
        || !core
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    let padded = match core.matches('.').count() {
        0 => format!("{core}.0.0{rest}"),
        1 => format!("{core}.0{rest}"),
        _ => return None,
    };
    Version::parse(&padded).ok()
}

/// Ascending tag order: tags that parse as versions order by version (ties
/// broken bytewise), a parseable tag outranks an unparseable one, and two
/// unparseable tags order lexicographically.
pub fn compare_tags(a: &str, b: &str) -> Ordering {
    match (parse_relaxed(a), parse_relaxed(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

/// Sorts tags best-first: version-shaped tags descending, then everything
/// else descending lexicographically.
pub fn sort_tags_descending(tags: &mut [String]) {
    tags.sort_by(|a, b| compare_tags(b, a));
}

/// Dotted timestamp version, the redeployment-aware fallback
/// (`2024.07.01.153045`).
pub fn dotted_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y.%m.%d.%H%M%S").to_string()
}

/// Compact timestamp version, the uniqueness-seeking fallback
/// (`20240701153045`).
pub fn compact_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn strict_semver_parses() {
        let version = parse_relaxed("1.2.3").unwrap();
        assert_eq!(version, Version::new(1, 2, 3));
    }

    #[test]
    fn v_prefix_is_tolerated() {
        assert_eq!(parse_relaxed("v1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_relaxed("V2.0.0").unwrap(), Version::new(2, 0, 0));
    }

    #[test]
    fn partial_versions_are_padded() {
        assert_eq!(parse_relaxed("1").unwrap(), Version::new(1, 0, 0));
        assert_eq!(parse_relaxed("1.2").unwrap(), Version::new(1, 2, 0));
    }

    #[test]
    fn pre_release_survives_padding() {
        let version = parse_relaxed("1.2-rc1").unwrap();
        assert_eq!(version.to_string(), "1.2.0-rc1");
    }

    #[test]
    fn non_versions_are_rejected() {
        assert!(parse_relaxed("latest").is_none());
        assert!(parse_relaxed("main").is_none());
        assert!(parse_relaxed("").is_none());
        assert!(parse_relaxed("1.2.3.4").is_none());
        assert!(parse_relaxed("1.x").is_none());
    }

    #[test]
    fn descending_sort_puts_versions_before_words() {
        let mut tags = vec![
            "latest".to_string(),
            "0.0.9".to_string(),
            "0.0.10".to_string(),
            "alpha".to_string(),
            "v0.1.0".to_string(),
        ];
        sort_tags_descending(&mut tags);
        assert_eq!(tags, vec!["v0.1.0", "0.0.10", "0.0.9", "latest", "alpha"]);
    }

    #[test]
    fn numeric_order_beats_lexicographic_for_versions() {
        let mut tags = vec!["0.0.2".to_string(), "0.0.10".to_string()];
        sort_tags_descending(&mut tags);
        assert_eq!(tags, vec!["0.0.10", "0.0.2"]);
    }

    #[test]
    fn timestamp_formats() {
        let at = Utc.with_ymd_and_hms(2024, 7, 1, 15, 30, 45).unwrap();
        assert_eq!(dotted_timestamp(at), "2024.07.01.153045");
        assert_eq!(compact_timestamp(at), "20240701153045");
    }
}
