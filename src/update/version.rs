//! Lenient version normalization and comparison.
//!
//! Upstream tags arrive as `v1.2`, `release-2.0.1`, `1.4@beta` and
//! worse. Normalization strips any channel prefix up to the first digit
//! and keeps the longest prefix of digits and dots; comparison is
//! numeric per dot-separated part, zero-padded on the shorter side.

use std::cmp::Ordering;

/// Normalize a raw version or tag string.
///
/// Returns an empty string when no digits are present.
pub fn normalize(raw: &str) -> String {
    let from_digit = match raw.find(|c: char| c.is_ascii_digit()) {
        Some(idx) => &raw[idx..],
        None => return String::new(),
    };
    let end = from_digit
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(from_digit.len());
    from_digit[..end].trim_matches('.').to_string()
}

/// Compare two version strings after normalization.
pub fn compare(a: &str, b: &str) -> Ordering {
    let a = normalize(a);
    let b = normalize(b);
    let parts_a: Vec<u64> = a.split('.').map(|p| p.parse().unwrap_or(0)).collect();
    let parts_b: Vec<u64> = b.split('.').map(|p| p.parse().unwrap_or(0)).collect();
    let len = parts_a.len().max(parts_b.len());
    for i in 0..len {
        let pa = parts_a.get(i).copied().unwrap_or(0);
        let pb = parts_b.get(i).copied().unwrap_or(0);
        match pa.cmp(&pb) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// True when `candidate` is strictly newer than `current`.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare(candidate, current) == Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_prefixes_and_suffixes() {
        assert_eq!(normalize("v1.2.3"), "1.2.3");
        assert_eq!(normalize("V2.0"), "2.0");
        assert_eq!(normalize("release-1.4"), "1.4");
        assert_eq!(normalize("1.4-beta2"), "1.4");
        assert_eq!(normalize("2.1."), "2.1");
        assert_eq!(normalize("nightly"), "");
    }

    #[test]
    fn comparison_is_numeric_per_part() {
        assert_eq!(compare("1.2", "1.10"), Ordering::Less);
        assert_eq!(compare("2.0", "2.0.0"), Ordering::Equal);
        assert_eq!(compare("v1.2", "1.2"), Ordering::Equal);
        assert!(is_newer("1.2", "1.1.9"));
        assert!(!is_newer("1.0", "1.0"));
    }

    #[test]
    fn comparison_laws() {
        for v in ["1.0", "v2.3.4", "release-10.0", "0.0.1"] {
            assert_eq!(compare(v, v), Ordering::Equal);
            assert_eq!(compare(&normalize(v), v), Ordering::Equal);
        }
        assert_eq!(compare("1.2", "1.3"), compare("1.3", "1.2").reverse());
    }

    #[test]
    fn normalization_is_idempotent() {
        for v in ["v1.2.3", "release-1.4", "2.1.", "plain"] {
            let once = normalize(v);
            assert_eq!(normalize(&once), once);
        }
    }
}
