//! Input validation for note authoring.
//!
//! Note types resolve in three tiers: exact match → synonym lookup →
//! error with suggestion. Tags are normalised the same way everywhere
//! (local authoring, remote pull, content hashing) so that hashes stay
//! stable across round trips.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

// ── Valid value sets ─────────────────────────────────────────

pub static VALID_NOTE_TYPES: LazyLock<HashSet<&str>> =
    LazyLock::new(|| ["basic", "cloze"].into_iter().collect());

pub static NOTE_TYPE_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("qa", "basic"),
        ("front-back", "basic"),
        ("frontback", "basic"),
        ("simple", "basic"),
        ("flashcard", "basic"),
        ("fill", "cloze"),
        ("fill-in", "cloze"),
        ("gap", "cloze"),
        ("blank", "cloze"),
    ]
    .into_iter()
    .collect()
});

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

static CLOZE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{c\d+::").expect("valid regex"));

/// Normalize a note type string via exact match or synonym lookup.
///
/// Returns the canonical type, or an error with the original input
/// and an optional suggestion.
pub fn normalize_note_type(input: &str) -> Result<String, (String, Option<String>)> {
    let lower = input.trim().to_lowercase();

    if VALID_NOTE_TYPES.contains(lower.as_str()) {
        return Ok(lower);
    }

    if let Some(&canonical) = NOTE_TYPE_SYNONYMS.get(lower.as_str()) {
        return Ok(canonical.to_string());
    }

    let suggestion = find_closest_match(&lower, &VALID_NOTE_TYPES, &NOTE_TYPE_SYNONYMS);
    Err((input.to_string(), suggestion))
}

/// Normalize a tag list.
///
/// Trims each tag, collapses inner whitespace to `-`, drops empties and
/// removes case-insensitive duplicates (first spelling wins).
#[must_use]
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(tags.len());

    for tag in tags {
        let cleaned = WHITESPACE_RE.replace_all(tag.as_ref().trim(), "-").to_string();
        if cleaned.is_empty() {
            continue;
        }
        if seen.insert(cleaned.to_lowercase()) {
            out.push(cleaned);
        }
    }

    out
}

/// Whether a cloze body contains at least one `{{cN::...}}` deletion.
#[must_use]
pub fn has_cloze_marker(text: &str) -> bool {
    CLOZE_MARKER_RE.is_match(text)
}

/// Find the closest matching value across valid set and synonyms.
fn find_closest_match(
    input: &str,
    valid: &HashSet<&str>,
    synonyms: &HashMap<&str, &str>,
) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;

    for &v in valid.iter().chain(synonyms.keys()) {
        let dist = levenshtein_distance(input, v);
        if dist <= 2 && best.is_none_or(|(_, d)| dist < d) {
            // For synonyms, show what it maps to
            let shown = synonyms.get(v).copied().unwrap_or(v);
            best = Some((shown, dist));
        }
    }

    best.map(|(v, _)| v.to_string())
}

/// Compute the Levenshtein edit distance between two strings.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_note_type() {
        assert_eq!(normalize_note_type("basic"), Ok("basic".to_string()));
        assert_eq!(normalize_note_type("CLOZE"), Ok("cloze".to_string()));
        assert_eq!(normalize_note_type("qa"), Ok("basic".to_string()));
        assert_eq!(normalize_note_type("gap"), Ok("cloze".to_string()));
    }

    #[test]
    fn test_normalize_note_type_suggests() {
        let err = normalize_note_type("clozee").unwrap_err();
        assert_eq!(err.0, "clozee");
        assert_eq!(err.1, Some("cloze".to_string()));

        let err = normalize_note_type("zzzzzzzz").unwrap_err();
        assert_eq!(err.1, None);
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(&["  rust lang ", "Rust-lang", "", "sync", "SYNC", "a\tb"]);
        assert_eq!(tags, vec!["rust-lang", "sync", "a-b"]);
    }

    #[test]
    fn test_has_cloze_marker() {
        assert!(has_cloze_marker("The capital is {{c1::Paris}}"));
        assert!(!has_cloze_marker("The capital is {{1::Paris}}"));
        assert!(!has_cloze_marker("no deletions"));
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abd"), 1);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }
}
