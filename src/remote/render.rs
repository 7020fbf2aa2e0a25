//! Note ↔ remote card content conversion.
//!
//! The remote stores one markdown body per card. Basic notes render as
//! `front`, a `---` separator, then `back` (and `extra` below it). Cloze
//! notes render the cloze body with Anki-style `{{c1::x}}` rewritten to
//! the remote's `{{1::x}}`, with `extra` after the separator.
//!
//! Parsing is best-effort: remote cards may have been written by hand,
//! so the reverse direction never fails, it only guesses a shape.

use regex::Regex;
use std::sync::LazyLock;

use super::{CardContent, RemoteCard};
use crate::model::{NoteFields, NoteType};
use crate::validate::{has_cloze_marker, normalize_tags};

static LOCAL_CLOZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{c(\d+)::(.*?)\}\}").expect("valid regex"));

static REMOTE_CLOZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{(\d+)::(.*?)\}\}").expect("valid regex"));

static REMOTE_CLOZE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\d+::").expect("valid regex"));

static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n-{3,}\n").expect("valid regex"));

const UNTITLED: &str = "Untitled";

/// `{{c1::x}}` → `{{1::x}}`
#[must_use]
pub fn local_cloze_to_remote(text: &str) -> String {
    LOCAL_CLOZE_RE.replace_all(text, "{{$1::$2}}").into_owned()
}

/// `{{1::x}}` → `{{c1::x}}`
#[must_use]
pub fn remote_cloze_to_local(text: &str) -> String {
    REMOTE_CLOZE_RE.replace_all(text, "{{c$1::$2}}").into_owned()
}

/// Render a note into the payload sent to `create_card`.
#[must_use]
pub fn render_note(fields: &NoteFields) -> CardContent {
    let content = match fields.note_type {
        NoteType::Cloze => {
            let mut content = local_cloze_to_remote(&fields.cloze);
            if !fields.extra.is_empty() {
                content.push_str("\n\n---\n");
                content.push_str(&fields.extra);
            }
            content
        }
        NoteType::Basic => {
            let mut content = format!("{}\n\n---\n{}", fields.front, fields.back);
            if !fields.extra.is_empty() {
                content.push_str("\n\n");
                content.push_str(&fields.extra);
            }
            content
        }
    };

    CardContent {
        content,
        tags: fields.tags.clone(),
    }
}

/// Split a body on its first separator line.
fn split_content(content: &str) -> (String, String) {
    if content.is_empty() {
        return (String::new(), String::new());
    }
    match SEPARATOR_RE.find(content) {
        Some(m) => (
            content[..m.start()].trim().to_string(),
            content[m.end()..].trim().to_string(),
        ),
        None => (content.trim().to_string(), String::new()),
    }
}

/// Interpret a remote card as note fields.
#[must_use]
pub fn parse_card(card: &RemoteCard) -> NoteFields {
    let content = card.content.trim();
    let title = card.name.as_deref().map(str::trim).unwrap_or_default();
    let tags = normalize_tags(&card.tags);
    let (left, right) = split_content(content);

    // An unterminated `{{1::` converts to nothing; such cards are read as basic.
    let cloze_zone = if left.is_empty() { content } else { left.as_str() };
    if REMOTE_CLOZE_MARKER_RE.is_match(cloze_zone) {
        let cloze = remote_cloze_to_local(cloze_zone);
        if has_cloze_marker(&cloze) {
            return NoteFields {
                note_type: NoteType::Cloze,
                cloze,
                extra: right,
                tags,
                ..NoteFields::default()
            };
        }
    }

    if !right.is_empty() {
        let front = if !left.is_empty() {
            left
        } else if !title.is_empty() {
            title.to_string()
        } else {
            UNTITLED.to_string()
        };
        return NoteFields {
            note_type: NoteType::Basic,
            front,
            back: right,
            tags,
            ..NoteFields::default()
        };
    }

    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if lines.len() >= 2 {
        return NoteFields {
            note_type: NoteType::Basic,
            front: lines[0].to_string(),
            back: lines[1..].join("\n"),
            tags,
            ..NoteFields::default()
        };
    }

    let (front, back) = if title.is_empty() {
        (
            lines.first().copied().unwrap_or(UNTITLED).to_string(),
            String::new(),
        )
    } else {
        (title.to_string(), content.to_string())
    };

    NoteFields {
        note_type: NoteType::Basic,
        front,
        back,
        tags,
        ..NoteFields::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(content: &str) -> RemoteCard {
        RemoteCard {
            id: "c1".into(),
            deck_id: "d1".into(),
            content: content.into(),
            name: None,
            tags: vec![],
            updated_at: None,
        }
    }

    #[test]
    fn test_cloze_syntax_conversion() {
        assert_eq!(
            local_cloze_to_remote("{{c1::Paris}} is in {{c2::France}}"),
            "{{1::Paris}} is in {{2::France}}"
        );
        assert_eq!(
            remote_cloze_to_local("{{1::Paris}} is in {{2::France}}"),
            "{{c1::Paris}} is in {{c2::France}}"
        );
    }

    #[test]
    fn test_render_basic() {
        let fields = NoteFields::basic("Q", "A").with_extra("hint").with_tags(&["geo"]);
        let rendered = render_note(&fields);
        assert_eq!(rendered.content, "Q\n\n---\nA\n\nhint");
        assert_eq!(rendered.tags, vec!["geo"]);
    }

    #[test]
    fn test_render_cloze_with_extra() {
        let fields = NoteFields::cloze("{{c1::Rust}} ships in 2015").with_extra("1.0 release");
        assert_eq!(
            render_note(&fields).content,
            "{{1::Rust}} ships in 2015\n\n---\n1.0 release"
        );
    }

    #[test]
    fn test_parse_basic_with_separator() {
        let fields = parse_card(&card("What is 2+2?\n\n---\n4"));
        assert_eq!(fields.note_type, NoteType::Basic);
        assert_eq!(fields.front, "What is 2+2?");
        assert_eq!(fields.back, "4");
    }

    #[test]
    fn test_parse_cloze() {
        let fields = parse_card(&card("{{1::Ownership}} prevents data races\n---\nsee ch. 4"));
        assert_eq!(fields.note_type, NoteType::Cloze);
        assert_eq!(fields.cloze, "{{c1::Ownership}} prevents data races");
        assert_eq!(fields.extra, "see ch. 4");
    }

    #[test]
    fn test_parse_without_separator_uses_lines() {
        let fields = parse_card(&card("Front line\nsecond\nthird"));
        assert_eq!(fields.front, "Front line");
        assert_eq!(fields.back, "second\nthird");
    }

    #[test]
    fn test_parse_single_line_prefers_name() {
        let mut c = card("just one line");
        c.name = Some("Title".into());
        let fields = parse_card(&c);
        assert_eq!(fields.front, "Title");
        assert_eq!(fields.back, "just one line");

        let fields = parse_card(&card(""));
        assert_eq!(fields.front, "Untitled");
    }

    #[test]
    fn test_cloze_spanning_lines_converts() {
        assert_eq!(
            remote_cloze_to_local("{{1::first line\nsecond line}} is the answer"),
            "{{c1::first line\nsecond line}} is the answer"
        );
        assert_eq!(
            local_cloze_to_remote("{{c2::a\nb}}"),
            "{{2::a\nb}}"
        );

        let fields = parse_card(&card("{{1::first line\nsecond line}} is the answer"));
        assert_eq!(fields.note_type, NoteType::Cloze);
        assert!(fields.validate().is_ok());
    }

    #[test]
    fn test_unterminated_cloze_falls_back_to_basic() {
        let fields = parse_card(&card("{{1::never closed\n---\nback side"));
        assert_eq!(fields.note_type, NoteType::Basic);
        assert_eq!(fields.front, "{{1::never closed");
        assert_eq!(fields.back, "back side");
        assert!(fields.validate().is_ok());

        let fields = parse_card(&card("{{1::x"));
        assert_eq!(fields.note_type, NoteType::Basic);
        assert!(fields.validate().is_ok());
    }

    #[test]
    fn test_render_then_parse_cloze_preserves_fields() {
        let fields = NoteFields::cloze("{{c1::Tokio}} is a runtime").with_extra("async");
        let rendered = render_note(&fields);
        let parsed = parse_card(&card(&rendered.content));
        assert_eq!(parsed.cloze, fields.cloze);
        assert_eq!(parsed.extra, fields.extra);
    }
}
