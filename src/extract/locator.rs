//! Locators for named declarations and named functions.
//!
//! Both search the raw source for a binding site by whole-identifier
//! match and delegate span capture to the scanner. Absence is reported
//! as `None`; the assembler turns it into a warning, never a failure.

use crate::extract::scanner::{self, BracketMode};
use crate::model::{Fragment, Span};

const BINDING_KEYWORDS: &[&str] = &["var", "let", "const"];

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Whole-identifier occurrence check: neither neighbor may extend the
/// identifier, so `AREA` never matches inside `AREA_LEVEL_RANGES`.
fn is_word_at(text: &str, at: usize, len: usize) -> bool {
    let bytes = text.as_bytes();
    let before_ok = at == 0 || !is_ident_byte(bytes[at - 1]);
    let after_ok = at + len >= bytes.len() || !is_ident_byte(bytes[at + len]);
    before_ok && after_ok
}

/// Extract `var NAME = { ... };` (or `[ ... ];`) as one fragment.
///
/// Finds the first binding keyword immediately followed by `name` and an
/// assignment marker, then captures whichever of `{`/`[` comes first
/// after the `=` through its balanced closer.
pub fn extract_declaration(name: &str, text: &str) -> Option<Fragment> {
    let (kw_start, after_eq) = find_binding(name, text)?;
    let span = scanner::find_matching_span(text, after_eq, BracketMode::Any)?;
    let full = Span {
        start: kw_start,
        end: span.end,
    };
    Some(Fragment::new(name, full.slice(text), full))
}

/// Extract `function NAME(...) { ... }` as one fragment.
///
/// Body capture is brace-depth only, with the scanner's string/comment
/// skipping still applied, so a brace inside a parameter default string
/// does not throw the match off.
pub fn extract_function(name: &str, text: &str) -> Option<Fragment> {
    let bytes = text.as_bytes();
    let mut search = 0;
    while let Some(rel) = text[search..].find("function") {
        let kw = search + rel;
        search = kw + "function".len();
        if !is_word_at(text, kw, "function".len()) {
            continue;
        }
        let mut i = kw + "function".len();
        if i >= bytes.len() || !bytes[i].is_ascii_whitespace() {
            continue;
        }
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if !text[i..].starts_with(name) || !is_word_at(text, i, name.len()) {
            continue;
        }
        i += name.len();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'(') {
            continue;
        }
        let span = scanner::find_matching_span(text, i, BracketMode::BracesOnly)?;
        let full = Span {
            start: kw,
            end: span.end,
        };
        return Some(Fragment::new(name, full.slice(text), full));
    }
    None
}

/// Find the first `var|let|const NAME =` site. Returns the keyword start
/// and the offset just past the `=`.
fn find_binding(name: &str, text: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut search = 0;
    while let Some(rel) = text[search..].find(name) {
        let at = search + rel;
        search = at + name.len();
        if !is_word_at(text, at, name.len()) {
            continue;
        }
        let Some(kw_start) = binding_keyword_before(text, at) else {
            continue;
        };
        // After the name: optional whitespace, then `=` (not `==`).
        let mut i = at + name.len();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') || bytes.get(i + 1) == Some(&b'=') {
            continue;
        }
        return Some((kw_start, i + 1));
    }
    None
}

/// The identifier at `at` must be directly preceded (whitespace aside)
/// by one of the binding keywords, itself on a word boundary.
fn binding_keyword_before(text: &str, at: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = at;
    while i > 0 && bytes[i - 1].is_ascii_whitespace() {
        i -= 1;
    }
    if i == at {
        // no separator between keyword and name
        return None;
    }
    for kw in BINDING_KEYWORDS {
        if text[..i].ends_with(kw) {
            let kw_start = i - kw.len();
            if kw_start == 0 || !is_ident_byte(bytes[kw_start - 1]) {
                return Some(kw_start);
            }
        }
    }
    None
}
