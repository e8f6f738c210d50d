//! Character-level cleanup passes for raw video titles.
//!
//! Each pass is a function `&str -> String` applied in sequence. None of
//! them touches letters or combining marks of any script, so Arabic text
//! (including harakat) survives verbatim.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Zero-width non-joiner, a letter-shaping control in Arabic-script orthographies.
const ZWNJ: char = '\u{200C}';

/// Run the character passes: compose, lowercase, drop brackets, drop symbols, collapse.
pub(crate) fn run_pipeline(raw: &str) -> String {
    let mut result = compose(raw);

    result = lowercase(&result);
    result = strip_brackets(&result);
    result = strip_symbols(&result);
    result = collapse_whitespace(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Unicode composition
// ---------------------------------------------------------------------------

/// Canonical composition (NFC) so equivalent sequences compare equal.
pub(crate) fn compose(s: &str) -> String {
    s.nfc().collect()
}

// ---------------------------------------------------------------------------
// Pass 2: Lowercase
// ---------------------------------------------------------------------------

/// Lowercase. Scripts without case (Arabic, CJK) pass through unchanged.
pub(crate) fn lowercase(s: &str) -> String {
    s.to_lowercase()
}

// ---------------------------------------------------------------------------
// Pass 3: Bracketed segments
// ---------------------------------------------------------------------------

/// Remove `(...)`, `[...]`, `{...}` and full-width bracket segments entirely.
///
/// Applied until stable so nested segments like `((Live) Cover)` vanish.
pub(crate) fn strip_brackets(s: &str) -> String {
    replace_brackets(s, " ")
}

/// Stand-in for a removed bracketed segment in [`split_at_brackets`].
const GAP: &str = "\u{1F}";

/// Split text at bracketed segments, returning the pieces outside them.
///
/// A title with no brackets yields a single piece.
pub(crate) fn split_at_brackets(s: &str) -> Vec<String> {
    replace_brackets(s, GAP)
        .split(GAP)
        .map(String::from)
        .collect()
}

fn replace_brackets(s: &str, replacement: &str) -> String {
    static BRACKET_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\([^()]*\)|\[[^\[\]]*\]|\{[^{}]*\}|【[^【】]*】|（[^（）]*）")
            .expect("valid regex")
    });

    let mut current = s.to_string();
    loop {
        let next = BRACKET_RE.replace_all(&current, replacement).to_string();
        if next == current {
            return current;
        }
        current = next;
    }
}

// ---------------------------------------------------------------------------
// Pass 4: Punctuation, symbols, emoji
// ---------------------------------------------------------------------------

/// Replace everything that is not a letter, digit, combining mark, or ZWNJ
/// with a space. Replacing (not deleting) keeps neighbouring words apart.
pub(crate) fn strip_symbols(s: &str) -> String {
    s.chars()
        .map(|c| if is_kept(c) { c } else { ' ' })
        .collect()
}

fn is_kept(c: char) -> bool {
    if is_emoji_modifier(c) {
        return false;
    }
    c.is_alphanumeric() || is_combining_mark(c) || c == ZWNJ
}

/// Variation selectors and symbol-combining marks only decorate emoji/symbols.
fn is_emoji_modifier(c: char) -> bool {
    matches!(c,
        '\u{FE00}'..='\u{FE0F}'
        | '\u{20D0}'..='\u{20FF}'
        | '\u{E0100}'..='\u{E01EF}'
        | '\u{200D}'
    )
}

// ---------------------------------------------------------------------------
// Pass 5: Whitespace
// ---------------------------------------------------------------------------

/// Collapse runs of whitespace to single spaces and trim the ends.
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
