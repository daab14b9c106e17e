//! Text normalisation ahead of tokenisation.
//!
//! The model was trained on plain ASCII punctuation; smart quotes, em-dashes
//! and exotic whitespace from word processors tokenise into rare ids and
//! degrade the audio.  Demo sentences are mostly clean already, but the
//! normaliser keeps the input surface honest for arbitrary text too.

use once_cell::sync::Lazy;
use regex::Regex;

/// Collapse any run of whitespace (including newlines) to a single space.
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalise typographic characters and whitespace for tokenisation.
///
/// - smart single/double quotes → ASCII `'` / `"`
/// - em dash → `--`, en dash → `-`, ellipsis → `...`
/// - non-breaking / narrow / ideographic spaces → regular space
/// - zero-width characters and BOM removed
/// - all whitespace runs collapsed, ends trimmed
pub fn normalize_text(text: &str) -> String {
    let text = text
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace('\u{2014}', "--")
        .replace('\u{2013}', "-")
        .replace('\u{2026}', "...")
        .replace(['\u{00A0}', '\u{202F}', '\u{3000}'], " ")
        .replace(['\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}'], "");

    RE_WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Make sure a sentence ends in punctuation the model treats as terminal;
/// an unterminated sentence tends to trail off instead of stopping.
pub fn ensure_terminal_punctuation(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return text.to_string();
    }
    match text.chars().last() {
        Some(c) if ".!?,;:。？！".contains(c) => text.to_string(),
        _ => format!("{}.", text),
    }
}

/// Full preparation step: normalise, then terminate.
pub fn prepare_text(text: &str) -> String {
    ensure_terminal_punctuation(&normalize_text(text))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
