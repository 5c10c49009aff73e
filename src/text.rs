//! Text normalization shared by cache keys, card identifiers, tags and pruning.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Canonical form used for fingerprints: NFC, trimmed, inner whitespace collapsed.
pub fn canonical_text(text: &str) -> String {
    let composed: String = text.nfc().collect();
    composed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Grouping key for dictionary forms and definitions.
///
/// Diacritics are kept: "zamek" and "zamęk" are different words.
pub fn fold_key(text: &str) -> String {
    canonical_text(text).to_lowercase()
}

/// Remove combining marks after canonical decomposition ("kamień" -> "kamien").
///
/// Letters without a decomposition (e.g. "ł") are left alone.
pub fn strip_diacritics(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Short ASCII-ish prefix for card identifiers.
pub fn uid_slug(text: &str, max_chars: usize) -> String {
    let slug: String = strip_diacritics(&fold_key(text))
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .take(max_chars)
        .collect();

    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug
    }
}

/// Tag-safe slug of a book title ("Pan Tadeusz: Ks. 1" -> "pan_tadeusz_ks_1").
pub fn book_tag(title: &str) -> Option<String> {
    let lowered = strip_diacritics(title).to_lowercase().replace('-', "_");

    let mut slug = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        let mapped = if c.is_whitespace() { '_' } else { c };
        if !(mapped.is_alphanumeric() || mapped == '_') {
            continue;
        }
        if mapped == '_' && slug.ends_with('_') {
            continue;
        }
        slug.push(mapped);
    }

    let slug = slug.trim_matches('_');
    (!slug.is_empty()).then(|| slug.to_string())
}
