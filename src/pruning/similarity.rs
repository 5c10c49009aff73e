//! Token-set similarity between two definitions.
//!
//! Both texts are folded (NFC, lowercase) and split into word tokens. The
//! score is the best normalized Levenshtein ratio among:
//! - shared tokens vs shared + tokens only in `a`
//! - shared tokens vs shared + tokens only in `b`
//! - shared + only-`a` vs shared + only-`b`
//!
//! So word order and repeated words do not matter, and a definition that is
//! a subset of the other ("castle" vs "castle, fortress") scores 1.0.

use std::collections::BTreeSet;

use crate::text;

/// Similarity in `0.0..=1.0`. Symmetric.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let a = tokens(a);
    let b = tokens(b);

    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let shared = join(a.intersection(&b));
    let with_a = join_after(&shared, a.difference(&b));
    let with_b = join_after(&shared, b.difference(&a));

    let mut best = strsim::normalized_levenshtein(&with_a, &with_b);
    if !shared.is_empty() {
        best = best
            .max(strsim::normalized_levenshtein(&shared, &with_a))
            .max(strsim::normalized_levenshtein(&shared, &with_b));
    }
    best
}

fn tokens(text: &str) -> BTreeSet<String> {
    text::fold_key(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn join<'a>(tokens: impl Iterator<Item = &'a String>) -> String {
    tokens.map(String::as_str).collect::<Vec<_>>().join(" ")
}

fn join_after<'a>(prefix: &str, rest: impl Iterator<Item = &'a String>) -> String {
    let rest = join(rest);
    match (prefix.is_empty(), rest.is_empty()) {
        (_, true) => prefix.to_string(),
        (true, false) => rest,
        (false, false) => format!("{} {}", prefix, rest),
    }
}
