//! Fuzzy name-resemblance scoring.
//!
//! Dissolving a wrapper folder is only safe when the folder and its content
//! actually belong together. This module scores how closely two names
//! resemble each other and gates dissolution on a caller-supplied threshold.
//!
//! The score is the maximum of several complementary measures so that a
//! child name which is a superset, subset, or word-reordering of the parent
//! name still scores highly:
//! - full alignment ratio (`rapidfuzz::fuzz::ratio`)
//! - partial ratio (best window of the longer string against the shorter)
//! - token-sort ratio (whitespace tokens sorted before comparison)
//! - token-set ratio (shared tokens weighed against the differing rest)

use rapidfuzz::fuzz;
use std::collections::BTreeSet;
use std::path::Path;

/// Strips a trailing extension from a name, if one is present.
///
/// Names without a dot are returned unchanged, so plain folder names
/// (including CJK ones) are never truncated.
///
/// # Examples
///
/// ```
/// use shelftidy::similarity::clean_name;
///
/// assert_eq!(clean_name("archive.zip"), "archive");
/// assert_eq!(clean_name("file.tar.gz"), "file.tar");
/// assert_eq!(clean_name("漫画合集"), "漫画合集");
/// ```
pub fn clean_name(name: &str) -> String {
    if name.contains('.') {
        Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string())
    } else {
        name.to_string()
    }
}

/// Computes the similarity of two names as a value in `0.0..=1.0`.
///
/// Extensions are stripped and the comparison is case-insensitive.
/// Empty input on either side scores 0.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let n1 = clean_name(&a.to_lowercase());
    let n2 = clean_name(&b.to_lowercase());
    if n1.is_empty() || n2.is_empty() {
        return 0.0;
    }

    let scores = [
        fuzz::ratio(n1.chars(), n2.chars()),
        partial_ratio(&n1, &n2),
        token_sort_ratio(&n1, &n2),
        token_set_ratio(&n1, &n2),
    ];

    scores.into_iter().fold(0.0, f64::max)
}

/// Checks whether a parent folder name and a child item name are similar
/// enough to allow dissolution.
///
/// A threshold of zero or below disables the gate entirely: the check
/// passes and the reported score is 1.0.
///
/// Returns `(passed, score)`.
pub fn check_similarity(parent_name: &str, child_name: &str, threshold: f64) -> (bool, f64) {
    if threshold <= 0.0 {
        return (true, 1.0);
    }

    let score = similarity(parent_name, child_name);
    (score >= threshold, score)
}

/// Best alignment of the shorter string against any same-length window of
/// the longer one, in `0.0..=1.0`.
///
/// This is what lets "漫画" score 1.0 against "漫画合集": the shorter name
/// matches a window of the longer one exactly.
fn partial_ratio(a: &str, b: &str) -> f64 {
    let (short, long): (Vec<char>, Vec<char>) = if a.chars().count() <= b.chars().count() {
        (a.chars().collect(), b.chars().collect())
    } else {
        (b.chars().collect(), a.chars().collect())
    };

    if short.is_empty() {
        return 0.0;
    }
    if short.len() == long.len() {
        return fuzz::ratio(short.iter().copied(), long.iter().copied());
    }

    let mut best: f64 = 0.0;
    for window in long.windows(short.len()) {
        let score = fuzz::ratio(short.iter().copied(), window.iter().copied());
        if score > best {
            best = score;
            if best >= 1.0 {
                break;
            }
        }
    }
    best
}

/// Ratio of the two strings with their whitespace tokens sorted, so word
/// order does not matter.
fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let sorted_join = |s: &str| {
        let mut tokens: Vec<&str> = s.split_whitespace().collect();
        tokens.sort_unstable();
        tokens.join(" ")
    };

    let sa = sorted_join(a);
    let sb = sorted_join(b);
    fuzz::ratio(sa.chars(), sb.chars())
}

/// Token-set ratio: shared tokens compared against each side's remainder.
///
/// When one side's tokens are a subset of the other's the score is 1.0,
/// which handles names like "作品集" inside "作品集 2024".
fn token_set_ratio(a: &str, b: &str) -> f64 {
    let ta: BTreeSet<&str> = a.split_whitespace().collect();
    let tb: BTreeSet<&str> = b.split_whitespace().collect();

    let inter: Vec<&str> = ta.intersection(&tb).copied().collect();
    let diff_a: Vec<&str> = ta.difference(&tb).copied().collect();
    let diff_b: Vec<&str> = tb.difference(&ta).copied().collect();

    if !inter.is_empty() && (diff_a.is_empty() || diff_b.is_empty()) {
        return 1.0;
    }

    let joined = |parts: &[&str]| parts.join(" ");
    let base = joined(&inter);
    let combined_a = if base.is_empty() {
        joined(&diff_a)
    } else {
        format!("{} {}", base, joined(&diff_a))
    };
    let combined_b = if base.is_empty() {
        joined(&diff_b)
    } else {
        format!("{} {}", base, joined(&diff_b))
    };

    [
        fuzz::ratio(base.chars(), combined_a.chars()),
        fuzz::ratio(base.chars(), combined_b.chars()),
        fuzz::ratio(combined_a.chars(), combined_b.chars()),
    ]
    .into_iter()
    .fold(0.0, f64::max)
}
