//! Token-set similarity scoring.
//!
//! Scores are integers in `0..=100`. Pairwise comparison is the indel
//! ratio `2 * LCS / (len_a + len_b)` from `rapidfuzz`.

use std::collections::BTreeSet;

use rapidfuzz::fuzz;

/// Indel similarity of two strings in `0.0..=100.0`.
pub fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    fuzz::ratio(a.chars(), b.chars()) * 100.0
}

/// Order-independent token-set similarity of two already-normalized strings.
///
/// Tokens are deduplicated. When every token of one side appears on the
/// other side the score is 100; extra tokens on the longer side only lower
/// the score through the pairwise ratios of the sorted token strings.
pub fn token_set_ratio(a: &str, b: &str) -> u8 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0;
    }

    let common: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    if !common.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100;
    }

    let sect = common.join(" ");
    let with_a = join_nonempty(&sect, &only_a.join(" "));
    let with_b = join_nonempty(&sect, &only_b.join(" "));

    let mut best = ratio(&with_a, &with_b);
    if !sect.is_empty() {
        best = best.max(ratio(&sect, &with_a)).max(ratio(&sect, &with_b));
    }
    best.round().clamp(0.0, 100.0) as u8
}

fn join_nonempty(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{head} {tail}"),
    }
}
