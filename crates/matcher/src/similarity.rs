//! Built-in similarity functions. All take normalized text and return a
//! score in 0–100.
//!
//! The ratio family follows the familiar fuzzy-matching vocabulary: `ratio`
//! compares whole strings, `partial_*` compares the shorter string against the
//! best-aligned window of the longer one, and `token_*` compares word sets so
//! that "smith, john" and "john smith" agree.

use std::collections::BTreeSet;

/// Case-fold, trim, and collapse internal whitespace runs to one space.
pub fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalized Levenshtein similarity.
pub fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b) * 100.0
}

/// 100 for identical strings, 0 otherwise.
pub fn exact(a: &str, b: &str) -> f64 {
    if a == b { 100.0 } else { 0.0 }
}

pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(a, b) * 100.0
}

/// Best `ratio` of the shorter string against every equal-length window of
/// the longer one.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (short, long) = if a_chars.len() <= b_chars.len() {
        (a_chars, b_chars)
    } else {
        (b_chars, a_chars)
    };

    if short.is_empty() {
        return if long.is_empty() { 100.0 } else { 0.0 };
    }
    if short.len() == long.len() {
        return ratio(a, b);
    }

    let needle: String = short.iter().collect();
    let mut best = 0.0_f64;
    for window in long.windows(short.len()) {
        let candidate: String = window.iter().collect();
        best = best.max(ratio(&needle, &candidate));
        if best >= 100.0 {
            break;
        }
    }
    best
}

/// Split on anything that is not alphanumeric.
fn tokens(s: &str) -> Vec<&str> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

fn sorted_tokens(s: &str) -> String {
    let mut toks = tokens(s);
    toks.sort_unstable();
    toks.join(" ")
}

/// `ratio` after sorting each side's tokens.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

struct TokenSplit<'a> {
    common: Vec<&'a str>,
    only_a: Vec<&'a str>,
    only_b: Vec<&'a str>,
}

fn split_token_sets<'a>(a: &'a str, b: &'a str) -> TokenSplit<'a> {
    let set_a: BTreeSet<&str> = tokens(a).into_iter().collect();
    let set_b: BTreeSet<&str> = tokens(b).into_iter().collect();
    TokenSplit {
        common: set_a.intersection(&set_b).copied().collect(),
        only_a: set_a.difference(&set_b).copied().collect(),
        only_b: set_b.difference(&set_a).copied().collect(),
    }
}

fn join_nonempty(head: &str, tail: &[&str]) -> String {
    let tail = tail.join(" ");
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail,
        (false, true) => head.to_string(),
        (false, false) => format!("{head} {tail}"),
    }
}

/// Compares the shared tokens against each side's full token set, so extra
/// words on one side (a middle name, a suffix) cost little.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let split = split_token_sets(a, b);
    if split.common.is_empty() && split.only_a.is_empty() && split.only_b.is_empty() {
        return 0.0;
    }

    let sect = split.common.join(" ");
    if !sect.is_empty() && (split.only_a.is_empty() || split.only_b.is_empty()) {
        return 100.0;
    }

    let combined_a = join_nonempty(&sect, &split.only_a);
    let combined_b = join_nonempty(&sect, &split.only_b);
    let mut best = ratio(&combined_a, &combined_b);
    if !sect.is_empty() {
        best = best
            .max(ratio(&sect, &combined_a))
            .max(ratio(&sect, &combined_b));
    }
    best
}

/// Any shared token scores 100; otherwise the partial ratio of the sorted
/// token strings.
pub fn partial_token_ratio(a: &str, b: &str) -> f64 {
    let split = split_token_sets(a, b);
    if !split.common.is_empty() {
        return 100.0;
    }
    if split.only_a.is_empty() || split.only_b.is_empty() {
        return 0.0;
    }
    partial_ratio(&split.only_a.join(" "), &split.only_b.join(" "))
}

/// Weighted combination of the scorers above. Similar-length strings use the
/// whole-string and token ratios; strings of very different length lean on
/// the partial ratios, scaled down.
pub fn wratio(a: &str, b: &str) -> f64 {
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    if len_a == 0 || len_b == 0 {
        return 0.0;
    }

    const UNBASE_SCALE: f64 = 0.95;
    let len_ratio = len_a.max(len_b) as f64 / len_a.min(len_b) as f64;
    let mut end_ratio = ratio(a, b);

    if len_ratio < 1.5 {
        let token = token_sort_ratio(a, b).max(token_set_ratio(a, b));
        return end_ratio.max(token * UNBASE_SCALE);
    }

    let partial_scale = if len_ratio < 8.0 { 0.9 } else { 0.6 };
    end_ratio = end_ratio.max(partial_ratio(a, b) * partial_scale);
    end_ratio.max(partial_token_ratio(a, b) * UNBASE_SCALE * partial_scale)
}
