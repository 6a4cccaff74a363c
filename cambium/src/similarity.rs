//! String distances used as update-cost proxies during matching.
//!
//! Labels are optional; an absent label is treated as the empty string
//! throughout, so every function here accepts `Option<&str>`.

use rapidhash::RapidHashMap;

/// Sliding char-windows of length 3; the whole string when shorter.
///
/// `|T(s)| = max(1, chars(s) - 2)`, which keeps the distance denominator
/// nonzero even for empty input.
fn trigrams(s: &str) -> Vec<&str> {
    let starts: Vec<usize> = s.char_indices().map(|(i, _)| i).collect();
    let n = starts.len();
    if n < 3 {
        return vec![s];
    }
    (0..=n - 3)
        .map(|i| {
            let end = if i + 3 < n { starts[i + 3] } else { s.len() };
            &s[starts[i]..end]
        })
        .collect()
}

/// Normalized trigram distance in `[0, 1]`.
///
/// Forms the trigram multisets of both strings and returns
/// `1 − 2·|matches| / (|T(a)| + |T(b)|)`. Symmetric, and 0 for equal
/// inputs (two absent labels included).
pub fn normalized_trigram_distance(a: Option<&str>, b: Option<&str>) -> f64 {
    let a = a.unwrap_or("");
    let b = b.unwrap_or("");

    let trigrams_a = trigrams(a);
    let trigrams_b = trigrams(b);

    let mut counts: RapidHashMap<&str, usize> = RapidHashMap::default();
    for &gram in &trigrams_a {
        *counts.entry(gram).or_default() += 1;
    }
    let mut matches = 0usize;
    for &gram in &trigrams_b {
        if let Some(count) = counts.get_mut(gram)
            && *count > 0
        {
            *count -= 1;
            matches += 1;
        }
    }

    1.0 - 2.0 * matches as f64 / (trigrams_a.len() + trigrams_b.len()) as f64
}

/// Plain Levenshtein edit distance over chars.
pub fn levenshtein_distance(a: Option<&str>, b: Option<&str>) -> usize {
    let a = a.unwrap_or("");
    let b = b.unwrap_or("");
    let (long, short): (Vec<char>, Vec<char>) = if a.chars().count() < b.chars().count() {
        (b.chars().collect(), a.chars().collect())
    } else {
        (a.chars().collect(), b.chars().collect())
    };

    if short.is_empty() {
        return long.len();
    }

    let mut previous: Vec<usize> = (0..=short.len()).collect();
    for (i, c1) in long.iter().enumerate() {
        let mut current = vec![i + 1];
        for (j, c2) in short.iter().enumerate() {
            let insertions = previous[j + 1] + 1;
            let deletions = current[j] + 1;
            let substitutions = previous[j] + usize::from(c1 != c2);
            current.push(insertions.min(deletions).min(substitutions));
        }
        previous = current;
    }
    previous[short.len()]
}

/// Levenshtein distance divided by the longer length; 0 for two empties.
pub fn normalized_levenshtein_distance(a: Option<&str>, b: Option<&str>) -> f64 {
    let distance = levenshtein_distance(a, b);
    let max_len = a
        .unwrap_or("")
        .chars()
        .count()
        .max(b.unwrap_or("").chars().count());
    if max_len == 0 {
        return 0.0;
    }
    distance as f64 / max_len as f64
}
