//! Approximate string matching for misheard words
//!
//! Levenshtein distance, a normalized similarity score built on it, and a
//! Soundex-style phonetic code. Every function is pure and total over
//! arbitrary input.

/// Default threshold for [`is_similar`]
pub const DEFAULT_SIMILAR_THRESHOLD: f64 = 0.7;
/// Default threshold for [`find_best_match`]
pub const DEFAULT_BEST_MATCH_THRESHOLD: f64 = 0.6;
/// Default threshold for [`fuzzy_contains`]
pub const DEFAULT_CONTAINS_THRESHOLD: f64 = 0.75;

/// Classic Levenshtein distance over characters (case-sensitive)
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two rolling rows instead of the full matrix
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Case-insensitive similarity in `0.0..=1.0`
///
/// `1 - distance / max(len)`, with two empty strings counting as identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - edit_distance(&a, &b) as f64 / max_len as f64
}

/// Whether two strings are at least `threshold` similar
pub fn is_similar(a: &str, b: &str, threshold: f64) -> bool {
    similarity(a, b) >= threshold
}

/// Best candidate at or above `threshold`; ties go to the earliest candidate
pub fn find_best_match<'a, S: AsRef<str>>(
    input: &str,
    candidates: &'a [S],
    threshold: f64,
) -> Option<&'a str> {
    let mut best: Option<(&'a str, f64)> = None;

    for candidate in candidates {
        let candidate = candidate.as_ref();
        let score = similarity(input, candidate);
        if score < threshold {
            continue;
        }
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((candidate, score)),
        }
    }

    best.map(|(c, _)| c)
}

/// First pattern (in pattern order) that appears in `input`, exactly or approximately
///
/// Exact substrings are checked for every pattern before any fuzzy comparison.
/// Single-word patterns are compared against each token; multi-word patterns
/// against every window of the same number of tokens.
pub fn fuzzy_contains<'a, S: AsRef<str>>(
    input: &str,
    patterns: &'a [S],
    threshold: f64,
) -> Option<&'a str> {
    let lowered = input.to_lowercase();

    if let Some(p) = patterns
        .iter()
        .map(AsRef::as_ref)
        .find(|p| !p.is_empty() && lowered.contains(&p.to_lowercase()))
    {
        return Some(p);
    }

    let tokens: Vec<&str> = lowered.split_whitespace().collect();

    for pattern in patterns.iter().map(AsRef::as_ref) {
        let words: Vec<&str> = pattern.split_whitespace().collect();
        if words.is_empty() || words.len() > tokens.len() {
            continue;
        }

        let found = if words.len() == 1 {
            tokens.iter().any(|t| is_similar(t, words[0], threshold))
        } else {
            let joined = words.join(" ");
            tokens
                .windows(words.len())
                .any(|w| is_similar(&w.join(" "), &joined, threshold))
        };

        if found {
            return Some(pattern);
        }
    }

    None
}

/// Consonant class for the phonetic code; `None` for vowels and h/w/y
fn phonetic_class(c: char) -> Option<char> {
    match c {
        'b' | 'f' | 'p' | 'v' => Some('1'),
        'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => Some('2'),
        'd' | 't' => Some('3'),
        'l' => Some('4'),
        'm' | 'n' => Some('5'),
        'r' => Some('6'),
        _ => None,
    }
}

/// Four-character Soundex-style code
///
/// Only ASCII letters take part. The first letter is kept (uppercased), the
/// rest map to consonant classes with adjacent duplicates collapsed, and the
/// result is padded with `'0'` to exactly four characters.
pub fn phonetic_code(s: &str) -> String {
    let mut letters = s
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_lowercase());

    let Some(first) = letters.next() else {
        return "0000".to_string();
    };

    let mut code = String::with_capacity(4);
    code.push(first.to_ascii_uppercase());
    let mut last = phonetic_class(first);

    for c in letters {
        if code.len() == 4 {
            break;
        }
        let class = phonetic_class(c);
        if let Some(digit) = class {
            if class != last {
                code.push(digit);
            }
        }
        last = class;
    }

    while code.len() < 4 {
        code.push('0');
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_edit_distance_basics() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("abc", ""), 3);
        assert_eq!(edit_distance("same", "same"), 0);
        // case-sensitive
        assert_eq!(edit_distance("Stop", "stop"), 1);
    }

    #[test]
    fn test_similarity_case_insensitive() {
        assert_eq!(similarity("STOP", "stop"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
        assert!((similarity("coolent", "coolant") - (1.0 - 1.0 / 7.0)).abs() < 1e-9);
    }

    #[test]
    fn test_is_similar_threshold() {
        assert!(is_similar("spindel", "spindle", 0.7));
        assert!(!is_similar("jog", "home", 0.7));
    }

    #[test]
    fn test_find_best_match_prefers_highest() {
        let candidates = ["probe", "prove", "home"];
        assert_eq!(find_best_match("proba", &candidates, 0.6), Some("probe"));
        assert_eq!(find_best_match("xyzzy", &candidates, 0.6), None);
    }

    #[test]
    fn test_find_best_match_tie_goes_to_first() {
        let candidates = ["cat", "bat"];
        // "hat" is one edit from both
        assert_eq!(find_best_match("hat", &candidates, 0.6), Some("cat"));
    }

    #[test]
    fn test_fuzzy_contains_exact_first() {
        let patterns = ["go left", "go right"];
        assert_eq!(fuzzy_contains("please go right now", &patterns, 0.75), Some("go right"));
    }

    #[test]
    fn test_fuzzy_contains_single_word_token() {
        let patterns = ["spindle"];
        assert_eq!(fuzzy_contains("turn the spindl on", &patterns, 0.75), Some("spindle"));
    }

    #[test]
    fn test_fuzzy_contains_multi_word_window() {
        let patterns = ["feed rate"];
        assert_eq!(fuzzy_contains("set fed rate 500", &patterns, 0.75), Some("feed rate"));
        assert_eq!(fuzzy_contains("set speed 500", &patterns, 0.75), None);
    }

    #[test]
    fn test_fuzzy_contains_after_normalization() {
        let normalizer = crate::text::TextNormalizer::new();
        let normalized = normalizer.normalize("go write fifty");
        assert_eq!(normalized, "go right 50");
        assert_eq!(fuzzy_contains(&normalized, &["go right"], 0.75), Some("go right"));
    }

    #[test]
    fn test_phonetic_code_examples() {
        assert_eq!(phonetic_code("Robert"), "R163");
        assert_eq!(phonetic_code("Rupert"), "R163");
        assert_eq!(phonetic_code("probe"), "P610");
        assert_eq!(phonetic_code(""), "0000");
        assert_eq!(phonetic_code("1234"), "0000");
        assert_eq!(phonetic_code("a"), "A000");
    }

    proptest! {
        #[test]
        fn prop_similarity_symmetric(a in ".{0,12}", b in ".{0,12}") {
            prop_assert_eq!(similarity(&a, &b), similarity(&b, &a));
        }

        #[test]
        fn prop_similarity_identity(a in ".{0,16}") {
            prop_assert_eq!(similarity(&a, &a), 1.0);
        }

        #[test]
        fn prop_edit_distance_bounds(a in ".{0,12}", b in ".{0,12}") {
            prop_assert_eq!(edit_distance(&a, &a), 0);
            let d = edit_distance(&a, &b);
            prop_assert!(d <= a.chars().count() + b.chars().count());
        }

        #[test]
        fn prop_phonetic_code_length(s in ".{0,24}") {
            prop_assert_eq!(phonetic_code(&s).len(), 4);
        }
    }
}
