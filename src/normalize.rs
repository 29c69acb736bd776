//! Query Normalizer
//!
//! Lower-cases, tokenizes and strips stop-words from raw customer queries.
//! Results are memoized for the lifetime of the normalizer; the query space is
//! operator-facing so the cache is left unbounded.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// Word-or-punctuation token pattern
static TOKEN_PATTERN: LazyLock<regex_lite::Regex> =
    LazyLock::new(|| regex_lite::Regex::new(r"\w+|[^\w\s]+").unwrap());

/// English stop-words removed before intent matching
pub const STOP_WORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that", "that'll",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has",
    "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn",
    "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn",
    "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan",
    "shan't", "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't",
    "wouldn", "wouldn't",
];

static STOP_WORD_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOP_WORDS.iter().copied().collect());

/// Memoizing query normalizer
#[derive(Debug, Default)]
pub struct QueryNormalizer {
    cache: HashMap<String, String>,
}

impl QueryNormalizer {
    /// Create an empty normalizer
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a raw query into space-joined content tokens
    pub fn normalize(&mut self, raw: &str) -> String {
        let lower = raw.to_lowercase();
        if let Some(hit) = self.cache.get(&lower) {
            return hit.clone();
        }

        let normalized = normalize_uncached(&lower);
        self.cache.insert(lower, normalized.clone());
        normalized
    }

    /// Number of memoized queries
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

fn normalize_uncached(lower: &str) -> String {
    TOKEN_PATTERN
        .find_iter(lower)
        .map(|m| m.as_str())
        .filter(|token| token.chars().all(char::is_alphanumeric))
        .filter(|token| !STOP_WORD_SET.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Character-level similarity ratio in `[0, 1]`
///
/// Computed as `2 * LCS / (len(a) + len(b))`, where LCS is the length of the
/// longest common subsequence. Two empty strings are identical.
pub fn similarity_ratio(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    // Single-row LCS table
    let mut row = vec![0usize; b.len() + 1];
    for &ca in &a {
        let mut diag = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diag + 1
            } else {
                above.max(row[j])
            };
            diag = above;
        }
    }

    (2 * row[b.len()]) as f32 / total as f32
}
