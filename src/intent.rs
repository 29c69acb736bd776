//! Intent Classifier
//!
//! Keyword-table classifier with two fuzzy fallbacks:
//!
//! 1. exact keyword substring over the normalized query (first intent in
//!    declaration order wins)
//! 2. best fuzzy ratio between any keyword and the normalized query
//! 3. best fuzzy ratio against previously learned phrases (stricter)
//! 4. `unknown`
//!
//! Every classification records `normalized -> intent` into the learned-phrase
//! memory if the phrase has not been seen before. Queries that normalize to an
//! empty string (only stop-words or punctuation) are never recorded.

use std::collections::BTreeMap;

use crate::bank::{IntentBank, UNKNOWN_INTENT};
use crate::normalize::{similarity_ratio, QueryNormalizer};

/// Keyword rule for one intent
#[derive(Debug, Clone)]
pub struct IntentRule {
    pub name: String,
    pub keywords: Vec<String>,
}

impl From<&IntentBank> for IntentRule {
    fn from(bank: &IntentBank) -> Self {
        IntentRule {
            name: bank.name.clone(),
            keywords: bank.keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }
}

/// Which rule produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    FuzzyKeyword,
    LearnedPhrase,
    Unknown,
}

/// Classification result
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: String,
    pub kind: MatchKind,
    /// Similarity of the winning match (1.0 for exact matches)
    pub score: f32,
}

/// Intent classifier configuration
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Minimum fuzzy ratio against table keywords (exclusive)
    pub keyword_threshold: f32,
    /// Minimum fuzzy ratio against learned phrases (exclusive)
    pub learned_threshold: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            keyword_threshold: 0.70,
            learned_threshold: 0.80,
        }
    }
}

/// Keyword + learned-phrase intent classifier
pub struct IntentClassifier {
    config: ClassifierConfig,
    rules: Vec<IntentRule>,
    learned: BTreeMap<String, String>,
}

impl IntentClassifier {
    /// Create a classifier over rules in declaration order
    pub fn new(config: ClassifierConfig, rules: Vec<IntentRule>) -> Self {
        IntentClassifier {
            config,
            rules,
            learned: BTreeMap::new(),
        }
    }

    /// Build rules from bank intents
    pub fn from_intents(config: ClassifierConfig, intents: &[IntentBank]) -> Self {
        Self::new(config, intents.iter().map(IntentRule::from).collect())
    }

    /// Classify a raw query, returning the intent label
    pub fn classify(&mut self, normalizer: &mut QueryNormalizer, query: &str) -> String {
        self.classify_detailed(normalizer, query).intent
    }

    /// Classify a raw query and report which rule matched
    pub fn classify_detailed(
        &mut self,
        normalizer: &mut QueryNormalizer,
        query: &str,
    ) -> Classification {
        let normalized = normalizer.normalize(query);
        let result = self.match_normalized(&normalized);
        self.learn(&normalized, &result.intent);
        result
    }

    /// Classify without touching the learned-phrase memory
    pub fn peek(&self, normalizer: &mut QueryNormalizer, query: &str) -> Classification {
        let normalized = normalizer.normalize(query);
        self.match_normalized(&normalized)
    }

    fn match_normalized(&self, normalized: &str) -> Classification {
        for rule in &self.rules {
            if rule
                .keywords
                .iter()
                .any(|k| !k.is_empty() && normalized.contains(k.as_str()))
            {
                return Classification {
                    intent: rule.name.clone(),
                    kind: MatchKind::Exact,
                    score: 1.0,
                };
            }
        }

        if normalized.is_empty() {
            return unknown();
        }

        let mut best: Option<(&str, f32)> = None;
        for rule in &self.rules {
            for keyword in &rule.keywords {
                let ratio = similarity_ratio(keyword, normalized);
                if best.map_or(true, |(_, b)| ratio > b) {
                    best = Some((rule.name.as_str(), ratio));
                }
            }
        }
        if let Some((intent, score)) = best {
            if score > self.config.keyword_threshold {
                return Classification {
                    intent: intent.to_string(),
                    kind: MatchKind::FuzzyKeyword,
                    score,
                };
            }
        }

        let mut best: Option<(&str, f32)> = None;
        for (phrase, intent) in &self.learned {
            let ratio = similarity_ratio(phrase, normalized);
            if best.map_or(true, |(_, b)| ratio > b) {
                best = Some((intent.as_str(), ratio));
            }
        }
        if let Some((intent, score)) = best {
            if score > self.config.learned_threshold {
                return Classification {
                    intent: intent.to_string(),
                    kind: MatchKind::LearnedPhrase,
                    score,
                };
            }
        }

        unknown()
    }

    /// Record a phrase unless it is already known; the first intent wins
    pub fn learn(&mut self, normalized: &str, intent: &str) -> bool {
        if normalized.is_empty() || self.learned.contains_key(normalized) {
            return false;
        }
        log::debug!("Learned phrase: '{}' -> {}", normalized, intent);
        self.learned
            .insert(normalized.to_string(), intent.to_string());
        true
    }

    /// Learned-phrase memory
    pub fn learned_phrases(&self) -> &BTreeMap<String, String> {
        &self.learned
    }

    /// Replace the learned-phrase memory (used when loading a snapshot)
    pub fn restore_learned(&mut self, learned: BTreeMap<String, String>) {
        self.learned = learned;
    }

    /// Intent names in declaration order
    pub fn intent_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }
}

fn unknown() -> Classification {
    Classification {
        intent: UNKNOWN_INTENT.to_string(),
        kind: MatchKind::Unknown,
        score: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, keywords: &[&str]) -> IntentRule {
        IntentRule {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn classifier() -> IntentClassifier {
        IntentClassifier::new(
            ClassifierConfig::default(),
            vec![
                rule("booking", &["book", "ticket", "reserve"]),
                rule("cancellation", &["cancel", "refund"]),
                rule("bus_status", &["bus", "late", "delay"]),
            ],
        )
    }

    #[test]
    fn test_exact_match_uses_declaration_order() {
        let mut c = classifier();
        let mut n = QueryNormalizer::new();
        // "ticket" (booking) and "cancel" (cancellation) both match
        let result = c.classify_detailed(&mut n, "Cancel my ticket");
        assert_eq!(result.intent, "booking");
        assert_eq!(result.kind, MatchKind::Exact);
    }

    #[test]
    fn test_fuzzy_keyword_match() {
        let mut c = classifier();
        let mut n = QueryNormalizer::new();
        // "refnd" vs "refund": LCS 5 -> 10/11
        let result = c.classify_detailed(&mut n, "refnd");
        assert_eq!(result.intent, "cancellation");
        assert_eq!(result.kind, MatchKind::FuzzyKeyword);
        assert!(result.score > 0.7);
    }

    #[test]
    fn test_learned_phrase_match() {
        let mut c = classifier();
        let mut n = QueryNormalizer::new();
        c.learn("wheelchair assistance needed", "bus_status");

        let result = c.classify_detailed(&mut n, "wheelchair assistance need");
        assert_eq!(result.intent, "bus_status");
        assert_eq!(result.kind, MatchKind::LearnedPhrase);
    }

    #[test]
    fn test_unknown_and_learning() {
        let mut c = classifier();
        let mut n = QueryNormalizer::new();
        assert_eq!(c.classify(&mut n, "quantum chromodynamics"), "unknown");
        assert_eq!(
            c.learned_phrases().get("quantum chromodynamics").map(String::as_str),
            Some("unknown")
        );
    }

    #[test]
    fn test_first_seen_intent_is_never_overwritten() {
        let mut c = classifier();
        assert!(c.learn("late again", "bus_status"));
        assert!(!c.learn("late again", "booking"));
        assert_eq!(c.learned_phrases()["late again"], "bus_status");
    }

    #[test]
    fn test_empty_normalized_query_is_not_learned() {
        let mut c = classifier();
        let mut n = QueryNormalizer::new();
        assert_eq!(c.classify(&mut n, "what is this?"), "unknown");
        assert!(c.learned_phrases().is_empty());
    }

    #[test]
    fn test_peek_does_not_learn() {
        let c = classifier();
        let mut n = QueryNormalizer::new();
        assert_eq!(c.peek(&mut n, "book a seat").intent, "booking");
        assert!(c.learned_phrases().is_empty());
    }
}
