//! Dynamic Response Synthesizer
//!
//! Builds a new response template when every template of a scope has already
//! been shown. Templates are assembled from an authored grammar:
//!
//! ```text
//! Skeleton  "Regarding {query}, {action}"   role = instruction
//! Fragment  "please check our website for more details"   role = instruction
//!     -> template "Regarding {query}, please check our website for more details"
//!     -> rendered "Regarding how do i cancel?, please check ..."
//! ```
//!
//! Skeletons declare the role of their `{action}` slot and only accept
//! fragments tagged with the same role. Candidate pairs are drawn without
//! replacement, the scope's own fragments before the shared fallback pool, so
//! the number of attempts is bounded by `max_attempts`.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::bank::render;

/// Placeholder filled by an action fragment
pub const ACTION_SLOT: &str = "{action}";

/// Phrase used when neither the scope nor the bank offers any fragment
pub const GENERIC_ACTION: &str = "please contact our support team for further assistance";

/// Role of an action fragment within a skeleton sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentRole {
    /// Imperative clause addressed to the customer ("please check ...")
    Instruction,
    /// Clause pointing at another channel ("our team can help ...")
    Referral,
}

/// Sentence skeleton with `{query}` and `{action}` slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skeleton {
    pub text: String,
    pub role: FragmentRole,
}

/// Reusable action phrase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFragment {
    pub role: FragmentRole,
    pub text: String,
}

/// Outcome of a synthesis run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    /// Template with `{query}` still in place
    pub template: String,
    /// Template rendered for the current query
    pub rendered: String,
    /// Number of candidates tried
    pub attempts: usize,
    /// True when every candidate collided and the last one was returned anyway
    pub exhausted: bool,
}

/// Bounded-attempt response synthesizer
#[derive(Debug, Clone)]
pub struct Synthesizer {
    skeletons: Vec<Skeleton>,
    fallback_actions: Vec<ActionFragment>,
    max_attempts: usize,
}

impl Synthesizer {
    /// Create a synthesizer over the given grammar
    pub fn new(
        skeletons: Vec<Skeleton>,
        fallback_actions: Vec<ActionFragment>,
        max_attempts: usize,
    ) -> Self {
        let skeletons = if skeletons.is_empty() {
            vec![Skeleton {
                text: "Regarding {query}, {action}".to_string(),
                role: FragmentRole::Instruction,
            }]
        } else {
            skeletons
        };

        Self {
            skeletons,
            fallback_actions,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Maximum number of candidates tried per call
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Synthesize a response for `query_lower`
    ///
    /// Candidates built from the scope's own `fragments` are tried first, then
    /// those built from the shared fallback pool (or the generic phrase when
    /// the bank has no fallback fragments). `is_taken` reports whether a
    /// rendered candidate collides with an existing or already-used response.
    pub fn synthesize<R, F>(
        &self,
        query_lower: &str,
        fragments: &[ActionFragment],
        is_taken: F,
        rng: &mut R,
    ) -> Synthesis
    where
        R: Rng + ?Sized,
        F: Fn(&str, &str) -> bool,
    {
        let generic = [ActionFragment {
            role: FragmentRole::Instruction,
            text: GENERIC_ACTION.to_string(),
        }];
        let shared_pool: &[ActionFragment] = if !self.fallback_actions.is_empty() {
            &self.fallback_actions
        } else {
            &generic
        };

        let mut own = self.compatible_pairs(fragments);
        own.shuffle(rng);
        let mut shared = self.compatible_pairs(shared_pool);
        shared.shuffle(rng);
        let candidates: Vec<_> = own.into_iter().chain(shared).collect();

        let mut last = None;
        for (attempt, (skeleton, fragment)) in
            candidates.iter().take(self.max_attempts).enumerate()
        {
            let template = skeleton.text.replace(ACTION_SLOT, &fragment.text);
            let rendered = render(&template, query_lower);
            if !is_taken(&template, &rendered) {
                return Synthesis {
                    template,
                    rendered,
                    attempts: attempt + 1,
                    exhausted: false,
                };
            }
            last = Some((template, rendered));
        }

        let attempts = candidates.len().min(self.max_attempts);
        let (template, rendered) = last.unwrap_or_else(|| {
            let template = self.skeletons[0]
                .text
                .replace(ACTION_SLOT, &shared_pool[0].text);
            let rendered = render(&template, query_lower);
            (template, rendered)
        });
        log::debug!(
            "synthesis exhausted after {} attempts for '{}'",
            attempts,
            query_lower
        );

        Synthesis {
            template,
            rendered,
            attempts,
            exhausted: true,
        }
    }

    /// Skeleton/fragment pairs whose roles agree, or every pair if none agree
    fn compatible_pairs<'a>(
        &'a self,
        pool: &'a [ActionFragment],
    ) -> Vec<(&'a Skeleton, &'a ActionFragment)> {
        let matching: Vec<_> = self
            .skeletons
            .iter()
            .flat_map(move |s| {
                pool.iter()
                    .filter(move |f| f.role == s.role)
                    .map(move |f| (s, f))
            })
            .collect();

        if !matching.is_empty() {
            return matching;
        }

        self.skeletons
            .iter()
            .flat_map(move |s| pool.iter().map(move |f| (s, f)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    fn skeleton(text: &str, role: FragmentRole) -> Skeleton {
        Skeleton {
            text: text.to_string(),
            role,
        }
    }

    fn fragment(text: &str, role: FragmentRole) -> ActionFragment {
        ActionFragment {
            role,
            text: text.to_string(),
        }
    }

    fn grammar() -> Synthesizer {
        Synthesizer::new(
            vec![
                skeleton("Regarding {query}, {action}", FragmentRole::Instruction),
                skeleton("For {query}, {action}", FragmentRole::Instruction),
                skeleton("About {query}: {action}", FragmentRole::Referral),
            ],
            vec![
                fragment("please check our website", FragmentRole::Instruction),
                fragment("our support page has the answer", FragmentRole::Referral),
            ],
            8,
        )
    }

    #[test]
    fn test_synthesize_fills_both_slots() {
        let synth = grammar();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let out = synth.synthesize("late bus", &[], |_, _| false, &mut rng);

        assert!(!out.exhausted);
        assert_eq!(out.attempts, 1);
        assert!(out.template.contains("{query}"));
        assert!(!out.template.contains(ACTION_SLOT));
        assert!(out.rendered.contains("late bus"));
    }

    #[test]
    fn test_roles_are_respected() {
        let synth = grammar();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..20 {
            let out = synth.synthesize("refund", &[], |_, _| false, &mut rng);
            if out.template.starts_with("About") {
                assert!(out.template.contains("support page"));
            } else {
                assert!(out.template.contains("check our website"));
            }
        }
    }

    #[test]
    fn test_avoids_taken_candidates() {
        let synth = grammar();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let taken: HashSet<String> =
            ["Regarding refund, please check our website".to_string()].into();

        for _ in 0..10 {
            let out = synth.synthesize("refund", &[], |_, r| taken.contains(r), &mut rng);
            assert!(!out.exhausted);
            assert!(!taken.contains(&out.rendered));
        }
    }

    #[test]
    fn test_terminates_when_everything_collides() {
        let synth = grammar();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let out = synth.synthesize("refund", &[], |_, _| true, &mut rng);

        assert!(out.exhausted);
        assert!(out.attempts <= synth.max_attempts());
        assert!(out.rendered.contains("refund"));
    }

    #[test]
    fn test_empty_fragment_pool_uses_generic_phrase() {
        let synth = Synthesizer::new(Vec::new(), Vec::new(), 5);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let out = synth.synthesize("pets", &[], |_, _| true, &mut rng);

        assert!(out.exhausted);
        assert_eq!(out.attempts, 1);
        assert_eq!(out.rendered, format!("Regarding pets, {}", GENERIC_ACTION));
    }

    #[test]
    fn test_scope_fragments_take_precedence() {
        let synth = grammar();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let own = [fragment("bring a blanket along", FragmentRole::Instruction)];
        let out = synth.synthesize("cold bus", &own, |_, _| false, &mut rng);
        assert!(out.template.contains("bring a blanket along"));
    }

    #[test]
    fn test_falls_back_to_shared_pool_when_own_fragments_are_used() {
        let synth = grammar();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let own = [fragment("bring a blanket along", FragmentRole::Instruction)];

        for _ in 0..5 {
            let out = synth.synthesize(
                "cold bus",
                &own,
                |template, _| template.contains("blanket"),
                &mut rng,
            );
            assert!(!out.exhausted);
            assert!(!out.template.contains("blanket"));
            // Two own candidates were tried before the shared pool
            assert_eq!(out.attempts, 3);
        }
    }

    #[test]
    fn test_shared_pool_candidates_are_distinct_up_to_attempt_bound() {
        let synth = grammar();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let own = [fragment("ask the driver", FragmentRole::Referral)];
        let taken = std::cell::RefCell::new(HashSet::new());

        // 1 own pair + 2 instruction + 1 referral shared pairs
        for _ in 0..4 {
            let out = synth.synthesize(
                "seat",
                &own,
                |_, r| taken.borrow().contains(r),
                &mut rng,
            );
            assert!(!out.exhausted);
            assert!(taken.borrow_mut().insert(out.rendered));
        }
        let out = synth.synthesize("seat", &own, |_, r| taken.borrow().contains(r), &mut rng);
        assert!(out.exhausted);
    }
}
