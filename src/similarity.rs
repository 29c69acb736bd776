//! Similarity Index
//!
//! TF-IDF vectors over the raw query corpus and a cosine nearest-history
//! lookup used to route novel queries to the category of a similar past query.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use crate::corpus::{Corpus, UNCLUSTERED};

/// Terms of two or more word characters
static TERM_PATTERN: LazyLock<regex_lite::Regex> =
    LazyLock::new(|| regex_lite::Regex::new(r"\b\w\w+\b").unwrap());

/// English stop-words dropped by the vectorizer
pub const VECTORIZER_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst",
    "amoungst", "amount", "an", "and", "another", "any", "anyhow", "anyone", "anything",
    "anyway", "anywhere", "are", "around", "as", "at", "back", "be", "became", "because",
    "become", "becomes", "becoming", "been", "before", "beforehand", "behind", "being", "below",
    "beside", "besides", "between", "beyond", "bill", "both", "bottom", "but", "by", "call",
    "can", "cannot", "cant", "co", "con", "could", "couldnt", "cry", "de", "describe", "detail",
    "do", "done", "down", "due", "during", "each", "eg", "eight", "either", "eleven", "else",
    "elsewhere", "empty", "enough", "etc", "even", "ever", "every", "everyone", "everything",
    "everywhere", "except", "few", "fifteen", "fifty", "fill", "find", "fire", "first", "five",
    "for", "former", "formerly", "forty", "found", "four", "from", "front", "full", "further",
    "get", "give", "go", "had", "has", "hasnt", "have", "he", "hence", "her", "here",
    "hereafter", "hereby", "herein", "hereupon", "hers", "herself", "him", "himself", "his",
    "how", "however", "hundred", "i", "ie", "if", "in", "inc", "indeed", "interest", "into",
    "is", "it", "its", "itself", "keep", "last", "latter", "latterly", "least", "less", "ltd",
    "made", "many", "may", "me", "meanwhile", "might", "mill", "mine", "more", "moreover",
    "most", "mostly", "move", "much", "must", "my", "myself", "name", "namely", "neither",
    "never", "nevertheless", "next", "nine", "no", "nobody", "none", "noone", "nor", "not",
    "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto",
    "or", "other", "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own",
    "part", "per", "perhaps", "please", "put", "rather", "re", "same", "see", "seem", "seemed",
    "seeming", "seems", "serious", "several", "she", "should", "show", "side", "since",
    "sincere", "six", "sixty", "so", "some", "somehow", "someone", "something", "sometime",
    "sometimes", "somewhere", "still", "such", "system", "take", "ten", "than", "that", "the",
    "their", "them", "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "thereupon", "these", "they", "thick", "thin", "third", "this",
    "those", "though", "three", "through", "throughout", "thru", "thus", "to", "together",
    "too", "top", "toward", "towards", "twelve", "twenty", "two", "un", "under", "until", "up",
    "upon", "us", "very", "via", "was", "we", "well", "were", "what", "whatever", "when",
    "whence", "whenever", "where", "whereafter", "whereas", "whereby", "wherein", "whereupon",
    "wherever", "whether", "which", "while", "whither", "who", "whoever", "whole", "whom",
    "whose", "why", "will", "with", "within", "without", "would", "yet", "you", "your", "yours",
    "yourself", "yourselves",
];

static VECTORIZER_STOP_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| VECTORIZER_STOP_WORDS.iter().copied().collect());

/// Similarity index errors
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("empty vocabulary; perhaps the documents only contain stop words")]
    EmptyVocabulary,

    #[error("vectorizer used before fitting")]
    NotFitted,
}

/// Split lower-cased text into vectorizer terms
pub fn terms(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TERM_PATTERN
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|t| !VECTORIZER_STOP_SET.contains(t))
        .map(str::to_string)
        .collect()
}

/// TF-IDF vectorizer with a capped vocabulary
#[derive(Debug, Clone)]
pub struct TfIdfVectorizer {
    max_features: usize,
    /// term -> column, columns in alphabetical order
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f32>,
}

impl TfIdfVectorizer {
    pub fn new(max_features: usize) -> Self {
        TfIdfVectorizer {
            max_features: max_features.max(1),
            vocabulary: BTreeMap::new(),
            idf: Vec::new(),
        }
    }

    /// Learn vocabulary and idf weights from documents
    pub fn fit(&mut self, documents: &[&str]) -> Result<(), IndexError> {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| terms(d)).collect();

        let mut term_freq: HashMap<&str, usize> = HashMap::new();
        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for tokens in &tokenized {
            let mut seen = HashSet::new();
            for t in tokens {
                *term_freq.entry(t.as_str()).or_insert(0) += 1;
                if seen.insert(t.as_str()) {
                    *doc_freq.entry(t.as_str()).or_insert(0) += 1;
                }
            }
        }
        if term_freq.is_empty() {
            return Err(IndexError::EmptyVocabulary);
        }

        // Most frequent first, ties alphabetical
        let mut ranked: Vec<(&str, usize)> = term_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.max_features);

        let mut kept: Vec<&str> = ranked.into_iter().map(|(t, _)| t).collect();
        kept.sort_unstable();

        let n = documents.len() as f32;
        self.vocabulary = kept
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i))
            .collect();
        self.idf = kept
            .iter()
            .map(|t| {
                let df = doc_freq.get(t).copied().unwrap_or(0) as f32;
                ((1.0 + n) / (1.0 + df)).ln() + 1.0
            })
            .collect();
        Ok(())
    }

    /// L2-normalized TF-IDF row for one document
    pub fn transform(&self, document: &str) -> Result<Vec<f32>, IndexError> {
        if self.vocabulary.is_empty() {
            return Err(IndexError::NotFitted);
        }
        let mut row = vec![0.0f32; self.vocabulary.len()];
        for t in terms(document) {
            if let Some(&col) = self.vocabulary.get(&t) {
                row[col] += 1.0;
            }
        }
        for (value, idf) in row.iter_mut().zip(&self.idf) {
            *value *= idf;
        }
        let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            row.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(row)
    }

    /// Fit on the documents and return their rows
    pub fn fit_transform(&mut self, documents: &[&str]) -> Result<Vec<Vec<f32>>, IndexError> {
        self.fit(documents)?;
        documents.iter().map(|d| self.transform(d)).collect()
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn vocabulary(&self) -> impl Iterator<Item = &str> {
        self.vocabulary.keys().map(String::as_str)
    }
}

/// Cosine similarity of two equal-length vectors
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// A historical query chosen as the nearest neighbour of a new one
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// Corpus position of the chosen query
    pub index: usize,
    pub raw: String,
    pub category: Option<String>,
    /// Cosine similarity of the best match (not necessarily of `index`)
    pub similarity: f32,
    /// True when `index` was picked among the best match's cluster-mates
    pub via_cluster: bool,
}

/// Nearest-history lookup over the corpus
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    vectorizer: TfIdfVectorizer,
    threshold: f32,
    min_corpus: usize,
    fitted_len: Option<usize>,
    rows: Vec<Vec<f32>>,
}

impl SimilarityIndex {
    /// Create an index; lookups need at least `min_corpus` queries
    pub fn new(max_features: usize, threshold: f32, min_corpus: usize) -> Self {
        SimilarityIndex {
            vectorizer: TfIdfVectorizer::new(max_features),
            threshold,
            min_corpus,
            fitted_len: None,
            rows: Vec::new(),
        }
    }

    /// Drop the cached fit
    pub fn invalidate(&mut self) {
        self.fitted_len = None;
        self.rows.clear();
    }

    /// Row matrix for the whole corpus, refit when the corpus grew
    pub fn corpus_rows(&mut self, corpus: &Corpus) -> Result<&[Vec<f32>], IndexError> {
        if self.fitted_len != Some(corpus.len()) {
            self.invalidate();
            self.rows = self.vectorizer.fit_transform(&corpus.texts())?;
            self.fitted_len = Some(corpus.len());
            log::debug!(
                "Fitted TF-IDF on {} queries ({} terms)",
                corpus.len(),
                self.vectorizer.vocabulary_len()
            );
        }
        Ok(&self.rows)
    }

    /// Find the historical query whose category a new query should borrow
    pub fn nearest_history<R: Rng + ?Sized>(
        &mut self,
        corpus: &Corpus,
        query: &str,
        rng: &mut R,
    ) -> Result<Option<Neighbor>, IndexError> {
        if corpus.is_empty() || corpus.len() < self.min_corpus {
            return Ok(None);
        }

        self.corpus_rows(corpus)?;
        let query_row = self.vectorizer.transform(query)?;

        let mut best: Option<(usize, f32)> = None;
        for (i, row) in self.rows.iter().enumerate() {
            let sim = cosine(&query_row, row);
            if best.map_or(true, |(_, b)| sim > b) {
                best = Some((i, sim));
            }
        }
        let Some((best_index, similarity)) = best else {
            return Ok(None);
        };
        if similarity < self.threshold {
            log::debug!("No history above {:.2} (best {:.3})", self.threshold, similarity);
            return Ok(None);
        }

        let records = corpus.records();
        let label = records[best_index].cluster_label;
        let mut index = best_index;
        let mut via_cluster = false;
        if label != UNCLUSTERED {
            let query_lower = query.to_lowercase();
            let mates: Vec<usize> = records
                .iter()
                .enumerate()
                .filter(|(_, r)| r.cluster_label == label && r.raw.to_lowercase() != query_lower)
                .map(|(i, _)| i)
                .collect();
            if let Some(&pick) = mates.choose(rng) {
                index = pick;
                via_cluster = true;
            }
        }

        let record = &records[index];
        Ok(Some(Neighbor {
            index,
            raw: record.raw.clone(),
            category: record.category.clone(),
            similarity,
            via_cluster,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn corpus(entries: &[(&str, Option<&str>, i32)]) -> Corpus {
        let mut c = Corpus::new();
        for (raw, cat, _) in entries {
            c.push(raw, raw.to_lowercase(), cat.map(str::to_string));
        }
        let labels: Vec<i32> = entries.iter().map(|e| e.2).collect();
        assert!(c.relabel(&labels));
        c
    }

    #[test]
    fn test_terms_drop_short_and_stop_words() {
        assert_eq!(terms("Where is the BUS, a x?"), vec!["bus".to_string()]);
    }

    #[test]
    fn test_vectorizer_caps_vocabulary() {
        let mut v = TfIdfVectorizer::new(2);
        v.fit(&["refund refund ticket", "ticket seat", "luggage"]).unwrap();
        let vocab: Vec<&str> = v.vocabulary().collect();
        assert_eq!(vocab, vec!["refund", "ticket"]);
    }

    #[test]
    fn test_vectorizer_rows_are_unit_length() {
        let mut v = TfIdfVectorizer::new(100);
        let rows = v.fit_transform(&["refund ticket", "late bus"]).unwrap();
        for row in rows {
            let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_empty_vocabulary() {
        let mut v = TfIdfVectorizer::new(100);
        assert!(matches!(
            v.fit(&["the a", "is it"]),
            Err(IndexError::EmptyVocabulary)
        ));
    }

    #[test]
    fn test_cosine() {
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_small_corpus_has_no_history() {
        let c = corpus(&[("refund status", Some("refund_status"), -1)]);
        let mut index = SimilarityIndex::new(100, 0.7, 5);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(index.nearest_history(&c, "refund status", &mut rng).unwrap(), None);
    }

    #[test]
    fn test_unclustered_best_match_is_returned() {
        let c = corpus(&[
            ("refund status", Some("refund_status"), -1),
            ("late bus", Some("bus_delay"), -1),
            ("pet travel", Some("travel_with_pet"), -1),
        ]);
        let mut index = SimilarityIndex::new(100, 0.7, 2);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let hit = index
            .nearest_history(&c, "Late bus", &mut rng)
            .unwrap()
            .unwrap();
        assert_eq!(hit.index, 1);
        assert_eq!(hit.category.as_deref(), Some("bus_delay"));
        assert!(!hit.via_cluster);
    }

    #[test]
    fn test_below_threshold() {
        let c = corpus(&[
            ("refund status", None, -1),
            ("late bus", None, -1),
            ("pet travel", None, -1),
        ]);
        let mut index = SimilarityIndex::new(100, 0.7, 2);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(index.nearest_history(&c, "luggage", &mut rng).unwrap(), None);
    }

    #[test]
    fn test_cluster_mate_excludes_own_text() {
        let c = corpus(&[
            ("late bus", Some("bus_delay"), 0),
            ("bus running late today", Some("where_is_bus"), 0),
            ("refund status", Some("refund_status"), 1),
        ]);
        let mut index = SimilarityIndex::new(100, 0.7, 2);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..5 {
            let hit = index
                .nearest_history(&c, "LATE BUS", &mut rng)
                .unwrap()
                .unwrap();
            assert_eq!(hit.index, 1);
            assert!(hit.via_cluster);
        }
    }

    #[test]
    fn test_lone_cluster_member_falls_back_to_best() {
        let c = corpus(&[
            ("late bus", Some("bus_delay"), 0),
            ("refund status", Some("refund_status"), 1),
        ]);
        let mut index = SimilarityIndex::new(100, 0.7, 2);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let hit = index
            .nearest_history(&c, "late bus", &mut rng)
            .unwrap()
            .unwrap();
        assert_eq!(hit.index, 0);
        assert!(!hit.via_cluster);
    }
}
