//! Picks the best of several generated replies for a prompt.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::text::{cleanse, tokenize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionAlgorithm {
    CosineSimilarity,
    MatchWords,
}

impl SelectionAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionAlgorithm::CosineSimilarity => "cosine_similarity",
            SelectionAlgorithm::MatchWords => "match_words",
        }
    }
}

impl fmt::Display for SelectionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionAlgorithm {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine_similarity" => Ok(SelectionAlgorithm::CosineSimilarity),
            "match_words" => Ok(SelectionAlgorithm::MatchWords),
            other => Err(EngineError::InvalidSelectionAlgorithm(other.to_string())),
        }
    }
}

/// A generated reply and how well it fits the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub text: Option<String>,
    pub score: f64,
}

/// Chooses one of `candidates` for `prompt`. Absent candidates are never returned.
pub fn select(
    prompt: &str,
    candidates: &[Option<String>],
    algorithm: SelectionAlgorithm,
) -> Result<Candidate, EngineError> {
    match algorithm {
        SelectionAlgorithm::CosineSimilarity => select_by_cosine_similarity(prompt, candidates),
        SelectionAlgorithm::MatchWords => select_by_matching_words(prompt, candidates),
    }
}

fn first_present(candidates: &[Option<String>]) -> Option<&String> {
    candidates.iter().flatten().next()
}

/// L2-normalised TF-IDF vectors, one per document, with smoothed IDF.
fn tfidf_vectors(documents: &[Vec<String>]) -> Vec<HashMap<&str, f64>> {
    let n_docs = documents.len() as f64;

    let mut doc_freq: HashMap<&str, usize> = HashMap::new();
    for doc in documents {
        let mut seen: Vec<&str> = doc.iter().map(String::as_str).collect();
        seen.sort_unstable();
        seen.dedup();
        for term in seen {
            *doc_freq.entry(term).or_insert(0) += 1;
        }
    }

    documents
        .iter()
        .map(|doc| {
            let mut vector: HashMap<&str, f64> = HashMap::new();
            for term in doc {
                *vector.entry(term.as_str()).or_insert(0.0) += 1.0;
            }
            for (term, weight) in vector.iter_mut() {
                let df = doc_freq[term] as f64;
                *weight *= ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0;
            }
            let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
            if norm > 0.0 {
                for weight in vector.values_mut() {
                    *weight /= norm;
                }
            }
            vector
        })
        .collect()
}

fn dot(a: &HashMap<&str, f64>, b: &HashMap<&str, f64>) -> f64 {
    a.iter()
        .filter_map(|(term, wa)| b.get(term).map(|wb| wa * wb))
        .sum()
}

/// Chooses the reply whose TF-IDF vector is closest to the prompt's.
pub fn select_by_cosine_similarity(
    prompt: &str,
    candidates: &[Option<String>],
) -> Result<Candidate, EngineError> {
    let mut documents: Vec<Vec<String>> = candidates
        .iter()
        .map(|c| c.as_deref().map(tokenize).unwrap_or_default())
        .collect();
    documents.push(tokenize(prompt));

    let vectors = tfidf_vectors(&documents);
    let prompt_idx = vectors.len() - 1;
    let prompt_vector = &vectors[prompt_idx];

    let mut ranked: Vec<(usize, f64)> = vectors
        .iter()
        .enumerate()
        .map(|(idx, v)| (idx, dot(prompt_vector, v)))
        .collect();
    // Stable ascending order; the prompt sorts last among equal scores.
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

    // The prompt matches itself, so the best real match is the last non-self entry.
    let best = ranked.iter().rev().find(|(idx, _)| *idx != prompt_idx);

    match best {
        Some(&(idx, score)) if score > 0.0 => Ok(Candidate {
            text: candidates[idx].clone(),
            score,
        }),
        _ => first_present(candidates)
            .map(|text| Candidate {
                text: Some(text.clone()),
                score: 0.0,
            })
            .ok_or(EngineError::NoCandidatesAvailable),
    }
}

/// Number of prompt words found in each candidate; absent candidates score zero.
pub fn match_word_scores(prompt: &str, candidates: &[Option<String>]) -> Vec<usize> {
    let words_to_match = cleanse(prompt);
    candidates
        .iter()
        .map(|candidate| match candidate {
            Some(text) => {
                let reply_words = cleanse(text);
                words_to_match
                    .iter()
                    .filter(|w| reply_words.contains(w))
                    .count()
            }
            None => 0,
        })
        .collect()
}

/// Chooses the first reply containing the most words found in the prompt.
pub fn select_by_matching_words(
    prompt: &str,
    candidates: &[Option<String>],
) -> Result<Candidate, EngineError> {
    let scores = match_word_scores(prompt, candidates);

    let max_score = candidates
        .iter()
        .zip(&scores)
        .filter(|(c, _)| c.is_some())
        .map(|(_, s)| *s)
        .max()
        .ok_or(EngineError::NoCandidatesAvailable)?;

    candidates
        .iter()
        .zip(&scores)
        .find(|(c, s)| c.is_some() && **s == max_score)
        .map(|(c, s)| Candidate {
            text: c.clone(),
            score: *s as f64,
        })
        .ok_or(EngineError::NoCandidatesAvailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(texts: &[&str]) -> Vec<Option<String>> {
        texts.iter().map(|t| Some(t.to_string())).collect()
    }

    #[test]
    fn algorithm_names_parse() {
        assert_eq!(
            "cosine_similarity".parse::<SelectionAlgorithm>().unwrap(),
            SelectionAlgorithm::CosineSimilarity
        );
        assert_eq!(
            "match_words".parse::<SelectionAlgorithm>().unwrap(),
            SelectionAlgorithm::MatchWords
        );
        let err = "random".parse::<SelectionAlgorithm>().unwrap_err();
        assert!(matches!(err, EngineError::InvalidSelectionAlgorithm(ref n) if n == "random"));
        assert_eq!(
            err.user_message(),
            "Error: `random` is not a valid selection algorithm"
        );
    }

    #[test]
    fn match_words_scores_and_picks_best() {
        let candidates = some(&["dog ran", "cat jumped", "the cat sat happily"]);
        assert_eq!(match_word_scores("the cat sat", &candidates), vec![0, 1, 2]);

        let chosen = select("the cat sat", &candidates, SelectionAlgorithm::MatchWords).unwrap();
        assert_eq!(chosen.text.as_deref(), Some("the cat sat happily"));
        assert_eq!(chosen.score, 2.0);
    }

    #[test]
    fn match_words_counts_each_prompt_word_once() {
        let candidates = some(&["cat cat cat cat", "cat sat"]);
        assert_eq!(match_word_scores("cat sat", &candidates), vec![1, 2]);
    }

    #[test]
    fn match_words_ties_go_to_first_present() {
        let candidates = vec![None, Some("a dog".to_string()), Some("a frog".to_string())];
        let chosen = select_by_matching_words("cat", &candidates).unwrap();
        assert_eq!(chosen.text.as_deref(), Some("a dog"));
        assert_eq!(chosen.score, 0.0);
    }

    #[test]
    fn all_absent_candidates_fail() {
        let candidates = vec![None, None];
        for algorithm in [SelectionAlgorithm::MatchWords, SelectionAlgorithm::CosineSimilarity] {
            let err = select("hello there", &candidates, algorithm).unwrap_err();
            assert!(matches!(err, EngineError::NoCandidatesAvailable));
        }
        assert!(matches!(
            select("hello", &[], SelectionAlgorithm::MatchWords),
            Err(EngineError::NoCandidatesAvailable)
        ));
    }

    #[test]
    fn cosine_picks_closest_candidate() {
        let candidates = some(&[
            "pizza tastes great tonight",
            "the rocket launch was delayed",
            "my garden has tomatoes",
        ]);
        let chosen =
            select_by_cosine_similarity("when is the next rocket launch", &candidates).unwrap();
        assert_eq!(chosen.text.as_deref(), Some("the rocket launch was delayed"));
        assert!(chosen.score > 0.0 && chosen.score < 1.0);
    }

    #[test]
    fn cosine_without_shared_vocabulary_returns_first_present() {
        let candidates = vec![
            None,
            Some("bananas are yellow".to_string()),
            Some("trains run late".to_string()),
        ];
        let chosen = select_by_cosine_similarity("quantum physics lecture", &candidates).unwrap();
        assert_eq!(chosen.text.as_deref(), Some("bananas are yellow"));
        assert_eq!(chosen.score, 0.0);
    }

    #[test]
    fn cosine_never_returns_absent_candidate() {
        let candidates = vec![None, Some("quiet library books".to_string()), None];
        let chosen = select_by_cosine_similarity("library books", &candidates).unwrap();
        assert_eq!(chosen.text.as_deref(), Some("quiet library books"));
    }

    #[test]
    fn cosine_identical_candidate_is_chosen_over_prompt() {
        let candidates = some(&["ducks swim", "cats nap"]);
        let chosen = select_by_cosine_similarity("cats nap", &candidates).unwrap();
        assert_eq!(chosen.text.as_deref(), Some("cats nap"));
        assert!((chosen.score - 1.0).abs() < 1e-9);
    }
}
