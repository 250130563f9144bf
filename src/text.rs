//! Tokenizing helpers shared by the candidate selectors.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// English stop words (the common NLTK list).
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
    "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan", "shan't",
    "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't", "wouldn",
    "wouldn't", "n't", "'s", "'re", "'ll", "'ve", "'d", "'m",
];

/// Irregular plural nouns and their lemmas.
const IRREGULAR_NOUNS: &[(&str, &str)] = &[
    ("children", "child"),
    ("people", "person"),
    ("men", "man"),
    ("women", "woman"),
    ("mice", "mouse"),
    ("geese", "goose"),
    ("feet", "foot"),
    ("teeth", "tooth"),
    ("oxen", "ox"),
    ("dice", "die"),
];

/// Noun suffix rewrites, tried in order.
const NOUN_SUFFIXES: &[(&str, &str)] = &[
    ("ies", "y"),
    ("ches", "ch"),
    ("shes", "sh"),
    ("sses", "ss"),
    ("xes", "x"),
    ("zes", "z"),
    ("men", "man"),
    ("s", ""),
];

fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

pub fn is_stop_word(word: &str) -> bool {
    stop_words().contains(word)
}

fn citation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[0-9]*\]").expect("valid citation regex"))
}

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+(?:'\w+)?").expect("valid word regex"))
}

fn non_word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s#]").expect("valid punctuation regex"))
}

/// Splits a lowercase word into its stem and clitic, e.g. `don't` into
/// `do` + `n't` and `cat's` into `cat` + `'s`.
fn split_clitic(word: &str) -> Vec<String> {
    if let Some(stem) = word.strip_suffix("n't") {
        if !stem.is_empty() {
            return vec![stem.to_string(), "n't".to_string()];
        }
    }
    match word.find('\'') {
        Some(idx) if idx > 0 => vec![word[..idx].to_string(), word[idx..].to_string()],
        _ => vec![word.to_string()],
    }
}

/// Reduces a lowercase noun to its dictionary form.
pub fn lemmatize(token: &str) -> String {
    if let Some((_, lemma)) = IRREGULAR_NOUNS.iter().find(|(plural, _)| *plural == token) {
        return lemma.to_string();
    }

    if token.chars().count() <= 3
        || token.ends_with("ss")
        || token.ends_with("us")
        || token.ends_with("is")
        || !token.chars().all(char::is_alphabetic)
    {
        return token.to_string();
    }

    for (suffix, replacement) in NOUN_SUFFIXES {
        if let Some(stem) = token.strip_suffix(suffix) {
            if stem.chars().count() >= 2 {
                return format!("{stem}{replacement}");
            }
        }
    }
    token.to_string()
}

/// Tokens used for the TF-IDF vector space.
///
/// Citation markers such as `[12]` are removed, the text is lowercased and
/// word-tokenized, every token is lemmatized, and stop words are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let text = citation_regex().replace_all(text, " ");
    let text = whitespace_regex().replace_all(&text, " ");
    let lower = text.to_lowercase();

    word_regex()
        .find_iter(&lower)
        .flat_map(|m| split_clitic(m.as_str()))
        .filter(|t| !is_stop_word(t))
        .map(|t| lemmatize(&t))
        .filter(|t| !t.is_empty() && !is_stop_word(t))
        .collect()
}

/// Returns the non-stop-words of `text`, lowercased, with punctuation
/// (other than `#`) stripped, deduplicated in order of first appearance.
pub fn cleanse(text: &str) -> Vec<String> {
    let stripped = non_word_regex().replace_all(text, " ").to_lowercase();
    let mut result: Vec<String> = Vec::new();

    for word in stripped.split(' ') {
        let word = word.trim();
        if word.chars().count() > 1 && !is_stop_word(word) && !result.iter().any(|w| w == word) {
            result.push(word.to_string());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_strips_citations_and_stop_words() {
        let tokens = tokenize("The  cats[12] sat on   the mats [3]");
        assert_eq!(tokens, vec!["cat", "sat", "mat"]);
    }

    #[test]
    fn tokenize_splits_contractions() {
        let tokens = tokenize("Dogs don't bark at parties");
        assert_eq!(tokens, vec!["dog", "bark", "party"]);
    }

    #[test]
    fn lemmatize_handles_common_plurals() {
        assert_eq!(lemmatize("boxes"), "box");
        assert_eq!(lemmatize("churches"), "church");
        assert_eq!(lemmatize("children"), "child");
        assert_eq!(lemmatize("glass"), "glass");
        assert_eq!(lemmatize("bus"), "bus");
        assert_eq!(lemmatize("analysis"), "analysis");
        assert_eq!(lemmatize("r2d2s"), "r2d2s");
    }

    #[test]
    fn cleanse_keeps_hashtags_and_dedups() {
        let words = cleanse("The #rust game, the GAME! a b");
        assert_eq!(words, vec!["#rust", "game"]);
    }

    #[test]
    fn cleanse_of_only_stop_words_is_empty() {
        assert!(cleanse("it is what it is").is_empty());
    }
}
