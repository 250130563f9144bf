//! Inserts missing sentence-ending periods into generated text.
//!
//! Generated sentences often run two sentences together, e.g.
//! `"I went to the store Then I came home"`. A capitalized word that
//! directly follows a word character is taken as the start of a new
//! sentence, unless it is a proper noun or a possessive.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::text::is_stop_word;

/// Words that are commonly capitalized only because they start a sentence.
const SENTENCE_STARTERS: &[&str] = &[
    "then", "yesterday", "today", "tomorrow", "tonight", "also", "however", "maybe", "perhaps",
    "well", "yeah", "yes", "yep", "nope", "okay", "ok", "lol", "anyway", "still", "please",
    "thanks", "thank", "sometimes", "actually", "honestly", "really", "never", "always",
    "everyone", "everybody", "someone", "something", "nothing", "nobody", "anyone", "let",
    "let's", "lets", "hey", "hi", "hello", "oh", "wow", "sure", "good", "great", "nice", "one",
    "first", "last", "next", "another", "every", "many", "much", "even", "though", "although",
    "since", "unless", "i'm", "i've", "i'll", "i'd", "we're", "they're", "there's", "that's",
    "what's", "it'll", "can't", "dont", "im", "ive",
];

/// Part-of-speech classes the repair heuristic cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// `NNP`
    ProperNoun,
    Other,
}

/// Tags whitespace-separated tokens.
pub trait PosTagger {
    fn tag(&self, tokens: &[&str]) -> Vec<Tag>;
}

/// Lexicon tagger: a capitalized word that is not a known function word or
/// common sentence opener is a proper noun.
///
/// Without a noun lexicon it cannot tell a capitalized common noun from a
/// name, so `"we ate Dinner was good"` is left alone. Missing a boundary is
/// preferred over putting a period in front of a name.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexiconTagger;

fn sentence_starters() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| SENTENCE_STARTERS.iter().copied().collect())
}

impl LexiconTagger {
    fn tag_word(word: &str) -> Tag {
        let core = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'');
        let Some(first) = core.chars().next() else {
            return Tag::Other;
        };
        let lower = core.to_lowercase();
        if is_stop_word(&lower) || sentence_starters().contains(lower.as_str()) {
            return Tag::Other;
        }
        if first.is_uppercase() {
            Tag::ProperNoun
        } else {
            Tag::Other
        }
    }
}

impl PosTagger for LexiconTagger {
    fn tag(&self, tokens: &[&str]) -> Vec<Tag> {
        tokens.iter().map(|t| Self::tag_word(t)).collect()
    }
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\S+").expect("valid token regex"))
}

/// First character uppercase, the rest lowercase (or nothing).
pub fn capitalized(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => {
            let rest = chars.as_str();
            rest.to_lowercase() == rest
        }
        _ => false,
    }
}

fn is_possessive(word: &str) -> bool {
    word.ends_with("'s") || word.ends_with("s'")
}

/// Adds periods where a new sentence seems to start without one.
pub fn repair(sentence: &str) -> String {
    repair_with(sentence, &LexiconTagger)
}

pub fn repair_with(sentence: &str, tagger: &dyn PosTagger) -> String {
    let tokens: Vec<(usize, &str)> = token_regex()
        .find_iter(sentence)
        .map(|m| (m.start(), m.as_str()))
        .collect();
    if tokens.len() < 2 {
        return sentence.to_string();
    }

    let words: Vec<&str> = tokens.iter().map(|(_, w)| *w).collect();
    let proper_nouns: HashSet<&str> = words
        .iter()
        .zip(tagger.tag(&words))
        .filter(|(w, tag)| *tag == Tag::ProperNoun || w.eq_ignore_ascii_case("i"))
        .map(|(w, _)| *w)
        .collect();
    let possessives: HashSet<&str> = words.iter().copied().filter(|w| is_possessive(w)).collect();

    let mut need_periods: Vec<usize> = Vec::new();
    for &(start, word) in &tokens[1..] {
        if proper_nouns.contains(word) || possessives.contains(word) || !capitalized(word) {
            continue;
        }

        let mut before = sentence[..start].char_indices().rev();
        let Some((gap_idx, _)) = before.next() else {
            continue;
        };
        if let Some((_, end_char)) = before.next() {
            if end_char.is_alphanumeric() {
                need_periods.push(gap_idx);
            }
        }
    }

    let mut repaired = sentence.to_string();
    for (inserted, idx) in need_periods.into_iter().enumerate() {
        repaired.insert(idx + inserted, '.');
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_period_before_new_sentence() {
        assert_eq!(
            repair("I went to the store Then I came home"),
            "I went to the store. Then I came home"
        );
    }

    #[test]
    fn proper_nouns_are_left_alone() {
        let s = "yesterday we watched NASA launch a rocket with Bob";
        assert_eq!(repair(s), s);
        let s = "the museum Nasa opened was closed";
        assert_eq!(repair(s), s);
    }

    #[test]
    fn pronoun_i_is_exempt() {
        let s = "that is what I said";
        assert_eq!(repair(s), s);
    }

    #[test]
    fn possessives_are_exempt() {
        let s = "we ate at the diner Mom's pie was good";
        assert_eq!(repair(s), s);
    }

    #[test]
    fn existing_punctuation_is_respected() {
        let s = "it was late, Then we left";
        assert_eq!(repair(s), s);
        let s = "done already. Then home";
        assert_eq!(repair(s), s);
    }

    #[test]
    fn digits_count_as_word_endings() {
        assert_eq!(repair("we scored 3 Then we won"), "we scored 3. Then we won");
    }

    #[test]
    fn multiple_insertions_shift_offsets() {
        assert_eq!(
            repair("it rained Then it snowed Maybe tomorrow It clears"),
            "it rained. Then it snowed. Maybe tomorrow. It clears"
        );
    }

    #[test]
    fn repeated_token_is_punctuated_at_each_occurrence() {
        assert_eq!(
            repair("go left Then right Then stop"),
            "go left. Then right. Then stop"
        );
    }

    #[test]
    fn unknown_capitalized_words_read_as_names() {
        assert_eq!(repair("we ate Dinner was good"), "we ate Dinner was good");
        assert_eq!(repair("we met Alice Then left"), "we met Alice. Then left");
    }

    #[test]
    fn repair_is_idempotent() {
        let inputs = [
            "I went to the store Then I came home",
            "it rained Then it snowed Maybe tomorrow It clears",
            "we visited NASA Then Paris",
            "",
            "Hello",
            "ünïcode wörds Then more",
        ];
        for s in inputs {
            let once = repair(s);
            assert_eq!(repair(&once), once, "input: {s}");
        }
    }

    #[test]
    fn capitalized_rules() {
        assert!(capitalized("Then"));
        assert!(capitalized("A"));
        assert!(!capitalized("NASA"));
        assert!(!capitalized("then"));
        assert!(!capitalized(""));
    }
}
