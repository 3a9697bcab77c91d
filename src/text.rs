//! Tokenization and small helpers shared by the local scorers

use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w+\b").expect("static regex"));

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
	[
		// articles & determiners
		"the", "a", "an", "this", "that", "these", "those",
		// be-verbs & auxiliaries
		"is", "are", "was", "were", "be", "been", "being", "am", "have", "has", "had", "do", "does", "did",
		// modals
		"will", "would", "shall", "should", "may", "might", "can", "could", "must",
		// prepositions
		"to", "of", "in", "for", "on", "with", "at", "by", "from", "into", "about", "over", "under", "after", "before",
		// conjunctions & negation
		"and", "or", "but", "not", "no", "if", "then", "than", "so", "as",
		// pronouns
		"i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them", "my", "your", "his", "our", "their", "its",
		// interrogatives
		"who", "what", "which", "when", "where", "how", "why",
		// other high-frequency structural words
		"very", "also", "just", "too", "there", "here", "some", "any", "all", "each", "such", "only", "own", "same",
	]
	.into_iter()
	.collect()
});

/// Case-folded word tokens, in order of appearance
pub fn tokenize(text: &str) -> Vec<String> {
	let lower = text.to_lowercase();
	WORD_RE.find_iter(&lower).map(|m| m.as_str().to_string()).collect()
}

/// Distinct case-folded word tokens
pub fn word_set(text: &str) -> HashSet<String> {
	tokenize(text).into_iter().collect()
}

pub fn is_stop_word(token: &str) -> bool {
	STOP_WORDS.contains(token)
}

/// Tokens that carry meaning: not a stop word and longer than `min_len - 1` chars
pub fn content_tokens(text: &str, min_len: usize) -> Vec<String> {
	tokenize(text).into_iter().filter(|t| t.chars().count() >= min_len && !is_stop_word(t)).collect()
}

/// First `limit` chars of `text`. Never splits a code point.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
	match text.char_indices().nth(limit) {
		Some((byte_idx, _)) => &text[..byte_idx],
		None => text,
	}
}

/// Index of the highest score, lowest index on ties. `None` for an empty vector.
pub fn argmax(scores: &[f64]) -> Option<usize> {
	if scores.is_empty() {
		return None;
	}
	let mut best = 0;
	for (i, &score) in scores.iter().enumerate().skip(1) {
		if score > scores[best] || (scores[best].is_nan() && !score.is_nan()) {
			best = i;
		}
	}
	Some(best)
}
