//! Keyword-overlap scoring. No external calls, so it always produces a ranking.

use std::collections::{HashMap, HashSet};

use crate::{
	config::LexicalConfig,
	text::{content_tokens, word_set},
};

const OVERLAP_POINTS: f64 = 2.0;
const VERBATIM_POINTS: f64 = 10.0;
const SENTENCE_POINTS: f64 = 3.0;
const MAIN_IDEA_POINTS: f64 = 5.0;
const MAIN_IDEA_TERMS: usize = 10;

const MAIN_IDEA_PHRASES: &[&str] = &[
	"main idea",
	"mainly about",
	"mostly about",
	"central idea",
	"primary purpose",
	"main purpose",
	"best title",
	"best summarizes",
	"summary of the passage",
];
const DETAIL_PHRASES: &[&str] = &[
	"according to",
	"the passage states",
	"the passage says",
	"the author says",
	"the author states",
	"which detail",
	"in paragraph",
];
const INFERENCE_PHRASES: &[&str] = &["infer", "suggest", "imply", "implies", "most likely", "probably", "conclude"];

/// Coarse question type, only used to pick which bonuses apply
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QuestionKind {
	MainIdea,
	Detail,
	Inference,
	General,
}

impl QuestionKind {
	/// First phrase list that matches wins; main idea is checked before detail before inference
	pub fn classify(question: &str) -> Self {
		let lower = question.to_lowercase();
		let matches = |phrases: &[&str]| phrases.iter().any(|p| lower.contains(p));
		if matches(MAIN_IDEA_PHRASES) {
			QuestionKind::MainIdea
		} else if matches(DETAIL_PHRASES) {
			QuestionKind::Detail
		} else if matches(INFERENCE_PHRASES) {
			QuestionKind::Inference
		} else {
			QuestionKind::General
		}
	}
}

#[derive(Clone, Debug)]
pub struct LexicalScorer {
	important_terms: usize,
	weighted: bool,
	min_shared_tokens: usize,
}

impl Default for LexicalScorer {
	fn default() -> Self {
		Self::new(&LexicalConfig::default())
	}
}

impl LexicalScorer {
	pub fn new(config: &LexicalConfig) -> Self {
		Self {
			important_terms: config.important_terms.clamp(20, 50),
			weighted: config.weighted,
			min_shared_tokens: config.min_shared_tokens.max(1),
		}
	}

	/// One score per option, same order as `options`
	pub fn score(&self, passage: &str, question: &str, options: &[String]) -> Vec<f64> {
		let passage_lower = passage.to_lowercase();
		let frequencies = TermFrequencies::from_text(passage);
		let important = frequencies.top(self.important_terms, self.weighted);
		let kind = QuestionKind::classify(question);
		let main_terms: HashSet<&str> = if kind == QuestionKind::MainIdea { frequencies.top(MAIN_IDEA_TERMS, false) } else { HashSet::new() };
		let sentences: Vec<HashSet<String>> = if kind == QuestionKind::Detail {
			passage_lower.split('.').map(word_set).filter(|s| !s.is_empty()).collect()
		} else {
			Vec::new()
		};

		options
			.iter()
			.enumerate()
			.map(|(i, option)| {
				let option_lower = option.trim().to_lowercase();
				let option_words = word_set(option);
				let mut points = 0.0;

				let shared = option_words.iter().filter(|w| important.contains(w.as_str())).count();
				points += OVERLAP_POINTS * shared as f64;

				if !option_lower.is_empty() && passage_lower.contains(&option_lower) {
					points += VERBATIM_POINTS;
				}

				if !sentences.is_empty() {
					let option_content: HashSet<String> = content_tokens(option, 1).into_iter().collect();
					let hits = sentences.iter().filter(|sentence| option_content.iter().filter(|w| sentence.contains(*w)).count() >= self.min_shared_tokens).count();
					points += SENTENCE_POINTS * hits as f64;
				}

				if option_words.iter().any(|w| main_terms.contains(w.as_str())) {
					points += MAIN_IDEA_POINTS;
				}

				tracing::debug!(option = i + 1, points, "lexical score");
				points
			})
			.collect()
	}
}

/// Content-term counts for a passage, in first-appearance order
struct TermFrequencies {
	terms: Vec<(String, usize)>,
	total: usize,
}

impl TermFrequencies {
	fn from_text(text: &str) -> Self {
		let tokens = content_tokens(text, 3);
		let mut position: HashMap<String, usize> = HashMap::new();
		let mut terms: Vec<(String, usize)> = Vec::new();
		for token in &tokens {
			match position.get(token) {
				Some(&idx) => terms[idx].1 += 1,
				None => {
					position.insert(token.clone(), terms.len());
					terms.push((token.clone(), 1));
				}
			}
		}
		Self { terms, total: tokens.len() }
	}

	/// The `n` highest-ranked terms. Ties keep first-appearance order.
	fn top(&self, n: usize, weighted: bool) -> HashSet<&str> {
		let total = self.total as f64;
		let rank = |tf: usize| if weighted { tf as f64 * (total / (tf as f64 + 1.0)).ln() } else { tf as f64 };
		let mut ranked: Vec<(&str, f64)> = self.terms.iter().map(|(t, tf)| (t.as_str(), rank(*tf))).collect();
		ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
		ranked.into_iter().take(n).map(|(t, _)| t).collect()
	}
}
