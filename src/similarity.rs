//! TF-IDF cosine ranking of options against the passage

use std::collections::{BTreeMap, HashSet};

use color_eyre::{Result, eyre::bail};

use crate::text::{content_tokens, truncate_chars, word_set};

const EPSILON: f64 = 1e-8;

#[derive(Clone, Debug)]
pub struct VectorSimilarityScorer {
	passage_limit: usize,
}

impl Default for VectorSimilarityScorer {
	fn default() -> Self {
		Self { passage_limit: 3000 }
	}
}

impl VectorSimilarityScorer {
	pub fn new(passage_limit: usize) -> Self {
		Self { passage_limit }
	}

	/// Cosine similarity of each option to the passage. Falls back to Jaccard overlap when nothing is indexable.
	pub fn score(&self, passage: &str, options: &[String]) -> Vec<f64> {
		let passage = truncate_chars(passage, self.passage_limit);
		match tfidf_cosine(passage, options) {
			Ok(scores) => scores,
			Err(e) => {
				tracing::debug!("TF-IDF vectorization failed ({e}), using Jaccard overlap");
				jaccard(passage, options)
			}
		}
	}
}

fn tfidf_cosine(passage: &str, options: &[String]) -> Result<Vec<f64>> {
	let docs: Vec<Vec<String>> = std::iter::once(passage).chain(options.iter().map(String::as_str)).map(|d| content_tokens(d, 2)).collect();

	let mut vocabulary: BTreeMap<&str, usize> = BTreeMap::new();
	for doc in &docs {
		let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
		for term in unique {
			*vocabulary.entry(term).or_default() += 1;
		}
	}
	if vocabulary.is_empty() {
		bail!("empty vocabulary");
	}

	let n = docs.len() as f64;
	let idf: Vec<f64> = vocabulary.values().map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0).collect();
	let index: BTreeMap<&str, usize> = vocabulary.keys().enumerate().map(|(i, t)| (*t, i)).collect();

	let vectors: Vec<Vec<f64>> = docs
		.iter()
		.map(|doc| {
			let mut v = vec![0.0; index.len()];
			for term in doc {
				v[index[term.as_str()]] += 1.0;
			}
			v.iter_mut().zip(&idf).for_each(|(w, idf)| *w *= idf);
			v
		})
		.collect();

	let Some((passage_vec, option_vecs)) = vectors.split_first() else {
		bail!("no passage vector");
	};
	Ok(option_vecs.iter().map(|v| cosine(passage_vec, v)).collect())
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
	let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	let norm = |v: &[f64]| v.iter().map(|x| x * x).sum::<f64>().sqrt();
	dot / (norm(a) * norm(b) + EPSILON)
}

fn jaccard(passage: &str, options: &[String]) -> Vec<f64> {
	let passage_words = word_set(passage);
	options
		.iter()
		.map(|option| {
			let option_words = word_set(option);
			let union = passage_words.union(&option_words).count();
			if union == 0 {
				return 0.0;
			}
			passage_words.intersection(&option_words).count() as f64 / union as f64
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::text::argmax;

	fn opts(items: &[&str]) -> Vec<String> {
		items.iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn identical_option_has_unit_similarity() {
		let passage = "Glaciers carve valleys slowly over thousands of years.";
		let scores = VectorSimilarityScorer::default().score(passage, &opts(&[passage, "Deserts are dry"]));
		assert!((scores[0] - 1.0).abs() < 1e-6, "{scores:?}");
		assert!(scores[1] < scores[0]);
	}

	#[test]
	fn ranks_verbatim_answer_highest() {
		let scores = VectorSimilarityScorer::default().score("The cat sat on the mat. The mat was red.", &opts(&["Blue", "Red", "Green"]));
		assert_eq!(argmax(&scores), Some(1));
	}

	#[test]
	fn empty_vocabulary_falls_back_to_jaccard() {
		// only stop words and single chars: nothing indexable
		let scores = VectorSimilarityScorer::default().score("it is a b", &opts(&["it is", "x y"]));
		assert_eq!(scores.len(), 2);
		assert!((scores[0] - 0.5).abs() < 1e-9, "{scores:?}");
		assert_eq!(scores[1], 0.0);
	}

	#[test]
	fn empty_everything_is_all_zero() {
		let scores = VectorSimilarityScorer::default().score("", &opts(&["", ""]));
		assert_eq!(scores, vec![0.0, 0.0]);
		assert_eq!(argmax(&scores), Some(0));
	}

	#[test]
	fn truncation_limits_what_is_compared() {
		let passage = format!("{} volcano", "x ".repeat(10));
		let full = VectorSimilarityScorer::new(10_000).score(&passage, &opts(&["volcano"]));
		let cut = VectorSimilarityScorer::new(5).score(&passage, &opts(&["volcano"]));
		assert!(full[0] > 0.0);
		assert_eq!(cut[0], 0.0);
	}
}
