//! The answer cascade: remote model, then TF-IDF similarity, then keyword scoring

use color_eyre::Result;

use crate::{
	Method, Round, Selection,
	config::AppConfig,
	lexical::LexicalScorer,
	llm::{Reasoner, RemoteReasoner},
	similarity::VectorSimilarityScorer,
	text::argmax,
};

/// A local ranking strategy. `Err` hands the round to the next stage.
pub trait Scorer {
	fn rank(&self, passage: &str, question: &str, options: &[String]) -> Result<Vec<f64>>;
}

impl Scorer for VectorSimilarityScorer {
	fn rank(&self, passage: &str, _question: &str, options: &[String]) -> Result<Vec<f64>> {
		Ok(self.score(passage, options))
	}
}

pub struct AnswerSelector<R = RemoteReasoner, S = VectorSimilarityScorer> {
	remote: Option<R>,
	similarity: S,
	lexical: LexicalScorer,
}

impl AnswerSelector {
	pub fn from_config(config: &AppConfig) -> Self {
		Self::new(
			RemoteReasoner::from_config(config),
			VectorSimilarityScorer::new(config.local_passage_limit),
			LexicalScorer::new(&config.lexical),
		)
	}

	pub fn remote_transports(&self) -> Vec<&'static str> {
		self.remote.as_ref().map(RemoteReasoner::transport_names).unwrap_or_default()
	}
}

impl<R: Reasoner, S: Scorer> AnswerSelector<R, S> {
	pub fn new(remote: Option<R>, similarity: S, lexical: LexicalScorer) -> Self {
		Self { remote, similarity, lexical }
	}

	pub async fn select_round(&self, round: &Round) -> Option<Selection> {
		self.select(&round.article, &round.question, &round.options).await
	}

	/// Pick an option. `None` only when `options` is empty; otherwise the index is always in range.
	pub async fn select(&self, passage: &str, question: &str, options: &[String]) -> Option<Selection> {
		if options.is_empty() {
			return None;
		}

		if let Some(remote) = &self.remote {
			match remote.ask(passage, question, options).await {
				Some(idx) if idx < options.len() => {
					tracing::info!("{} picked option {}", Method::RemoteAi, idx + 1);
					return Some(Selection::new(idx, Method::RemoteAi));
				}
				Some(idx) => tracing::warn!("Remote stage returned out-of-range option {}, falling back", idx + 1),
				None => tracing::info!("Remote stage inconclusive, falling back"),
			}
		}

		match self.similarity.rank(passage, question, options) {
			Ok(scores) if scores.len() == options.len() => {
				if let Some(idx) = argmax(&scores) {
					tracing::info!("{} picked option {} (score {:.4})", Method::VectorSimilarity, idx + 1, scores[idx]);
					return Some(Selection::new(idx, Method::VectorSimilarity));
				}
			}
			Ok(scores) => tracing::warn!("Similarity stage scored {} of {} options, falling back", scores.len(), options.len()),
			Err(e) => tracing::warn!("Similarity stage failed: {e}"),
		}

		let scores = self.lexical.score(passage, question, options);
		let idx = argmax(&scores).unwrap_or(0);
		tracing::info!("{} picked option {} (score {})", Method::Lexical, idx + 1, scores.get(idx).copied().unwrap_or_default());
		Some(Selection::new(idx, Method::Lexical))
	}
}

#[cfg(test)]
mod tests {
	use color_eyre::eyre::bail;

	use super::*;

	struct Fixed(Option<usize>);

	impl Reasoner for Fixed {
		async fn ask(&self, _: &str, _: &str, _: &[String]) -> Option<usize> {
			self.0
		}
	}

	struct Broken;

	impl Scorer for Broken {
		fn rank(&self, _: &str, _: &str, _: &[String]) -> Result<Vec<f64>> {
			bail!("vectorizer exploded")
		}
	}

	struct Short;

	impl Scorer for Short {
		fn rank(&self, _: &str, _: &str, _: &[String]) -> Result<Vec<f64>> {
			Ok(vec![1.0])
		}
	}

	const PASSAGE: &str = "The cat sat on the mat. The mat was red.";
	const QUESTION: &str = "According to the passage, what color was the mat?";

	fn opts(items: &[&str]) -> Vec<String> {
		items.iter().map(|s| s.to_string()).collect()
	}

	#[tokio::test]
	async fn index_always_in_range() {
		let selector = AnswerSelector::from_config(&AppConfig::default());
		let pool = ["red", "a big cat", "", "mat", "sat on the mat", "zebra"];
		for n in 2..=5 {
			for passage in [PASSAGE, "", "!!! ???", "x"] {
				let options = opts(&pool[..n]);
				let selection = selector.select(passage, QUESTION, &options).await.unwrap();
				assert!(selection.index < n, "{selection:?} for {n} options");
			}
		}
	}

	#[tokio::test]
	async fn scenario_without_remote_uses_similarity() {
		let selector = AnswerSelector::from_config(&AppConfig::default());
		let selection = selector.select(PASSAGE, QUESTION, &opts(&["Blue", "Red", "Green"])).await.unwrap();
		assert_eq!(selection, Selection::new(1, Method::VectorSimilarity));
	}

	#[tokio::test]
	async fn confident_remote_answer_wins() {
		let selector = AnswerSelector::new(Some(Fixed(Some(2))), VectorSimilarityScorer::default(), LexicalScorer::default());
		let selection = selector.select(PASSAGE, QUESTION, &opts(&["Blue", "Red", "Green"])).await.unwrap();
		assert_eq!(selection, Selection::new(2, Method::RemoteAi));
	}

	#[tokio::test]
	async fn out_of_range_remote_answer_falls_through() {
		let selector = AnswerSelector::new(Some(Fixed(Some(7))), VectorSimilarityScorer::default(), LexicalScorer::default());
		let selection = selector.select(PASSAGE, QUESTION, &opts(&["Blue", "Red", "Green"])).await.unwrap();
		assert_eq!(selection.method, Method::VectorSimilarity);
	}

	#[tokio::test]
	async fn inconclusive_remote_and_broken_similarity_reach_lexical() {
		let selector = AnswerSelector::new(Some(Fixed(None)), Broken, LexicalScorer::default());
		let selection = selector.select(PASSAGE, QUESTION, &opts(&["Blue", "Red", "Green"])).await.unwrap();
		assert_eq!(selection, Selection::new(1, Method::Lexical));
	}

	#[tokio::test]
	async fn short_similarity_vector_is_not_trusted() {
		let selector = AnswerSelector::new(None::<Fixed>, Short, LexicalScorer::default());
		let selection = selector.select(PASSAGE, QUESTION, &opts(&["Blue", "Red", "Green"])).await.unwrap();
		assert_eq!(selection.method, Method::Lexical);
	}

	#[tokio::test]
	async fn empty_option_set_has_no_answer() {
		let selector = AnswerSelector::new(Some(Fixed(Some(0))), Broken, LexicalScorer::default());
		assert_eq!(selector.select(PASSAGE, QUESTION, &[]).await, None);
	}

	#[tokio::test]
	async fn select_round_reads_scraped_fields() {
		let selector = AnswerSelector::from_config(&AppConfig::default());
		let round = Round::new(PASSAGE.to_string(), QUESTION.to_string(), opts(&["Blue", "Red"]));
		assert_eq!(selector.select_round(&round).await.map(|s| s.index), Some(1));
	}
}
