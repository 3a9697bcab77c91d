use std::{sync::LazyLock, time::Duration};

use ask_llm::{Client as LlmClient, Conversation, Model, Role};
use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use regex::Regex;

use crate::{config::AppConfig, huggingface::HuggingFaceClient, spark::SparkClient, text::truncate_chars};

/// Highest option count a reply can address: labels run `A`..`E` / `1`..`5`
pub const MAX_LABELS: usize = 5;

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b([A-Ea-e]|[1-5])\b").expect("static regex"));

/// Words after a lone letter that still read as "this letter is the answer"
const LABEL_FOLLOWERS: &[&str] = &["is", "was", "would", "should", "seems", "looks", "appears", "fits", "matches"];
/// Words before a lone letter that mark it as a label
const LABEL_LEADERS: &[&str] = &["option", "answer", "choice", "answer is", ":"];

/// Something that reads the passage and names an option, or gives up
pub trait Reasoner {
	/// `Some(idx)` with `idx < options.len()`, `None` when inconclusive
	fn ask(&self, passage: &str, question: &str, options: &[String]) -> impl Future<Output = Option<usize>>;
}

/// Prompt shared by every transport. `passage` is expected to be truncated already.
pub fn build_prompt(passage: &str, question: &str, options: &[String]) -> String {
	let mut options_text = String::new();
	for (i, option) in options.iter().enumerate() {
		options_text.push_str(&format!("{}. {}\n", label(i), option));
	}
	let last = label(options.len().saturating_sub(1));

	format!(
		r#"Read the passage and answer the question. Base your choice strictly on the passage.

Passage:
{passage}

Question:
{question}

Options:
{options_text}
Reply with the letter of the correct option only (A-{last}), nothing else."#
	)
}

fn label(idx: usize) -> char {
	(b'A' + (idx.min(25) as u8)) as char
}

/// Find the option a free-text reply points at.
///
/// Scans left to right for standalone labels: digits `1`..`5` or letters `A`..`E` in either case.
/// The first label addressing one of the `n_options` wins. A lowercase letter (or `A`) that reads as
/// prose, like the article in "a good guess" or the `e` of "e.g.", is skipped.
pub fn parse_answer_label(text: &str, n_options: usize) -> Option<usize> {
	for m in LABEL_RE.find_iter(text) {
		let c = m.as_str().chars().next()?;
		let idx = match c {
			'1'..='5' => c as usize - '1' as usize,
			'B'..='E' => c as usize - 'A' as usize,
			'A' | 'a'..='e' => {
				if reads_as_prose(&text[..m.start()], &text[m.end()..]) {
					continue;
				}
				c.to_ascii_uppercase() as usize - 'A' as usize
			}
			_ => continue,
		};
		if idx < n_options.min(MAX_LABELS) {
			return Some(idx);
		}
	}
	None
}

fn reads_as_prose(before: &str, after: &str) -> bool {
	if closes_abbreviation(before) {
		return true;
	}
	let before = before.trim_end().to_lowercase();
	if LABEL_LEADERS.iter().any(|l| before.ends_with(l)) {
		return false;
	}
	let mut chars = after.chars();
	match chars.next() {
		Some('.') => chars.next().is_some_and(|c| c.is_alphabetic()),
		Some(c) if c.is_whitespace() => {
			let next_word: String = after.trim_start().chars().take_while(|c| c.is_alphabetic()).collect();
			!next_word.is_empty() && !LABEL_FOLLOWERS.contains(&next_word.to_lowercase().as_str())
		}
		_ => false,
	}
}

/// The letter is glued to a preceding `<letter>.`, like the final `e` of "i.e."
fn closes_abbreviation(before: &str) -> bool {
	let mut rev = before.chars().rev();
	rev.next() == Some('.') && rev.next().is_some_and(|c| c.is_alphabetic()) && rev.next().is_none_or(|c| !c.is_alphanumeric())
}

/// Await `fut`, giving up after `secs` seconds
pub async fn within<T>(secs: u64, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
	match tokio::time::timeout(Duration::from_secs(secs), fut).await {
		Ok(result) => result,
		Err(_) => bail!("{what} timed out after {secs}s"),
	}
}

/// General-purpose `ask_llm` client, used as one more remote transport
#[derive(Clone, Debug)]
pub struct AskLlmClient {
	passage_limit: usize,
	timeout_secs: u64,
}

impl AskLlmClient {
	pub fn new(passage_limit: usize, timeout_secs: u64) -> Self {
		Self { passage_limit, timeout_secs }
	}

	async fn complete(&self, prompt: String) -> Result<String> {
		let mut conv = Conversation::new();
		conv.add(Role::User, prompt);

		let client = LlmClient::default().model(Model::Medium).max_tokens(64);
		let request = async { client.conversation(&conv).await.map_err(|e| eyre!("ask_llm request failed: {e}")) };
		let response = within(self.timeout_secs, "ask_llm request", request).await?;

		tracing::debug!("LLM raw response: {}", response.text);
		Ok(response.text)
	}
}

impl Reasoner for AskLlmClient {
	async fn ask(&self, passage: &str, question: &str, options: &[String]) -> Option<usize> {
		let prompt = build_prompt(truncate_chars(passage, self.passage_limit), question, options);
		match self.complete(prompt).await {
			Ok(text) => parse_answer_label(&text, options.len()),
			Err(e) => {
				tracing::warn!("ask_llm call failed: {e}");
				None
			}
		}
	}
}

/// One configured way of reaching a remote model
#[derive(Clone, Debug)]
pub enum Transport {
	Spark(SparkClient),
	HuggingFace(HuggingFaceClient),
	AskLlm(AskLlmClient),
}

impl Transport {
	pub fn name(&self) -> &'static str {
		match self {
			Transport::Spark(_) => "spark",
			Transport::HuggingFace(_) => "huggingface",
			Transport::AskLlm(_) => "ask_llm",
		}
	}

	async fn ask(&self, passage: &str, question: &str, options: &[String]) -> Option<usize> {
		match self {
			Transport::Spark(c) => c.ask(passage, question, options).await,
			Transport::HuggingFace(c) => c.ask(passage, question, options).await,
			Transport::AskLlm(c) => c.ask(passage, question, options).await,
		}
	}
}

/// The remote stage: every configured transport, tried in order until one answers
#[derive(Clone, Debug)]
pub struct RemoteReasoner {
	transports: Vec<Transport>,
}

impl RemoteReasoner {
	pub fn new(transports: Vec<Transport>) -> Self {
		Self { transports }
	}

	/// Only transports with credentials are included. `None` if nothing is configured.
	pub fn from_config(config: &AppConfig) -> Option<Self> {
		let mut transports = Vec::new();
		if config.spark.is_configured() {
			transports.push(Transport::Spark(SparkClient::new(config.spark.clone())));
		}
		if config.huggingface.is_configured() {
			transports.push(Transport::HuggingFace(HuggingFaceClient::new(config.huggingface.clone())));
		}
		if config.ask_llm {
			transports.push(Transport::AskLlm(AskLlmClient::new(config.spark.passage_limit, config.spark.timeout_secs)));
		}
		if transports.is_empty() { None } else { Some(Self::new(transports)) }
	}

	pub fn transport_names(&self) -> Vec<&'static str> {
		self.transports.iter().map(Transport::name).collect()
	}
}

impl Reasoner for RemoteReasoner {
	async fn ask(&self, passage: &str, question: &str, options: &[String]) -> Option<usize> {
		for transport in &self.transports {
			tracing::info!("Asking {}...", transport.name());
			match transport.ask(passage, question, options).await {
				Some(idx) if idx < options.len() => return Some(idx),
				_ => tracing::info!("{} was inconclusive", transport.name()),
			}
		}
		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_letter_label() {
		assert_eq!(parse_answer_label("The answer is B.", 4), Some(1));
		assert_eq!(parse_answer_label("D", 4), Some(3));
		assert_eq!(parse_answer_label("answer: c", 4), Some(2));
	}

	#[test]
	fn parses_digit_label() {
		assert_eq!(parse_answer_label("I would pick 3", 4), Some(2));
		assert_eq!(parse_answer_label("Option 2) is best", 3), Some(1));
	}

	#[test]
	fn label_outside_option_range_is_ignored() {
		assert_eq!(parse_answer_label("E", 4), None);
		assert_eq!(parse_answer_label("E, or maybe B", 4), Some(1));
		assert_eq!(parse_answer_label("5", 3), None);
	}

	#[test]
	fn no_label_is_inconclusive() {
		assert_eq!(parse_answer_label("I am not sure about this one.", 4), None);
		assert_eq!(parse_answer_label("", 4), None);
		// digits glued to other digits are not labels
		assert_eq!(parse_answer_label("Around 1990 or 2010", 4), None);
	}

	#[test]
	fn articles_and_abbreviations_are_not_labels() {
		assert_eq!(parse_answer_label("It is a tricky one, but C fits", 4), Some(2));
		assert_eq!(parse_answer_label("A careful reading points to D", 4), Some(3));
		assert_eq!(parse_answer_label("e.g. the second: B", 5), Some(1));
		assert_eq!(parse_answer_label("I think a is right", 4), Some(0));
		assert_eq!(parse_answer_label("Option a is right", 4), Some(0));
		assert_eq!(parse_answer_label("i.e. the passage says so, so B", 5), Some(1));
		assert_eq!(parse_answer_label("It says so, i.e. D", 5), Some(3));
	}

	#[tokio::test]
	async fn stalled_request_gives_up_at_the_deadline() {
		let started = std::time::Instant::now();
		let result: Result<String> = within(1, "stalled call", std::future::pending()).await;
		assert!(result.unwrap_err().to_string().contains("timed out after 1s"));
		assert!(started.elapsed() < Duration::from_secs(5));

		assert_eq!(within(1, "quick call", async { Ok(7) }).await.unwrap(), 7);
	}

	#[test]
	fn prompt_labels_options_and_embeds_inputs() {
		let prompt = build_prompt("Short passage.", "Why?", &["first".to_string(), "second".to_string(), "third".to_string()]);
		assert!(prompt.contains("Short passage."));
		assert!(prompt.contains("Why?"));
		assert!(prompt.contains("A. first\nB. second\nC. third\n"));
		assert!(prompt.contains("(A-C)"));
	}

	struct Fixed(Option<usize>);

	impl Reasoner for Fixed {
		async fn ask(&self, _: &str, _: &str, _: &[String]) -> Option<usize> {
			self.0
		}
	}

	#[tokio::test]
	async fn reasoner_trait_is_usable_generically() {
		async fn run<R: Reasoner>(r: &R) -> Option<usize> {
			r.ask("p", "q", &["a".to_string(), "b".to_string()]).await
		}
		assert_eq!(run(&Fixed(Some(1))).await, Some(1));
		assert_eq!(run(&Fixed(None)).await, None);
	}

	#[test]
	fn nothing_configured_means_no_remote_stage() {
		assert!(RemoteReasoner::from_config(&AppConfig::default()).is_none());
	}

	#[test]
	fn transports_follow_priority_order() {
		let mut config = AppConfig::default();
		config.huggingface.token = Some("hf_token".to_string());
		config.spark.app_id = "app".to_string();
		config.spark.api_key = "key".to_string();
		config.spark.api_secret = "secret".to_string();
		config.ask_llm = true;
		let remote = RemoteReasoner::from_config(&config).unwrap();
		assert_eq!(remote.transport_names(), vec!["spark", "huggingface", "ask_llm"]);
	}
}
