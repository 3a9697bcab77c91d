//! Text-generation inference endpoint, one POST per question

use std::time::Duration;

use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
	config::HuggingFaceConfig,
	llm::{Reasoner, build_prompt, parse_answer_label},
	text::truncate_chars,
};

#[derive(Debug, Deserialize)]
struct Generation {
	generated_text: String,
}

#[derive(Clone, Debug)]
pub struct HuggingFaceClient {
	config: HuggingFaceConfig,
	http: reqwest::Client,
}

impl HuggingFaceClient {
	pub fn new(config: HuggingFaceConfig) -> Self {
		let http = reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build().unwrap_or_default();
		Self { config, http }
	}

	async fn generate(&self, prompt: String) -> Result<String> {
		let body = json!({
			"inputs": prompt,
			"parameters": {
				"max_length": 50,
				"temperature": 0.1,
				"do_sample": false,
			}
		});

		let mut request = self.http.post(&self.config.endpoint).json(&body);
		if let Some(token) = self.config.token.as_deref().filter(|t| !t.is_empty()) {
			request = request.bearer_auth(token);
		}

		let response = request.send().await.map_err(|e| eyre!("Inference request failed: {e}"))?;
		let status = response.status();
		if status != reqwest::StatusCode::OK {
			bail!("Inference endpoint returned {status}");
		}

		let generations: Vec<Generation> = response.json().await.map_err(|e| eyre!("Malformed inference response: {e}"))?;
		let first = generations.into_iter().next().ok_or_else(|| eyre!("Inference response was an empty array"))?;
		Ok(first.generated_text)
	}
}

impl Reasoner for HuggingFaceClient {
	async fn ask(&self, passage: &str, question: &str, options: &[String]) -> Option<usize> {
		let prompt = build_prompt(truncate_chars(passage, self.config.passage_limit), question, options);
		match self.generate(prompt).await {
			Ok(text) => {
				tracing::info!("Inference result: {}", text.trim());
				parse_answer_label(&text, options.len())
			}
			Err(e) => {
				tracing::warn!("{e}");
				None
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use tokio::{
		io::{AsyncReadExt, AsyncWriteExt},
		net::TcpListener,
		task::JoinHandle,
	};

	use super::*;

	/// Answers exactly one request with `status` and `body`; the handle yields the raw request
	async fn serve_once(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let url = format!("http://{}/models/test", listener.local_addr().unwrap());
		let handle = tokio::spawn(async move {
			let (mut stream, _) = listener.accept().await.unwrap();
			let mut raw = Vec::new();
			let mut buf = [0u8; 4096];
			loop {
				let n = stream.read(&mut buf).await.unwrap();
				raw.extend_from_slice(&buf[..n]);
				let text = String::from_utf8_lossy(&raw).to_string();
				if let Some(header_end) = text.find("\r\n\r\n") {
					let content_length = text[..header_end]
						.lines()
						.find_map(|l| l.to_lowercase().strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap()))
						.unwrap_or(0);
					if raw.len() >= header_end + 4 + content_length {
						break;
					}
				}
				if n == 0 {
					break;
				}
			}
			let response = format!("HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}", body.len());
			stream.write_all(response.as_bytes()).await.unwrap();
			stream.shutdown().await.ok();
			String::from_utf8_lossy(&raw).to_string()
		});
		(url, handle)
	}

	fn client(endpoint: String, token: Option<&str>) -> HuggingFaceClient {
		HuggingFaceClient::new(HuggingFaceConfig {
			token: token.map(str::to_string),
			endpoint,
			passage_limit: 800,
			timeout_secs: 5,
		})
	}

	fn opts() -> Vec<String> {
		["red", "green", "blue", "black"].iter().map(|s| s.to_string()).collect()
	}

	#[tokio::test]
	async fn parses_generated_text() {
		let (url, server) = serve_once(200, r#"[{"generated_text": "The answer is B."}]"#).await;
		let idx = client(url, Some("hf_test")).ask("passage", "question?", &opts()).await;
		assert_eq!(idx, Some(1));

		let request = server.await.unwrap();
		let lower = request.to_lowercase();
		assert!(lower.starts_with("post /models/test"));
		assert!(lower.contains("authorization: bearer hf_test"));
		assert!(request.contains(r#""max_length":50"#));
		assert!(request.contains(r#""do_sample":false"#));
	}

	#[tokio::test]
	async fn long_passage_is_cut_to_the_configured_prefix() {
		let (url, server) = serve_once(200, r#"[{"generated_text": "A"}]"#).await;
		let passage = format!("{}{}", "k".repeat(800), "TAILMARKER");
		assert_eq!(client(url, None).ask(&passage, "q", &opts()).await, Some(0));
		let request = server.await.unwrap();
		assert!(!request.contains("TAILMARKER"));
		assert!(!request.to_lowercase().contains("authorization"));
	}

	#[tokio::test]
	async fn non_success_status_is_inconclusive() {
		let (url, _server) = serve_once(503, r#"{"error": "Model is loading"}"#).await;
		assert_eq!(client(url, Some("t")).ask("p", "q", &opts()).await, None);
	}

	#[tokio::test]
	async fn malformed_body_is_inconclusive() {
		let (url, _server) = serve_once(200, r#"{"error": "unexpected"}"#).await;
		assert_eq!(client(url, Some("t")).ask("p", "q", &opts()).await, None);
	}

	#[tokio::test]
	async fn reply_without_label_is_inconclusive() {
		let (url, _server) = serve_once(200, r#"[{"generated_text": "I cannot tell from this text."}]"#).await;
		assert_eq!(client(url, Some("t")).ask("p", "q", &opts()).await, None);
	}

	#[tokio::test]
	async fn unreachable_endpoint_is_inconclusive() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let url = format!("http://{}/", listener.local_addr().unwrap());
		drop(listener);
		assert_eq!(client(url, Some("t")).ask("p", "q", &opts()).await, None);
	}
}
