//! Streaming chat over an HMAC-signed websocket.
//!
//! The connection URL carries its own credentials: a base64 `authorization` blob wrapping an
//! HMAC-SHA256 signature over host, date and request line, plus the `date` and `host` it was
//! computed for. One prompt is sent per connection; content fragments stream back until a frame
//! with `status == 2` arrives. A background task owns the receive half and reports through a
//! oneshot channel, while the shared buffer keeps partial output readable after a timeout.

use std::{
	sync::{Arc, Mutex},
	time::Duration,
};

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use futures::{SinkExt, Stream, StreamExt};
use hmac::{Hmac, Mac};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tokio::{
	sync::oneshot,
	time::{Instant, timeout_at},
};
use tokio_tungstenite::{
	connect_async,
	tungstenite::{Error as WsError, Message},
};

use crate::{
	config::SparkConfig,
	llm::{Reasoner, build_prompt, parse_answer_label},
	text::truncate_chars,
};

/// `choices.status` of the last frame in a reply
const STATUS_COMPLETE: i64 = 2;

#[derive(Debug, Deserialize)]
struct ChatResponse {
	header: ResponseHeader,
	#[serde(default)]
	payload: Option<ResponsePayload>,
}

#[derive(Debug, Deserialize)]
struct ResponseHeader {
	code: i64,
	#[serde(default)]
	message: String,
}

#[derive(Debug, Deserialize)]
struct ResponsePayload {
	choices: Choices,
}

#[derive(Debug, Deserialize)]
struct Choices {
	status: i64,
	#[serde(default)]
	text: Vec<ChoiceText>,
}

#[derive(Debug, Deserialize)]
struct ChoiceText {
	#[serde(default)]
	content: String,
}

/// How the receive task ended
#[derive(Debug)]
enum Outcome {
	Completed,
	Closed,
	Failed(String),
}

/// Current time as an RFC 1123 date, the format the signature is computed over
pub fn rfc1123_now() -> String {
	Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Base64 HMAC-SHA256 of the canonical `host`/`date`/request-line string
pub fn sign(secret: &str, host: &str, date: &str, path: &str) -> Result<String> {
	let canonical = format!("host: {host}\ndate: {date}\nGET {path} HTTP/1.1");
	let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|e| eyre!("Invalid HMAC key: {e}"))?;
	mac.update(canonical.as_bytes());
	Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Connection URL with `authorization`, `date` and `host` query parameters
pub fn build_auth_url(endpoint: &str, api_key: &str, api_secret: &str, date: &str) -> Result<Url> {
	let base = Url::parse(endpoint).map_err(|e| eyre!("Invalid chat endpoint {endpoint}: {e}"))?;
	let host = base.host_str().ok_or_else(|| eyre!("Chat endpoint has no host: {endpoint}"))?;

	let signature = sign(api_secret, host, date, base.path())?;
	let authorization_origin = format!(r#"api_key="{api_key}", algorithm="hmac-sha256", headers="host date request-line", signature="{signature}""#);
	let authorization = STANDARD.encode(authorization_origin);

	Url::parse_with_params(endpoint, &[("authorization", authorization.as_str()), ("date", date), ("host", host)]).map_err(|e| eyre!("Failed to build chat URL: {e}"))
}

#[derive(Clone, Debug)]
pub struct SparkClient {
	config: SparkConfig,
}

impl SparkClient {
	pub fn new(config: SparkConfig) -> Self {
		Self { config }
	}

	fn request_body(&self, prompt: &str) -> serde_json::Value {
		json!({
			"header": {
				"app_id": self.config.app_id,
				"uid": self.config.uid,
			},
			"parameter": {
				"chat": {
					"domain": self.config.domain,
					"temperature": self.config.temperature,
					"max_tokens": self.config.max_tokens,
				}
			},
			"payload": {
				"message": {
					"text": [{ "role": "user", "content": prompt }]
				}
			}
		})
	}

	/// Send one prompt and collect the streamed reply.
	///
	/// Connecting, sending and receiving share a single `timeout_secs` deadline. Running out of time
	/// before the request is sent is an error; running out while receiving returns whatever arrived.
	async fn converse(&self, prompt: &str) -> Result<String> {
		let deadline = Instant::now() + Duration::from_secs(self.config.timeout_secs);
		let url = build_auth_url(&self.config.endpoint, &self.config.api_key, &self.config.api_secret, &rfc1123_now())?;
		let (socket, _) = timeout_at(deadline, connect_async(url.as_str()))
			.await
			.map_err(|_| eyre!("Timed out connecting to chat endpoint after {}s", self.config.timeout_secs))?
			.map_err(|e| eyre!("Failed to connect to chat endpoint: {e}"))?;
		let (mut sink, stream) = socket.split();

		timeout_at(deadline, sink.send(Message::Text(self.request_body(prompt).to_string().into())))
			.await
			.map_err(|_| eyre!("Timed out sending chat request after {}s", self.config.timeout_secs))?
			.map_err(|e| eyre!("Failed to send chat request: {e}"))?;
		tracing::debug!("Chat request sent");

		let buffer = Arc::new(Mutex::new(String::new()));
		let (done_tx, done_rx) = oneshot::channel();
		let receiver = tokio::spawn(receive_loop(stream, Arc::clone(&buffer), done_tx));

		let outcome = timeout_at(deadline, done_rx).await;
		receiver.abort();
		let _ = sink.close().await;

		let text = buffer.lock().map(|b| b.trim().to_string()).unwrap_or_default();
		match outcome {
			Ok(Ok(Outcome::Failed(reason))) => bail!(reason),
			Ok(Ok(Outcome::Completed)) => Ok(text),
			Ok(Ok(Outcome::Closed)) | Ok(Err(_)) => {
				tracing::debug!("Chat connection closed before completion");
				Ok(text)
			}
			Err(_) => {
				tracing::warn!("Timed out waiting for chat reply after {}s", self.config.timeout_secs);
				Ok(text)
			}
		}
	}
}

async fn receive_loop<S>(mut stream: S, buffer: Arc<Mutex<String>>, done: oneshot::Sender<Outcome>)
where
	S: Stream<Item = Result<Message, WsError>> + Unpin + Send + 'static,
{
	let outcome = loop {
		let text = match stream.next().await {
			Some(Ok(Message::Text(text))) => text,
			Some(Ok(Message::Close(_))) | None => break Outcome::Closed,
			Some(Ok(_)) => continue,
			Some(Err(e)) => break Outcome::Failed(format!("Chat connection error: {e}")),
		};

		let response: ChatResponse = match serde_json::from_str(text.as_str()) {
			Ok(r) => r,
			Err(e) => break Outcome::Failed(format!("Malformed chat frame: {e}")),
		};
		if response.header.code != 0 {
			break Outcome::Failed(format!("Chat API returned error {}: {}", response.header.code, response.header.message));
		}

		let Some(payload) = response.payload else { continue };
		if let Ok(mut buf) = buffer.lock() {
			for fragment in &payload.choices.text {
				buf.push_str(&fragment.content);
			}
		}
		if payload.choices.status == STATUS_COMPLETE {
			break Outcome::Completed;
		}
	};
	let _ = done.send(outcome);
}

impl Reasoner for SparkClient {
	async fn ask(&self, passage: &str, question: &str, options: &[String]) -> Option<usize> {
		let prompt = build_prompt(truncate_chars(passage, self.config.passage_limit), question, options);
		match self.converse(&prompt).await {
			Ok(text) => {
				tracing::info!("Chat reply: {text}");
				parse_answer_label(&text, options.len())
			}
			Err(e) => {
				tracing::warn!("{e}");
				None
			}
		}
	}
}
