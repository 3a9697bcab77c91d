use std::fmt;

use derive_new::new;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod huggingface;
pub mod lexical;
pub mod llm;
pub mod login;
pub mod runner;
pub mod selector;
pub mod session;
pub mod similarity;
pub mod spark;
pub mod text;

/// One quiz round as scraped from the page: passage, question and the ordered options
#[derive(Clone, Debug, Deserialize, Serialize, new)]
pub struct Round {
	/// The reading passage
	pub article: String,
	/// The question text/prompt
	pub question: String,
	/// Available options, in on-screen order
	pub options: Vec<String>,
}

impl fmt::Display for Round {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "{}", self.question)?;
		writeln!(f)?;
		for (i, option) in self.options.iter().enumerate() {
			writeln!(f, "( ) {}. {}", i + 1, option)?;
		}
		Ok(())
	}
}

/// Which cascade stage resolved a round
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Method {
	RemoteAi,
	VectorSimilarity,
	Lexical,
}

impl Method {
	pub fn name(&self) -> &'static str {
		match self {
			Method::RemoteAi => "RemoteAI",
			Method::VectorSimilarity => "VectorSimilarity",
			Method::Lexical => "Lexical",
		}
	}
}

impl fmt::Display for Method {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// The chosen option index together with the stage that picked it
#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
pub struct Selection {
	/// Zero-based, always `< options.len()`
	pub index: usize,
	pub method: Method,
}
