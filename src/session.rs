use std::{collections::BTreeMap, fmt};

use crate::Method;

/// Running tally for one quiz session. Lives as long as the session and is handed to reporting explicitly.
#[derive(Clone, Debug, Default)]
pub struct SessionStats {
	attempted: u32,
	correct: u32,
	/// Append-only: one entry per resolved round
	methods: Vec<Method>,
}

impl SessionStats {
	pub fn record_method(&mut self, method: Method) {
		self.methods.push(method);
	}

	/// An answer was submitted; `correct` is what the result page said
	pub fn record_submission(&mut self, correct: bool) {
		self.attempted += 1;
		if correct {
			self.correct += 1;
		}
	}

	pub fn attempted(&self) -> u32 {
		self.attempted
	}

	pub fn correct(&self) -> u32 {
		self.correct
	}

	pub fn methods(&self) -> &[Method] {
		&self.methods
	}

	/// Percentage, rounded to two decimals. Zero before the first submission.
	pub fn success_rate(&self) -> f64 {
		if self.attempted == 0 {
			return 0.0;
		}
		(self.correct as f64 / self.attempted as f64 * 10_000.0).round() / 100.0
	}

	pub fn method_usage(&self) -> BTreeMap<Method, usize> {
		let mut usage = BTreeMap::new();
		for method in &self.methods {
			*usage.entry(*method).or_default() += 1;
		}
		usage
	}
}

impl fmt::Display for SessionStats {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "Attempted: {}", self.attempted)?;
		writeln!(f, "Correct:   {}", self.correct)?;
		writeln!(f, "Accuracy:  {}%", self.success_rate())?;
		let usage = self.method_usage();
		if usage.is_empty() {
			write!(f, "Methods:   none")?;
		} else {
			let parts: Vec<String> = usage.iter().map(|(m, n)| format!("{m}={n}")).collect();
			write!(f, "Methods:   {}", parts.join(", "))?;
		}
		Ok(())
	}
}
