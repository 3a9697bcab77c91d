use color_eyre::{Result, eyre::eyre};
use serde::{Deserialize, Serialize};
use v_utils::macros::{MyConfigPrimitives, Settings, SettingsNested};

/// Sources layer as env < config file < flags. Field names double as `--kebab-case` flags,
/// nested sections as `--<section>-<field>`.
#[derive(Clone, Debug, MyConfigPrimitives, Settings)]
pub struct AppConfig {
	#[serde(default)]
	pub username: String,
	#[serde(default)]
	pub password: String,
	/// Page the login form lives on
	#[settings(default = default_login_url())]
	pub login_url: String,
	/// Login counts as successful once the URL contains any of these
	#[serde(default = "default_login_success_markers")]
	pub login_success_markers: Vec<String>,
	/// Number of quiz rounds to attempt (default: 20)
	#[serde(default = "default_quiz_count")]
	pub quiz_count: u32,
	/// Run with visible browser window (non-headless mode)
	#[serde(default)]
	pub visible: bool,
	/// Lower bound of the randomized pause between rounds (default: 5)
	#[serde(default = "default_min_delay_secs")]
	pub min_delay_secs: f64,
	/// Upper bound of the randomized pause between rounds (default: 10)
	#[serde(default = "default_max_delay_secs")]
	pub max_delay_secs: f64,
	/// Wait after navigation before scraping (default: 4)
	#[serde(default = "default_settle_delay_secs")]
	pub settle_delay_secs: u64,
	/// Passage prefix handed to the local similarity scorer (default: 3000)
	#[serde(default = "default_local_passage_limit")]
	pub local_passage_limit: usize,
	/// Also try the `ask_llm` client in the remote stage
	#[serde(default)]
	pub ask_llm: bool,
	#[serde(default)]
	#[settings(flatten)]
	pub selectors: Selectors,
	#[serde(default)]
	#[settings(flatten)]
	pub spark: SparkConfig,
	#[serde(default)]
	#[settings(flatten)]
	pub huggingface: HuggingFaceConfig,
	#[serde(default)]
	#[settings(flatten)]
	pub lexical: LexicalConfig,
}

/// CSS selectors used to scrape and drive the quiz page
#[derive(Clone, Debug, Deserialize, Serialize, SettingsNested)]
#[serde(default)]
#[settings(prefix = "selectors")]
pub struct Selectors {
	pub passage: String,
	pub question: String,
	pub option: String,
	pub submit: String,
	pub next: String,
	pub username_field: String,
	pub password_field: String,
	pub login_button: String,
}

impl Default for Selectors {
	fn default() -> Self {
		Self {
			passage: "div[class*='passage']".to_string(),
			question: "div[class*='question']".to_string(),
			option: "div[class*='answer-card']".to_string(),
			submit: "button[type='submit'], .submit-answer".to_string(),
			next: ".next-question, button.next".to_string(),
			username_field: "#username".to_string(),
			password_field: "#password".to_string(),
			login_button: "button[type='submit'], input[type='submit']".to_string(),
		}
	}
}

/// Streaming chat endpoint, authenticated with an HMAC-signed URL
#[derive(Clone, Debug, Deserialize, Serialize, SettingsNested)]
#[serde(default)]
#[settings(prefix = "spark")]
pub struct SparkConfig {
	pub app_id: String,
	pub api_key: String,
	pub api_secret: String,
	pub endpoint: String,
	pub domain: String,
	pub uid: String,
	pub temperature: f64,
	pub max_tokens: u32,
	pub passage_limit: usize,
	pub timeout_secs: u64,
}

impl Default for SparkConfig {
	fn default() -> Self {
		Self {
			app_id: String::new(),
			api_key: String::new(),
			api_secret: String::new(),
			endpoint: "wss://spark-api.xf-yun.com/v3.5/chat".to_string(),
			domain: "generalv3.5".to_string(),
			uid: "read_headless".to_string(),
			temperature: 0.1,
			max_tokens: 1024,
			passage_limit: 3000,
			timeout_secs: 30,
		}
	}
}

impl SparkConfig {
	/// All three credentials must be present
	pub fn is_configured(&self) -> bool {
		![&self.app_id, &self.api_key, &self.api_secret].iter().any(|s| s.trim().is_empty())
	}
}

/// Text-generation inference endpoint, plain HTTP
#[derive(Clone, Debug, Deserialize, Serialize, SettingsNested)]
#[serde(default)]
#[settings(prefix = "huggingface")]
pub struct HuggingFaceConfig {
	pub token: Option<String>,
	pub endpoint: String,
	pub passage_limit: usize,
	pub timeout_secs: u64,
}

impl Default for HuggingFaceConfig {
	fn default() -> Self {
		Self {
			token: None,
			endpoint: "https://api-inference.huggingface.co/models/google/flan-t5-xl".to_string(),
			passage_limit: 800,
			timeout_secs: 30,
		}
	}
}

impl HuggingFaceConfig {
	pub fn is_configured(&self) -> bool {
		self.token.as_deref().is_some_and(|t| !t.trim().is_empty())
	}
}

#[derive(Clone, Debug, Deserialize, Serialize, SettingsNested)]
#[serde(default)]
#[settings(prefix = "lexical")]
pub struct LexicalConfig {
	/// How many top-ranked passage terms count as important (clamped to 20..=50)
	pub important_terms: usize,
	/// Rank terms by `tf * ln(total / (tf + 1))` instead of raw frequency
	pub weighted: bool,
	/// Shared tokens a sentence needs to earn the detail-question bonus
	pub min_shared_tokens: usize,
}

impl Default for LexicalConfig {
	fn default() -> Self {
		Self {
			important_terms: 20,
			weighted: false,
			min_shared_tokens: 1,
		}
	}
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			username: String::new(),
			password: String::new(),
			login_url: default_login_url(),
			login_success_markers: default_login_success_markers(),
			quiz_count: default_quiz_count(),
			visible: false,
			min_delay_secs: default_min_delay_secs(),
			max_delay_secs: default_max_delay_secs(),
			settle_delay_secs: default_settle_delay_secs(),
			local_passage_limit: default_local_passage_limit(),
			ask_llm: false,
			selectors: Selectors::default(),
			spark: SparkConfig::default(),
			huggingface: HuggingFaceConfig::default(),
			lexical: LexicalConfig::default(),
		}
	}
}

fn default_login_url() -> String {
	"https://readtheory.org/auth/login".to_string()
}

fn default_login_success_markers() -> Vec<String> {
	vec!["dashboard".to_string(), "quiz".to_string()]
}

fn default_quiz_count() -> u32 {
	20
}

fn default_min_delay_secs() -> f64 {
	5.0
}

fn default_max_delay_secs() -> f64 {
	10.0
}

fn default_settle_delay_secs() -> u64 {
	4
}

fn default_local_passage_limit() -> usize {
	3000
}

impl AppConfig {
	/// Build from the config file, environment and `flags`, then check the values make sense
	pub fn load(flags: SettingsFlags) -> Result<Self> {
		let config = Self::try_build(flags).map_err(|e| eyre!("Failed to load config: {}", e))?;
		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> Result<()> {
		if self.min_delay_secs < 0.0 || self.max_delay_secs < self.min_delay_secs {
			return Err(eyre!("Invalid delay range: {}..{}", self.min_delay_secs, self.max_delay_secs));
		}
		if self.spark.timeout_secs == 0 || self.huggingface.timeout_secs == 0 {
			return Err(eyre!("Remote timeouts must be at least one second"));
		}
		Ok(())
	}
}
