use std::{
	io::IsTerminal,
	path::{Path, PathBuf},
};

use chromiumoxide::browser::{Browser, BrowserConfig};
use clap::{Parser, Subcommand};
use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use futures::StreamExt;
use read_headless::{
	Round,
	config::{AppConfig, SettingsFlags},
	login::{fill_missing_credentials, login},
	runner::run_quiz_loop,
	selector::AnswerSelector,
	session::SessionStats,
};
use tracing_subscriber::EnvFilter;
use v_utils::{elog, log};

#[derive(Debug, Parser)]
#[command(name = "read_headless")]
#[command(about = "Automated reading-comprehension quiz answering", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[clap(flatten)]
	settings: SettingsFlags,
}

#[derive(Debug, Subcommand)]
enum Commands {
	/// Log in and answer quiz rounds in the browser (default)
	Run,
	/// Pick an answer for a single round read from a JSON file ({"article", "question", "options"})
	Answer {
		#[arg(short, long)]
		input: PathBuf,
	},
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with_writer(std::io::stderr)
		.init();

	let cli = Cli::parse();
	let config = AppConfig::load(cli.settings)?;

	match cli.command.unwrap_or(Commands::Run) {
		Commands::Answer { input } => answer_once(&config, &input).await,
		Commands::Run => run(config).await,
	}
}

async fn answer_once(config: &AppConfig, input: &Path) -> Result<()> {
	let raw = std::fs::read_to_string(input).map_err(|e| eyre!("Failed to read {}: {}", input.display(), e))?;
	let round: Round = serde_json::from_str(&raw).map_err(|e| eyre!("Failed to parse round from {}: {}", input.display(), e))?;

	let selector = AnswerSelector::from_config(config);
	eprint!("{}", round);
	let Some(selection) = selector.select_round(&round).await else {
		bail!("Round has no options to choose from");
	};
	println!("{}. {} ({})", selection.index + 1, round.options[selection.index], selection.method);
	Ok(())
}

async fn run(mut config: AppConfig) -> Result<()> {
	if config.username.is_empty() || config.password.is_empty() {
		if !std::io::stdin().is_terminal() {
			bail!("Username and password are required (set them in the config or pass --username/--password)");
		}
		fill_missing_credentials(&mut config, &mut std::io::stdin().lock(), || rpassword::prompt_password("Password: "))?;
	}

	let selector = AnswerSelector::from_config(&config);
	let transports = selector.remote_transports();
	log!("Starting quiz automation: {} rounds", config.quiz_count);
	log!("Visible mode: {}", config.visible);
	log!("Remote stage: {}", if transports.is_empty() { "not configured".to_string() } else { transports.join(" -> ") });

	let browser_config = if config.visible {
		BrowserConfig::builder().with_head().build()
	} else {
		BrowserConfig::builder().build()
	}
	.map_err(|e| eyre!("Failed to build browser config: {}", e))?;

	let (mut browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| eyre!("Failed to launch browser: {}", e))?;

	// Spawn a task to handle browser events (suppress errors as they're mostly noise)
	let handle = tokio::spawn(async move { while let Some(_event) = handler.next().await {} });

	let page = browser.new_page("about:blank").await.map_err(|e| eyre!("Failed to create new page: {}", e))?;

	let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			eprintln!("\nInterrupt received, finishing the current round...");
			let _ = cancel_tx.send(true);
		}
	});

	let session_id = chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string();
	let mut stats = SessionStats::default();

	let outcome = match login(&page, &config).await {
		Ok(()) => run_quiz_loop(&page, &config, &selector, &mut stats, cancel_rx, &session_id).await,
		Err(e) => Err(e),
	};
	if let Err(e) = &outcome {
		elog!("Stopped: {}", e);
	}

	log!("\n==================================================");
	log!("Session summary:\n{}", stats);
	log!("==================================================");

	drop(page);
	browser.close().await.map_err(|e| eyre!("Failed to close browser: {}", e))?;
	drop(browser);
	handle.abort();

	outcome
}
