//! Quiz loop: scrape a round, pick an answer, click it, submit, move on

#[cfg(feature = "xdg")]
use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::Page;
use color_eyre::{Result, eyre::eyre};
use tokio::sync::watch;
#[cfg(feature = "xdg")]
use v_utils::xdg_state_dir;
use v_utils::{elog, log};

use crate::{
	Round,
	config::{AppConfig, Selectors},
	login::js_string,
	selector::AnswerSelector,
	session::SessionStats,
};

/// Answer up to `config.quiz_count` rounds, or fewer if `cancel` flips to true.
/// A round already in flight finishes; no new round starts after the flag is set.
pub async fn run_quiz_loop(page: &Page, config: &AppConfig, selector: &AnswerSelector, stats: &mut SessionStats, mut cancel: watch::Receiver<bool>, session_id: &str) -> Result<()> {
	for round_num in 1..=config.quiz_count {
		if *cancel.borrow() {
			log!("Interrupted, not starting further rounds");
			break;
		}
		log!("\n==================== Round {}/{} ====================", round_num, config.quiz_count);

		match process_round(page, config, selector, stats, session_id).await {
			Ok(true) => {
				log!("Accuracy so far: {}%", stats.success_rate());
				log!("Method usage: {}", format_usage(stats));

				if !click_selector(page, &config.selectors.next).await.unwrap_or(false) {
					log!("Next button not found, reloading page...");
					reload(page).await?;
				}

				let delay = round_delay(config);
				log!("Waiting {:.1}s before the next round...", delay.as_secs_f64());
				if pause(delay, &mut cancel).await {
					log!("Interrupted during pause");
					break;
				}
			}
			Ok(false) => {
				elog!("Round could not be completed, reloading page...");
				reload(page).await?;
				if pause(Duration::from_secs(5), &mut cancel).await {
					break;
				}
			}
			Err(e) => {
				elog!("Round failed: {}", e);
				reload(page).await?;
			}
		}
	}
	Ok(())
}

/// Returns Ok(true) if an answer was submitted
async fn process_round(page: &Page, config: &AppConfig, selector: &AnswerSelector, stats: &mut SessionStats, session_id: &str) -> Result<bool> {
	tokio::time::sleep(Duration::from_secs(config.settle_delay_secs)).await;

	let Some(round) = scrape_round(page, &config.selectors).await? else {
		elog!("Passage or question not found on page");
		#[cfg(feature = "xdg")]
		if let Err(e) = save_page_html(page, session_id).await {
			elog!("Failed to save page HTML: {e}");
		}
		return Ok(false);
	};
	if round.options.len() < 2 {
		elog!("Found {} option(s), need at least 2", round.options.len());
		return Ok(false);
	}

	tracing::info!(session = session_id, passage_chars = round.article.chars().count(), "Scraped round");
	eprint!("{}", round);

	let Some(selection) = selector.select_round(&round).await else {
		return Ok(false);
	};
	stats.record_method(selection.method);
	log!("{} chose option {}: {}", selection.method, selection.index + 1, round.options[selection.index]);

	if !click_option(page, &config.selectors.option, selection.index).await? {
		elog!("Option {} could not be clicked", selection.index + 1);
		return Ok(false);
	}
	tokio::time::sleep(Duration::from_secs(2)).await;

	if !click_selector(page, &config.selectors.submit).await? {
		elog!("Submit button not found");
		return Ok(false);
	}
	log!("Answer submitted");
	tokio::time::sleep(Duration::from_secs(3)).await;

	let verdict = check_result(page).await.unwrap_or_else(|e| {
		elog!("Failed to read result: {}", e);
		None
	});
	match verdict {
		Some(true) => log!("Correct!"),
		Some(false) => log!("Incorrect"),
		None => log!("Could not tell whether the answer was correct"),
	}
	stats.record_submission(verdict.unwrap_or(false));

	Ok(true)
}

/// Scrape passage, question and non-empty option texts. `None` if passage or question is missing.
async fn scrape_round(page: &Page, selectors: &Selectors) -> Result<Option<Round>> {
	let script = format!(
		r#"
		(function() {{
			const passage = document.querySelector({passage});
			const question = document.querySelector({question});
			if (!passage || !question) return null;
			const options = Array.from(document.querySelectorAll({option}))
				.map(el => (el.innerText || el.textContent || '').trim())
				.filter(text => text.length > 0);
			return JSON.stringify({{
				article: (passage.innerText || passage.textContent || '').trim(),
				question: (question.innerText || question.textContent || '').trim(),
				options: options
			}});
		}})()
		"#,
		passage = js_string(&selectors.passage),
		question = js_string(&selectors.question),
		option = js_string(&selectors.option),
	);

	let result = page.evaluate(script).await.map_err(|e| eyre!("Failed to scrape round: {}", e))?;
	let Some(json_str) = result.value().and_then(|v| v.as_str()) else {
		return Ok(None);
	};
	let round: Round = serde_json::from_str(json_str).map_err(|e| eyre!("Failed to parse scraped round: {}", e))?;
	Ok(Some(round))
}

/// Click the `idx`-th non-empty option, counting the same way `scrape_round` does
async fn click_option(page: &Page, option_selector: &str, idx: usize) -> Result<bool> {
	let script = format!(
		r#"
		(function() {{
			const options = Array.from(document.querySelectorAll({sel}))
				.filter(el => (el.innerText || el.textContent || '').trim().length > 0);
			const target = options[{idx}];
			if (!target) return false;
			target.scrollIntoView({{ block: 'center' }});
			target.click();
			return true;
		}})()
		"#,
		sel = js_string(option_selector),
	);
	let result = page.evaluate(script).await.map_err(|e| eyre!("Failed to click option: {}", e))?;
	Ok(result.value().and_then(|v| v.as_bool()).unwrap_or(false))
}

async fn click_selector(page: &Page, selector: &str) -> Result<bool> {
	let script = format!(
		r#"
		(function() {{
			const el = document.querySelector({sel});
			if (!el) return false;
			el.click();
			return true;
		}})()
		"#,
		sel = js_string(selector),
	);
	let result = page.evaluate(script).await.map_err(|e| eyre!("Failed to click {}: {}", selector, e))?;
	Ok(result.value().and_then(|v| v.as_bool()).unwrap_or(false))
}

/// `Some(true)` correct, `Some(false)` incorrect, `None` if the page does not say
async fn check_result(page: &Page) -> Result<Option<bool>> {
	let script = r#"
		(function() {
			const text = (document.body && document.body.innerText || '').toLowerCase();
			if (text.includes('incorrect') || text.includes('wrong answer')) return 'incorrect';
			if (text.includes('correct')) return 'correct';
			const marked = Array.from(document.querySelectorAll('[class*="correct"]'))
				.filter(el => !el.className.toString().includes('incorrect'));
			if (marked.length > 0) return 'correct';
			return null;
		})()
	"#;
	let result = page.evaluate(script).await.map_err(|e| eyre!("Failed to check result: {}", e))?;
	Ok(result.value().and_then(|v| v.as_str()).and_then(parse_verdict))
}

fn parse_verdict(verdict: &str) -> Option<bool> {
	match verdict {
		"correct" => Some(true),
		"incorrect" => Some(false),
		_ => None,
	}
}

async fn reload(page: &Page) -> Result<()> {
	page.evaluate("location.reload()").await.map_err(|e| eyre!("Failed to reload page: {}", e))?;
	tokio::time::sleep(Duration::from_secs(3)).await;
	Ok(())
}

/// Randomized pause between rounds, uniform in `[min_delay_secs, max_delay_secs]`
pub fn round_delay(config: &AppConfig) -> Duration {
	if config.max_delay_secs <= config.min_delay_secs {
		return Duration::from_secs_f64(config.min_delay_secs.max(0.0));
	}
	Duration::from_secs_f64(rand::random_range(config.min_delay_secs..=config.max_delay_secs))
}

/// Sleep for `duration` unless cancelled first. Returns true if cancelled.
async fn pause(duration: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
	tokio::select! {
		_ = tokio::time::sleep(duration) => false,
		stopped = cancel.wait_for(|stop| *stop) => stopped.is_ok(),
	}
}

pub fn format_usage(stats: &SessionStats) -> String {
	let usage = stats.method_usage();
	if usage.is_empty() {
		return "none".to_string();
	}
	usage.iter().map(|(method, n)| format!("{method}: {n}")).collect::<Vec<_>>().join(", ")
}

/// Save the current page's HTML to disk for debugging
/// Uses the page URL as the filename label
#[cfg(feature = "xdg")]
pub async fn save_page_html(page: &Page, session_id: &str) -> Result<PathBuf> {
	let html_dir = xdg_state_dir!("persist_htmls").join(session_id);
	std::fs::create_dir_all(&html_dir).map_err(|e| eyre!("Failed to create HTML dir: {}", e))?;

	let url = page.url().await.ok().flatten().unwrap_or_default();
	let label = url.replace("https://", "").replace("http://", "");

	let html = page.evaluate("document.documentElement.outerHTML").await.map_err(|e| eyre!("Failed to get page HTML: {}", e))?;
	let html_str = html.value().and_then(|v| v.as_str()).unwrap_or("<html></html>");

	let timestamp = chrono::Utc::now().timestamp();
	let safe_label: String = label.chars().map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect();

	let filepath = html_dir.join(format!("{}_{}.html", timestamp, safe_label));
	std::fs::write(&filepath, html_str).map_err(|e| eyre!("Failed to write HTML file: {}", e))?;

	log!("Saved page HTML to: {}", filepath.display());
	Ok(filepath)
}
