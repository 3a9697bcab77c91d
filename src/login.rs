use std::io::BufRead;

use chromiumoxide::Page;
use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use v_utils::log;

use crate::config::AppConfig;

/// Open the login page, submit credentials and check we landed somewhere that looks logged in
pub async fn login(page: &Page, config: &AppConfig) -> Result<()> {
	log!("Logging in at {}...", config.login_url);
	page.goto(&config.login_url).await.map_err(|e| eyre!("Failed to navigate to login page: {}", e))?;
	tokio::time::sleep(tokio::time::Duration::from_secs(3)).await;

	if !fill_and_submit_login_form(page, config).await? {
		return Err(eyre!("Login form not found (selectors: {}, {})", config.selectors.username_field, config.selectors.password_field));
	}
	tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

	let final_url = page.url().await.ok().flatten().unwrap_or_default();
	if is_logged_in(&final_url, &config.login_success_markers) {
		log!("Login successful, now at: {}", final_url);
		return Ok(());
	}

	let error_shown = page
		.evaluate(
			r#"
			(function() {
				const text = (document.body && document.body.innerText || '').toLowerCase();
				return ['invalid', 'incorrect', 'error'].some(w => text.includes(w));
			})()
		"#,
		)
		.await
		.ok()
		.and_then(|r| r.value().and_then(|v| v.as_bool()))
		.unwrap_or(false);

	if error_shown {
		return Err(eyre!("Login failed: the site rejected the credentials (at {})", final_url));
	}

	// no marker but no error either; the site may just redirect somewhere unexpected
	log!("Could not verify login from URL {}, continuing anyway", final_url);
	Ok(())
}

pub fn is_logged_in(url: &str, markers: &[String]) -> bool {
	markers.iter().any(|m| url.contains(m.as_str()))
}

/// Fill username/password and submit the login form. Returns false if the fields are missing.
async fn fill_and_submit_login_form(page: &Page, config: &AppConfig) -> Result<bool> {
	let fill_script = format!(
		r#"
		(function() {{
			const usernameField = document.querySelector({user_sel});
			const passwordField = document.querySelector({pass_sel});
			if (usernameField && passwordField) {{
				usernameField.value = {username};
				passwordField.value = {password};
				usernameField.dispatchEvent(new Event('input', {{ bubbles: true }}));
				passwordField.dispatchEvent(new Event('input', {{ bubbles: true }}));
				return true;
			}}
			return false;
		}})()
		"#,
		user_sel = js_string(&config.selectors.username_field),
		pass_sel = js_string(&config.selectors.password_field),
		username = js_string(&config.username),
		password = js_string(&config.password),
	);
	let filled = page.evaluate(fill_script).await.map_err(|e| eyre!("Failed to fill login form: {}", e))?;
	if !filled.value().and_then(|v| v.as_bool()).unwrap_or(false) {
		return Ok(false);
	}

	let submit_script = format!(
		r#"
		(function() {{
			const submitButton = document.querySelector({button_sel});
			if (submitButton) {{
				submitButton.click();
				return true;
			}}
			const form = document.querySelector('form');
			if (form) {{
				form.submit();
				return true;
			}}
			return false;
		}})()
		"#,
		button_sel = js_string(&config.selectors.login_button),
	);
	page.evaluate(submit_script).await.map_err(|e| eyre!("Failed to submit login form: {}", e))?;

	Ok(true)
}

/// Ask for whichever credential the config left empty. `read_password` is expected not to echo.
pub fn fill_missing_credentials(config: &mut AppConfig, input: &mut impl BufRead, read_password: impl FnOnce() -> std::io::Result<String>) -> Result<()> {
	if config.username.trim().is_empty() {
		eprint!("Username: ");
		let mut line = String::new();
		input.read_line(&mut line).map_err(|e| eyre!("Failed to read username: {}", e))?;
		config.username = line.trim().to_string();
	}
	if config.password.is_empty() {
		let password = read_password().map_err(|e| eyre!("Failed to read password: {}", e))?;
		config.password = password.trim_end_matches(['\r', '\n']).to_string();
	}
	if config.username.is_empty() || config.password.is_empty() {
		bail!("Username and password are required");
	}
	Ok(())
}

/// Quote `s` as a JS string literal
pub fn js_string(s: &str) -> String {
	serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}
