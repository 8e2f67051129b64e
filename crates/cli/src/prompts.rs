//! Interactive prompts for the human-in-the-loop inputs.
//!
//! Each prompt blocks until the operator answers; no timeout applies to
//! human input points.

use std::path::PathBuf;

use dialoguer::Input;

/// CAPTCHA challenge page the operator solves to obtain a token.
pub const CAPTCHA_URL: &str = "https://signalcaptchas.org/registration/generate.html";

pub fn phone_number() -> anyhow::Result<String> {
	let raw: String = Input::new()
		.with_prompt("Phone number (E.164, including country code, e.g. +49...)")
		.interact_text()?;
	Ok(normalize_number(&raw))
}

pub fn captcha_token() -> anyhow::Result<String> {
	let token: String = Input::new()
		.with_prompt("Paste the CAPTCHA token (the link the challenge page offers to open in the app)")
		.interact_text()?;
	Ok(token.trim().to_string())
}

pub fn verification_code() -> anyhow::Result<String> {
	let code: String = Input::new().with_prompt("Verification code you received").interact_text()?;
	Ok(code.trim().to_string())
}

pub fn screenshot_path() -> anyhow::Result<PathBuf> {
	let raw: String = Input::new()
		.with_prompt("Path to the screenshot of the desktop client's QR code")
		.interact_text()?;
	// Shells and file managers like to quote dragged-in paths.
	Ok(PathBuf::from(raw.trim().trim_matches('"')))
}

pub fn device_name() -> anyhow::Result<String> {
	let name: String = Input::new()
		.with_prompt("Device display name")
		.default("Desktop".to_string())
		.interact_text()?;
	Ok(name.trim().to_string())
}

/// E.164 numbers start with `+`; prepend it when the operator leaves it off.
pub fn normalize_number(raw: &str) -> String {
	let trimmed = raw.trim();
	if trimmed.starts_with('+') {
		trimmed.to_string()
	} else {
		format!("+{trimmed}")
	}
}
