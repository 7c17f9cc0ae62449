// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP client with consistent User-Agent header.

use reqwest::{Client, ClientBuilder};

const SDK_NAME: &str = "feato-rust";
const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Creates a new HTTP client builder with the standard Feato User-Agent header.
///
/// # Example
/// ```ignore
/// let client = feato_common_http::builder()
///     .timeout(Duration::from_secs(30))
///     .build()?;
/// ```
pub fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

/// Creates a new HTTP client with the standard Feato User-Agent header and no
/// other settings.
pub fn new_client() -> reqwest::Result<Client> {
	builder().build()
}

/// Creates a new HTTP client builder with a custom User-Agent header.
pub fn builder_with_user_agent(user_agent: impl Into<String>) -> ClientBuilder {
	Client::builder().user_agent(user_agent.into())
}

/// Returns the standard Feato User-Agent string.
///
/// Format: `feato-rust/{version} ({os}-{arch})`
pub fn user_agent() -> String {
	format!(
		"{SDK_NAME}/{SDK_VERSION} ({}-{})",
		std::env::consts::OS,
		std::env::consts::ARCH
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn user_agent_has_correct_format() {
		let ua = user_agent();
		assert!(ua.starts_with("feato-rust/"));
		assert!(ua.contains(SDK_VERSION));
		assert!(ua.ends_with(')'));
	}

	#[test]
	fn user_agent_names_platform() {
		let ua = user_agent();
		let platform = format!("({}-{})", std::env::consts::OS, std::env::consts::ARCH);
		assert_eq!(ua, format!("feato-rust/{SDK_VERSION} {platform}"));
	}

	#[test]
	fn new_client_builds() {
		assert!(new_client().is_ok());
	}

	#[test]
	fn builder_with_custom_user_agent() {
		let client = builder_with_user_agent("my-custom-agent/1.0").build();
		assert!(client.is_ok());
	}

	#[test]
	fn default_builder_builds() {
		assert!(builder().build().is_ok());
	}
}
