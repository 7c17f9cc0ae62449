// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! One-shot fetch of the full flag table.

use feato_flags_core::{ClientConfig, FlagTable, SnapshotResponse};
use reqwest::Client;
use tracing::{debug, info};

use crate::error::{FlagsError, Result};

/// Fetches the flag snapshot that bootstraps the cache.
///
/// There is no retry here. A failed load is returned to the caller of `init`.
#[derive(Debug, Clone)]
pub struct SnapshotLoader {
	http: Client,
	base_url: String,
}

impl SnapshotLoader {
	pub fn new(http: Client, base_url: impl Into<String>) -> Self {
		Self {
			http,
			base_url: base_url.into(),
		}
	}

	pub fn url(&self) -> String {
		format!("{}/feature-flag", self.base_url)
	}

	/// Issues `GET {base}/feature-flag?secret=..&environment=..`.
	pub async fn load(&self, config: &ClientConfig) -> Result<FlagTable> {
		let url = self.url();
		debug!(url = %url, environment = %config.environment(), "Fetching flag snapshot");

		let response = self
			.http
			.get(&url)
			.query(&[
				("secret", config.project_key()),
				("environment", config.environment()),
			])
			.send()
			.await?;

		let status = response.status();
		if !status.is_success() {
			return Err(FlagsError::SnapshotLoad {
				status: status.as_u16(),
				message: status.canonical_reason().unwrap_or("unknown status").to_string(),
			});
		}

		let body = response.text().await?;
		let table = SnapshotResponse::parse(&body)?.into_table();

		info!(flags = table.len(), environment = %config.environment(), "Flag snapshot loaded");
		Ok(table)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn url_targets_feature_flag_endpoint() {
		let loader = SnapshotLoader::new(Client::new(), "https://hub.example.com/v1");
		assert_eq!(loader.url(), "https://hub.example.com/v1/feature-flag");
	}
}
