// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;

use crate::error::{CoreError, Result};

/// Project credential and environment for a single client instance.
///
/// One client serves exactly one project/environment pair. The values are fixed
/// once the config is built.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
	project_key: String,
	environment: String,
}

impl ClientConfig {
	/// Creates a validated config.
	///
	/// Both values must be non-empty after trimming whitespace.
	pub fn new(project_key: impl Into<String>, environment: impl Into<String>) -> Result<Self> {
		let project_key = project_key.into();
		let environment = environment.into();

		if project_key.trim().is_empty() {
			return Err(CoreError::InvalidProjectKey);
		}
		if environment.trim().is_empty() {
			return Err(CoreError::InvalidEnvironment);
		}

		Ok(Self {
			project_key,
			environment,
		})
	}

	/// The project secret sent as the `secret` query parameter.
	pub fn project_key(&self) -> &str {
		&self.project_key
	}

	pub fn environment(&self) -> &str {
		&self.environment
	}
}

impl fmt::Debug for ClientConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ClientConfig")
			.field("project_key", &"[REDACTED]")
			.field("environment", &self.environment)
			.finish()
	}
}
