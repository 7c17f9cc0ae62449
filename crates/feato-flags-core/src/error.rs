// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
	#[error("invalid project key: must not be empty")]
	InvalidProjectKey,

	#[error("invalid environment: must not be empty")]
	InvalidEnvironment,

	#[error("malformed flag event: {0}")]
	MalformedMessage(String),

	#[error("malformed snapshot: {0}")]
	MalformedSnapshot(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
