// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the flags SDK.

use feato_flags_core::CoreError;
use thiserror::Error;

/// Flags SDK errors.
///
/// Only snapshot loading and client construction surface errors to the
/// application. Streaming failures are logged and recovered internally.
#[derive(Debug, Error)]
pub enum FlagsError {
	/// Project key or environment rejected.
	#[error("invalid client configuration: {0}")]
	InvalidConfig(#[source] CoreError),

	/// Base URL is missing or not an http(s) URL.
	#[error("invalid base URL: {0}")]
	InvalidBaseUrl(String),

	/// The snapshot endpoint answered with a non-success status.
	#[error("snapshot load failed ({status}): {message}")]
	SnapshotLoad { status: u16, message: String },

	/// The snapshot body could not be decoded.
	#[error("invalid snapshot body: {0}")]
	InvalidSnapshot(String),

	/// HTTP request failed before a response was received.
	#[error("HTTP request failed: {0}")]
	RequestFailed(#[from] reqwest::Error),

	/// The streaming endpoint refused the connection.
	#[error("server error ({status}): {message}")]
	ServerError { status: u16, message: String },

	/// The stream broke after it was established.
	#[error("stream error: {0}")]
	StreamError(String),

	/// A streamed message could not be decoded.
	#[error("malformed message: {0}")]
	MalformedMessage(#[source] CoreError),
}

impl From<CoreError> for FlagsError {
	fn from(err: CoreError) -> Self {
		match err {
			CoreError::InvalidProjectKey | CoreError::InvalidEnvironment => FlagsError::InvalidConfig(err),
			CoreError::MalformedMessage(_) => FlagsError::MalformedMessage(err),
			CoreError::MalformedSnapshot(msg) => FlagsError::InvalidSnapshot(msg),
		}
	}
}

/// Result type alias for flags operations.
pub type Result<T> = std::result::Result<T, FlagsError>;
