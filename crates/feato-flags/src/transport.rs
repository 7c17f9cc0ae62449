// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Streaming transport for flag updates.
//!
//! A transport opens the hub's update stream and yields raw message payloads.
//! The stream ending, or yielding an `Err`, means the connection failed; the
//! connection manager decides what happens next.

use std::fmt;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use feato_flags_core::{ClientConfig, PROTOCOL_VERSION};
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracing::debug;

use crate::error::{FlagsError, Result};

/// Message payloads from an open stream.
pub type MessageStream = BoxStream<'static, Result<String>>;

/// Parameters for opening the update stream.
#[derive(Clone)]
pub struct StreamRequest {
	pub base_url: String,
	pub project_key: String,
	pub environment: String,
	pub version: u32,
}

impl StreamRequest {
	pub fn new(base_url: impl Into<String>, config: &ClientConfig) -> Self {
		Self {
			base_url: base_url.into(),
			project_key: config.project_key().to_string(),
			environment: config.environment().to_string(),
			version: PROTOCOL_VERSION,
		}
	}

	/// Endpoint URL without query parameters.
	pub fn url(&self) -> String {
		format!("{}/hub", self.base_url)
	}

	pub fn query(&self) -> Vec<(&'static str, String)> {
		vec![
			("secret", self.project_key.clone()),
			("environment", self.environment.clone()),
			("version", self.version.to_string()),
		]
	}
}

impl fmt::Debug for StreamRequest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StreamRequest")
			.field("base_url", &self.base_url)
			.field("project_key", &"[REDACTED]")
			.field("environment", &self.environment)
			.field("version", &self.version)
			.finish()
	}
}

/// Opens a server-push stream of flag messages.
#[async_trait]
pub trait StreamTransport: Send + Sync {
	async fn open(&self, request: &StreamRequest) -> Result<MessageStream>;
}

/// Server-Sent Events transport over `reqwest`.
#[derive(Debug, Clone)]
pub struct SseTransport {
	http: reqwest::Client,
}

impl SseTransport {
	/// Wraps an existing client. It must not carry a request timeout, or the
	/// stream would be cut after that long.
	pub fn new(http: reqwest::Client) -> Self {
		Self { http }
	}

	pub fn with_default_client() -> Result<Self> {
		Ok(Self::new(feato_common_http::new_client()?))
	}
}

#[async_trait]
impl StreamTransport for SseTransport {
	async fn open(&self, request: &StreamRequest) -> Result<MessageStream> {
		let response = self
			.http
			.get(request.url())
			.query(&request.query())
			.header(ACCEPT, "text/event-stream")
			.header(CACHE_CONTROL, "no-cache")
			.send()
			.await?;

		let status = response.status();
		if !status.is_success() {
			return Err(FlagsError::ServerError {
				status: status.as_u16(),
				message: response.text().await.unwrap_or_default(),
			});
		}

		let messages = response
			.bytes_stream()
			.eventsource()
			.filter_map(|item| async move {
				match item {
					// Only unnamed ("message") events carry flag updates.
					Ok(event) if event.event != "message" && !event.event.is_empty() => {
						debug!(event_type = %event.event, "Ignoring named SSE event");
						None
					}
					Ok(event) if event.data.is_empty() => None,
					Ok(event) => Some(Ok(event.data)),
					Err(e) => Some(Err(FlagsError::StreamError(e.to_string()))),
				}
			})
			.boxed();

		Ok(messages)
	}
}
