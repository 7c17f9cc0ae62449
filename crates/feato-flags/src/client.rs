// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Feato client: snapshot bootstrap plus streamed updates behind one handle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use feato_flags_core::{ClientConfig, FlagTable};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::cache::{FlagCache, FlagsListener, InitializedListener};
use crate::error::{FlagsError, Result};
use crate::snapshot::SnapshotLoader;
use crate::stream::{ConnectionState, StreamConfig, StreamConnection};
use crate::subscribers::Subscription;
use crate::transport::{SseTransport, StreamRequest, StreamTransport};

/// Hosted hub used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://feato-hub-service-229218510057.us-central1.run.app/v1";

/// SDK version for identification.
const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
/// SDK name for identification.
const SDK_NAME: &str = "feato-rust";

/// Builder for constructing a [`FeatoClient`].
pub struct FeatoClientBuilder {
	project_key: Option<String>,
	environment: Option<String>,
	base_url: Option<String>,
	request_timeout: Option<Duration>,
	user_agent: Option<String>,
	streaming: bool,
	stream_config: StreamConfig,
	transport: Option<Arc<dyn StreamTransport>>,
}

impl FeatoClientBuilder {
	/// Creates a new builder with default settings.
	pub fn new() -> Self {
		Self {
			project_key: None,
			environment: None,
			base_url: None,
			request_timeout: None,
			user_agent: None,
			streaming: true,
			stream_config: StreamConfig::default(),
			transport: None,
		}
	}

	/// Sets the project secret.
	pub fn project_key(mut self, key: impl Into<String>) -> Self {
		self.project_key = Some(key.into());
		self
	}

	/// Sets the environment name.
	///
	/// Example: `production`, `staging`, `development`
	pub fn environment(mut self, env: impl Into<String>) -> Self {
		self.environment = Some(env.into());
		self
	}

	/// Takes project key and environment from an existing config.
	pub fn config(mut self, config: ClientConfig) -> Self {
		self.project_key = Some(config.project_key().to_string());
		self.environment = Some(config.environment().to_string());
		self
	}

	/// Sets the hub base URL, e.g. `https://flags.example.com/v1`.
	pub fn base_url(mut self, url: impl Into<String>) -> Self {
		self.base_url = Some(url.into());
		self
	}

	/// Sets a timeout for the snapshot request. Unset by default.
	///
	/// The update stream is long-lived and never gets a timeout.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = Some(timeout);
		self
	}

	/// Overrides the `feato-rust/{version} ({os}-{arch})` User-Agent on snapshot
	/// and stream requests.
	pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = Some(user_agent.into());
		self
	}

	/// Enables or disables streamed updates. With streaming off, flags keep their
	/// snapshot values.
	pub fn streaming(mut self, enabled: bool) -> Self {
		self.streaming = enabled;
		self
	}

	/// Sets reconnection timing.
	pub fn stream_config(mut self, config: StreamConfig) -> Self {
		self.stream_config = config;
		self
	}

	/// Replaces the default SSE transport.
	pub fn transport(mut self, transport: Arc<dyn StreamTransport>) -> Self {
		self.transport = Some(transport);
		self
	}

	/// Builds the client. No network traffic happens until [`FeatoClient::init`].
	pub fn build(self) -> Result<FeatoClient> {
		let config = ClientConfig::new(
			self.project_key.unwrap_or_default(),
			self.environment.unwrap_or_default(),
		)?;
		let base_url = normalize_base_url(self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))?;

		let http_builder = || match &self.user_agent {
			Some(user_agent) => feato_common_http::builder_with_user_agent(user_agent.as_str()),
			None => feato_common_http::builder(),
		};

		let mut http = http_builder();
		if let Some(timeout) = self.request_timeout {
			http = http.timeout(timeout);
		}
		let loader = SnapshotLoader::new(http.build()?, base_url.clone());

		let transport: Arc<dyn StreamTransport> = match (self.transport, &self.user_agent) {
			(Some(transport), _) => transport,
			(None, Some(_)) => Arc::new(SseTransport::new(http_builder().build()?)),
			(None, None) => Arc::new(SseTransport::with_default_client()?),
		};

		info!(
			base_url = %base_url,
			environment = %config.environment(),
			streaming = self.streaming,
			sdk_name = SDK_NAME,
			sdk_version = SDK_VERSION,
			"Feato client initialized"
		);

		Ok(FeatoClient {
			inner: Arc::new(FeatoClientInner {
				config,
				base_url,
				loader,
				transport,
				streaming: self.streaming,
				stream_config: self.stream_config,
				cache: FlagCache::new(),
				stream: StreamConnection::new(),
				init_lock: AsyncMutex::new(()),
			}),
		})
	}
}

impl Default for FeatoClientBuilder {
	fn default() -> Self {
		Self::new()
	}
}

fn normalize_base_url(url: &str) -> Result<String> {
	let trimmed = url.trim().trim_end_matches('/');
	let rest = trimmed
		.strip_prefix("https://")
		.or_else(|| trimmed.strip_prefix("http://"));

	match rest {
		Some(host) if !host.is_empty() => Ok(trimmed.to_string()),
		_ => Err(FlagsError::InvalidBaseUrl(url.to_string())),
	}
}

/// Internal client state.
struct FeatoClientInner {
	config: ClientConfig,
	base_url: String,
	loader: SnapshotLoader,
	transport: Arc<dyn StreamTransport>,
	streaming: bool,
	stream_config: StreamConfig,
	cache: FlagCache,
	stream: StreamConnection,
	init_lock: AsyncMutex<()>,
}

/// Client that keeps a local flag table in sync with the hub.
///
/// Construct it once and share it; clones are cheap and refer to the same
/// table, subscribers and stream.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use feato_flags::{FeatoClient, FlagTable};
///
/// let client = FeatoClient::builder()
///     .project_key("proj_xxx")
///     .environment("production")
///     .build()?;
///
/// client.init().await?;
///
/// let sub = client.subscribe_flags(Arc::new(|flags: &FlagTable| {
///     println!("dark_mode = {}", flags.is_enabled("dark_mode"));
/// }));
///
/// // ...
///
/// sub.unsubscribe();
/// client.disconnect();
/// ```
#[derive(Clone)]
pub struct FeatoClient {
	inner: Arc<FeatoClientInner>,
}

impl FeatoClient {
	/// Creates a new builder for constructing a FeatoClient.
	pub fn builder() -> FeatoClientBuilder {
		FeatoClientBuilder::new()
	}

	/// Creates a client against the default hub.
	pub fn new(config: ClientConfig) -> Result<Self> {
		Self::builder().config(config).build()
	}

	/// Current flag table.
	pub fn flags(&self) -> Arc<FlagTable> {
		self.inner.cache.flags()
	}

	/// Value of a single flag, or `None` if the hub doesn't know the key.
	pub fn flag(&self, key: &str) -> Option<bool> {
		self.inner.cache.get(key)
	}

	pub fn is_initialized(&self) -> bool {
		self.inner.cache.is_initialized()
	}

	/// Loads the flag snapshot, then starts streaming updates.
	///
	/// Does nothing once initialized. Concurrent callers wait for the first one,
	/// so the snapshot is fetched once. On failure the client stays uninitialized
	/// and `init` may be called again.
	pub async fn init(&self) -> Result<()> {
		if self.is_initialized() {
			return Ok(());
		}

		let _guard = self.inner.init_lock.lock().await;
		if self.is_initialized() {
			debug!("Feato client already initialized");
			return Ok(());
		}

		let table = self
			.inner
			.loader
			.load(&self.inner.config)
			.await
			.inspect_err(|e| warn!(error = %e, "Flag snapshot load failed"))?;

		self.inner.cache.load_snapshot(table);
		self.connect();
		Ok(())
	}

	/// Starts the update stream if it isn't running.
	///
	/// `init` calls this. Call it directly to resume streaming after
	/// [`FeatoClient::disconnect`]. Returns true if a stream task is running
	/// afterwards.
	pub fn connect(&self) -> bool {
		if !self.is_initialized() {
			debug!("Not connecting flag stream before init");
			return false;
		}
		if !self.inner.streaming {
			debug!("Streaming disabled, serving snapshot values only");
			return false;
		}

		let request = StreamRequest::new(self.inner.base_url.clone(), &self.inner.config);
		self.inner.stream.start(
			Arc::clone(&self.inner.transport),
			request,
			self.inner.cache.clone(),
			self.inner.stream_config.clone(),
		)
	}

	/// Closes the update stream and cancels any pending reconnect.
	///
	/// Safe to call at any time, any number of times, including before `init`.
	/// Flags and subscribers are kept.
	pub fn disconnect(&self) {
		if self.inner.stream.stop() {
			info!("Disconnected from flag stream");
		}
	}

	/// Registers a listener for flag table changes.
	///
	/// The listener is called right away with the current table, then after every
	/// change. Subscribing the same `Arc` twice registers it once.
	pub fn subscribe_flags(&self, listener: FlagsListener) -> Subscription {
		self.inner.cache.subscribe_flags(listener)
	}

	/// Registers a listener for the initialized state, called right away with
	/// the current value.
	pub fn subscribe_initialized(&self, listener: InitializedListener) -> Subscription {
		self.inner.cache.subscribe_initialized(listener)
	}

	pub fn connection_state(&self) -> ConnectionState {
		self.inner.stream.state()
	}

	pub fn reconnect_attempts(&self) -> u64 {
		self.inner.stream.reconnect_attempts()
	}

	pub fn events_received(&self) -> u64 {
		self.inner.stream.events_received()
	}

	pub fn config(&self) -> &ClientConfig {
		&self.inner.config
	}

	pub fn base_url(&self) -> &str {
		&self.inner.base_url
	}
}

impl fmt::Debug for FeatoClient {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FeatoClient")
			.field("config", &self.inner.config)
			.field("base_url", &self.inner.base_url)
			.field("initialized", &self.is_initialized())
			.field("state", &self.connection_state())
			.finish()
	}
}
