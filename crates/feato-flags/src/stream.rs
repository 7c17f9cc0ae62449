// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stream connection manager for real-time flag updates.
//!
//! One background task owns both the live stream and, after a failure, the pending
//! reconnect sleep. The two are never alive at the same time, and stopping the
//! task cancels whichever one exists.
//!
//! ```text
//! Disconnected ──start──► Connecting ──open ok──► Connected
//!      ▲                     ▲    │                  │
//!      │ stop                │    │ open failed      │ stream ended / errored
//!      │                     │    ▼                  ▼
//!      └──────────────── ReconnectScheduled { attempt, delay } ◄┘
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use feato_flags_core::FeatureFlagEvent;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backoff::ReconnectPolicy;
use crate::cache::FlagCache;
use crate::error::{FlagsError, Result};
use crate::transport::{MessageStream, StreamRequest, StreamTransport};

/// Connection lifecycle as seen from outside the stream task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	/// No stream task is running.
	Disconnected,
	/// Opening the stream.
	Connecting,
	/// Stream is open and delivering messages.
	Connected,
	/// Waiting `delay` before reconnection attempt number `attempt`.
	ReconnectScheduled { attempt: u32, delay: Duration },
}

impl fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConnectionState::Disconnected => write!(f, "disconnected"),
			ConnectionState::Connecting => write!(f, "connecting"),
			ConnectionState::Connected => write!(f, "connected"),
			ConnectionState::ReconnectScheduled { attempt, delay } => {
				write!(f, "reconnect #{attempt} in {}ms", delay.as_millis())
			}
		}
	}
}

/// Reconnection timing for the stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
	/// Delay before the first reconnection attempt.
	pub reconnect_base_delay: Duration,
	/// Upper bound for any reconnection delay.
	pub reconnect_max_delay: Duration,
}

impl StreamConfig {
	pub fn policy(&self) -> ReconnectPolicy {
		ReconnectPolicy::new(self.reconnect_base_delay, self.reconnect_max_delay)
	}
}

impl Default for StreamConfig {
	fn default() -> Self {
		Self {
			reconnect_base_delay: Duration::from_secs(1),
			reconnect_max_delay: Duration::from_secs(30),
		}
	}
}

#[derive(Debug)]
struct StreamStats {
	state: Mutex<ConnectionState>,
	reconnect_attempts: AtomicU64,
	events_received: AtomicU64,
}

/// A running stream task and the flag that fences it off after `stop`.
struct RunningStream {
	handle: JoinHandle<()>,
	cancelled: Arc<AtomicBool>,
	cache: FlagCache,
}

impl RunningStream {
	fn cancel(self) {
		{
			// Waits out any event that is being applied right now.
			let _dispatch = self.cache.dispatch_lock();
			self.cancelled.store(true, Ordering::SeqCst);
		}
		self.handle.abort();
	}
}

/// Manages the long-lived update stream.
pub struct StreamConnection {
	stats: Arc<StreamStats>,
	running: Mutex<Option<RunningStream>>,
}

impl StreamConnection {
	pub fn new() -> Self {
		Self {
			stats: Arc::new(StreamStats {
				state: Mutex::new(ConnectionState::Disconnected),
				reconnect_attempts: AtomicU64::new(0),
				events_received: AtomicU64::new(0),
			}),
			running: Mutex::new(None),
		}
	}

	/// Starts the stream task on the current Tokio runtime.
	///
	/// Does nothing if a task is already running. Returns false, without failing,
	/// when there is no runtime to run the stream on; the flags then stay at their
	/// snapshot values.
	pub fn start(
		&self,
		transport: Arc<dyn StreamTransport>,
		request: StreamRequest,
		cache: FlagCache,
		config: StreamConfig,
	) -> bool {
		let mut running = self.running.lock();
		if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
			debug!("Flag stream already running");
			return true;
		}

		let runtime = match Handle::try_current() {
			Ok(runtime) => runtime,
			Err(_) => {
				warn!("No async runtime available, flag streaming disabled");
				return false;
			}
		};

		let cancelled = Arc::new(AtomicBool::new(false));
		*self.stats.state.lock() = ConnectionState::Connecting;

		let handle = runtime.spawn(run_stream_loop(
			transport,
			request,
			cache.clone(),
			config,
			Arc::clone(&self.stats),
			Arc::clone(&cancelled),
		));

		*running = Some(RunningStream {
			handle,
			cancelled,
			cache,
		});
		true
	}

	/// Stops the stream task, closing the live stream or cancelling the pending
	/// reconnect. Returns false if nothing was running.
	pub fn stop(&self) -> bool {
		// Released before cancelling: a flag listener may call `stop` while the
		// stream task holds the dispatch lock.
		let running = self.running.lock().take();

		let stopped = match running {
			Some(running) => {
				running.cancel();
				true
			}
			None => false,
		};
		*self.stats.state.lock() = ConnectionState::Disconnected;
		stopped
	}

	pub fn is_running(&self) -> bool {
		self
			.running
			.lock()
			.as_ref()
			.is_some_and(|r| !r.handle.is_finished())
	}

	pub fn state(&self) -> ConnectionState {
		*self.stats.state.lock()
	}

	/// Number of reconnections scheduled since this manager was created.
	pub fn reconnect_attempts(&self) -> u64 {
		self.stats.reconnect_attempts.load(Ordering::SeqCst)
	}

	/// Number of events applied to the cache since this manager was created.
	pub fn events_received(&self) -> u64 {
		self.stats.events_received.load(Ordering::SeqCst)
	}
}

impl Default for StreamConnection {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for StreamConnection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StreamConnection")
			.field("state", &self.state())
			.field("reconnect_attempts", &self.reconnect_attempts())
			.field("events_received", &self.events_received())
			.finish()
	}
}

impl Drop for StreamConnection {
	fn drop(&mut self) {
		if let Some(running) = self.running.get_mut().take() {
			running.cancelled.store(true, Ordering::SeqCst);
			running.handle.abort();
		}
	}
}

fn set_state(stats: &StreamStats, cancelled: &AtomicBool, state: ConnectionState) {
	let mut current = stats.state.lock();
	if !cancelled.load(Ordering::SeqCst) {
		*current = state;
	}
}

/// Reports `Disconnected` if the stream task ends for any reason other than `stop`.
struct ExitGuard {
	stats: Arc<StreamStats>,
	cancelled: Arc<AtomicBool>,
}

impl Drop for ExitGuard {
	fn drop(&mut self) {
		set_state(&self.stats, &self.cancelled, ConnectionState::Disconnected);
	}
}

/// Runs the stream with reconnection until the task is aborted.
async fn run_stream_loop(
	transport: Arc<dyn StreamTransport>,
	request: StreamRequest,
	cache: FlagCache,
	config: StreamConfig,
	stats: Arc<StreamStats>,
	cancelled: Arc<AtomicBool>,
) {
	let _exit = ExitGuard {
		stats: Arc::clone(&stats),
		cancelled: Arc::clone(&cancelled),
	};
	let mut policy = config.policy();

	loop {
		set_state(&stats, &cancelled, ConnectionState::Connecting);
		info!(url = %request.url(), environment = %request.environment, "Connecting to flag stream");

		match transport.open(&request).await {
			Ok(messages) => {
				set_state(&stats, &cancelled, ConnectionState::Connected);
				info!("Flag stream connected");

				match consume_stream(messages, &cache, &mut policy, &stats, &cancelled).await {
					Ok(()) => warn!("Flag stream closed"),
					Err(e) => warn!(error = %e, "Flag stream failed"),
				}
			}
			Err(e) => warn!(error = %e, "Failed to open flag stream"),
		}

		if cancelled.load(Ordering::SeqCst) {
			break;
		}

		let delay = policy.next_delay();
		let attempt = policy.attempts();
		stats.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
		set_state(
			&stats,
			&cancelled,
			ConnectionState::ReconnectScheduled { attempt, delay },
		);
		warn!(
			delay_ms = delay.as_millis() as u64,
			attempt, "Reconnecting to flag stream"
		);

		tokio::time::sleep(delay).await;
	}

	debug!("Flag stream task exited");
}

/// Applies messages until the stream ends or errors.
async fn consume_stream(
	mut messages: MessageStream,
	cache: &FlagCache,
	policy: &mut ReconnectPolicy,
	stats: &StreamStats,
	cancelled: &AtomicBool,
) -> Result<()> {
	while let Some(message) = messages.next().await {
		let data = message?;

		match process_message(&data, cache, cancelled) {
			Ok(true) => {
				stats.events_received.fetch_add(1, Ordering::SeqCst);
				if policy.attempts() > 0 {
					debug!(attempts = policy.attempts(), "Flag stream healthy, resetting backoff");
					policy.reset();
				}
			}
			Ok(false) => return Ok(()),
			Err(e) => warn!(error = %e, "Dropping malformed flag event"),
		}
	}

	Ok(())
}

/// Parses one message and applies it to the cache.
///
/// Returns `Ok(false)` if the stream was stopped before the event could be applied.
fn process_message(data: &str, cache: &FlagCache, cancelled: &AtomicBool) -> Result<bool> {
	let event = FeatureFlagEvent::parse(data).map_err(FlagsError::MalformedMessage)?;

	let _dispatch = cache.dispatch_lock();
	if cancelled.load(Ordering::SeqCst) {
		return Ok(false);
	}
	cache.apply_event(&event);
	Ok(true)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::VecDeque;

	use async_trait::async_trait;
	use feato_flags_core::{ClientConfig, FlagTable};
	use futures::channel::mpsc;
	use tokio::time::Instant;

	enum Session {
		Fail,
		Messages(mpsc::UnboundedReceiver<Result<String>>),
	}

	/// Plays back scripted sessions, then stays connected forever.
	struct ScriptedTransport {
		sessions: Mutex<VecDeque<Session>>,
		opened: Mutex<Vec<Instant>>,
	}

	impl ScriptedTransport {
		fn new(sessions: Vec<Session>) -> Arc<Self> {
			Arc::new(Self {
				sessions: Mutex::new(sessions.into()),
				opened: Mutex::new(Vec::new()),
			})
		}

		fn open_count(&self) -> usize {
			self.opened.lock().len()
		}

		fn gaps(&self) -> Vec<Duration> {
			let opened = self.opened.lock();
			opened.windows(2).map(|w| w[1] - w[0]).collect()
		}
	}

	#[async_trait]
	impl StreamTransport for ScriptedTransport {
		async fn open(&self, _request: &StreamRequest) -> Result<MessageStream> {
			self.opened.lock().push(Instant::now());
			let next = self.sessions.lock().pop_front();
			match next {
				Some(Session::Fail) => Err(FlagsError::ServerError {
					status: 503,
					message: "unavailable".to_string(),
				}),
				Some(Session::Messages(rx)) => Ok(rx.boxed()),
				None => Ok(futures::stream::pending().boxed()),
			}
		}
	}

	/// A session that delivers `messages` and then closes.
	fn closed_session(messages: &[&str]) -> Session {
		let (tx, rx) = mpsc::unbounded();
		for message in messages {
			tx.unbounded_send(Ok(message.to_string())).unwrap();
		}
		Session::Messages(rx)
	}

	fn open_session() -> (mpsc::UnboundedSender<Result<String>>, Session) {
		let (tx, rx) = mpsc::unbounded();
		(tx, Session::Messages(rx))
	}

	fn request() -> StreamRequest {
		let config = ClientConfig::new("proj_secret", "test").unwrap();
		StreamRequest::new("http://localhost", &config)
	}

	fn snapshot_cache() -> FlagCache {
		let cache = FlagCache::new();
		cache.load_snapshot(FlagTable::from_iter([("dark_mode".to_string(), true)]));
		cache
	}

	fn start(conn: &StreamConnection, transport: &Arc<ScriptedTransport>, cache: &FlagCache) -> bool {
		conn.start(
			Arc::clone(transport) as Arc<dyn StreamTransport>,
			request(),
			cache.clone(),
			StreamConfig::default(),
		)
	}

	#[test]
	fn stream_config_defaults() {
		let config = StreamConfig::default();
		assert_eq!(config.reconnect_base_delay, Duration::from_secs(1));
		assert_eq!(config.reconnect_max_delay, Duration::from_secs(30));
	}

	#[test]
	fn initial_state() {
		let conn = StreamConnection::new();
		assert_eq!(conn.state(), ConnectionState::Disconnected);
		assert!(!conn.is_running());
		assert_eq!(conn.reconnect_attempts(), 0);
		assert_eq!(conn.events_received(), 0);
	}

	#[test]
	fn start_without_runtime_degrades_gracefully() {
		let conn = StreamConnection::new();
		let transport = ScriptedTransport::new(vec![]);

		assert!(!start(&conn, &transport, &FlagCache::new()));
		assert_eq!(conn.state(), ConnectionState::Disconnected);
		assert!(!conn.is_running());
		assert_eq!(transport.open_count(), 0);
	}

	#[test]
	fn stop_without_start_is_noop() {
		let conn = StreamConnection::new();
		assert!(!conn.stop());
		assert!(!conn.stop());
		assert_eq!(conn.state(), ConnectionState::Disconnected);
	}

	#[test]
	fn process_message_applies_null_as_false() {
		let cache = snapshot_cache();
		let cancelled = AtomicBool::new(false);

		let applied =
			process_message(r#"{"key":"dark_mode","value":null}"#, &cache, &cancelled).unwrap();

		assert!(applied);
		assert_eq!(cache.get("dark_mode"), Some(false));
	}

	#[test]
	fn process_message_rejects_malformed_payload() {
		let cache = snapshot_cache();
		let cancelled = AtomicBool::new(false);

		let err = process_message("{", &cache, &cancelled).unwrap_err();

		assert!(matches!(err, FlagsError::MalformedMessage(_)));
		assert_eq!(cache.get("dark_mode"), Some(true));
	}

	#[test]
	fn process_message_skips_after_cancel() {
		let cache = snapshot_cache();
		let cancelled = AtomicBool::new(true);

		let applied =
			process_message(r#"{"key":"dark_mode","value":false}"#, &cache, &cancelled).unwrap();

		assert!(!applied);
		assert_eq!(cache.get("dark_mode"), Some(true));
	}

	#[tokio::test(start_paused = true)]
	async fn applies_streamed_events_and_notifies_once_each() {
		let cache = snapshot_cache();
		let notified = Arc::new(Mutex::new(Vec::new()));
		let n = Arc::clone(&notified);
		let _sub = cache.subscribe_flags(Arc::new(move |t: &FlagTable| n.lock().push(t.clone())));
		notified.lock().clear();

		let (tx, session) = open_session();
		let transport = ScriptedTransport::new(vec![session]);
		let conn = StreamConnection::new();
		assert!(start(&conn, &transport, &cache));

		tx.unbounded_send(Ok(r#"{"key":"dark_mode","value":false}"#.to_string()))
			.unwrap();
		tokio::time::sleep(Duration::from_millis(10)).await;

		assert_eq!(conn.state(), ConnectionState::Connected);
		assert_eq!(cache.get("dark_mode"), Some(false));
		assert_eq!(conn.events_received(), 1);
		assert_eq!(
			*notified.lock(),
			vec![FlagTable::from_iter([("dark_mode".to_string(), false)])]
		);
	}

	#[tokio::test(start_paused = true)]
	async fn panicking_listener_does_not_end_the_stream() {
		let cache = snapshot_cache();
		let _sub = cache.subscribe_flags(Arc::new(|t: &FlagTable| {
			if t.contains_key("boom") {
				panic!("listener rejected boom");
			}
		}));

		let (tx, session) = open_session();
		let transport = ScriptedTransport::new(vec![session]);
		let conn = StreamConnection::new();
		start(&conn, &transport, &cache);

		tx.unbounded_send(Ok(r#"{"key":"boom","value":true}"#.to_string()))
			.unwrap();
		tokio::time::sleep(Duration::from_secs(60)).await;
		tx.unbounded_send(Ok(r#"{"key":"dark_mode","value":false}"#.to_string()))
			.unwrap();
		tokio::time::sleep(Duration::from_millis(10)).await;

		assert_eq!(cache.get("boom"), Some(true));
		assert_eq!(cache.get("dark_mode"), Some(false));
		assert_eq!(conn.events_received(), 2);
		assert_eq!(conn.state(), ConnectionState::Connected);
		assert!(conn.is_running());
		assert_eq!(transport.open_count(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn dropping_connection_stops_the_stream_task() {
		let cache = snapshot_cache();
		let (tx, session) = open_session();
		let transport = ScriptedTransport::new(vec![session]);
		let conn = StreamConnection::new();
		start(&conn, &transport, &cache);
		tokio::time::sleep(Duration::from_millis(10)).await;
		assert_eq!(transport.open_count(), 1);

		drop(conn);
		tokio::time::sleep(Duration::from_secs(60)).await;

		assert!(tx.is_closed());
		let _ = tx.unbounded_send(Ok(r#"{"key":"dark_mode","value":false}"#.to_string()));
		tokio::time::sleep(Duration::from_millis(10)).await;
		assert_eq!(cache.get("dark_mode"), Some(true));
		assert_eq!(transport.open_count(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn malformed_message_is_dropped_and_stream_continues() {
		let cache = snapshot_cache();
		let (tx, session) = open_session();
		let transport = ScriptedTransport::new(vec![session]);
		let conn = StreamConnection::new();
		start(&conn, &transport, &cache);

		tx.unbounded_send(Ok("not json".to_string())).unwrap();
		tx.unbounded_send(Ok(r#"{"key":"beta"}"#.to_string())).unwrap();
		tx.unbounded_send(Ok(r#"{"key":"beta","value":true}"#.to_string()))
			.unwrap();
		tokio::time::sleep(Duration::from_millis(10)).await;

		assert_eq!(cache.get("beta"), Some(true));
		assert_eq!(conn.events_received(), 1);
		assert_eq!(transport.open_count(), 1);
		assert_eq!(conn.reconnect_attempts(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn start_is_idempotent() {
		let cache = snapshot_cache();
		let transport = ScriptedTransport::new(vec![]);
		let conn = StreamConnection::new();

		assert!(start(&conn, &transport, &cache));
		assert!(start(&conn, &transport, &cache));
		tokio::time::sleep(Duration::from_millis(10)).await;

		assert_eq!(transport.open_count(), 1);
		assert!(conn.is_running());
	}

	#[tokio::test(start_paused = true)]
	async fn consecutive_failures_back_off_exponentially() {
		let cache = snapshot_cache();
		let transport = ScriptedTransport::new(vec![
			Session::Fail,
			Session::Fail,
			Session::Fail,
			Session::Fail,
		]);
		let conn = StreamConnection::new();
		start(&conn, &transport, &cache);

		tokio::time::sleep(Duration::from_secs(20)).await;

		assert_eq!(transport.open_count(), 5);
		assert_eq!(
			transport.gaps(),
			vec![
				Duration::from_secs(1),
				Duration::from_secs(2),
				Duration::from_secs(4),
				Duration::from_secs(8),
			]
		);
		assert_eq!(conn.reconnect_attempts(), 4);
		assert_eq!(conn.state(), ConnectionState::Connected);
	}

	#[tokio::test(start_paused = true)]
	async fn state_reports_scheduled_reconnect() {
		let cache = snapshot_cache();
		let transport = ScriptedTransport::new(vec![Session::Fail]);
		let conn = StreamConnection::new();
		start(&conn, &transport, &cache);

		tokio::time::sleep(Duration::from_millis(500)).await;

		assert_eq!(
			conn.state(),
			ConnectionState::ReconnectScheduled {
				attempt: 1,
				delay: Duration::from_secs(1),
			}
		);
	}

	#[tokio::test(start_paused = true)]
	async fn drop_after_successful_messages_restarts_from_base_delay() {
		let cache = snapshot_cache();
		let transport = ScriptedTransport::new(vec![
			closed_session(&[
				r#"{"key":"a","value":true}"#,
				r#"{"key":"b","value":true}"#,
				r#"{"key":"c","value":true}"#,
			]),
			Session::Fail,
		]);
		let conn = StreamConnection::new();
		start(&conn, &transport, &cache);

		tokio::time::sleep(Duration::from_secs(10)).await;

		assert_eq!(
			transport.gaps(),
			vec![Duration::from_secs(1), Duration::from_secs(2)]
		);
		assert_eq!(conn.events_received(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn successful_message_resets_backoff() {
		let cache = snapshot_cache();
		let transport = ScriptedTransport::new(vec![
			Session::Fail,
			Session::Fail,
			closed_session(&[r#"{"key":"a","value":true}"#]),
			Session::Fail,
		]);
		let conn = StreamConnection::new();
		start(&conn, &transport, &cache);

		tokio::time::sleep(Duration::from_secs(20)).await;

		// fail (1s), fail (2s), message then close (back to 1s), fail (2s)
		assert_eq!(
			transport.gaps(),
			vec![
				Duration::from_secs(1),
				Duration::from_secs(2),
				Duration::from_secs(1),
				Duration::from_secs(2),
			]
		);
	}

	#[tokio::test(start_paused = true)]
	async fn stop_cancels_pending_reconnect() {
		let cache = snapshot_cache();
		let transport = ScriptedTransport::new(vec![Session::Fail]);
		let conn = StreamConnection::new();
		start(&conn, &transport, &cache);

		tokio::time::sleep(Duration::from_millis(100)).await;
		assert!(matches!(
			conn.state(),
			ConnectionState::ReconnectScheduled { .. }
		));

		assert!(conn.stop());
		assert!(!conn.stop());
		tokio::time::sleep(Duration::from_secs(60)).await;

		assert_eq!(transport.open_count(), 1);
		assert_eq!(conn.state(), ConnectionState::Disconnected);
		assert!(!conn.is_running());
	}

	#[tokio::test(start_paused = true)]
	async fn stop_closes_live_stream() {
		let cache = snapshot_cache();
		let (tx, session) = open_session();
		let transport = ScriptedTransport::new(vec![session]);
		let conn = StreamConnection::new();
		start(&conn, &transport, &cache);
		tokio::time::sleep(Duration::from_millis(10)).await;

		conn.stop();
		let _ = tx.unbounded_send(Ok(r#"{"key":"dark_mode","value":false}"#.to_string()));
		tokio::time::sleep(Duration::from_secs(5)).await;

		assert_eq!(cache.get("dark_mode"), Some(true));
		assert!(tx.is_closed());
		assert_eq!(transport.open_count(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn restart_after_stop_reconnects() {
		let cache = snapshot_cache();
		let transport = ScriptedTransport::new(vec![]);
		let conn = StreamConnection::new();

		start(&conn, &transport, &cache);
		tokio::time::sleep(Duration::from_millis(10)).await;
		conn.stop();

		assert!(start(&conn, &transport, &cache));
		tokio::time::sleep(Duration::from_millis(10)).await;

		assert_eq!(transport.open_count(), 2);
		assert_eq!(conn.state(), ConnectionState::Connected);
	}
}
