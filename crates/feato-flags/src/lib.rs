// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Feature flag sync client for Feato.
//!
//! The client fetches a full flag snapshot over HTTP, then keeps it current from a
//! long-lived Server-Sent Events stream. Observers subscribe to table changes and
//! to the initialized state.
//!
//! # Features
//!
//! - **Snapshot bootstrap**: one fetch on `init`, surfaced as an error on failure
//! - **Real-time updates**: SSE stream merged key by key into the local table
//! - **Self-healing stream**: capped exponential backoff, unbounded retries
//! - **Subscriptions**: listeners are replayed the current state on subscribe
//! - **Snapshot-only mode**: streaming can be turned off, or degrades when no
//!   async runtime is available
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use feato_flags::{FeatoClient, FlagTable};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FeatoClient::builder()
//!         .project_key("proj_xxx")
//!         .environment("production")
//!         .build()?;
//!
//!     client.init().await?;
//!
//!     if client.flag("dark_mode").unwrap_or(false) {
//!         // ...
//!     }
//!
//!     let sub = client.subscribe_flags(Arc::new(|flags: &FlagTable| {
//!         println!("{} flags", flags.len());
//!     }));
//!
//!     sub.unsubscribe();
//!     client.disconnect();
//!     Ok(())
//! }
//! ```

mod backoff;
mod cache;
mod client;
mod error;
mod snapshot;
mod stream;
mod subscribers;
mod transport;

pub use backoff::ReconnectPolicy;
pub use cache::{FlagCache, FlagsListener, InitializedListener};
pub use client::{FeatoClient, FeatoClientBuilder, DEFAULT_BASE_URL};
pub use error::{FlagsError, Result};
pub use snapshot::SnapshotLoader;
pub use stream::{ConnectionState, StreamConfig, StreamConnection};
pub use subscribers::{Listener, SubscriberSet, Subscription};
pub use transport::{MessageStream, SseTransport, StreamRequest, StreamTransport};

// Re-export core types for convenience
pub use feato_flags_core::{ClientConfig, FeatureFlagEvent, FlagKey, FlagTable, PROTOCOL_VERSION};
