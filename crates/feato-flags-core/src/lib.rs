// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Feato feature flag client.
//!
//! This crate holds the data model shared by the client SDK (`feato-flags`) and
//! anything else that needs to speak the hub's wire format. It performs no I/O.
//!
//! # Overview
//!
//! - [`FlagTable`]: immutable `key -> bool` mapping, replaced on snapshot load and
//!   merged one key at a time from streamed events
//! - [`FeatureFlagEvent`]: a single streamed flag update
//! - [`SnapshotResponse`]: the body returned by the snapshot endpoint
//! - [`ClientConfig`]: project credential and environment for one client
//!
//! # Example
//!
//! ```
//! use feato_flags_core::{FeatureFlagEvent, FlagTable};
//!
//! let table = FlagTable::from_iter([("dark_mode".to_string(), true)]);
//!
//! let event = FeatureFlagEvent::parse(r#"{"key":"dark_mode","value":null}"#).unwrap();
//! let table = table.with_event(&event);
//!
//! assert_eq!(table.get("dark_mode"), Some(false));
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod table;

pub use config::ClientConfig;
pub use error::{CoreError, Result};
pub use event::{FeatureFlagEvent, SnapshotResponse};
pub use table::{FlagKey, FlagTable};

/// Protocol version announced to the streaming endpoint.
pub const PROTOCOL_VERSION: u32 = 1;
