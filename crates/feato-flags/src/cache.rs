// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory flag table with change notification.
//!
//! The cache has a single writer at a time: the snapshot loader during `init`, then
//! the stream task. Every write and its notification pass run under one re-entrant
//! dispatch lock, and so does "register listener + replay current state". A listener
//! therefore never sees tables out of order, and a late subscriber can't miss an
//! update that lands while it is being registered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use feato_flags_core::{FeatureFlagEvent, FlagTable};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard, RwLock};
use tracing::debug;

use crate::subscribers::{Listener, SubscriberSet, Subscription};

/// Callback receiving the full flag table after every change.
pub type FlagsListener = Listener<FlagTable>;

/// Callback receiving the initialized state.
pub type InitializedListener = Listener<bool>;

struct CacheInner {
	table: RwLock<Arc<FlagTable>>,
	initialized: AtomicBool,
	flag_subscribers: SubscriberSet<FlagTable>,
	init_subscribers: SubscriberSet<bool>,
	dispatch: ReentrantMutex<()>,
}

/// Shared handle to the flag table and its subscribers.
#[derive(Clone)]
pub struct FlagCache {
	inner: Arc<CacheInner>,
}

impl FlagCache {
	pub fn new() -> Self {
		Self {
			inner: Arc::new(CacheInner {
				table: RwLock::new(Arc::new(FlagTable::new())),
				initialized: AtomicBool::new(false),
				flag_subscribers: SubscriberSet::new(),
				init_subscribers: SubscriberSet::new(),
				dispatch: ReentrantMutex::new(()),
			}),
		}
	}

	/// Returns the current table.
	pub fn flags(&self) -> Arc<FlagTable> {
		Arc::clone(&self.inner.table.read())
	}

	pub fn get(&self, key: &str) -> Option<bool> {
		self.inner.table.read().get(key)
	}

	pub fn flag_count(&self) -> usize {
		self.inner.table.read().len()
	}

	pub fn is_initialized(&self) -> bool {
		self.inner.initialized.load(Ordering::SeqCst)
	}

	/// Replaces the whole table from a snapshot and marks the cache initialized.
	///
	/// Flag listeners are notified first, then initialization listeners.
	pub fn load_snapshot(&self, table: FlagTable) {
		let _dispatch = self.inner.dispatch.lock();

		let table = Arc::new(table);
		*self.inner.table.write() = Arc::clone(&table);
		self.inner.initialized.store(true, Ordering::SeqCst);
		debug!(flags = table.len(), "Flag table replaced from snapshot");

		self.inner.flag_subscribers.notify(&table);
		self.inner.init_subscribers.notify(&true);
	}

	/// Overwrites one key and notifies flag listeners once.
	pub fn apply_event(&self, event: &FeatureFlagEvent) -> Arc<FlagTable> {
		let _dispatch = self.inner.dispatch.lock();

		let table = {
			let mut current = self.inner.table.write();
			let next = Arc::new(current.with_event(event));
			*current = Arc::clone(&next);
			next
		};
		debug!(flag_key = %event.key, value = event.value, "Flag updated");

		self.inner.flag_subscribers.notify(&table);
		table
	}

	/// Registers a flag listener and immediately calls it with the current table.
	pub fn subscribe_flags(&self, listener: FlagsListener) -> Subscription {
		let _dispatch = self.inner.dispatch.lock();

		let subscription = self.inner.flag_subscribers.subscribe(Arc::clone(&listener));
		listener(&self.flags());
		subscription
	}

	/// Registers an initialization listener and immediately calls it with the
	/// current state.
	pub fn subscribe_initialized(&self, listener: InitializedListener) -> Subscription {
		let _dispatch = self.inner.dispatch.lock();

		let subscription = self.inner.init_subscribers.subscribe(Arc::clone(&listener));
		listener(&self.is_initialized());
		subscription
	}

	pub fn flag_listener_count(&self) -> usize {
		self.inner.flag_subscribers.len()
	}

	pub fn init_listener_count(&self) -> usize {
		self.inner.init_subscribers.len()
	}

	/// Holds the dispatch lock so a caller can check its own state and write in
	/// one step. The lock is re-entrant.
	pub(crate) fn dispatch_lock(&self) -> ReentrantMutexGuard<'_, ()> {
		self.inner.dispatch.lock()
	}
}

impl Default for FlagCache {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for FlagCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FlagCache")
			.field("flags", &self.flag_count())
			.field("initialized", &self.is_initialized())
			.finish()
	}
}
