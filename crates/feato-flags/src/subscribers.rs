// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Listener registry for flag and initialization changes.
//!
//! Listeners are identified by `Arc` pointer identity: subscribing the same `Arc`
//! twice registers it once, and removal needs that same `Arc`.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::warn;

/// A registered callback.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

type ListenerList<T> = Mutex<Vec<Listener<T>>>;

fn same_listener<T>(a: &Listener<T>, b: &Listener<T>) -> bool {
	std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Insertion-ordered set of listeners.
pub struct SubscriberSet<T> {
	listeners: Arc<ListenerList<T>>,
}

impl<T: 'static> SubscriberSet<T> {
	pub fn new() -> Self {
		Self {
			listeners: Arc::new(Mutex::new(Vec::new())),
		}
	}

	/// Registers a listener. Returns false if it was already registered.
	pub fn add(&self, listener: Listener<T>) -> bool {
		let mut listeners = self.listeners.lock();
		if listeners.iter().any(|l| same_listener(l, &listener)) {
			return false;
		}
		listeners.push(listener);
		true
	}

	/// Removes a listener. Returns false if it was not registered.
	pub fn remove(&self, listener: &Listener<T>) -> bool {
		remove_from(&self.listeners, listener)
	}

	pub fn len(&self) -> usize {
		self.listeners.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.listeners.lock().is_empty()
	}

	/// Invokes every listener in insertion order.
	///
	/// The list is copied before the first call, so listeners may subscribe or
	/// unsubscribe while being notified. Changes take effect on the next pass.
	/// A listener that panics is logged and skipped; the remaining listeners
	/// still run.
	pub fn notify(&self, value: &T) {
		let snapshot: Vec<Listener<T>> = self.listeners.lock().clone();
		for listener in snapshot {
			if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(value))) {
				warn!(panic = %panic_message(&*payload), "Flag listener panicked");
			}
		}
	}

	/// Registers a listener and returns a handle that removes it.
	pub fn subscribe(&self, listener: Listener<T>) -> Subscription {
		self.add(Arc::clone(&listener));

		let weak: Weak<ListenerList<T>> = Arc::downgrade(&self.listeners);
		Subscription::new(move || {
			if let Some(listeners) = weak.upgrade() {
				remove_from(&listeners, &listener);
			}
		})
	}
}

impl<T: 'static> Default for SubscriberSet<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> fmt::Debug for SubscriberSet<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SubscriberSet")
			.field("listeners", &self.listeners.lock().len())
			.finish()
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
	if let Some(message) = payload.downcast_ref::<&'static str>() {
		*message
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.as_str()
	} else {
		"unknown panic"
	}
}

fn remove_from<T>(listeners: &ListenerList<T>, listener: &Listener<T>) -> bool {
	let mut listeners = listeners.lock();
	let before = listeners.len();
	listeners.retain(|l| !same_listener(l, listener));
	listeners.len() != before
}

/// Handle returned by a subscribe call.
///
/// Dropping the handle does not unsubscribe. Call [`Subscription::unsubscribe`].
pub struct Subscription {
	remove: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
	fn new(remove: impl FnOnce() + Send + 'static) -> Self {
		Self {
			remove: Mutex::new(Some(Box::new(remove))),
		}
	}

	/// Removes the listener. Further calls do nothing.
	pub fn unsubscribe(&self) {
		let remove = self.remove.lock().take();
		if let Some(remove) = remove {
			remove();
		}
	}

	/// Returns true until [`Subscription::unsubscribe`] has been called.
	pub fn is_active(&self) -> bool {
		self.remove.lock().is_some()
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("active", &self.is_active())
			.finish()
	}
}
