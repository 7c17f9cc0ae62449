// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The in-memory flag table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::FeatureFlagEvent;

/// Opaque flag identifier, unique within a project/environment.
pub type FlagKey = String;

/// Mapping from flag key to boolean value.
///
/// A table is never mutated in place. Updates produce a new table so that a reader
/// holding an `Arc<FlagTable>` always sees a complete state, either before or after
/// an update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagTable {
	flags: BTreeMap<FlagKey, bool>,
}

impl FlagTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds a table from snapshot values, treating `null` as `false`.
	pub fn from_snapshot(flags: BTreeMap<FlagKey, Option<bool>>) -> Self {
		flags
			.into_iter()
			.map(|(key, value)| (key, value.unwrap_or(false)))
			.collect()
	}

	/// Returns the stored value, or `None` if the key is unknown.
	pub fn get(&self, key: &str) -> Option<bool> {
		self.flags.get(key).copied()
	}

	/// Returns the stored value, treating unknown keys as disabled.
	pub fn is_enabled(&self, key: &str) -> bool {
		self.get(key).unwrap_or(false)
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.flags.contains_key(key)
	}

	pub fn len(&self) -> usize {
		self.flags.len()
	}

	pub fn is_empty(&self) -> bool {
		self.flags.is_empty()
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.flags.keys().map(String::as_str)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
		self.flags.iter().map(|(k, v)| (k.as_str(), *v))
	}

	/// Returns a copy of this table with the event's key overwritten.
	///
	/// Last applied wins. `updated_at` is not compared.
	pub fn with_event(&self, event: &FeatureFlagEvent) -> Self {
		let mut flags = self.flags.clone();
		flags.insert(event.key.clone(), event.value);
		Self { flags }
	}

	pub fn as_map(&self) -> &BTreeMap<FlagKey, bool> {
		&self.flags
	}
}

impl FromIterator<(FlagKey, bool)> for FlagTable {
	fn from_iter<I: IntoIterator<Item = (FlagKey, bool)>>(iter: I) -> Self {
		Self {
			flags: iter.into_iter().collect(),
		}
	}
}

impl From<BTreeMap<FlagKey, bool>> for FlagTable {
	fn from(flags: BTreeMap<FlagKey, bool>) -> Self {
		Self { flags }
	}
}
