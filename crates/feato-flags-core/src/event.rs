// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wire types for the snapshot and streaming endpoints.
//!
//! # Streamed event
//!
//! Each server-sent message carries one JSON object:
//!
//! ```text
//! { "key": "dark_mode", "value": true | false | null, "updatedAt": "2025-01-01T00:00:00Z" }
//! ```
//!
//! `value` must be present but may be `null`, which is stored as `false`.
//! `updatedAt` is informational only and never rejects an event. RFC 3339, offset-less
//! ISO-8601 date-times and plain dates are read as UTC, numbers as epoch milliseconds.
//! Anything else, including a missing value, becomes the Unix epoch.
//!
//! # Snapshot
//!
//! ```text
//! { "flags": { "dark_mode": true, "beta": false } }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::table::{FlagKey, FlagTable};

/// A single incremental flag update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagEvent {
	pub key: FlagKey,
	pub value: bool,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFlagEvent {
	key: String,
	// Present-but-nullable: `Option::deserialize` disables serde's implicit default.
	#[serde(deserialize_with = "Option::deserialize")]
	value: Option<bool>,
	#[serde(default)]
	updated_at: Option<serde_json::Value>,
}

/// Best-effort read of `updatedAt`. `None` means the caller falls back to the epoch.
fn parse_updated_at(raw: &serde_json::Value) -> Option<DateTime<Utc>> {
	match raw {
		serde_json::Value::String(text) => parse_timestamp(text.trim()),
		serde_json::Value::Number(millis) => {
			millis.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis)
		}
		_ => None,
	}
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
	if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
		return Some(parsed.with_timezone(&Utc));
	}
	for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
		if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
			return Some(naive.and_utc());
		}
	}
	NaiveDate::parse_from_str(text, "%Y-%m-%d")
		.ok()
		.and_then(|date| date.and_hms_opt(0, 0, 0))
		.map(|naive| naive.and_utc())
}

impl FeatureFlagEvent {
	pub fn new(key: impl Into<FlagKey>, value: bool) -> Self {
		Self {
			key: key.into(),
			value,
			updated_at: Utc::now(),
		}
	}

	/// Parses a streamed message payload.
	pub fn parse(data: &str) -> Result<Self> {
		let raw: RawFlagEvent =
			serde_json::from_str(data).map_err(|e| CoreError::MalformedMessage(e.to_string()))?;

		Ok(Self {
			key: raw.key,
			value: raw.value.unwrap_or(false),
			updated_at: raw
				.updated_at
				.as_ref()
				.and_then(parse_updated_at)
				.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
		})
	}
}

/// Body of the snapshot endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotResponse {
	pub flags: BTreeMap<FlagKey, Option<bool>>,
}

impl SnapshotResponse {
	pub fn parse(body: &str) -> Result<Self> {
		serde_json::from_str(body).map_err(|e| CoreError::MalformedSnapshot(e.to_string()))
	}

	pub fn into_table(self) -> FlagTable {
		FlagTable::from_snapshot(self.flags)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_full_event() {
		let event = FeatureFlagEvent::parse(
			r#"{"key":"dark_mode","value":true,"updatedAt":"2025-03-01T12:00:00Z"}"#,
		)
		.unwrap();

		assert_eq!(event.key, "dark_mode");
		assert!(event.value);
		assert_eq!(event.updated_at.to_rfc3339(), "2025-03-01T12:00:00+00:00");
	}

	#[test]
	fn null_value_is_false() {
		let event = FeatureFlagEvent::parse(r#"{"key":"dark_mode","value":null}"#).unwrap();
		assert!(!event.value);
	}

	#[test]
	fn missing_updated_at_defaults_to_epoch() {
		let event = FeatureFlagEvent::parse(r#"{"key":"dark_mode","value":true}"#).unwrap();
		assert_eq!(event.updated_at, DateTime::<Utc>::UNIX_EPOCH);
	}

	#[test]
	fn null_updated_at_defaults_to_epoch() {
		let event =
			FeatureFlagEvent::parse(r#"{"key":"dark_mode","value":true,"updatedAt":null}"#).unwrap();
		assert_eq!(event.updated_at, DateTime::<Utc>::UNIX_EPOCH);
	}

	#[test]
	fn unknown_fields_are_ignored() {
		let event =
			FeatureFlagEvent::parse(r#"{"key":"a","value":false,"projectId":"p1"}"#).unwrap();
		assert_eq!(event.key, "a");
	}

	#[test]
	fn missing_value_is_malformed() {
		let err = FeatureFlagEvent::parse(r#"{"key":"dark_mode"}"#).unwrap_err();
		assert!(matches!(err, CoreError::MalformedMessage(_)));
	}

	#[test]
	fn missing_key_is_malformed() {
		let err = FeatureFlagEvent::parse(r#"{"value":true}"#).unwrap_err();
		assert!(matches!(err, CoreError::MalformedMessage(_)));
	}

	#[test]
	fn non_json_is_malformed() {
		let err = FeatureFlagEvent::parse("not json").unwrap_err();
		assert!(matches!(err, CoreError::MalformedMessage(_)));
	}

	fn updated_at(raw: &str) -> DateTime<Utc> {
		let data = format!(r#"{{"key":"dark_mode","value":false,"updatedAt":{raw}}}"#);
		let event = FeatureFlagEvent::parse(&data).unwrap();
		assert_eq!(event.key, "dark_mode");
		assert!(!event.value);
		event.updated_at
	}

	#[test]
	fn offset_less_timestamp_is_read_as_utc() {
		assert_eq!(
			updated_at(r#""2025-03-01T12:00:00""#).to_rfc3339(),
			"2025-03-01T12:00:00+00:00"
		);
	}

	#[test]
	fn seven_digit_fraction_is_accepted() {
		let ts = updated_at(r#""2025-03-01T12:00:00.1234567""#);
		assert_eq!(ts.timestamp(), 1_740_830_400);
		assert_eq!(ts.timestamp_subsec_nanos(), 123_456_700);
	}

	#[test]
	fn date_only_timestamp_is_midnight_utc() {
		assert_eq!(
			updated_at(r#""2025-03-01""#).to_rfc3339(),
			"2025-03-01T00:00:00+00:00"
		);
	}

	#[test]
	fn offset_timestamp_is_converted_to_utc() {
		assert_eq!(
			updated_at(r#""2025-03-01T14:00:00+02:00""#).to_rfc3339(),
			"2025-03-01T12:00:00+00:00"
		);
	}

	#[test]
	fn numeric_timestamp_is_epoch_millis() {
		assert_eq!(updated_at("1740830400000").timestamp(), 1_740_830_400);
	}

	#[test]
	fn unparseable_timestamp_still_applies_event() {
		assert_eq!(updated_at(r#""yesterday""#), DateTime::<Utc>::UNIX_EPOCH);
		assert_eq!(updated_at("true"), DateTime::<Utc>::UNIX_EPOCH);
	}

	#[test]
	fn snapshot_into_table() {
		let snapshot =
			SnapshotResponse::parse(r#"{"flags":{"dark_mode":true,"beta":null}}"#).unwrap();
		let table = snapshot.into_table();

		assert_eq!(table.get("dark_mode"), Some(true));
		assert_eq!(table.get("beta"), Some(false));
	}

	#[test]
	fn snapshot_without_flags_is_malformed() {
		let err = SnapshotResponse::parse(r#"{"data":{}}"#).unwrap_err();
		assert!(matches!(err, CoreError::MalformedSnapshot(_)));
	}
}
