// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Capped exponential backoff for stream reconnection.

use std::time::Duration;

/// Computes reconnection delays: `min(base * 2^attempts, max)`.
///
/// There is no retry limit. The attempt counter is reset once the stream delivers
/// a message, so a fresh failure starts again from `base`.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
	base_delay: Duration,
	max_delay: Duration,
	attempts: u32,
}

impl ReconnectPolicy {
	pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
		Self {
			base_delay,
			max_delay,
			attempts: 0,
		}
	}

	/// Returns the delay for the next reconnection and bumps the attempt counter.
	pub fn next_delay(&mut self) -> Duration {
		let factor = 2u32.checked_pow(self.attempts).unwrap_or(u32::MAX);
		let delay = self
			.base_delay
			.checked_mul(factor)
			.unwrap_or(self.max_delay)
			.min(self.max_delay);
		self.attempts = self.attempts.saturating_add(1);
		delay
	}

	pub fn reset(&mut self) {
		self.attempts = 0;
	}

	pub fn attempts(&self) -> u32 {
		self.attempts
	}

	pub fn base_delay(&self) -> Duration {
		self.base_delay
	}

	pub fn max_delay(&self) -> Duration {
		self.max_delay
	}
}

impl Default for ReconnectPolicy {
	fn default() -> Self {
		Self::new(Duration::from_secs(1), Duration::from_secs(30))
	}
}
