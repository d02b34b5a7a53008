// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Retry logic with exponential backoff.

use reqwest::StatusCode;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	pub jitter: bool,
}

impl Default for RetryConfig {
	/// The registration schedule: 10 attempts, 5s doubling up to 5 minutes.
	fn default() -> Self {
		Self {
			max_attempts: 10,
			base_delay: Duration::from_secs(5),
			max_delay: Duration::from_secs(300),
			backoff_factor: 2.0,
			jitter: false,
		}
	}
}

pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

const RETRYABLE_STATUSES: [StatusCode; 6] = [
	StatusCode::TOO_MANY_REQUESTS,
	StatusCode::REQUEST_TIMEOUT,
	StatusCode::INTERNAL_SERVER_ERROR,
	StatusCode::BAD_GATEWAY,
	StatusCode::SERVICE_UNAVAILABLE,
	StatusCode::GATEWAY_TIMEOUT,
];

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		if self.is_timeout() || self.is_connect() {
			return true;
		}
		self
			.status()
			.map(|status| RETRYABLE_STATUSES.contains(&status))
			.unwrap_or(false)
	}
}

impl RetryableError for StatusCode {
	fn is_retryable(&self) -> bool {
		RETRYABLE_STATUSES.contains(self)
	}
}

/// Delay to wait after the failed attempt numbered `attempt` (zero based).
///
/// Without jitter this is `base * factor^attempt`, capped at `max_delay`. With
/// jitter the capped value is scaled by a random factor in `[0.5, 1.5)`.
pub fn backoff_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
	let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
	let exponential = cfg.base_delay.as_secs_f64() * cfg.backoff_factor.powi(exponent);
	let capped = if exponential.is_finite() {
		exponential.min(cfg.max_delay.as_secs_f64())
	} else {
		cfg.max_delay.as_secs_f64()
	};

	let delay = if cfg.jitter {
		capped * (0.5 + fastrand::f64())
	} else {
		capped
	};

	Duration::from_secs_f64(delay)
}

pub async fn retry<F, Fut, T, E>(cfg: &RetryConfig, mut f: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Display,
{
	let mut attempt = 0;

	loop {
		match f().await {
			Ok(result) => return Ok(result),
			Err(err) => {
				attempt += 1;

				if !err.is_retryable() {
					warn!(error = %err, attempt, "non-retryable error encountered");
					return Err(err);
				}

				if attempt >= cfg.max_attempts {
					warn!(
						error = %err,
						attempt,
						max_attempts = cfg.max_attempts,
						"max retry attempts exhausted"
					);
					return Err(err);
				}

				let delay = backoff_delay(cfg, attempt - 1);
				warn!(
					error = %err,
					attempt,
					max_attempts = cfg.max_attempts,
					delay_ms = delay.as_millis() as u64,
					"retrying after error"
				);

				tokio::time::sleep(delay).await;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::Arc;

	#[derive(Debug)]
	struct MockError {
		retryable: bool,
	}

	impl std::fmt::Display for MockError {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			write!(f, "mock error (retryable={})", self.retryable)
		}
	}

	impl RetryableError for MockError {
		fn is_retryable(&self) -> bool {
			self.retryable
		}
	}

	fn fast_config(max_attempts: u32) -> RetryConfig {
		RetryConfig {
			max_attempts,
			base_delay: Duration::from_millis(1),
			max_delay: Duration::from_millis(10),
			backoff_factor: 2.0,
			jitter: false,
		}
	}

	/// Purpose: an authoritative rejection must surface after a single attempt.
	#[tokio::test]
	async fn non_retryable_error_fails_immediately() {
		let attempts = Arc::new(AtomicU32::new(0));
		let counter = Arc::clone(&attempts);

		let result: Result<(), MockError> = retry(&fast_config(5), || {
			let counter = Arc::clone(&counter);
			async move {
				counter.fetch_add(1, Ordering::SeqCst);
				Err(MockError { retryable: false })
			}
		})
		.await;

		assert!(result.is_err());
		assert_eq!(attempts.load(Ordering::SeqCst), 1);
	}

	/// Purpose: transient failures are retried until the attempt bound.
	#[tokio::test]
	async fn retryable_error_stops_at_max_attempts() {
		let attempts = Arc::new(AtomicU32::new(0));
		let counter = Arc::clone(&attempts);

		let result: Result<(), MockError> = retry(&fast_config(3), || {
			let counter = Arc::clone(&counter);
			async move {
				counter.fetch_add(1, Ordering::SeqCst);
				Err(MockError { retryable: true })
			}
		})
		.await;

		assert!(result.is_err());
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn success_after_transient_failures() {
		let attempts = Arc::new(AtomicU32::new(0));
		let counter = Arc::clone(&attempts);

		let result: Result<u32, MockError> = retry(&fast_config(5), || {
			let counter = Arc::clone(&counter);
			async move {
				let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
				if n < 3 {
					Err(MockError { retryable: true })
				} else {
					Ok(n)
				}
			}
		})
		.await;

		assert_eq!(result.unwrap(), 3);
	}

	#[test]
	fn default_schedule_doubles_from_five_seconds() {
		let cfg = RetryConfig::default();
		assert_eq!(backoff_delay(&cfg, 0), Duration::from_secs(5));
		assert_eq!(backoff_delay(&cfg, 1), Duration::from_secs(10));
		assert_eq!(backoff_delay(&cfg, 5), Duration::from_secs(160));
		assert_eq!(backoff_delay(&cfg, 6), Duration::from_secs(300));
		assert_eq!(backoff_delay(&cfg, 9), Duration::from_secs(300));
	}

	#[test]
	fn status_codes_classified() {
		assert!(StatusCode::SERVICE_UNAVAILABLE.is_retryable());
		assert!(!StatusCode::UNAUTHORIZED.is_retryable());
		assert!(!StatusCode::FORBIDDEN.is_retryable());
	}

	proptest! {
		/// Purpose: no attempt number may push the delay past the cap.
		#[test]
		fn delay_never_exceeds_cap(attempt in 0u32..10_000, base_ms in 1u64..10_000, max_ms in 1u64..600_000) {
			let cfg = RetryConfig {
				max_attempts: 10,
				base_delay: Duration::from_millis(base_ms),
				max_delay: Duration::from_millis(max_ms),
				backoff_factor: 2.0,
				jitter: false,
			};
			prop_assert!(backoff_delay(&cfg, attempt) <= cfg.max_delay);
		}

		#[test]
		fn delay_is_monotonic(attempt in 0u32..64) {
			let cfg = RetryConfig::default();
			prop_assert!(backoff_delay(&cfg, attempt) <= backoff_delay(&cfg, attempt + 1));
		}

		#[test]
		fn jitter_stays_within_half_and_one_and_a_half(attempt in 0u32..20) {
			let mut cfg = RetryConfig::default();
			cfg.jitter = true;
			let plain = backoff_delay(&RetryConfig::default(), attempt).as_secs_f64();
			let jittered = backoff_delay(&cfg, attempt).as_secs_f64();
			prop_assert!(jittered >= plain * 0.5 - 1e-9);
			prop_assert!(jittered < plain * 1.5 + 1e-9);
		}
	}
}
