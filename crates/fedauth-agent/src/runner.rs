// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Registration schedule: once at startup, then every refresh interval.

use fedauth_common_http::{retry, RetryConfig};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::RegistrationResult;
use crate::register::{RegisterResponse, Registrar};

const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// One registration cycle with exponential backoff.
pub async fn register_with_retry(
	registrar: &Registrar,
	cfg: &RetryConfig,
) -> RegistrationResult<RegisterResponse> {
	retry(cfg, || registrar.register()).await
}

/// Runs until `cancel` fires. A cycle that exhausts its attempts is logged
/// and the next cycle still runs on schedule.
pub async fn run(
	registrar: &Registrar,
	refresh_interval: Duration,
	cfg: &RetryConfig,
	cancel: CancellationToken,
) {
	let period = refresh_interval.max(MIN_REFRESH_INTERVAL);
	let mut ticker = interval_at(Instant::now() + period, period);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

	let mut cycle: u64 = 0;
	loop {
		cycle += 1;
		tokio::select! {
			biased;
			_ = cancel.cancelled() => break,
			result = register_with_retry(registrar, cfg) => match result {
				Ok(_) => info!(cluster = registrar.cluster(), cycle, "credentials registered"),
				Err(err) => warn!(
					cluster = registrar.cluster(),
					cycle,
					error = %err,
					"registration failed, will retry on next interval"
				),
			},
		}

		tokio::select! {
			biased;
			_ = cancel.cancelled() => break,
			_ = ticker.tick() => {}
		}
	}

	info!(cluster = registrar.cluster(), "registration loop stopped");
}
