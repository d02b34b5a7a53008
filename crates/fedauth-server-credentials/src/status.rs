// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Freshness of a stored bearer token, for display only.
//!
//! The `exp` claim is read without verifying the signature.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const EXPIRING_SOON_THRESHOLD: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
	Valid,
	ExpiringSoon,
	Expired,
	Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStatus {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires_at: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires_in: Option<String>,
	pub status: TokenState,
}

impl TokenStatus {
	fn unknown() -> Self {
		Self {
			expires_at: None,
			expires_in: None,
			status: TokenState::Unknown,
		}
	}
}

pub fn token_status(token: &str, now: DateTime<Utc>) -> TokenStatus {
	let Some(expires_at) = unverified_expiry(token) else {
		return TokenStatus::unknown();
	};

	let formatted = Some(expires_at.to_rfc3339_opts(SecondsFormat::Secs, true));
	let remaining = match (expires_at - now).to_std() {
		Ok(remaining) if !remaining.is_zero() => remaining,
		_ => {
			return TokenStatus {
				expires_at: formatted,
				expires_in: Some("expired".to_string()),
				status: TokenState::Expired,
			}
		}
	};

	let status = if remaining < EXPIRING_SOON_THRESHOLD {
		TokenState::ExpiringSoon
	} else {
		TokenState::Valid
	};

	TokenStatus {
		expires_at: formatted,
		expires_in: Some(
			humantime::format_duration(Duration::from_secs(remaining.as_secs())).to_string(),
		),
		status,
	}
}

fn unverified_expiry(token: &str) -> Option<DateTime<Utc>> {
	#[derive(Deserialize)]
	struct Exp {
		exp: Option<i64>,
	}

	let mut parts = token.split('.');
	let (Some(_), Some(payload), Some(_), None) =
		(parts.next(), parts.next(), parts.next(), parts.next())
	else {
		return None;
	};

	let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
	let exp = serde_json::from_slice::<Exp>(&bytes).ok()?.exp?;
	if exp == 0 {
		return None;
	}
	Utc.timestamp_opt(exp, 0).single()
}
