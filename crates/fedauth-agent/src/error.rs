// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use fedauth_common_http::RetryableError;
use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistrationError {
	#[error("failed to read {what} from {path}: {source}")]
	ReadFile {
		what: &'static str,
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("service account token at {0} is empty")]
	EmptyToken(PathBuf),

	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	/// The server answered with a non-success status.
	#[error("registration rejected ({status}): {error} - {message}")]
	Rejected {
		status: StatusCode,
		error: String,
		message: String,
	},

	#[error("invalid response: {0}")]
	InvalidResponse(String),

	#[error("configuration error: {0}")]
	Configuration(String),
}

pub type RegistrationResult<T> = Result<T, RegistrationError>;

impl RetryableError for RegistrationError {
	fn is_retryable(&self) -> bool {
		match self {
			// Projected tokens are written by the kubelet and may not exist yet.
			RegistrationError::ReadFile { .. } | RegistrationError::EmptyToken(_) => true,
			RegistrationError::Http(err) => err.is_retryable() || err.is_request(),
			// The server also answers 401 when it cannot reach our key set.
			RegistrationError::Rejected { status, .. } => {
				status.is_retryable() || *status == StatusCode::UNAUTHORIZED
			}
			RegistrationError::InvalidResponse(_) => true,
			RegistrationError::Configuration(_) => false,
		}
	}
}
