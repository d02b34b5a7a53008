// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use serde::{Deserialize, Serialize};

/// Error body for the registration and validation endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
}

impl ErrorResponse {
	pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			error: error.into(),
			message: message.into(),
		}
	}

	pub fn into_response_with(self, status: StatusCode) -> Response {
		(status, Json(self)).into_response()
	}
}
