// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
	pub status: String,
	pub version: String,
}

/// GET /health - liveness probe.
pub async fn health_check() -> Json<HealthResponse> {
	Json(HealthResponse {
		status: "ok".to_string(),
		version: env!("CARGO_PKG_VERSION").to_string(),
	})
}
