// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Federation server: one identity-review endpoint for many clusters.
//!
//! A presented token is attributed to a cluster by verifying its signature
//! against each trusted cluster's published keys, locally. Only the detected
//! cluster is then asked to review the token.

pub mod api;
pub mod error;
pub mod review;
pub mod routes;

pub use api::{create_router, AppState};
pub use error::ErrorResponse;
