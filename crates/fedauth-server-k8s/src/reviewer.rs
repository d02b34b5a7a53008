// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;

use crate::error::K8sResult;
use crate::token_review::TokenReview;

/// Submits a TokenReview to one cluster's API server.
///
/// Implementations return the cluster's authoritative answer. An
/// `authenticated: false` status is a successful call; only transport and
/// HTTP-level failures are errors.
#[async_trait]
pub trait TokenReviewer: Send + Sync {
	async fn review(&self, request: &TokenReview) -> K8sResult<TokenReview>;
}
