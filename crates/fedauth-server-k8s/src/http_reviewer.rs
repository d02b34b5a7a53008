// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use fedauth_common_http::sanitize_body_for_error;
use fedauth_common_secret::SecretString;
use reqwest::{header::AUTHORIZATION, Client};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{K8sError, K8sResult};
use crate::reviewer::TokenReviewer;
use crate::token_review::{TokenReview, TOKEN_REVIEW_PATH};

/// Reviews tokens against a remote API server with an explicit CA and bearer.
pub struct HttpTokenReviewer {
	client: Client,
	endpoint: String,
	bearer: Option<SecretString>,
}

impl HttpTokenReviewer {
	/// `ca_pem` may be empty, in which case the system roots are trusted.
	pub fn new(
		endpoint: impl Into<String>,
		ca_pem: &[u8],
		bearer: Option<SecretString>,
		timeout: Duration,
	) -> K8sResult<Self> {
		let client = fedauth_common_http::builder_with_ca(ca_pem)
			.and_then(|b| b.timeout(timeout).build())
			.map_err(|e| K8sError::Config {
				message: e.to_string(),
			})?;

		Ok(Self {
			client,
			endpoint: endpoint.into().trim_end_matches('/').to_string(),
			bearer,
		})
	}
}

impl std::fmt::Debug for HttpTokenReviewer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HttpTokenReviewer")
			.field("endpoint", &self.endpoint)
			.field("has_bearer", &self.bearer.is_some())
			.finish()
	}
}

#[async_trait]
impl TokenReviewer for HttpTokenReviewer {
	#[instrument(skip(self, request), fields(endpoint = %self.endpoint))]
	async fn review(&self, request: &TokenReview) -> K8sResult<TokenReview> {
		let url = format!("{}{}", self.endpoint, TOKEN_REVIEW_PATH);
		let mut req = self.client.post(&url).json(request);
		if let Some(bearer) = &self.bearer {
			req = req.header(AUTHORIZATION, format!("Bearer {}", bearer.expose()));
		}

		let response = req.send().await?;
		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(K8sError::Upstream {
				status: status.as_u16(),
				message: sanitize_body_for_error(&body, 200),
			});
		}

		let review: TokenReview = response.json().await?;
		debug!(
			authenticated = review.is_authenticated(),
			"remote TokenReview completed"
		);
		Ok(review)
	}
}
