// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use k8s_openapi::api::authentication::v1 as authv1;
use kube::{
	api::{Api, PostParams},
	Client,
};
use tracing::{debug, instrument};

use crate::error::{K8sError, K8sResult};
use crate::reviewer::TokenReviewer;
use crate::token_review::TokenReview;

/// Reviews tokens against the cluster this process runs in, using its own
/// ServiceAccount identity.
#[derive(Clone)]
pub struct KubeTokenReviewer {
	client: Client,
}

impl KubeTokenReviewer {
	/// Uses only the mounted ServiceAccount, ignoring any kubeconfig.
	pub fn in_cluster() -> K8sResult<Self> {
		let config = kube::Config::incluster().map_err(|e| K8sError::Config {
			message: format!("not running in cluster: {e}"),
		})?;
		let client = Client::try_from(config)?;
		debug!("in-cluster K8s client initialized");
		Ok(Self { client })
	}
}

#[async_trait]
impl TokenReviewer for KubeTokenReviewer {
	#[instrument(skip(self, request), fields(audiences = ?request.spec.audiences))]
	async fn review(&self, request: &TokenReview) -> K8sResult<TokenReview> {
		let token_reviews: Api<authv1::TokenReview> = Api::all(self.client.clone());
		let response = token_reviews
			.create(&PostParams::default(), &authv1::TokenReview::from(request))
			.await?;

		let review = TokenReview::from(response);
		debug!(
			authenticated = review.is_authenticated(),
			"ambient TokenReview completed"
		);
		Ok(review)
	}
}
