// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Kubernetes plumbing for the federation server.
//!
//! This crate provides:
//! - The `authentication.k8s.io/v1` TokenReview wire envelope
//! - A trait-based reviewer with an ambient in-cluster implementation (kube)
//!   and a remote-endpoint implementation (reqwest, per-cluster CA and bearer)
//! - Read and server-side-apply access to the Secret that persists credentials

mod error;
mod http_reviewer;
mod kube_reviewer;
mod reviewer;
mod secret;
mod token_review;

pub use error::{K8sError, K8sResult};
pub use http_reviewer::HttpTokenReviewer;
pub use kube_reviewer::KubeTokenReviewer;
pub use reviewer::TokenReviewer;
pub use secret::SecretClient;
pub use token_review::{
	TokenReview, TokenReviewSpec, TokenReviewStatus, UserInfo, TOKEN_REVIEW_API_VERSION,
	TOKEN_REVIEW_KIND, TOKEN_REVIEW_PATH,
};
