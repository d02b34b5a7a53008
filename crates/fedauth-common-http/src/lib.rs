// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP utilities.
//!
//! This crate provides:
//! - A client builder with a consistent User-Agent and optional cluster CA trust
//! - Exponential backoff as a pure function plus an async retry loop

mod client;
mod retry;

pub use client::{builder, builder_with_ca, sanitize_body_for_error, user_agent};
pub use retry::{backoff_delay, retry, RetryConfig, RetryableError};
