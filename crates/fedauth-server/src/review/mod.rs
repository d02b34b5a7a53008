// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Cluster detection and identity-review forwarding.

mod detector;
mod forwarder;

pub use detector::{detect_cluster, DetectError};
pub use forwarder::{ForwardError, ReviewForwarder};
