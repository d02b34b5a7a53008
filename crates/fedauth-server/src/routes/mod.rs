// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

pub mod clusters;
pub mod health;
pub mod register;
pub mod token_review;
pub mod validate;
