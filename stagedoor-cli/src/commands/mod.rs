// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 The Stagedoor Authors

//! CLI command modules.

pub mod routes;
pub mod start;
pub mod validate;
