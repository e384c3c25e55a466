// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 The Stagedoor Authors

//! `stagedoor start` command - run the local gateway.

use stagedoor_core::server::{self, StartOptions};
use stagedoor_core::{GatewayResult, ServiceConfig};

pub async fn execute(config_path: &str, port: u16, debug_port: Option<u16>) -> GatewayResult<()> {
    tracing::info!(config = %config_path, port, "starting local gateway");

    let config = ServiceConfig::load_file(config_path)?;
    server::start(&config, StartOptions { port, debug_port }).await
}
