// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 The Stagedoor Authors

//! `stagedoor validate` command - validate a service manifest.

use stagedoor_core::{GatewayResult, ServiceConfig};

pub async fn execute(file: &str) -> GatewayResult<()> {
    tracing::info!(file = %file, "validating service manifest");

    let config = ServiceConfig::load_file(file)?;

    println!("✓ Manifest is valid");
    println!();
    println!("Service:  {}", config.service);
    println!(
        "Provider: {} (stage: {}, region: {})",
        config.provider.name,
        config.provider.stage(),
        config.provider.region()
    );
    println!();
    println!("Functions ({}):", config.functions.len());
    for (name, func) in &config.functions {
        let http_events = func.events.iter().filter(|event| event.is_http()).count();
        println!(
            "  - {} (handler: {}, http events: {})",
            name, func.handler, http_events
        );
    }

    Ok(())
}
