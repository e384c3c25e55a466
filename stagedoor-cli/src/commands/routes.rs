//! `stagedoor routes` command - print the derived route table.

use stagedoor_core::routes::build_route_functions;
use stagedoor_core::{GatewayResult, ServiceConfig};

pub async fn execute(config_path: &str) -> GatewayResult<()> {
    let config = ServiceConfig::load_file(config_path)?;
    let functions = build_route_functions(&config)?;

    println!("❯ Function routes");
    for func in &functions {
        println!(
            "* {} ({}, {}mb, {}s)",
            func.name, func.runtime, func.memory_size, func.timeout
        );
        for route in &func.routes {
            println!("    {} {}", route.method, route.path);
        }
    }

    Ok(())
}
