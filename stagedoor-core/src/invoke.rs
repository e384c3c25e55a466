//! Per-request sandbox lifecycle.
//!
//! Drives one execution unit from creation through teardown and classifies
//! what the function wrote to stdout. The unit's stderr frames are passed
//! through to the host's stderr as they are demultiplexed.

use std::io::Write as _;
use std::path::Path;

use crate::demux::demux;
use crate::docker::{build_environment, debug_entrypoint, runtime_image, ExecutionBackend, UnitSpec};
use crate::error::{BackendError, GatewayResult};
use crate::response::{classify, ClassifiedOutput};
use crate::routes::RouteFunction;
use crate::unit::{UnitLifecycle, UnitState};

/// Runs one invocation to completion: create (pulling the image on a miss,
/// once), start, wait, fetch the combined output, tear down, classify.
pub async fn invoke(
    backend: &dyn ExecutionBackend,
    func: &RouteFunction,
    event_json: &str,
    region: &str,
    debug_port: Option<u16>,
    task_dir: &Path,
) -> GatewayResult<ClassifiedOutput> {
    let mut lifecycle = UnitLifecycle::new(func.name.clone());
    match run(backend, func, event_json, region, debug_port, task_dir, &mut lifecycle).await {
        Ok(output) => Ok(output),
        Err(error) => {
            if !lifecycle.state().is_terminal() {
                let _ = lifecycle.transition_to(UnitState::Failed);
            }
            Err(error)
        }
    }
}

async fn run(
    backend: &dyn ExecutionBackend,
    func: &RouteFunction,
    event_json: &str,
    region: &str,
    debug_port: Option<u16>,
    task_dir: &Path,
    lifecycle: &mut UnitLifecycle,
) -> GatewayResult<ClassifiedOutput> {
    let image = runtime_image(&func.runtime);
    let spec = UnitSpec {
        image: image.clone(),
        env: build_environment(func, event_json, region),
        entrypoint: debug_port.and_then(|port| debug_entrypoint(&func.runtime, port)),
        debug_port,
        task_dir: task_dir.to_path_buf(),
    };

    lifecycle.transition_to(UnitState::Creating)?;
    tracing::debug!(handler = %func.handler, image = %image, "creating execution unit");
    let unit_id = match backend.create_unit(&spec).await {
        Ok(id) => id,
        Err(BackendError::NotFound { .. }) => {
            tracing::info!(image = %image, "image not present locally");
            println!("Pulling {image} image...");
            lifecycle.transition_to(UnitState::Pulling)?;
            backend.pull_image(&image).await?;
            lifecycle.transition_to(UnitState::Creating)?;
            backend.create_unit(&spec).await?
        }
        Err(error) => return Err(error.into()),
    };
    lifecycle.transition_to(UnitState::Created)?;

    tracing::debug!(handler = %func.handler, unit = %unit_id, "invoking function");
    backend.start_unit(&unit_id).await?;
    lifecycle.transition_to(UnitState::Running)?;

    // The declared timeout is advisory only; nothing bounds this wait.
    let exit_code = backend.wait_unit(&unit_id).await?;
    lifecycle.transition_to(UnitState::Exited)?;
    tracing::debug!(unit = %unit_id, exit_code, "unit exited");

    let raw = backend.fetch_output(&unit_id).await?;
    lifecycle.transition_to(UnitState::LogsFetched)?;

    let mut captured = Vec::new();
    let mut host_stderr = std::io::stderr();
    demux(
        &raw,
        |chunk| captured.extend_from_slice(chunk),
        |chunk| {
            let _ = host_stderr.write_all(chunk);
        },
    );

    // Teardown is best-effort: a failure here leaks the unit, not the request.
    tracing::debug!(unit = %unit_id, "removing unit");
    if let Err(error) = backend.destroy_unit(&unit_id).await {
        tracing::warn!(unit = %unit_id, %error, "failed to remove unit");
    }
    lifecycle.transition_to(UnitState::Destroyed)?;

    let stdout_text = String::from_utf8_lossy(&captured);
    tracing::debug!(raw = %stdout_text, "raw function response");
    let output = classify(&stdout_text)?;
    if let Some(trailer) = &output.trailer {
        println!("{trailer}");
    }
    Ok(output)
}
