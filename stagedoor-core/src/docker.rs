// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 The Stagedoor Authors

//! Execution backend: ephemeral containers over the Docker Engine API.
//!
//! Speaks HTTP to the daemon's unix socket. Only the operations the
//! invocation lifecycle depends on are implemented: connectivity probe,
//! create, start, wait, combined-log retrieval, remove, and image pull with
//! streamed progress. Log retrieval returns the raw multiplexed byte stream;
//! splitting it is the demultiplexer's job.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{header, Method, Request, StatusCode};
use hyper_util::client::legacy::Client;
use hyperlocal::{UnixClientExt, UnixConnector, Uri as UnixUri};
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::routes::RouteFunction;

/// Default daemon socket, matching the docker CLI's own default.
pub const DOCKER_SOCKET: &str = "/var/run/docker.sock";
/// Directory the function's code is mounted into, read-only.
pub const TASK_DIR: &str = "/var/task";

/// Deterministic image reference for a runtime identifier.
pub fn runtime_image(runtime: &str) -> String {
    // https://hub.docker.com/r/lambci/lambda/tags
    format!("lambci/lambda:{runtime}")
}

/// Environment for one invocation: function-level variables first, then the
/// fixed invocation variables.
pub fn build_environment(func: &RouteFunction, event_json: &str, region: &str) -> Vec<String> {
    let mut env: Vec<String> = func
        .environment
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    env.push(format!("AWS_LAMBDA_FUNCTION_HANDLER={}", func.handler));
    env.push(format!("AWS_LAMBDA_EVENT_BODY={event_json}"));
    env.push(format!("AWS_LAMBDA_FUNCTION_NAME={}", func.qualified_name));
    env.push(format!(
        "AWS_LAMBDA_FUNCTION_MEMORY_SIZE={}",
        func.memory_size
    ));
    env.push(format!("AWS_LAMBDA_FUNCTION_TIMEOUT={}", func.timeout));
    env.push(format!("AWS_REGION={region}"));
    env.push(format!("AWS_DEFAULT_REGION={region}"));
    env
}

/// Debugger-launching entrypoint for runtimes that support one. Only the
/// node runtimes ship a debuggable bootstrap in their images.
pub fn debug_entrypoint(runtime: &str, port: u16) -> Option<Vec<String>> {
    match runtime {
        "nodejs8.10" | "nodejs10.x" | "nodejs12.x" => Some(vec![
            "/var/lang/bin/node".to_string(),
            format!("--inspect-brk=0.0.0.0:{port}"),
            "/var/runtime/node_modules/awslambda/index.js".to_string(),
        ]),
        _ => None,
    }
}

pub fn debug_supported(runtime: &str) -> bool {
    debug_entrypoint(runtime, 0).is_some()
}

/// Everything the backend needs to create one execution unit.
#[derive(Debug, Clone)]
pub struct UnitSpec {
    pub image: String,
    pub env: Vec<String>,
    pub entrypoint: Option<Vec<String>>,
    pub debug_port: Option<u16>,
    /// Host directory bound read-only into the unit's task volume.
    pub task_dir: PathBuf,
}

/// The create/start/wait/logs/remove contract the invocation lifecycle
/// depends on. Implementations must be safe for concurrent use by many
/// in-flight invocations.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Connectivity probe, run once at server start.
    async fn ping(&self) -> Result<(), BackendError>;

    /// Requests creation of a unit; returns the backend-assigned id.
    /// A missing image surfaces as [`BackendError::NotFound`].
    async fn create_unit(&self, spec: &UnitSpec) -> Result<String, BackendError>;

    async fn start_unit(&self, id: &str) -> Result<(), BackendError>;

    /// Suspends until the unit exits; returns its exit code. No timeout is
    /// enforced here.
    async fn wait_unit(&self, id: &str) -> Result<i64, BackendError>;

    /// Retrieves the combined stdout+stderr log as one raw multiplexed byte
    /// sequence. Only meaningful after the unit has exited.
    async fn fetch_output(&self, id: &str) -> Result<Vec<u8>, BackendError>;

    async fn destroy_unit(&self, id: &str) -> Result<(), BackendError>;

    /// Pulls an image, streaming progress to the operator's terminal.
    async fn pull_image(&self, image: &str) -> Result<(), BackendError>;
}

// Engine API request/response bodies, limited to the fields this system
// sends and reads.

#[derive(Debug, Serialize)]
struct EmptyObject {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateContainerBody<'a> {
    image: &'a str,
    env: &'a [String],
    volumes: BTreeMap<&'a str, EmptyObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entrypoint: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exposed_ports: Option<BTreeMap<String, EmptyObject>>,
    host_config: HostConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct HostConfig {
    binds: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port_bindings: Option<BTreeMap<String, Vec<PortBinding>>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PortBinding {
    host_port: String,
}

#[derive(Debug, Deserialize)]
struct CreateContainerResponse {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct WaitResponse {
    #[serde(rename = "StatusCode")]
    status_code: i64,
}

#[derive(Debug, Default, Deserialize)]
struct PullProgress {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    progress: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn create_body(spec: &UnitSpec) -> CreateContainerBody<'_> {
    let mut volumes = BTreeMap::new();
    volumes.insert(TASK_DIR, EmptyObject {});

    let exposed_ports = spec.debug_port.map(|port| {
        let mut ports = BTreeMap::new();
        ports.insert(format!("{port}/tcp"), EmptyObject {});
        ports
    });
    let port_bindings = spec.debug_port.map(|port| {
        let mut bindings = BTreeMap::new();
        bindings.insert(
            format!("{port}/tcp"),
            vec![PortBinding {
                host_port: port.to_string(),
            }],
        );
        bindings
    });

    CreateContainerBody {
        image: &spec.image,
        env: &spec.env,
        volumes,
        entrypoint: spec.entrypoint.as_deref(),
        exposed_ports,
        host_config: HostConfig {
            binds: vec![format!("{}:{}:ro", spec.task_dir.display(), TASK_DIR)],
            port_bindings,
        },
    }
}

/// Docker Engine API client over the daemon's unix socket.
pub struct DockerBackend {
    client: Client<UnixConnector, Full<Bytes>>,
    socket_path: PathBuf,
}

impl DockerBackend {
    pub fn new() -> Self {
        Self::with_socket(DOCKER_SOCKET)
    }

    pub fn with_socket(path: impl Into<PathBuf>) -> Self {
        Self {
            client: Client::unix(),
            socket_path: path.into(),
        }
    }

    fn uri(&self, path_and_query: &str) -> hyper::Uri {
        UnixUri::new(&self.socket_path, path_and_query).into()
    }

    async fn request(
        &self,
        operation: &'static str,
        method: Method,
        path_and_query: &str,
        payload: Option<Vec<u8>>,
    ) -> Result<Bytes, BackendError> {
        let mut builder = Request::builder().method(method).uri(self.uri(path_and_query));
        let body = match payload {
            Some(bytes) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Full::new(Bytes::from(bytes))
            }
            None => Full::new(Bytes::new()),
        };
        let request = builder.body(body).map_err(|e| BackendError::Transport {
            operation,
            message: e.to_string(),
        })?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| BackendError::Transport {
                operation,
                message: e.to_string(),
            })?;
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| BackendError::Transport {
                operation,
                message: e.to_string(),
            })?
            .to_bytes();

        if status == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound { operation });
        }
        if !status.is_success() {
            return Err(BackendError::Api {
                operation,
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        Ok(bytes)
    }
}

impl Default for DockerBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionBackend for DockerBackend {
    async fn ping(&self) -> Result<(), BackendError> {
        self.request("ping", Method::GET, "/_ping", None).await?;
        Ok(())
    }

    async fn create_unit(&self, spec: &UnitSpec) -> Result<String, BackendError> {
        let operation = "create_unit";
        let body = serde_json::to_vec(&create_body(spec)).map_err(|e| BackendError::Transport {
            operation,
            message: e.to_string(),
        })?;
        let bytes = self
            .request(operation, Method::POST, "/containers/create", Some(body))
            .await?;
        let response: CreateContainerResponse =
            serde_json::from_slice(&bytes).map_err(|e| BackendError::Transport {
                operation,
                message: format!("unreadable create response: {e}"),
            })?;
        Ok(response.id)
    }

    async fn start_unit(&self, id: &str) -> Result<(), BackendError> {
        self.request(
            "start_unit",
            Method::POST,
            &format!("/containers/{id}/start"),
            None,
        )
        .await?;
        Ok(())
    }

    async fn wait_unit(&self, id: &str) -> Result<i64, BackendError> {
        let operation = "wait_unit";
        let bytes = self
            .request(operation, Method::POST, &format!("/containers/{id}/wait"), None)
            .await?;
        let response: WaitResponse =
            serde_json::from_slice(&bytes).map_err(|e| BackendError::Transport {
                operation,
                message: format!("unreadable wait response: {e}"),
            })?;
        Ok(response.status_code)
    }

    async fn fetch_output(&self, id: &str) -> Result<Vec<u8>, BackendError> {
        let bytes = self
            .request(
                "fetch_output",
                Method::GET,
                &format!("/containers/{id}/logs?stdout=true&stderr=true"),
                None,
            )
            .await?;
        Ok(bytes.to_vec())
    }

    async fn destroy_unit(&self, id: &str) -> Result<(), BackendError> {
        self.request(
            "destroy_unit",
            Method::DELETE,
            &format!("/containers/{id}"),
            None,
        )
        .await?;
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<(), BackendError> {
        let operation = "pull_image";
        let (from_image, tag) = image.rsplit_once(':').unwrap_or((image, "latest"));
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.uri(&format!("/images/create?fromImage={from_image}&tag={tag}")))
            .body(Full::new(Bytes::new()))
            .map_err(|e| BackendError::Transport {
                operation,
                message: e.to_string(),
            })?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| BackendError::Transport {
                operation,
                message: e.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            let bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|e| BackendError::Transport {
                    operation,
                    message: e.to_string(),
                })?
                .to_bytes();
            return Err(BackendError::Api {
                operation,
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        // The daemon streams NDJSON progress events until the pull resolves.
        let mut body = response.into_body();
        let mut pending: Vec<u8> = Vec::new();
        let mut stdout = std::io::stdout();
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| BackendError::Transport {
                operation,
                message: e.to_string(),
            })?;
            if let Ok(data) = frame.into_data() {
                pending.extend_from_slice(&data);
                while let Some(newline) = pending.iter().position(|byte| *byte == b'\n') {
                    let line: Vec<u8> = pending.drain(..=newline).collect();
                    report_pull_progress(image, &line, &mut stdout)?;
                }
            }
        }
        if !pending.is_empty() {
            report_pull_progress(image, &pending, &mut stdout)?;
        }
        let _ = writeln!(stdout);

        Ok(())
    }
}

/// Renders one progress event, overwriting the previous line.
fn report_pull_progress(
    image: &str,
    line: &[u8],
    out: &mut impl std::io::Write,
) -> Result<(), BackendError> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(());
    }

    let event: PullProgress = serde_json::from_str(text).unwrap_or_default();
    if let Some(message) = event.error {
        return Err(BackendError::Pull {
            image: image.to_string(),
            message,
        });
    }

    let _ = write!(
        out,
        "\r\x1b[2K{} {} {}",
        event.status.unwrap_or_default(),
        event.id.unwrap_or_default(),
        event.progress.unwrap_or_default()
    );
    let _ = out.flush();
    Ok(())
}
