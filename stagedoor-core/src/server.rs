// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 The Stagedoor Authors

//! HTTP server lifecycle and request wiring.
//!
//! Registers one route per derived HTTP trigger, each bound to the full
//! synthesize-invoke-classify pipeline, then serves until the first
//! termination signal arrives.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{RawPathParams, Request};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, delete, get, head, options, patch, post, put, MethodRouter};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::docker::{DockerBackend, ExecutionBackend};
use crate::error::{GatewayError, GatewayResult};
use crate::event::{apigw_event, InboundRequest};
use crate::invoke::invoke;
use crate::response::{FunctionResponse, DEFAULT_CONTENT_TYPE};
use crate::routes::{build_route_functions, matcher_path, RouteFunction};

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Port to listen on.
    pub port: u16,
    /// Debugger port to publish. Only supported for a subset of runtimes.
    pub debug_port: Option<u16>,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            debug_port: None,
        }
    }
}

/// Shared by every request handler: the backend handle plus the immutable
/// invocation settings.
struct Invoker {
    backend: Arc<dyn ExecutionBackend>,
    stage: String,
    region: String,
    debug_port: Option<u16>,
    task_dir: PathBuf,
}

/// Builds the router: one registration per derived route, wrapped in request
/// tracing and process-wide CORS.
pub fn build_router(
    functions: &[RouteFunction],
    backend: Arc<dyn ExecutionBackend>,
    stage: &str,
    region: &str,
    debug_port: Option<u16>,
    task_dir: PathBuf,
) -> Router {
    let invoker = Arc::new(Invoker {
        backend,
        stage: stage.to_string(),
        region: region.to_string(),
        debug_port,
        task_dir,
    });

    // Method routers for the same path are merged so two functions may share
    // a path with different verbs.
    let mut routers: BTreeMap<String, MethodRouter> = BTreeMap::new();
    for func in functions {
        let func = Arc::new(func.clone());
        for route in &func.routes {
            let invoker = Arc::clone(&invoker);
            let func = Arc::clone(&func);
            let handler = move |params: RawPathParams, request: Request| {
                let invoker = Arc::clone(&invoker);
                let func = Arc::clone(&func);
                async move { handle_invocation(invoker, func, params, request).await }
            };

            let path = matcher_path(&route.path);
            let registration = register(&route.method, handler);
            let merged = match routers.remove(&path) {
                Some(existing) => existing.merge(registration),
                None => registration,
            };
            routers.insert(path, merged);
        }
    }

    let mut router = Router::new();
    for (path, method_router) in routers {
        router = router.route(&path, method_router);
    }
    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Explicit mapping from a normalized verb to a router registration. The
/// match-any registration covers the `all` wildcard; an unrecognized verb
/// falls back to it as well.
fn register<H, T>(method: &str, handler: H) -> MethodRouter
where
    H: axum::handler::Handler<T, ()>,
    T: 'static,
{
    match method {
        "get" => get(handler),
        "post" => post(handler),
        "put" => put(handler),
        "delete" => delete(handler),
        "patch" => patch(handler),
        "head" => head(handler),
        "options" => options(handler),
        _ => any(handler),
    }
}

async fn handle_invocation(
    invoker: Arc<Invoker>,
    func: Arc<RouteFunction>,
    params: RawPathParams,
    request: Request,
) -> Response {
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);
    let mut headers = BTreeMap::new();
    for (name, value) in request.headers() {
        headers.insert(
            name.as_str().to_string(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        );
    }
    let path_parameters: BTreeMap<String, String> = params
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

    let body = match axum::body::to_bytes(request.into_body(), usize::MAX).await {
        Ok(bytes) if bytes.is_empty() => None,
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(error) => {
            tracing::error!(%error, "unable to read request body");
            return error_response(&error.to_string());
        }
    };

    let inbound = InboundRequest {
        method,
        path,
        body,
        headers,
        query,
        path_parameters,
    };
    let event = apigw_event(&inbound, &invoker.stage);
    let event_json = match serde_json::to_string(&event) {
        Ok(json) => json,
        Err(error) => return error_response(&error.to_string()),
    };

    match invoke(
        invoker.backend.as_ref(),
        &func,
        &event_json,
        &invoker.region,
        invoker.debug_port,
        &invoker.task_dir,
    )
    .await
    {
        Ok(output) => function_response(output.response),
        Err(error) => {
            tracing::error!(function = %func.name, %error, "invocation failed");
            error_response(&error.to_string())
        }
    }
}

fn function_response(response: FunctionResponse) -> Response {
    match response {
        FunctionResponse::Unhandled { payload } => {
            tracing::debug!("function invocation yielded unhandled error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, DEFAULT_CONTENT_TYPE.to_string())],
                payload.to_string(),
            )
                .into_response()
        }
        FunctionResponse::Success {
            status,
            content_type,
            body,
        } => {
            let status =
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
        }
    }
}

fn error_response(message: &str) -> Response {
    let body = serde_json::json!({ "errorMessage": message }).to_string();
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, DEFAULT_CONTENT_TYPE.to_string())],
        body,
    )
        .into_response()
}

/// Starts the local gateway and blocks until a termination signal arrives.
/// This is the single entry point the CLI adapter consumes.
pub async fn start(config: &ServiceConfig, options: StartOptions) -> GatewayResult<()> {
    let functions = build_route_functions(config)?;

    // One connectivity probe per server start, not per request.
    let backend = DockerBackend::new();
    tracing::debug!("pinging docker daemon");
    backend
        .ping()
        .await
        .map_err(|e| GatewayError::BackendUnavailable {
            message: e.to_string(),
        })?;

    let stage = config.provider.stage().to_string();
    let region = config.provider.region().to_string();
    let task_dir = std::env::current_dir().map_err(|e| GatewayError::Io {
        context: "resolving working directory",
        source: e,
    })?;

    let router = build_router(
        &functions,
        Arc::new(backend),
        &stage,
        &region,
        options.debug_port,
        task_dir,
    );

    println!("Starting server...");
    let addr = SocketAddr::from(([0, 0, 0, 0], options.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AddrInUse => GatewayError::PortInUse { port: options.port },
            _ => GatewayError::Listen {
                message: e.to_string(),
            },
        })?;

    println!("Listening on port {}...", options.port);
    if let Some(debug_port) = options.debug_port {
        println!("❯ Debugging enabled on port {debug_port}");
    }
    println!("❯ Function routes");
    for func in &functions {
        println!("* {}", func.name);
        for route in &func.routes {
            println!(
                "    {} http://localhost:{}{}",
                route.method, options.port, route.path
            );
        }
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GatewayError::Listen {
            message: e.to_string(),
        })?;

    Ok(())
}

/// Resolves when the first of the two termination signals arrives.
async fn shutdown_signal() {
    let interrupt = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(error) => {
                tracing::error!(%error, "unable to install SIGTERM handler");
                let _ = interrupt.await;
                println!("Received SIGINT signal. Stopping server...");
                return;
            }
        };

        tokio::select! {
            _ = interrupt => println!("Received SIGINT signal. Stopping server..."),
            _ = terminate.recv() => println!("Received SIGTERM signal. Stopping server..."),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = interrupt.await;
        println!("Received interrupt signal. Stopping server...");
    }
}
