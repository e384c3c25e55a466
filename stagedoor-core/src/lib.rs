//! Stagedoor Core Library
//!
//! Emulates an API Gateway + function-compute stack on the local machine:
//! derives HTTP routes from declared functions, synthesizes gateway-shaped
//! invocation events, runs each invocation in an ephemeral container, splits
//! the container's combined output stream, and translates the function's
//! response back into an HTTP response.

pub mod config;
pub mod demux;
pub mod docker;
pub mod error;
pub mod event;
pub mod invoke;
pub mod response;
pub mod routes;
pub mod server;
pub mod unit;

// Re-export commonly used types
pub use config::{EventConfig, FunctionConfig, HttpTrigger, ProviderConfig, ServiceConfig};
pub use docker::{DockerBackend, ExecutionBackend, UnitSpec};
pub use error::{BackendError, GatewayError, GatewayResult, UnitTransitionError};
pub use event::{InboundRequest, InvocationEvent};
pub use response::{ClassifiedOutput, FunctionResponse};
pub use routes::{Route, RouteFunction};
pub use server::{StartOptions, DEFAULT_PORT};
pub use unit::{UnitLifecycle, UnitState};
