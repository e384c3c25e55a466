// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 The Stagedoor Authors

//! YAML service manifest parser.
//!
//! Parses the declarative service description the route table is derived
//! from: a provider block with service-wide defaults plus one declaration
//! per function. Only the fields this system consumes are modeled; unknown
//! trigger kinds are carried opaquely so they can be filtered out later.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{GatewayError, GatewayResult};

/// Stage used when the provider block does not declare one.
pub const DEFAULT_STAGE: &str = "dev";
/// Region used when the provider block does not declare one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Root of the service manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service: String,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionConfig>,
}

/// Provider block: cloud provider name plus service-wide defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub memory_size: Option<u32>,
    #[serde(default)]
    pub timeout: Option<u32>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl ProviderConfig {
    /// Deployment stage label echoed into synthesized request contexts.
    pub fn stage(&self) -> &str {
        self.stage.as_deref().unwrap_or(DEFAULT_STAGE)
    }

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }
}

/// One declared function.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionConfig {
    pub handler: String,
    /// Fully-qualified platform name. Composed as
    /// `{service}-{stage}-{function}` when absent.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub memory_size: Option<u32>,
    #[serde(default)]
    pub timeout: Option<u32>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

/// One declared trigger. Only the `http` key is meaningful here; anything
/// else (schedule, queue, ...) is retained opaquely and filtered out during
/// route derivation.
#[derive(Debug, Clone, Deserialize)]
pub struct EventConfig {
    #[serde(default)]
    pub http: Option<HttpTrigger>,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_yaml::Value>,
}

impl EventConfig {
    /// True when the event binds the function to an HTTP route.
    pub fn is_http(&self) -> bool {
        self.http.is_some()
    }
}

/// An HTTP trigger in either of its two declared forms.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HttpTrigger {
    /// Compact `"METHOD /path"` form.
    Compact(String),
    /// Structured `{method, path, cors?}` form. The cors flag is accepted
    /// for compatibility; CORS is applied process-wide.
    Structured {
        method: String,
        path: String,
        #[serde(default)]
        cors: Option<bool>,
    },
}

impl ServiceConfig {
    /// Load and parse a manifest from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(GatewayError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| GatewayError::Io {
            context: "reading service manifest",
            source: e,
        })?;

        Self::load_str(&content)
    }

    /// Parse a manifest from a YAML string.
    pub fn load_str(content: &str) -> GatewayResult<Self> {
        serde_yaml::from_str(content).map_err(|e| GatewayError::ConfigParse {
            message: format!("YAML parse error: {}", e),
        })
    }
}
