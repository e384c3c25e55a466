// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 The Stagedoor Authors

//! Gateway invocation event synthesis.
//!
//! Builds the gateway-shaped payload a function receives from an inbound
//! local request plus the deployment stage label. Synthesis cannot fail:
//! every field is either echoed from the request or a fixed placeholder.

use std::collections::BTreeMap;

use serde::Serialize;

/// Source address reported for every synthesized invocation.
pub const LOOPBACK_SOURCE_IP: &str = "127.0.0.1";
/// The local listener only ever speaks plain http.
const FORWARDED_PROTO: &str = "http";
const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";
/// Synthetic but stable-shaped identifier used throughout the request
/// context.
const PLACEHOLDER_ID: &str = "123";
const USER_AGENT: &str = concat!("Stagedoor/", env!("CARGO_PKG_VERSION"));

/// The inbound request fields the synthesizer consumes.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub method: String,
    pub path: String,
    pub body: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Raw query string, without the leading `?`.
    pub query: Option<String>,
    pub path_parameters: BTreeMap<String, String>,
}

/// Structural analogue of the gateway's invocation payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationEvent {
    pub http_method: String,
    pub path: String,
    pub body: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub query_string_parameters: Option<BTreeMap<String, String>>,
    pub multi_value_query_string_parameters: Option<BTreeMap<String, Vec<String>>>,
    pub path_parameters: BTreeMap<String, String>,
    pub stage_variables: Option<BTreeMap<String, String>>,
    pub is_base64_encoded: bool,
    pub request_context: RequestContext,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub path: String,
    pub account_id: String,
    pub resource_id: String,
    pub stage: String,
    pub request_id: String,
    pub identity: CallerIdentity,
    pub resource_path: String,
    pub http_method: String,
    pub api_id: String,
}

/// Caller identity block; only the source IP is populated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    pub cognito_identity_pool_id: Option<String>,
    pub account_id: Option<String>,
    pub cognito_identity_id: Option<String>,
    pub caller: Option<String>,
    pub api_key: Option<String>,
    pub source_ip: String,
    pub access_key: Option<String>,
    pub cognito_authentication_type: Option<String>,
    pub cognito_authentication_provider: Option<String>,
    pub user_arn: Option<String>,
    pub user_agent: String,
    pub user: Option<String>,
}

/// Synthesizes the invocation payload for one inbound request.
pub fn apigw_event(request: &InboundRequest, stage: &str) -> InvocationEvent {
    let mut headers = request.headers.clone();
    headers.insert(
        FORWARDED_PROTO_HEADER.to_string(),
        FORWARDED_PROTO.to_string(),
    );

    let (single, multi) = parse_query(request.query.as_deref());

    InvocationEvent {
        http_method: request.method.clone(),
        path: request.path.clone(),
        body: request.body.clone(),
        headers,
        query_string_parameters: single,
        multi_value_query_string_parameters: multi,
        path_parameters: request.path_parameters.clone(),
        stage_variables: None,
        is_base64_encoded: false,
        request_context: RequestContext {
            path: "/".to_string(),
            account_id: PLACEHOLDER_ID.to_string(),
            resource_id: PLACEHOLDER_ID.to_string(),
            stage: stage.to_string(),
            request_id: PLACEHOLDER_ID.to_string(),
            identity: CallerIdentity {
                cognito_identity_pool_id: None,
                account_id: None,
                cognito_identity_id: None,
                caller: None,
                api_key: None,
                source_ip: LOOPBACK_SOURCE_IP.to_string(),
                access_key: None,
                cognito_authentication_type: None,
                cognito_authentication_provider: None,
                user_arn: None,
                user_agent: USER_AGENT.to_string(),
                user: None,
            },
            resource_path: "/".to_string(),
            http_method: request.method.clone(),
            api_id: PLACEHOLDER_ID.to_string(),
        },
    }
}

/// Exposes the query string both as a flat map (last occurrence wins) and as
/// a multi-value map. Both are `None` when the request carries no query.
#[allow(clippy::type_complexity)]
fn parse_query(
    query: Option<&str>,
) -> (
    Option<BTreeMap<String, String>>,
    Option<BTreeMap<String, Vec<String>>>,
) {
    let query = match query {
        Some(q) if !q.is_empty() => q,
        _ => return (None, None),
    };

    let mut single = BTreeMap::new();
    let mut multi: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        single.insert(key.to_string(), value.to_string());
        multi.entry(key.to_string()).or_default().push(value.to_string());
    }

    (Some(single), Some(multi))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> InboundRequest {
        InboundRequest {
            method: "GET".to_string(),
            path: "/hello/world".to_string(),
            body: None,
            headers: BTreeMap::from([("accept".to_string(), "*/*".to_string())]),
            query: None,
            path_parameters: BTreeMap::from([("name".to_string(), "world".to_string())]),
        }
    }

    #[test]
    fn test_echoes_request_fields() {
        let event = apigw_event(&request(), "dev");
        assert_eq!(event.http_method, "GET");
        assert_eq!(event.path, "/hello/world");
        assert_eq!(event.path_parameters["name"], "world");
        assert_eq!(event.request_context.http_method, "GET");
        assert_eq!(event.request_context.stage, "dev");
        assert!(!event.is_base64_encoded);
    }

    #[test]
    fn test_injects_forwarded_proto() {
        let event = apigw_event(&request(), "dev");
        assert_eq!(event.headers["accept"], "*/*");
        assert_eq!(event.headers["x-forwarded-proto"], "http");
    }

    #[test]
    fn test_identity_only_carries_source_ip() {
        let event = apigw_event(&request(), "dev");
        let identity = &event.request_context.identity;
        assert_eq!(identity.source_ip, LOOPBACK_SOURCE_IP);
        assert!(identity.caller.is_none());
        assert!(identity.account_id.is_none());
    }

    #[test]
    fn test_query_parameters_both_shapes() {
        let mut req = request();
        req.query = Some("q=a&q=b&lang=rust".to_string());
        let event = apigw_event(&req, "dev");

        let single = event.query_string_parameters.unwrap();
        assert_eq!(single["q"], "b");
        assert_eq!(single["lang"], "rust");

        let multi = event.multi_value_query_string_parameters.unwrap();
        assert_eq!(multi["q"], vec!["a", "b"]);
        assert_eq!(multi["lang"], vec!["rust"]);
    }

    #[test]
    fn test_absent_query_serializes_null() {
        let event = apigw_event(&request(), "dev");
        assert!(event.query_string_parameters.is_none());

        let json = serde_json::to_value(&event).unwrap();
        assert!(json["queryStringParameters"].is_null());
        assert!(json["multiValueQueryStringParameters"].is_null());
        assert!(json["stageVariables"].is_null());
    }

    #[test]
    fn test_serializes_camel_case() {
        let event = apigw_event(&request(), "prod");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["httpMethod"], "GET");
        assert_eq!(json["pathParameters"]["name"], "world");
        assert_eq!(json["isBase64Encoded"], false);
        assert_eq!(json["requestContext"]["stage"], "prod");
        assert_eq!(json["requestContext"]["identity"]["sourceIp"], "127.0.0.1");
        assert!(json["requestContext"]["identity"]["userArn"].is_null());
    }
}
