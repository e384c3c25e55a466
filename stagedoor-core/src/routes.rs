//! Route derivation from declared functions.
//!
//! Translates the gateway's route syntax into the local route grammar
//! (`:name` parameters, `*` greedy wildcard) and walks the declared
//! functions to build the table of invokable HTTP routes.

use std::collections::BTreeMap;

use crate::config::{HttpTrigger, ServiceConfig};
use crate::error::{GatewayError, GatewayResult};

/// The only cloud provider whose declarations this system understands.
pub const SUPPORTED_PROVIDER: &str = "aws";
/// Memory default when neither function nor provider declares one, in MB.
pub const DEFAULT_MEMORY_SIZE: u32 = 1536;
/// Timeout default when neither function nor provider declares one, in seconds.
pub const DEFAULT_TIMEOUT: u32 = 300;

/// One HTTP trigger, normalized to the local route grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Lowercase verb, or `all` for the match-any wildcard.
    pub method: String,
    /// Local path pattern: `:name` parameters, `*` greedy wildcard.
    pub path: String,
}

/// One function with a resolved invocation identity and at least one route.
#[derive(Debug, Clone)]
pub struct RouteFunction {
    pub name: String,
    pub qualified_name: String,
    pub handler: String,
    pub runtime: String,
    pub memory_size: u32,
    pub timeout: u32,
    pub routes: Vec<Route>,
    pub environment: BTreeMap<String, String>,
}

/// Lowercases a verb and maps the `ANY` wildcard to the router's
/// match-any verb.
pub fn translate_method(method: &str) -> String {
    let lowered = method.to_ascii_lowercase();
    if lowered == "any" {
        "all".to_string()
    } else {
        lowered
    }
}

/// Rewrites a gateway path into the local route grammar: the greedy
/// `{proxy+}` marker becomes `*` and every `{name}` placeholder becomes
/// `:name`. Segments without placeholders pass through untouched.
pub fn translate_path(gateway_path: &str) -> String {
    let path = gateway_path.replace("{proxy+}", "*");
    let mut translated = String::with_capacity(path.len());
    let mut rest = path.as_str();

    while let Some(open) = rest.find('{') {
        translated.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                translated.push(':');
                translated.push_str(&after[..close]);
                rest = &after[close + 1..];
            }
            None => {
                // unbalanced brace, keep it literally
                translated.push_str(&rest[open..]);
                rest = "";
            }
        }
    }

    translated.push_str(rest);
    translated
}

/// Maps the local route grammar onto the embedded router's matcher syntax:
/// `:name` becomes `{name}` and a bare `*` segment becomes the named
/// catch-all `{*proxy}`.
pub(crate) fn matcher_path(local_path: &str) -> String {
    local_path
        .split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{name}}}")
            } else if segment == "*" {
                "{*proxy}".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Builds the route table: one [`RouteFunction`] per declared function that
/// has a resolvable runtime and at least one HTTP trigger.
pub fn build_route_functions(config: &ServiceConfig) -> GatewayResult<Vec<RouteFunction>> {
    let provider = &config.provider;
    if provider.name != SUPPORTED_PROVIDER {
        return Err(GatewayError::UnsupportedProvider {
            name: provider.name.clone(),
        });
    }

    let stage = provider.stage();
    let mut functions = Vec::new();

    for (name, func) in &config.functions {
        let Some(runtime) = func.runtime.as_deref().or(provider.runtime.as_deref()) else {
            tracing::warn!(function = %name, "unable to infer a runtime for function, skipping");
            continue;
        };

        let routes: Vec<Route> = func
            .events
            .iter()
            .filter_map(|event| event.http.as_ref())
            .map(route_from_trigger)
            .collect();
        if routes.is_empty() {
            continue;
        }

        let mut environment = provider.environment.clone();
        environment.extend(func.environment.clone());

        functions.push(RouteFunction {
            name: name.clone(),
            qualified_name: func
                .name
                .clone()
                .unwrap_or_else(|| format!("{}-{}-{}", config.service, stage, name)),
            handler: func.handler.clone(),
            runtime: runtime.to_string(),
            memory_size: func
                .memory_size
                .or(provider.memory_size)
                .unwrap_or(DEFAULT_MEMORY_SIZE),
            timeout: func.timeout.or(provider.timeout).unwrap_or(DEFAULT_TIMEOUT),
            routes,
            environment,
        });
    }

    if functions.is_empty() {
        return Err(GatewayError::NoHttpFunctions);
    }

    Ok(functions)
}

fn route_from_trigger(trigger: &HttpTrigger) -> Route {
    match trigger {
        HttpTrigger::Compact(spec) => {
            let (method, path) = spec.split_once(' ').unwrap_or((spec.as_str(), "/"));
            Route {
                method: translate_method(method),
                path: translate_path(path.trim()),
            }
        }
        HttpTrigger::Structured { method, path, .. } => Route {
            method: translate_method(method),
            path: translate_path(path),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    #[test]
    fn test_translate_method_lowercases() {
        assert_eq!(translate_method("GET"), "get");
        assert_eq!(translate_method("Post"), "post");
    }

    #[test]
    fn test_translate_method_wildcard() {
        assert_eq!(translate_method("ANY"), "all");
        assert_eq!(translate_method("any"), "all");
    }

    #[test]
    fn test_translate_method_idempotent() {
        for verb in ["GET", "put", "ANY", "delete"] {
            let once = translate_method(verb);
            assert_eq!(translate_method(&once), once);
        }
    }

    #[test]
    fn test_translate_path_root() {
        assert_eq!(translate_path("/"), "/");
    }

    #[test]
    fn test_translate_path_named_params() {
        assert_eq!(
            translate_path("/foo/{bar}/baz/{boom}"),
            "/foo/:bar/baz/:boom"
        );
    }

    #[test]
    fn test_translate_path_greedy_wildcard() {
        assert_eq!(translate_path("/foo/{proxy+}"), "/foo/*");
    }

    #[test]
    fn test_translate_path_plain_segments_untouched() {
        assert_eq!(translate_path("/pets/search"), "/pets/search");
    }

    #[test]
    fn test_matcher_path() {
        assert_eq!(matcher_path("/"), "/");
        assert_eq!(matcher_path("/hello/:name"), "/hello/{name}");
        assert_eq!(matcher_path("/files/*"), "/files/{*proxy}");
    }

    fn manifest(yaml: &str) -> ServiceConfig {
        ServiceConfig::load_str(yaml).unwrap()
    }

    #[test]
    fn test_http_trigger_classification() {
        let config = manifest(
            r#"
service: demo
provider:
  name: aws
  runtime: nodejs10.x
functions:
  mixed:
    handler: index.mixed
    events:
      - http: GET /
      - cron: expression
"#,
        );
        let events = &config.functions["mixed"].events;
        assert!(events[0].is_http());
        assert!(!events[1].is_http());
    }

    #[test]
    fn test_build_route_table() {
        let config = manifest(
            r#"
service: demo
provider:
  name: aws
  runtime: nodejs10.x
  stage: test
functions:
  hello:
    handler: index.hello
    events:
      - http: GET /hello/{name}
"#,
        );
        let functions = build_route_functions(&config).unwrap();
        assert_eq!(functions.len(), 1);
        let hello = &functions[0];
        assert_eq!(hello.qualified_name, "demo-test-hello");
        assert_eq!(hello.memory_size, DEFAULT_MEMORY_SIZE);
        assert_eq!(hello.timeout, DEFAULT_TIMEOUT);
        assert_eq!(
            hello.routes,
            vec![Route {
                method: "get".to_string(),
                path: "/hello/:name".to_string(),
            }]
        );
    }

    #[test]
    fn test_unsupported_provider() {
        let config = manifest(
            r#"
service: demo
provider:
  name: gcp
functions:
  hello:
    handler: index.hello
    events:
      - http: GET /
"#,
        );
        assert!(matches!(
            build_route_functions(&config),
            Err(GatewayError::UnsupportedProvider { name }) if name == "gcp"
        ));
    }

    #[test]
    fn test_function_without_runtime_skipped() {
        let config = manifest(
            r#"
service: demo
provider:
  name: aws
functions:
  orphan:
    handler: index.orphan
    events:
      - http: GET /orphan
  typed:
    handler: index.typed
    runtime: python3.8
    events:
      - http: GET /typed
"#,
        );
        let functions = build_route_functions(&config).unwrap();
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "typed");
    }

    #[test]
    fn test_no_http_functions_is_fatal() {
        let config = manifest(
            r#"
service: demo
provider:
  name: aws
  runtime: nodejs10.x
functions:
  timer:
    handler: index.timer
    events:
      - schedule: rate(1 minute)
"#,
        );
        assert!(matches!(
            build_route_functions(&config),
            Err(GatewayError::NoHttpFunctions)
        ));
    }

    #[test]
    fn test_environment_merge_function_wins() {
        let config = manifest(
            r#"
service: demo
provider:
  name: aws
  runtime: nodejs10.x
  environment:
    SHARED: provider
    STAGE_NAME: dev
functions:
  hello:
    handler: index.hello
    environment:
      SHARED: function
    events:
      - http: GET /
"#,
        );
        let functions = build_route_functions(&config).unwrap();
        let env = &functions[0].environment;
        assert_eq!(env["SHARED"], "function");
        assert_eq!(env["STAGE_NAME"], "dev");
    }

    #[test]
    fn test_overrides_beat_defaults() {
        let config = manifest(
            r#"
service: demo
provider:
  name: aws
  runtime: nodejs10.x
  memorySize: 256
  timeout: 15
functions:
  small:
    handler: index.small
    memorySize: 128
    events:
      - http: GET /small
"#,
        );
        let functions = build_route_functions(&config).unwrap();
        assert_eq!(functions[0].memory_size, 128);
        assert_eq!(functions[0].timeout, 15);
    }

    #[test]
    fn test_structured_trigger_normalized() {
        let config = manifest(
            r#"
service: demo
provider:
  name: aws
  runtime: nodejs10.x
functions:
  anything:
    handler: index.anything
    events:
      - http:
          method: ANY
          path: /files/{proxy+}
"#,
        );
        let functions = build_route_functions(&config).unwrap();
        assert_eq!(
            functions[0].routes,
            vec![Route {
                method: "all".to_string(),
                path: "/files/*".to_string(),
            }]
        );
    }
}
