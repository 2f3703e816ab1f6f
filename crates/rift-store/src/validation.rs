//! Stub validation run before any stub reaches a repository.
//!
//! Validation failures are values, not errors: the admin layer turns a
//! non-empty [`ValidationOutcome`] into a 400 and leaves storage untouched.

use crate::stubs::MAX_REPEAT;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub const BAD_DATA: &str = "bad data";
pub const INVALID_INJECTION: &str = "invalid injection";

const RESPONSE_TYPES: [&str; 4] = ["is", "proxy", "inject", "fault"];
const PROXY_MODES: [&str; 3] = ["proxyOnce", "proxyAlways", "proxyTransparent"];

/// A single validation failure, serialized into `{errors: [...]}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
}

impl ValidationError {
    pub fn bad_data(message: impl Into<String>, source: Option<&Value>) -> Self {
        Self {
            code: BAD_DATA.to_string(),
            message: message.into(),
            source: source.cloned(),
        }
    }

    fn invalid_injection(source: &Value) -> Self {
        Self {
            code: INVALID_INJECTION.to_string(),
            message: "JavaScript injection is not allowed unless started with --allow-injection"
                .to_string(),
            source: Some(source.clone()),
        }
    }
}

/// Result of validating a stub list
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub errors: Vec<ValidationError>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks stub definitions before they are stored
#[async_trait]
pub trait StubValidator: Send + Sync {
    async fn validate(&self, protocol: &str, stubs: &[Value]) -> ValidationOutcome;
}

/// Structural validator shared by every protocol
#[derive(Debug, Clone, Default)]
pub struct DefaultStubValidator {
    allow_injection: bool,
}

impl DefaultStubValidator {
    pub fn new(allow_injection: bool) -> Self {
        Self { allow_injection }
    }

    fn check_stub(&self, stub: &Value, errors: &mut Vec<ValidationError>) {
        let Some(fields) = stub.as_object() else {
            errors.push(ValidationError::bad_data("each stub must be an object", Some(stub)));
            return;
        };

        match fields.get("predicates") {
            None | Some(Value::Null) => {}
            Some(Value::Array(predicates)) => {
                for predicate in predicates {
                    self.check_predicate(predicate, errors);
                }
            }
            Some(_) => errors.push(ValidationError::bad_data(
                "'predicates' must be an array",
                Some(stub),
            )),
        }

        match fields.get("responses") {
            None => {}
            Some(Value::Array(responses)) => {
                for response in responses {
                    self.check_response(response, errors);
                }
            }
            Some(_) => errors.push(ValidationError::bad_data(
                "'responses' must be an array",
                Some(stub),
            )),
        }
    }

    fn check_predicate(&self, predicate: &Value, errors: &mut Vec<ValidationError>) {
        let Some(fields) = predicate.as_object() else {
            errors.push(ValidationError::bad_data(
                "each predicate must be an object",
                Some(predicate),
            ));
            return;
        };
        if fields.contains_key("inject") && !self.allow_injection {
            errors.push(ValidationError::invalid_injection(predicate));
        }
    }

    fn check_response(&self, response: &Value, errors: &mut Vec<ValidationError>) {
        let Some(fields) = response.as_object() else {
            errors.push(ValidationError::bad_data(
                "each response must be an object",
                Some(response),
            ));
            return;
        };

        let types: Vec<&str> = RESPONSE_TYPES
            .iter()
            .copied()
            .filter(|t| fields.contains_key(*t))
            .collect();
        match types.as_slice() {
            [] => errors.push(ValidationError::bad_data(
                "unrecognized response type",
                Some(response),
            )),
            [_] => {}
            _ => errors.push(ValidationError::bad_data(
                "each response object must have only one response type",
                Some(response),
            )),
        }

        if let Some(proxy) = fields.get("proxy") {
            check_proxy(proxy, response, errors);
        }
        if fields.contains_key("inject") && !self.allow_injection {
            errors.push(ValidationError::invalid_injection(response));
        }
        check_repeat(response, errors);
    }
}

fn check_proxy(proxy: &Value, response: &Value, errors: &mut Vec<ValidationError>) {
    let to = proxy.get("to").and_then(Value::as_str).unwrap_or_default();
    if to.is_empty() {
        errors.push(ValidationError::bad_data(
            "proxy responses require a non-empty 'to' field",
            Some(response),
        ));
    }

    match proxy.get("mode") {
        None | Some(Value::Null) => {}
        Some(Value::String(mode)) if PROXY_MODES.contains(&mode.as_str()) => {}
        Some(mode) => errors.push(ValidationError::bad_data(
            format!("invalid proxy mode {mode}; must be one of {}", PROXY_MODES.join(", ")),
            Some(response),
        )),
    }
}

fn check_repeat(response: &Value, errors: &mut Vec<ValidationError>) {
    let behaviors = response
        .get("_behaviors")
        .or_else(|| response.get("behaviors"));
    let repeats: Vec<&Value> = match behaviors {
        Some(Value::Object(map)) => map.get("repeat").into_iter().collect(),
        Some(Value::Array(items)) => items.iter().filter_map(|b| b.get("repeat")).collect(),
        _ => Vec::new(),
    };

    if repeats
        .iter()
        .any(|repeat| !repeat.as_u64().is_some_and(|r| r > 0))
    {
        errors.push(ValidationError::bad_data(
            "'repeat' behavior must be a positive integer",
            Some(response),
        ));
    } else if repeats
        .iter()
        .filter_map(|repeat| repeat.as_u64())
        .any(|r| r > u64::from(MAX_REPEAT))
    {
        errors.push(ValidationError::bad_data(
            format!("'repeat' behavior must not exceed {MAX_REPEAT}"),
            Some(response),
        ));
    }
}

#[async_trait]
impl StubValidator for DefaultStubValidator {
    async fn validate(&self, _protocol: &str, stubs: &[Value]) -> ValidationOutcome {
        let mut errors = Vec::new();
        for stub in stubs {
            self.check_stub(stub, &mut errors);
        }
        ValidationOutcome { errors }
    }
}
