//! Response types and HATEOAS structures for the Admin API.

use crate::error::StoreError;
use crate::model::{is_proxy_response, Imposter, Stub};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::HeaderMap;
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::error;

/// HATEOAS link structure for Mountebank compatibility
#[derive(Debug, Serialize, Clone)]
pub struct Link {
    pub href: String,
}

/// HATEOAS links for imposter resources
#[derive(Debug, Serialize, Clone)]
pub struct ImposterLinks {
    #[serde(rename = "self")]
    pub self_link: Link,
    pub stubs: Link,
}

/// HATEOAS links for stub resources
#[derive(Debug, Serialize, Clone)]
pub struct StubLinks {
    #[serde(rename = "self")]
    pub self_link: Link,
}

/// A stub with its _links for the response
#[derive(Debug, Serialize)]
pub struct StubWithLinks {
    #[serde(flatten)]
    pub stub: Stub,
    #[serde(rename = "_links")]
    pub links: StubLinks,
}

/// Imposter summary for list responses
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImposterSummary {
    pub protocol: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub number_of_requests: usize,
    #[serde(rename = "_links")]
    pub links: ImposterLinks,
}

impl ImposterSummary {
    pub fn new(imposter: &Imposter, base_url: &str) -> Self {
        Self {
            protocol: imposter.protocol.clone(),
            port: imposter.port,
            name: imposter
                .config
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string),
            number_of_requests: imposter.requests.len(),
            links: make_imposter_links(base_url, imposter.port),
        }
    }
}

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
}

/// Individual error detail
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Query parameters for imposter endpoints
#[derive(Debug, Default)]
pub struct ImposterQueryParams {
    pub replayable: bool,
    pub remove_proxies: bool,
}

impl ImposterQueryParams {
    /// Parse query parameters from query string
    pub fn parse(query: Option<&str>) -> Self {
        let mut params = Self::default();
        if let Some(q) = query {
            params.replayable = q.contains("replayable=true");
            params.remove_proxies = q.contains("removeProxies=true");
        }
        params
    }
}

// =============================================================================
// Imposter rendering
// =============================================================================

/// Drop proxy responses, then stubs left without responses
pub fn filter_proxy_stubs(stubs: Vec<Stub>) -> Vec<Stub> {
    stubs
        .into_iter()
        .filter_map(|mut stub| {
            stub.responses.retain(|response| !is_proxy_response(response));
            if stub.responses.is_empty() {
                None
            } else {
                Some(stub)
            }
        })
        .collect()
}

/// Render an imposter as returned by the admin API.
///
/// `replayable` strips requests, matches and links so the output can be
/// posted back as-is; `remove_proxies` strips proxy responses.
pub fn imposter_json(mut imposter: Imposter, params: &ImposterQueryParams, base_url: &str) -> Value {
    if params.remove_proxies {
        imposter.stubs = filter_proxy_stubs(imposter.stubs);
    }
    // links posted back from an earlier GET are regenerated, never stored
    for field in ["_links", "numberOfRequests"] {
        imposter.config.remove(field);
    }
    for stub in &mut imposter.stubs {
        stub.extra.remove("_links");
    }

    if params.replayable {
        imposter.requests.clear();
        for stub in &mut imposter.stubs {
            stub.matches.clear();
        }
        return serde_json::to_value(&imposter).unwrap_or_default();
    }

    let port = imposter.port;
    let stubs: Vec<StubWithLinks> = std::mem::take(&mut imposter.stubs)
        .into_iter()
        .enumerate()
        .map(|(index, stub)| StubWithLinks {
            stub,
            links: make_stub_links(base_url, port, index),
        })
        .collect();
    let requests = std::mem::take(&mut imposter.requests);

    let mut json = serde_json::to_value(&imposter).unwrap_or_default();
    if let Value::Object(ref mut fields) = json {
        fields.insert("numberOfRequests".to_string(), Value::from(requests.len()));
        fields.insert("requests".to_string(), Value::Array(requests));
        fields.insert(
            "stubs".to_string(),
            serde_json::to_value(stubs).unwrap_or_default(),
        );
        fields.insert(
            "_links".to_string(),
            serde_json::to_value(make_imposter_links(base_url, port)).unwrap_or_default(),
        );
    }
    json
}

// =============================================================================
// Helper functions for generating HATEOAS links
// =============================================================================

/// Extract base URL from request headers for HATEOAS links
pub fn get_base_url(headers: &HeaderMap) -> String {
    if let Some(host) = headers.get("host") {
        if let Ok(host_str) = host.to_str() {
            return format!("http://{}", host_str);
        }
    }
    "http://localhost:2525".to_string()
}

/// Generate HATEOAS links for an imposter
pub fn make_imposter_links(base_url: &str, port: u16) -> ImposterLinks {
    ImposterLinks {
        self_link: Link {
            href: format!("{}/imposters/{}", base_url, port),
        },
        stubs: Link {
            href: format!("{}/imposters/{}/stubs", base_url, port),
        },
    }
}

/// Generate HATEOAS links for a stub
pub fn make_stub_links(base_url: &str, port: u16, index: usize) -> StubLinks {
    StubLinks {
        self_link: Link {
            href: format!("{}/imposters/{}/stubs/{}", base_url, port, index),
        },
    }
}

// =============================================================================
// Response helper functions
// =============================================================================

/// Create a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    build_response_with_headers(status, [("Content-Type", "application/json")], json)
}

/// Build an HTTP response with headers.
///
/// This function handles the unlikely case where Response::builder() fails
/// by returning a minimal 500 error response.
pub fn build_response_with_headers(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        builder = builder.header(key.as_ref(), value.as_ref());
    }
    builder.body(Full::new(body.into())).unwrap_or_else(|_| {
        // This should never happen with valid inputs, but handle gracefully
        Response::new(Full::new(Bytes::from("Internal Server Error")))
    })
}

/// Mountebank error code for a status
fn error_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "bad data",
        StatusCode::NOT_FOUND => "no such resource",
        _ => "internal error",
    }
}

/// Create an error response
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let error = ErrorResponse {
        errors: vec![ErrorDetail {
            code: error_code(status).to_string(),
            message: message.to_string(),
        }],
    };
    json_response(status, &error)
}

/// Create a not found response
pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

pub fn imposter_not_found(port: u16) -> Response<Full<Bytes>> {
    error_response(
        StatusCode::NOT_FOUND,
        &format!("Imposter not found on port {port}"),
    )
}

/// Map a storage failure to a response: missing resources are 404, the
/// rest are logged and answered with 500
pub fn store_error_response(err: StoreError) -> Response<Full<Bytes>> {
    if err.is_missing_resource() {
        return error_response(StatusCode::NOT_FOUND, &err.to_string());
    }
    error!("Admin API storage failure: {}", err);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
}

/// Collect request body into bytes
pub async fn collect_body<B>(body: B) -> Result<Bytes, String>
where
    B: Body,
    B::Error: fmt::Display,
{
    body.collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}

/// Parse a JSON request body; an empty body reads as `{}`
pub fn parse_json_body(body: &[u8]) -> Result<Value, Response<Full<Bytes>>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_slice(body).map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            &format!("Unable to parse body as JSON: {e}"),
        )
    })
}
