//! Route dispatch logic for the Admin API.

use crate::admin_api::handlers::{imposters, requests, stubs};
use crate::admin_api::types::{collect_body, error_response, get_base_url, not_found};
use crate::admin_api::AdminState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::{Method, Request, Response, StatusCode};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Parsed route for imposter-specific endpoints
#[derive(Debug, PartialEq)]
enum ImposterRoute {
    /// GET/DELETE /imposters/:port
    Root,
    /// POST/PUT/GET /imposters/:port/stubs
    Stubs,
    /// PUT/DELETE /imposters/:port/stubs/:index
    StubByIndex(usize),
    /// DELETE /imposters/:port/savedRequests
    SavedRequests,
    /// DELETE /imposters/:port/savedProxyResponses
    SavedProxyResponses,
    /// POST /imposters/:port/_requests
    Requests,
    /// POST /imposters/:port/_requests/:key
    ProxyResponse(u64),
}

impl ImposterRoute {
    /// Parse route from path segments after `/imposters/:port`
    fn parse(segments: &[&str]) -> Option<Self> {
        match segments {
            [] => Some(ImposterRoute::Root),
            ["stubs"] => Some(ImposterRoute::Stubs),
            ["stubs", index_str] => index_str.parse().ok().map(ImposterRoute::StubByIndex),
            ["savedRequests"] => Some(ImposterRoute::SavedRequests),
            ["savedProxyResponses"] => Some(ImposterRoute::SavedProxyResponses),
            ["_requests"] => Some(ImposterRoute::Requests),
            ["_requests", key_str] => key_str.parse().ok().map(ImposterRoute::ProxyResponse),
            _ => None,
        }
    }
}

/// Main request router.
///
/// Generic over the request body so the same dispatch serves hyper
/// connections and in-memory bodies.
pub async fn route_request<B>(
    req: Request<B>,
    state: Arc<AdminState>,
) -> Result<Response<Full<Bytes>>, hyper::Error>
where
    B: Body,
    B::Error: fmt::Display,
{
    let (parts, body) = req.into_parts();
    let method = parts.method;
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().map(|s| s.to_string());
    let base_url = get_base_url(&parts.headers);

    debug!("Admin API: {} {}", method, path);

    let body = match collect_body(body).await {
        Ok(body) => body,
        Err(e) => return Ok(error_response(StatusCode::BAD_REQUEST, &e)),
    };

    let response = route_by_path(&method, &path, query.as_deref(), &body, &base_url, &state).await;
    Ok(response)
}

/// Route based on path
async fn route_by_path(
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &[u8],
    base_url: &str,
    state: &AdminState,
) -> Response<Full<Bytes>> {
    if path == "/imposters" {
        return match *method {
            Method::GET => imposters::handle_list(state, query, base_url).await,
            Method::POST => imposters::handle_create(state, body, base_url).await,
            Method::DELETE => imposters::handle_delete_all(state, query, base_url).await,
            _ => not_found(),
        };
    }

    if let Some(rest) = path.strip_prefix("/imposters/") {
        return route_imposter(method, rest, query, body, base_url, state).await;
    }

    not_found()
}

/// Route imposter-specific requests
async fn route_imposter(
    method: &Method,
    rest: &str,
    query: Option<&str>,
    body: &[u8],
    base_url: &str,
    state: &AdminState,
) -> Response<Full<Bytes>> {
    let segments: Vec<&str> = rest.trim_end_matches('/').split('/').collect();
    let Some((port_str, tail)) = segments.split_first() else {
        return not_found();
    };
    let port: u16 = match port_str.parse() {
        Ok(p) => p,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid port number"),
    };
    let Some(route) = ImposterRoute::parse(tail) else {
        return not_found();
    };

    match (method, route) {
        (&Method::GET, ImposterRoute::Root) => {
            imposters::handle_get(state, port, query, base_url).await
        }
        (&Method::DELETE, ImposterRoute::Root) => {
            imposters::handle_delete(state, port, query, base_url).await
        }
        (&Method::GET, ImposterRoute::Stubs) => stubs::handle_get_all(state, port, base_url).await,
        (&Method::PUT, ImposterRoute::Stubs) => {
            stubs::handle_replace_all(state, port, body, base_url).await
        }
        (&Method::POST, ImposterRoute::Stubs) => stubs::handle_add(state, port, body, base_url).await,
        (&Method::PUT, ImposterRoute::StubByIndex(index)) => {
            stubs::handle_replace(state, port, index, body, base_url).await
        }
        (&Method::DELETE, ImposterRoute::StubByIndex(index)) => {
            stubs::handle_delete(state, port, index, base_url).await
        }
        (&Method::DELETE, ImposterRoute::SavedRequests) => {
            imposters::handle_delete_saved_requests(state, port, base_url).await
        }
        (&Method::DELETE, ImposterRoute::SavedProxyResponses) => {
            imposters::handle_delete_saved_proxy_responses(state, port, base_url).await
        }
        (&Method::POST, ImposterRoute::Requests) => {
            requests::handle_resolve(state, port, body, base_url).await
        }
        (&Method::POST, ImposterRoute::ProxyResponse(key)) => {
            requests::handle_proxy_response(state, port, key, body).await
        }
        _ => not_found(),
    }
}
