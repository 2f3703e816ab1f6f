//! Request resolution handlers used by out-of-process protocol servers.

use crate::admin_api::types::{
    error_response, json_response, parse_json_body, store_error_response,
};
use crate::admin_api::AdminState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// Handle POST /imposters/:port/_requests - `{request}`
pub async fn handle_resolve(
    state: &AdminState,
    port: u16,
    body: &[u8],
    base_url: &str,
) -> Response<Full<Bytes>> {
    let mut payload = match parse_json_body(body) {
        Ok(value) => value,
        Err(resp) => return resp,
    };
    let Some(request) = payload.get_mut("request").map(serde_json::Value::take) else {
        return error_response(StatusCode::BAD_REQUEST, "must contain 'request' field");
    };

    match state.resolver.resolve(port, request, base_url).await {
        Ok(resolution) => json_response(StatusCode::OK, &resolution),
        Err(e) => store_error_response(e),
    }
}

/// Handle POST /imposters/:port/_requests/:key - `{proxyResponse}`
pub async fn handle_proxy_response(
    state: &AdminState,
    port: u16,
    key: u64,
    body: &[u8],
) -> Response<Full<Bytes>> {
    let mut payload = match parse_json_body(body) {
        Ok(value) => value,
        Err(resp) => return resp,
    };
    let Some(proxy_response) = payload
        .get_mut("proxyResponse")
        .map(serde_json::Value::take)
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "must contain 'proxyResponse' field",
        );
    };

    match state.resolver.resolve_proxy(port, key, proxy_response).await {
        Ok(resolution) => json_response(StatusCode::OK, &resolution),
        Err(e) => store_error_response(e),
    }
}
