//! Imposter handlers: create, list, inspect and delete imposters.

use super::{load_imposter, validated_stubs};
use crate::admin_api::types::{
    build_response_with_headers, error_response, imposter_json, json_response,
    parse_json_body, store_error_response, ImposterQueryParams, ImposterSummary,
};
use crate::admin_api::AdminState;
use crate::imposters::ListenerHandle;
use crate::model::Imposter;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde_json::{json, Value};
use tracing::{info, warn};

/// Handle POST /imposters - create an imposter with its stubs
pub async fn handle_create(
    state: &AdminState,
    body: &[u8],
    base_url: &str,
) -> Response<Full<Bytes>> {
    let mut definition = match parse_json_body(body) {
        Ok(value) => value,
        Err(resp) => return resp,
    };

    let Some(port) = definition
        .get("port")
        .and_then(Value::as_u64)
        .and_then(|p| u16::try_from(p).ok())
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "'port' must be a valid port number",
        );
    };
    if state.repo.exists(port) {
        warn!("Rejected imposter on port {}: port already registered", port);
        return error_response(
            StatusCode::BAD_REQUEST,
            &format!("Port {port} is already in use"),
        );
    }

    let protocol = definition
        .get("protocol")
        .and_then(Value::as_str)
        .unwrap_or("http")
        .to_string();
    let candidates = match definition.as_object_mut().and_then(|m| m.remove("stubs")) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(stubs)) => stubs,
        Some(_) => {
            return error_response(StatusCode::BAD_REQUEST, "'stubs' must be an array");
        }
    };
    let stubs = match validated_stubs(state, port, &protocol, &candidates).await {
        Ok(stubs) => stubs,
        Err(resp) => return resp,
    };

    let imposter: Imposter = match serde_json::from_value(definition) {
        Ok(imposter) => imposter,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Invalid imposter JSON: {e}"),
            );
        }
    };

    // stubs land before the header, replacing anything left on disk
    if let Err(e) = state.repo.stubs_for(port).overwrite_all(stubs).await {
        return store_error_response(e);
    }
    let stored = match state.repo.add(imposter, ListenerHandle::detached()).await {
        Ok(stored) => stored,
        Err(e) => return store_error_response(e),
    };
    info!("Created imposter on port {} ({})", port, protocol);

    let json = imposter_json(stored, &ImposterQueryParams::default(), base_url);
    let body = serde_json::to_string_pretty(&json).unwrap_or_else(|_| "{}".to_string());
    let location = format!("{base_url}/imposters/{port}");
    build_response_with_headers(
        StatusCode::CREATED,
        [
            ("Content-Type", "application/json"),
            ("Location", location.as_str()),
        ],
        body,
    )
}

/// Handle GET /imposters - list all imposters
pub async fn handle_list(
    state: &AdminState,
    query: Option<&str>,
    base_url: &str,
) -> Response<Full<Bytes>> {
    let params = ImposterQueryParams::parse(query);
    let imposters = match state.repo.all().await {
        Ok(imposters) => imposters,
        Err(e) => return store_error_response(e),
    };

    let rendered: Vec<Value> = if params.replayable || params.remove_proxies {
        imposters
            .into_iter()
            .map(|imposter| imposter_json(imposter, &params, base_url))
            .collect()
    } else {
        imposters
            .iter()
            .map(|imposter| {
                serde_json::to_value(ImposterSummary::new(imposter, base_url)).unwrap_or_default()
            })
            .collect()
    };
    json_response(StatusCode::OK, &json!({ "imposters": rendered }))
}

/// Handle DELETE /imposters - delete all imposters, answering what was removed
pub async fn handle_delete_all(
    state: &AdminState,
    query: Option<&str>,
    base_url: &str,
) -> Response<Full<Bytes>> {
    let mut params = ImposterQueryParams::parse(query);
    params.replayable = true;

    let imposters = match state.repo.all().await {
        Ok(imposters) => imposters,
        Err(e) => return store_error_response(e),
    };
    if let Err(e) = state.repo.delete_all().await {
        return store_error_response(e);
    }
    state.resolver.forget_all();
    info!("Deleted all imposters ({})", imposters.len());

    let rendered: Vec<Value> = imposters
        .into_iter()
        .map(|imposter| imposter_json(imposter, &params, base_url))
        .collect();
    json_response(StatusCode::OK, &json!({ "imposters": rendered }))
}

/// Handle GET /imposters/:port
pub async fn handle_get(
    state: &AdminState,
    port: u16,
    query: Option<&str>,
    base_url: &str,
) -> Response<Full<Bytes>> {
    let params = ImposterQueryParams::parse(query);
    match load_imposter(state, port).await {
        Ok(imposter) => json_response(StatusCode::OK, &imposter_json(imposter, &params, base_url)),
        Err(resp) => resp,
    }
}

/// Handle DELETE /imposters/:port - an absent imposter answers `{}`
pub async fn handle_delete(
    state: &AdminState,
    port: u16,
    query: Option<&str>,
    base_url: &str,
) -> Response<Full<Bytes>> {
    let params = ImposterQueryParams::parse(query);
    match state.repo.del(port).await {
        Ok(Some(imposter)) => {
            state.resolver.forget(port);
            info!("Deleted imposter on port {}", port);
            json_response(StatusCode::OK, &imposter_json(imposter, &params, base_url))
        }
        Ok(None) => json_response(StatusCode::OK, &json!({})),
        Err(e) => store_error_response(e),
    }
}

/// Handle DELETE /imposters/:port/savedProxyResponses
pub async fn handle_delete_saved_proxy_responses(
    state: &AdminState,
    port: u16,
    base_url: &str,
) -> Response<Full<Bytes>> {
    if let Err(resp) = load_imposter(state, port).await {
        return resp;
    }
    if let Err(e) = state.repo.stubs_for(port).delete_saved_proxy_responses().await {
        return store_error_response(e);
    }
    info!("Cleared saved proxy responses for imposter on port {}", port);
    handle_get(state, port, None, base_url).await
}

/// Handle DELETE /imposters/:port/savedRequests
pub async fn handle_delete_saved_requests(
    state: &AdminState,
    port: u16,
    base_url: &str,
) -> Response<Full<Bytes>> {
    if let Err(resp) = load_imposter(state, port).await {
        return resp;
    }
    if let Err(e) = state.repo.stubs_for(port).delete_saved_requests().await {
        return store_error_response(e);
    }
    info!("Cleared saved requests for imposter on port {}", port);
    handle_get(state, port, None, base_url).await
}
