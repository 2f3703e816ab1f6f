//! Stub handlers: list, add, replace and delete stubs of an imposter.

use super::{load_imposter, validated_stubs, HandlerResult};
use crate::admin_api::types::{
    error_response, imposter_json, json_response, make_stub_links, parse_json_body,
    store_error_response, ImposterQueryParams, StubWithLinks,
};
use crate::admin_api::AdminState;
use crate::model::Imposter;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde_json::{json, Value};
use tracing::{info, warn};

const INVALID_STUB_INDEX: &str =
    "'stubIndex' must be a valid integer, representing the array index position of the stub to replace";
const INVALID_INSERT_INDEX: &str = "'index' must be between 0 and the length of the stubs array";

/// Re-read the imposter after a change and render it
async fn changed_imposter(state: &AdminState, port: u16, base_url: &str) -> Response<Full<Bytes>> {
    match load_imposter(state, port).await {
        Ok(imposter) => json_response(
            StatusCode::OK,
            &imposter_json(imposter, &ImposterQueryParams::default(), base_url),
        ),
        Err(resp) => resp,
    }
}

/// Check that `index` addresses an existing stub
async fn existing_index(state: &AdminState, port: u16, index: usize) -> HandlerResult<()> {
    let count = state
        .repo
        .stubs_for(port)
        .count()
        .await
        .map_err(store_error_response)?;
    if index >= count {
        warn!(
            "Rejected stub index {} for imposter on port {} ({} stubs)",
            index, port, count
        );
        return Err(error_response(StatusCode::NOT_FOUND, INVALID_STUB_INDEX));
    }
    Ok(())
}

/// Handle GET /imposters/:port/stubs
pub async fn handle_get_all(state: &AdminState, port: u16, base_url: &str) -> Response<Full<Bytes>> {
    let imposter: Imposter = match load_imposter(state, port).await {
        Ok(imposter) => imposter,
        Err(resp) => return resp,
    };

    let stubs: Vec<StubWithLinks> = imposter
        .stubs
        .into_iter()
        .enumerate()
        .map(|(index, mut stub)| {
            stub.extra.remove("_links");
            StubWithLinks {
                stub,
                links: make_stub_links(base_url, port, index),
            }
        })
        .collect();
    json_response(StatusCode::OK, &json!({ "stubs": stubs }))
}

/// Handle PUT /imposters/:port/stubs - replace every stub
pub async fn handle_replace_all(
    state: &AdminState,
    port: u16,
    body: &[u8],
    base_url: &str,
) -> Response<Full<Bytes>> {
    let imposter = match load_imposter(state, port).await {
        Ok(imposter) => imposter,
        Err(resp) => return resp,
    };
    let request = match parse_json_body(body) {
        Ok(value) => value,
        Err(resp) => return resp,
    };

    let candidates = match request.get("stubs") {
        None => return error_response(StatusCode::BAD_REQUEST, "'stubs' is a required field"),
        Some(Value::Array(stubs)) => stubs.clone(),
        Some(_) => return error_response(StatusCode::BAD_REQUEST, "'stubs' must be an array"),
    };
    let stubs = match validated_stubs(state, port, &imposter.protocol, &candidates).await {
        Ok(stubs) => stubs,
        Err(resp) => return resp,
    };

    let count = stubs.len();
    if let Err(e) = state.repo.stubs_for(port).overwrite_all(stubs).await {
        return store_error_response(e);
    }
    info!("Replaced stubs of imposter on port {} ({} stubs)", port, count);
    changed_imposter(state, port, base_url).await
}

/// Handle PUT /imposters/:port/stubs/:index - replace a single stub
pub async fn handle_replace(
    state: &AdminState,
    port: u16,
    index: usize,
    body: &[u8],
    base_url: &str,
) -> Response<Full<Bytes>> {
    let imposter = match load_imposter(state, port).await {
        Ok(imposter) => imposter,
        Err(resp) => return resp,
    };
    if let Err(resp) = existing_index(state, port, index).await {
        return resp;
    }
    let candidate = match parse_json_body(body) {
        Ok(value) => value,
        Err(resp) => return resp,
    };

    let stub = match validated_stubs(state, port, &imposter.protocol, &[candidate]).await {
        Ok(mut stubs) => stubs.remove(0),
        Err(resp) => return resp,
    };
    if let Err(e) = state.repo.stubs_for(port).overwrite_at_index(stub, index).await {
        return store_error_response(e);
    }
    info!("Replaced stub {} of imposter on port {}", index, port);
    changed_imposter(state, port, base_url).await
}

/// Handle POST /imposters/:port/stubs - add a stub, at the end unless
/// `index` says otherwise
pub async fn handle_add(
    state: &AdminState,
    port: u16,
    body: &[u8],
    base_url: &str,
) -> Response<Full<Bytes>> {
    let imposter = match load_imposter(state, port).await {
        Ok(imposter) => imposter,
        Err(resp) => return resp,
    };
    let request = match parse_json_body(body) {
        Ok(value) => value,
        Err(resp) => return resp,
    };

    let Some(candidate) = request.get("stub").cloned() else {
        return error_response(StatusCode::BAD_REQUEST, "must contain 'stub' field");
    };
    let count = imposter.stubs.len();
    let index = match request.get("index") {
        None | Some(Value::Null) => count,
        Some(value) => match value.as_u64().and_then(|i| usize::try_from(i).ok()) {
            Some(index) if index <= count => index,
            _ => {
                warn!(
                    "Rejected stub insert at {} for imposter on port {} ({} stubs)",
                    value, port, count
                );
                return error_response(StatusCode::BAD_REQUEST, INVALID_INSERT_INDEX);
            }
        },
    };

    let stub = match validated_stubs(state, port, &imposter.protocol, &[candidate]).await {
        Ok(mut stubs) => stubs.remove(0),
        Err(resp) => return resp,
    };
    if let Err(e) = state.repo.stubs_for(port).insert_at_index(stub, index).await {
        return store_error_response(e);
    }
    info!("Added stub at index {} to imposter on port {}", index, port);
    changed_imposter(state, port, base_url).await
}

/// Handle DELETE /imposters/:port/stubs/:index
pub async fn handle_delete(
    state: &AdminState,
    port: u16,
    index: usize,
    base_url: &str,
) -> Response<Full<Bytes>> {
    if let Err(resp) = load_imposter(state, port).await {
        return resp;
    }
    if let Err(resp) = existing_index(state, port, index).await {
        return resp;
    }
    if let Err(e) = state.repo.stubs_for(port).delete_at_index(index).await {
        return store_error_response(e);
    }
    info!("Deleted stub {} of imposter on port {}", index, port);
    changed_imposter(state, port, base_url).await
}
