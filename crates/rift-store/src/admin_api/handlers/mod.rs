//! Admin API request handlers, one module per resource.

pub mod imposters;
pub mod requests;
pub mod stubs;

use super::types::{error_response, imposter_not_found, json_response, store_error_response};
use super::AdminState;
use crate::model::{Imposter, Stub};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde_json::Value;
use tracing::warn;

type HandlerResult<T> = Result<T, Response<Full<Bytes>>>;

/// Fetch an imposter or answer 404
async fn load_imposter(state: &AdminState, port: u16) -> HandlerResult<Imposter> {
    match state.repo.get(port).await {
        Ok(Some(imposter)) => Ok(imposter),
        Ok(None) => Err(imposter_not_found(port)),
        Err(e) => Err(store_error_response(e)),
    }
}

/// Run the validator over candidate stubs and convert them once they pass.
/// Nothing is stored on failure.
async fn validated_stubs(
    state: &AdminState,
    port: u16,
    protocol: &str,
    candidates: &[Value],
) -> HandlerResult<Vec<Stub>> {
    let outcome = state.validator.validate(protocol, candidates).await;
    if !outcome.is_valid() {
        warn!(
            "Rejected stubs for imposter on port {}: {} error(s)",
            port,
            outcome.errors.len()
        );
        return Err(json_response(StatusCode::BAD_REQUEST, &outcome));
    }

    candidates
        .iter()
        .map(|candidate| {
            serde_json::from_value::<Stub>(candidate.clone()).map_err(|e| {
                warn!("Rejected stub for imposter on port {}: {}", port, e);
                error_response(StatusCode::BAD_REQUEST, &format!("Invalid stub JSON: {e}"))
            })
        })
        .collect()
}
