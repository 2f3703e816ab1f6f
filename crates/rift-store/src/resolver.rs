//! Request resolution for out-of-process protocol servers.
//!
//! A protocol server posts each request it receives; the resolver finds the
//! matching stub, serves its next response and either answers directly or,
//! for proxy responses, hands back a proxy instruction. The server performs
//! the proxy call itself and posts the result back under the resolution key,
//! at which point the response is recorded as a new stub per the proxy mode.

use crate::error::{StoreError, StoreResult};
use crate::imposters::ImpostersRepository;
use crate::matcher::RequestMatcher;
use crate::model::{is_proxy_response, Stub};
use crate::stubs::StubRepository;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const PROXY_ONCE: &str = "proxyOnce";
const PROXY_ALWAYS: &str = "proxyAlways";
const PROXY_TRANSPARENT: &str = "proxyTransparent";

/// Pending proxy calls not answered within this window are dropped
pub const PENDING_PROXY_TTL: Duration = Duration::from_secs(300);

/// Answer to a resolved request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resolution {
    /// Send this response
    Response { response: Value },
    /// Proxy the request, then post the result to `callbackURL`
    Proxy {
        proxy: Value,
        request: Value,
        #[serde(rename = "callbackURL")]
        callback_url: String,
    },
}

/// Proxy call handed out and not yet answered
#[derive(Debug)]
struct PendingProxy {
    port: u16,
    stub_index: usize,
    stub_predicates: Vec<Value>,
    proxy: Value,
    request: Value,
    started: Instant,
}

/// Resolves requests against an imposter repository
pub struct ResponseResolver {
    repo: Arc<dyn ImpostersRepository>,
    matcher: Arc<dyn RequestMatcher>,
    pending: Mutex<HashMap<u64, PendingProxy>>,
    next_key: AtomicU64,
}

impl ResponseResolver {
    pub fn new(repo: Arc<dyn ImpostersRepository>, matcher: Arc<dyn RequestMatcher>) -> Self {
        Self {
            repo,
            matcher,
            pending: Mutex::new(HashMap::new()),
            next_key: AtomicU64::new(0),
        }
    }

    /// Resolve a request received by the imposter on `port`.
    ///
    /// `callback_base` is the admin base URL used to build the proxy
    /// callback, e.g. `http://localhost:2525`.
    pub async fn resolve(
        &self,
        port: u16,
        request: Value,
        callback_base: &str,
    ) -> StoreResult<Resolution> {
        let imposter = self
            .repo
            .get(port)
            .await?
            .ok_or_else(|| StoreError::missing_imposter(port))?;
        let stubs = self.repo.stubs_for(port);
        let started = Instant::now();

        if imposter.records_requests() {
            stubs.add_request(with_timestamp(request.clone())).await?;
        }

        let matcher = Arc::clone(&self.matcher);
        let filter = |predicates: &[Value]| matcher.matches(predicates, &request);
        let matched = stubs.first(&filter, 0).await?;
        let response_config = matched.stub.next_response().await?;
        debug!(
            "Request on port {} matched stub {:?}",
            port, matched.index
        );

        if is_proxy_response(&response_config) {
            let key = self.next_key.fetch_add(1, Ordering::Relaxed);
            let proxy = response_config.get("proxy").cloned().unwrap_or_default();
            {
                let mut pending = self.pending.lock();
                evict_expired(&mut pending, PENDING_PROXY_TTL);
                pending.insert(
                    key,
                    PendingProxy {
                        port,
                        stub_index: matched.index.unwrap_or_default(),
                        stub_predicates: matched.stub.stub().predicates.clone(),
                        proxy: proxy.clone(),
                        request: request.clone(),
                        started,
                    },
                );
            }
            return Ok(Resolution::Proxy {
                proxy,
                request,
                callback_url: format!("{callback_base}/imposters/{port}/_requests/{key}"),
            });
        }

        // protocol servers interpret fault and inject definitions themselves
        let response = response_config
            .get("is")
            .cloned()
            .unwrap_or_else(|| response_config.clone());

        if imposter.records_matches() {
            let elapsed = elapsed_millis(started);
            matched
                .stub
                .record_match(request, response.clone(), response_config, elapsed)
                .await?;
        }

        Ok(Resolution::Response { response })
    }

    /// Complete a proxy resolution with the response the origin returned
    pub async fn resolve_proxy(
        &self,
        port: u16,
        key: u64,
        proxy_response: Value,
    ) -> StoreResult<Resolution> {
        let pending = {
            let mut pending = self.pending.lock();
            let owned_by_port = pending.get(&key).is_some_and(|entry| entry.port == port);
            if owned_by_port {
                pending.remove(&key)
            } else {
                None
            }
        }
        .ok_or_else(|| {
            StoreError::MissingResource(format!(
                "no pending proxy resolution {key} on port {port}"
            ))
        })?;

        let mode = pending
            .proxy
            .get("mode")
            .and_then(Value::as_str)
            .unwrap_or(PROXY_ONCE);

        if mode != PROXY_TRANSPARENT {
            let stubs = self.repo.stubs_for(port);
            let recorded = recorded_response(&pending, &proxy_response);
            let generators = pending
                .proxy
                .get("predicateGenerators")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let predicates = generate_predicates(generators, &pending.request);

            if mode == PROXY_ALWAYS {
                record_proxy_always(stubs.as_ref(), &pending, predicates, recorded).await?;
            } else {
                record_proxy_once(stubs.as_ref(), &pending, predicates, recorded).await?;
            }
        }

        Ok(Resolution::Response {
            response: proxy_response,
        })
    }

    /// Drop pending proxy calls for an imposter that is going away
    pub fn forget(&self, port: u16) {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|_, entry| entry.port != port);
        let dropped = before - pending.len();
        if dropped > 0 {
            debug!("Dropped {} pending proxy calls for port {}", dropped, port);
        }
    }

    /// Drop every pending proxy call
    pub fn forget_all(&self) {
        self.pending.lock().clear();
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

fn evict_expired(pending: &mut HashMap<u64, PendingProxy>, ttl: Duration) {
    let before = pending.len();
    pending.retain(|_, entry| entry.started.elapsed() < ttl);
    let evicted = before - pending.len();
    if evicted > 0 {
        warn!("Evicted {} proxy calls never answered within {:?}", evicted, ttl);
    }
}

fn elapsed_millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn with_timestamp(mut request: Value) -> Value {
    if let Value::Object(ref mut fields) = request {
        fields.entry("timestamp").or_insert_with(|| {
            Value::String(
                chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            )
        });
    }
    request
}

/// Response definition saved for a proxied call
fn recorded_response(pending: &PendingProxy, proxy_response: &Value) -> Value {
    let elapsed = elapsed_millis(pending.started);
    let mut is = match proxy_response {
        Value::Object(fields) => fields.clone(),
        other => {
            let mut fields = Map::new();
            fields.insert("body".to_string(), other.clone());
            fields
        }
    };
    is.insert("_proxyResponseTime".to_string(), json!(elapsed));

    let mut response = json!({ "is": is });
    if pending
        .proxy
        .get("addWaitBehavior")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        response["_behaviors"] = json!({ "wait": elapsed });
    }
    response
}

/// Current index of the proxy stub; stubs may have moved since the request.
///
/// The stub must still carry the proxy definition the call came from, so a
/// key outliving its imposter never records into a replacement.
async fn proxy_stub_index(stubs: &dyn StubRepository, pending: &PendingProxy) -> StoreResult<usize> {
    stubs
        .to_json()
        .await?
        .iter()
        .position(|stub| {
            stub.predicates == pending.stub_predicates
                && stub
                    .responses
                    .iter()
                    .any(|response| response.get("proxy") == Some(&pending.proxy))
        })
        .ok_or_else(|| {
            StoreError::MissingResource(format!(
                "proxy stub {} on port {} no longer exists",
                pending.stub_index, pending.port
            ))
        })
}

/// Save the response in a new stub ahead of the proxy so it answers next time
async fn record_proxy_once(
    stubs: &dyn StubRepository,
    pending: &PendingProxy,
    predicates: Vec<Value>,
    response: Value,
) -> StoreResult<()> {
    let index = proxy_stub_index(stubs, pending).await?;
    debug!("Recording proxied response at index {} ({})", index, PROXY_ONCE);
    stubs
        .insert_at_index(Stub::new(predicates, vec![response]), index)
        .await
}

/// Append the response to the first later stub with the same predicates,
/// or save a new stub at the end
async fn record_proxy_always(
    stubs: &dyn StubRepository,
    pending: &PendingProxy,
    predicates: Vec<Value>,
    response: Value,
) -> StoreResult<()> {
    let index = proxy_stub_index(stubs, pending).await?;
    let existing = stubs
        .first(&|candidate: &[Value]| candidate == predicates.as_slice(), index + 1)
        .await?;

    if existing.success {
        debug!(
            "Appending proxied response to stub {:?} ({})",
            existing.index, PROXY_ALWAYS
        );
        existing.stub.add_response(response).await
    } else {
        debug!("Recording proxied response in a new stub ({})", PROXY_ALWAYS);
        stubs.add(Stub::new(predicates, vec![response])).await
    }
}

/// Build predicates for a recorded response from `predicateGenerators`
pub fn generate_predicates(generators: &[Value], request: &Value) -> Vec<Value> {
    let mut predicates = Vec::new();

    for generator in generators {
        let Some(matches) = generator.get("matches") else {
            continue;
        };
        let except = generator
            .get("except")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .and_then(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("Invalid except pattern {:?} in predicateGenerators: {}", pattern, e);
                    None
                }
            });

        let Some(Value::Object(selected)) = select_fields(matches, request, except.as_ref()) else {
            continue;
        };
        if selected.is_empty() {
            continue;
        }

        let operator = generator
            .get("predicateOperator")
            .and_then(Value::as_str)
            .unwrap_or("deepEquals");
        let mut predicate = Map::new();
        predicate.insert(operator.to_string(), Value::Object(selected));
        for option in ["caseSensitive", "except"] {
            if let Some(value) = generator.get(option) {
                predicate.insert(option.to_string(), value.clone());
            }
        }
        predicates.push(Value::Object(predicate));
    }

    predicates
}

/// Copy the request fields flagged `true` in `matches`, recursing into
/// nested selections such as `{"headers": {"Accept": true}}`
fn select_fields(matches: &Value, actual: &Value, except: Option<&Regex>) -> Option<Value> {
    match matches {
        Value::Bool(true) => Some(match (actual, except) {
            (Value::String(s), Some(re)) => Value::String(re.replace_all(s, "").into_owned()),
            _ => actual.clone(),
        }),
        Value::Object(fields) => {
            let actual_fields = actual.as_object()?;
            let selected: Map<String, Value> = fields
                .iter()
                .filter_map(|(key, nested)| {
                    let value = actual_fields.get(key)?;
                    select_fields(nested, value, except).map(|v| (key.clone(), v))
                })
                .collect();
            Some(Value::Object(selected))
        }
        _ => None,
    }
}
