use crate::config::GatewayConfig;
use crate::context::ExchangeContext;
use crate::error::{GatewayError, Result};
use crate::inject;
use crate::journal::SharedJournal;
use crate::providers::ModelProviderMap;
use crate::proxy;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub models: ModelProviderMap,
    pub client: reqwest::Client,
    pub journal: Option<SharedJournal>,
}

impl AppState {
    /// State with an HTTP client built from `config`'s timeouts.
    pub fn new(config: GatewayConfig, journal: Option<SharedJournal>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self {
            models: config.model_map(),
            config,
            client,
            journal,
        })
    }
}

/// Every path is forwarded; there are no gateway-local routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let router = Router::new()
        .fallback(handle_exchange)
        .layer(DefaultBodyLimit::max(state.config.max_request_body_bytes))
        .layer(TraceLayer::new_for_http());

    let router = if state.config.cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}

async fn handle_exchange(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let original = uri.path_and_query().map_or(uri.path(), |pq| pq.as_str());
    let mut ctx = ExchangeContext::new(method, original);

    info!(exchange = %ctx.id, method = %ctx.method, path = %ctx.original_path, "Request");
    if ctx.was_rewritten() {
        info!(
            exchange = %ctx.id,
            from = %ctx.original_path,
            to = %ctx.rewritten_path,
            "Path rewritten"
        );
    }
    if ctx.is_models() {
        info!(exchange = %ctx.id, query = ctx.query().unwrap_or(""), "Model list request");
    }
    if state.config.debug.headers {
        let names: Vec<&str> = headers.keys().map(|k| k.as_str()).collect();
        info!(exchange = %ctx.id, ?names, "Inbound headers");
    }

    let (body, rewritten) = match prepare_body(&state, &mut ctx, &headers, body) {
        Ok(prepared) => prepared,
        Err(e) => {
            warn!(exchange = %ctx.id, "Rejected request body: {e}");
            return e.into_response();
        }
    };

    match proxy::send_upstream(&state.client, &state.config, &ctx, &headers, body, rewritten).await
    {
        Ok(upstream) => proxy::relay_response(upstream, ctx, &state.config, state.journal.clone()),
        Err(e) => proxy::transport_failure(e, &ctx, state.journal.as_ref()),
    }
}

/// Decode JSON bodies, shape chat completions, and re-encode what was decoded.
///
/// Returns the bytes to forward and whether they differ from the inbound body.
fn prepare_body(
    state: &AppState,
    ctx: &mut ExchangeContext,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<(Bytes, bool)> {
    if body.is_empty() || !is_json(headers) {
        return Ok((body, false));
    }

    let mut value: Value = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::invalid_body(e.to_string()))?;

    if ctx.method != Method::POST {
        return Ok((body, false));
    }

    if ctx.is_chat_completions() {
        if !value.is_object() {
            return Ok((body, false));
        }
        inject::inject_provider(
            ctx,
            &mut value,
            &state.models,
            &state.config.default_provider,
            state.config.debug.body,
        );
    } else {
        let Some(obj) = value.as_object().filter(|obj| !obj.is_empty()) else {
            return Ok((body, false));
        };
        let (model, provider) = inject::peek_routing(obj);
        ctx.provider_already_set = provider.is_some();
        ctx.model = model;
        ctx.provider = provider;
    }

    let encoded = Bytes::from(serde_json::to_vec(&value)?);
    if ctx.is_chat_completions() {
        info!(
            exchange = %ctx.id,
            summary = %inject::request_summary(&value),
            body_len = encoded.len(),
            "Sending request upstream"
        );
    }
    Ok((encoded, true))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| ct.split(';').next())
        .map(|mime| mime.trim().to_ascii_lowercase())
        .is_some_and(|mime| mime == "application/json" || mime.ends_with("+json"))
}
