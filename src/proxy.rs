//! Forwarding to the upstream origin and relaying its response.
//!
//! The outbound half builds the upstream request from the shaped exchange.
//! The inbound half copies status and selected headers and relays the body
//! chunk by chunk. For diagnostic statuses a bounded copy of the body is
//! taken as it passes through and inspected once the whole body has been
//! relayed.

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::context::ExchangeContext;
use crate::diagnostics;
use crate::error::{GatewayError, Result};
use crate::journal::{ExchangeRecord, SharedJournal};

/// Request headers never forwarded upstream. `host` and `content-length` are
/// derived from the upstream URL and the final body.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Response headers copied from the upstream when present.
pub const RELAYED_RESPONSE_HEADERS: &[&str] = &[
    "content-type",
    "content-encoding",
    "cache-control",
    "x-ratelimit-limit",
    "x-ratelimit-remaining",
    "x-ratelimit-reset",
];

const RESPONSE_PREVIEW_CHARS: usize = 200;

fn should_forward_header(name: &str) -> bool {
    let lower = name.to_lowercase();
    !HOP_BY_HOP_HEADERS.contains(&lower.as_str())
}

/// Headers for the upstream request.
#[must_use]
pub fn outbound_headers(inbound: &HeaderMap, json_body_rewritten: bool) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if should_forward_header(name.as_str()) {
            out.append(name.clone(), value.clone());
        }
    }
    if json_body_rewritten {
        out.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    out
}

/// `Bearer abcdefgh...` style preview of an authorization value.
#[must_use]
pub fn authorization_preview(value: &str) -> String {
    match value.strip_prefix("Bearer ") {
        Some(token) => format!("Bearer {}...", diagnostics::preview(token, 8)),
        None => format!("{}...", diagnostics::preview(value, 8)),
    }
}

/// Full URL of the upstream resource for this exchange.
#[must_use]
pub fn upstream_url(config: &GatewayConfig, ctx: &ExchangeContext) -> String {
    format!("{}{}", config.upstream_base(), ctx.rewritten_path)
}

/// Send the shaped request upstream and wait for response headers.
pub async fn send_upstream(
    client: &reqwest::Client,
    config: &GatewayConfig,
    ctx: &ExchangeContext,
    inbound_headers: &HeaderMap,
    body: Bytes,
    json_body_rewritten: bool,
) -> Result<reqwest::Response> {
    match inbound_headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        Some(auth) => {
            info!(exchange = %ctx.id, key = %authorization_preview(auth), "Authorization header present");
        }
        None => {
            warn!(exchange = %ctx.id, "No Authorization header; the upstream will likely reject this request");
        }
    }

    let url = upstream_url(config, ctx);
    let headers = outbound_headers(inbound_headers, json_body_rewritten);
    debug!(exchange = %ctx.id, method = %ctx.method, %url, body_len = body.len(), "Forwarding");

    let mut request = client.request(ctx.method.clone(), &url).headers(headers);
    if !body.is_empty() {
        request = request.body(body);
    }

    match tokio::time::timeout(config.upstream_timeout(), request.send()).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(GatewayError::upstream(error_chain(&e))),
        Err(_) => Err(GatewayError::Timeout {
            secs: config.upstream_timeout_secs,
        }),
    }
}

/// Turn the upstream response into the caller's response.
pub fn relay_response(
    upstream: reqwest::Response,
    ctx: ExchangeContext,
    config: &GatewayConfig,
    journal: Option<SharedJournal>,
) -> Response {
    let status = upstream.status();
    let upstream_headers = upstream.headers().clone();
    info!(exchange = %ctx.id, status = status.as_u16(), "Upstream response");

    if ctx.is_models() {
        if status == StatusCode::OK {
            info!(exchange = %ctx.id, "Model list received");
        } else {
            error!(exchange = %ctx.id, status = status.as_u16(), "Model list request failed");
        }
    }

    let content_type = upstream_headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let is_stream = content_type.is_some_and(|ct| ct.contains("text/event-stream"));

    if is_stream {
        info!(exchange = %ctx.id, "Streaming response detected");
    } else if let Some(ct) = content_type {
        debug!(exchange = %ctx.id, content_type = ct, "Buffered response");
    }
    if ctx.streaming_requested && !is_stream {
        warn!(
            exchange = %ctx.id,
            "Streaming was requested but the upstream returned a non-streaming response"
        );
    }

    let mut headers = relayed_headers(&upstream_headers, &config.extra_response_headers);
    if !is_stream {
        if let Some(len) = upstream_headers.get(CONTENT_LENGTH) {
            headers.insert(CONTENT_LENGTH, len.clone());
        }
    }
    if ctx.is_models() && !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        debug!(exchange = %ctx.id, "Defaulted model list content-type to application/json");
    }

    diagnostics::log_rate_limit(&upstream_headers, &ctx);

    if status == StatusCode::OK && is_stream {
        info!(exchange = %ctx.id, "Relaying stream to caller");
    }

    let relay = Relay::new(ctx, status, is_stream, config, upstream_headers, journal);
    let body = Body::from_stream(relay_stream(upstream.bytes_stream(), relay));

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Synthesized response for an exchange that never reached the upstream.
pub fn transport_failure(
    err: GatewayError,
    ctx: &ExchangeContext,
    journal: Option<&SharedJournal>,
) -> Response {
    error!(exchange = %ctx.id, "Proxy error: {err}");
    if let Some(journal) = journal {
        journal.record(ExchangeRecord::from_context(ctx, None).with_error(err.to_string()));
    }
    err.into_response()
}

/// Copy the allow-listed headers (plus `extra`) from an upstream response.
#[must_use]
pub fn relayed_headers(upstream: &HeaderMap, extra: &[String]) -> HeaderMap {
    let mut out = HeaderMap::new();
    let names = RELAYED_RESPONSE_HEADERS
        .iter()
        .copied()
        .chain(extra.iter().map(String::as_str));

    for name in names {
        let Ok(name) = HeaderName::from_bytes(name.to_lowercase().as_bytes()) else {
            continue;
        };
        for value in upstream.get_all(&name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

const DISCONNECTED: &str = "caller disconnected before the body was relayed";

/// Relay state for one exchange. Finishes exactly once: when the declared
/// content length has been relayed, when the upstream body ends, or when the
/// body is dropped by the server.
struct Relay {
    ctx: ExchangeContext,
    /// Present when the body should be inspected, bounded by `capture_limit`.
    captured: Option<BytesMut>,
    capture_limit: usize,
    preview: bool,
    upstream_base: String,
    upstream_headers: HeaderMap,
    expected_len: Option<u64>,
    relayed: u64,
    record: ExchangeRecord,
    journal: Option<SharedJournal>,
    done: bool,
}

impl Relay {
    fn new(
        ctx: ExchangeContext,
        status: StatusCode,
        is_stream: bool,
        config: &GatewayConfig,
        upstream_headers: HeaderMap,
        journal: Option<SharedJournal>,
    ) -> Self {
        let expected_len = if is_stream {
            None
        } else {
            upstream_headers
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
        };
        let mut record = ExchangeRecord::from_context(&ctx, Some(status.as_u16())).streamed(is_stream);
        record.stream_mismatch = ctx.streaming_requested && !is_stream;

        Self {
            captured: diagnostics::is_diagnostic_status(status.as_u16()).then(BytesMut::new),
            capture_limit: config.max_error_body_bytes,
            preview: status == StatusCode::OK && !is_stream && config.debug.response,
            upstream_base: config.upstream_base().to_string(),
            upstream_headers,
            expected_len,
            relayed: 0,
            record,
            journal,
            done: false,
            ctx,
        }
    }

    fn observe(&mut self, chunk: &[u8]) {
        if self.relayed == 0 && self.preview {
            let text = String::from_utf8_lossy(chunk);
            info!(
                exchange = %self.ctx.id,
                "First response bytes: {}...",
                diagnostics::preview(&text, RESPONSE_PREVIEW_CHARS)
            );
        }
        if let Some(buf) = self.captured.as_mut() {
            let room = self.capture_limit.saturating_sub(buf.len());
            buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
        }
        self.relayed += chunk.len() as u64;
    }

    /// Whether the declared content length has been relayed in full.
    fn body_complete(&self) -> bool {
        self.expected_len.is_some_and(|len| self.relayed >= len)
    }

    fn finish(&mut self, completed: bool) {
        if self.done {
            return;
        }
        self.done = true;

        if let Some(buf) = self.captured.take() {
            let status = self.record.status.unwrap_or_default();
            self.record.upstream_error = diagnostics::log_error_body(
                status,
                &buf,
                &self.upstream_headers,
                &self.ctx,
                &self.upstream_base,
            );
        }

        self.record.elapsed_ms = self.ctx.elapsed_ms();
        if !completed && self.record.error.is_none() {
            warn!(exchange = %self.ctx.id, relayed = self.relayed, "{DISCONNECTED}");
            self.record.error = Some(DISCONNECTED.to_string());
        }
        debug!(exchange = %self.ctx.id, elapsed_ms = self.record.elapsed_ms, "Exchange complete");

        if let Some(journal) = &self.journal {
            journal.record(self.record.clone());
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        let completed = self.body_complete();
        self.finish(completed);
    }
}

fn relay_stream(
    byte_stream: impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
    mut relay: Relay,
) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send + 'static {
    async_stream::stream! {
        tokio::pin!(byte_stream);

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    let message = error_chain(&e);
                    error!(exchange = %relay.ctx.id, "Upstream body error: {message}");
                    relay.record.error = Some(message);
                    relay.finish(false);
                    yield Err(std::io::Error::other(e));
                    break;
                }
            };

            relay.observe(&chunk);
            // A sized body is not polled past its last byte.
            if relay.body_complete() {
                relay.finish(true);
            }
            yield Ok(chunk);
        }

        relay.finish(true);
    }
}

/// An error and all of its sources, joined with `: `.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
