//! Log-only diagnostics for upstream responses.
//!
//! Nothing here changes what the caller receives. Error bodies are inspected
//! from a bounded copy taken while the original bytes are relayed.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{error, info};

use crate::context::ExchangeContext;

/// Statuses whose bodies are inspected.
pub const DIAGNOSTIC_STATUSES: &[u16] = &[400, 401, 403, 429, 500];

const RAW_PREVIEW_CHARS: usize = 200;
const DEFAULT_RETRY_AFTER: &str = "60";
const FULL_KEY_RATE_LIMIT: &str = "30 requests per minute for full keys";

#[must_use]
pub fn is_diagnostic_status(status: u16) -> bool {
    DIAGNOSTIC_STATUSES.contains(&status)
}

/// Pull a human-readable message out of an error body.
///
/// Tries `error.message`, then `message`, then falls back to the first
/// characters of the raw body. Empty bodies yield `None`.
#[must_use]
pub fn extract_error_message(body: &[u8]) -> Option<String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return None;
    }

    let structured = serde_json::from_slice::<Value>(body).ok().and_then(|v| {
        let nested = v.pointer("/error/message").and_then(Value::as_str);
        let flat = v.get("message").and_then(Value::as_str);
        nested.or(flat).map(str::to_string)
    });

    structured.or_else(|| Some(preview(&String::from_utf8_lossy(body), RAW_PREVIEW_CHARS)))
}

/// The first `max` characters of `s`, on a char boundary.
#[must_use]
pub fn preview(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Status-specific hint lines to log after the error message.
#[must_use]
pub fn status_hints(
    status: u16,
    ctx: &ExchangeContext,
    retry_after: Option<&str>,
    upstream_base: &str,
) -> Vec<String> {
    let model = ctx.model.as_deref().unwrap_or("<none>");
    let provider = ctx.provider.as_deref().unwrap_or("<none>");

    let mut lines = match status {
        401 | 403 => vec![
            "Authorization problem: check the API key configured in the client".to_string(),
        ],
        429 => vec![
            format!(
                "Rate limit exceeded: wait {} seconds before the next request",
                retry_after.unwrap_or(DEFAULT_RETRY_AFTER)
            ),
            format!("Upstream quota: {FULL_KEY_RATE_LIMIT}"),
        ],
        500 => vec![
            "Upstream server error. Likely causes:".to_string(),
            "  1. Transient upstream failure (retry in a few seconds)".to_string(),
            format!("  2. Model \"{model}\" temporarily unavailable at provider \"{provider}\""),
            format!("  3. Rate limit exceeded ({FULL_KEY_RATE_LIMIT})"),
            "Suggestions:".to_string(),
            "  - Wait a few seconds and retry the request".to_string(),
            "  - Try another model (e.g. gpt5_thinking, o3mini, claude45sonnet)".to_string(),
            "  - Check the x-ratelimit-* response headers".to_string(),
        ],
        _ => Vec::new(),
    };

    if let (Some(_), Some(provider)) = (&ctx.model, &ctx.provider) {
        lines.push(format!(
            "Check available models: curl \"{upstream_base}/v1/models?provider={provider}\""
        ));
    }

    lines
}

/// Log the outcome of an inspected error response and return the message
/// extracted from the body, if any.
pub fn log_error_body(
    status: u16,
    body: &[u8],
    headers: &HeaderMap,
    ctx: &ExchangeContext,
    upstream_base: &str,
) -> Option<String> {
    let message = extract_error_message(body);
    match &message {
        Some(message) => error!(exchange = %ctx.id, status, "Upstream error: {message}"),
        None if status == 500 => {
            error!(exchange = %ctx.id, status, "Upstream error 500: could not read error details");
        }
        None => error!(exchange = %ctx.id, status, "Upstream error with empty body"),
    }

    let retry_after = headers.get("retry-after").and_then(|v| v.to_str().ok());
    for line in status_hints(status, ctx, retry_after, upstream_base) {
        error!(exchange = %ctx.id, "{line}");
    }
    message
}

/// Log `x-ratelimit-remaining` and, when present, when the window resets.
pub fn log_rate_limit(headers: &HeaderMap, ctx: &ExchangeContext) {
    let Some(remaining) = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
    else {
        return;
    };

    info!(exchange = %ctx.id, remaining, "Rate limit remaining");

    if let Some(reset) = headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(reset_instant)
    {
        info!(exchange = %ctx.id, reset = %reset.to_rfc3339(), "Rate limit resets");
    }
}

/// Interpret an `x-ratelimit-reset` value as epoch seconds.
#[must_use]
pub fn reset_instant(value: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = value.trim().parse().ok()?;
    DateTime::from_timestamp(secs, 0)
}
