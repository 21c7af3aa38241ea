//! Chat completion request shaping.
//!
//! Every chat completion forwarded upstream carries a `provider` field and
//! has streaming turned off. The upstream does not stream reliably for every
//! model/provider pair, so a streaming request is downgraded here and the
//! original intent is kept on the [`ExchangeContext`] for response logging.

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::context::ExchangeContext;
use crate::providers::ModelProviderMap;

/// Where the forwarded `provider` value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderSource {
    /// The caller supplied one; left untouched.
    Caller,
    /// Found in the model table.
    Mapped,
    /// Model unknown (or absent); configured default used.
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shaped {
    pub model: Option<String>,
    pub provider: String,
    pub source: ProviderSource,
    pub stream_downgraded: bool,
}

/// Fill in `provider` and force `stream: false` on a chat completion body.
///
/// Returns `None` when the body is not a JSON object; such bodies are
/// forwarded as they are.
pub fn shape_chat_request(
    body: &mut Value,
    models: &ModelProviderMap,
    default_provider: &str,
) -> Option<Shaped> {
    let obj = body.as_object_mut()?;

    let model = obj.get("model").and_then(Value::as_str).map(str::to_string);

    let (provider, source) = match obj.get("provider").filter(|v| is_set(v)) {
        Some(existing) => (display_value(existing), ProviderSource::Caller),
        None => {
            let (provider, source) = match model.as_deref().and_then(|m| models.lookup(m)) {
                Some(mapped) => (mapped.to_string(), ProviderSource::Mapped),
                None => (default_provider.to_string(), ProviderSource::Default),
            };
            obj.insert("provider".to_string(), Value::String(provider.clone()));
            (provider, source)
        }
    };

    let stream_downgraded = obj.get("stream") == Some(&Value::Bool(true));
    if stream_downgraded {
        obj.insert("stream".to_string(), Value::Bool(false));
    }

    Some(Shaped {
        model,
        provider,
        source,
        stream_downgraded,
    })
}

/// Shape the body and record the outcome on `ctx`, logging each decision.
pub fn inject_provider(
    ctx: &mut ExchangeContext,
    body: &mut Value,
    models: &ModelProviderMap,
    default_provider: &str,
    log_full_body: bool,
) {
    let Some(shaped) = shape_chat_request(body, models, default_provider) else {
        debug!(exchange = %ctx.id, "Chat completion body is not a JSON object, not shaping");
        return;
    };

    let model = shaped.model.as_deref().unwrap_or("<none>");
    match shaped.source {
        ProviderSource::Caller => {
            info!(exchange = %ctx.id, provider = %shaped.provider, "Provider already set");
        }
        ProviderSource::Mapped => {
            info!(exchange = %ctx.id, model, provider = %shaped.provider, "Provider resolved from model table");
        }
        ProviderSource::Default => {
            info!(exchange = %ctx.id, model, provider = %shaped.provider, "Using default provider for model");
        }
    }

    if log_full_body {
        let pretty = serde_json::to_string_pretty(body).unwrap_or_default();
        info!(exchange = %ctx.id, "Request body:\n{pretty}");
    } else {
        info!(exchange = %ctx.id, summary = %request_summary(body), "Request parameters");
    }

    if shaped.stream_downgraded {
        warn!(exchange = %ctx.id, "Streaming requested; forwarding with stream=false for upstream compatibility");
    }

    ctx.streaming_requested = shaped.stream_downgraded;
    ctx.provider_already_set = shaped.source == ProviderSource::Caller;
    ctx.model = shaped.model;
    ctx.provider = Some(shaped.provider);
}

/// Compact view of a chat completion body for logs.
#[must_use]
pub fn request_summary(body: &Value) -> Value {
    let messages_count = body
        .get("messages")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    let field = |key: &str| body.get(key).cloned().unwrap_or(Value::Null);

    json!({
        "model": field("model"),
        "provider": field("provider"),
        "messages_count": messages_count,
        "temperature": field("temperature"),
        "max_tokens": field("max_tokens"),
        "stream": field("stream"),
    })
}

/// Missing, `null`, `false` and `""` all count as "not supplied".
fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Model and provider as they will be sent upstream, for bodies that were not
/// shaped (e.g. a POST to another endpoint).
#[must_use]
pub fn peek_routing(body: &Map<String, Value>) -> (Option<String>, Option<String>) {
    let text = |key: &str| body.get(key).filter(|v| is_set(v)).map(display_value);
    (text("model"), text("provider"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn shape(mut body: Value) -> (Value, Option<Shaped>) {
        let models = ModelProviderMap::builtin();
        let shaped = shape_chat_request(&mut body, &models, "Capi");
        (body, shaped)
    }

    #[test]
    fn test_existing_provider_is_kept() {
        let (body, shaped) = shape(json!({"model": "gpt5", "provider": "X"}));
        assert_eq!(body["provider"], "X");
        let shaped = shaped.unwrap();
        assert_eq!(shaped.source, ProviderSource::Caller);
        assert_eq!(shaped.provider, "X");
    }

    #[test]
    fn test_provider_from_model_table() {
        let (body, shaped) = shape(json!({"model": "gpt5", "messages": []}));
        assert_eq!(body["provider"], "Perplexity");
        assert_eq!(shaped.unwrap().source, ProviderSource::Mapped);
    }

    #[test]
    fn test_default_provider_for_unknown_model() {
        let (body, shaped) = shape(json!({"model": "unknown-model-xyz"}));
        assert_eq!(body["provider"], "Capi");
        assert_eq!(shaped.unwrap().source, ProviderSource::Default);
    }

    #[test]
    fn test_default_provider_without_model() {
        let (body, shaped) = shape(json!({"messages": []}));
        assert_eq!(body["provider"], "Capi");
        assert_eq!(shaped.unwrap().model, None);
    }

    #[test]
    fn test_empty_or_null_provider_is_replaced() {
        for provider in [json!(""), Value::Null, json!(false)] {
            let (body, shaped) = shape(json!({"model": "o3", "provider": provider}));
            assert_eq!(body["provider"], "Perplexity");
            assert_eq!(shaped.unwrap().source, ProviderSource::Mapped);
        }
    }

    #[test]
    fn test_stream_is_downgraded() {
        let (body, shaped) = shape(json!({"model": "gpt5", "stream": true}));
        assert_eq!(body["stream"], false);
        assert!(shaped.unwrap().stream_downgraded);
    }

    #[test]
    fn test_stream_false_or_absent_is_untouched() {
        let (body, shaped) = shape(json!({"model": "gpt5", "stream": false}));
        assert_eq!(body["stream"], false);
        assert!(!shaped.unwrap().stream_downgraded);

        let (body, shaped) = shape(json!({"model": "gpt5"}));
        assert!(body.get("stream").is_none());
        assert!(!shaped.unwrap().stream_downgraded);
    }

    #[test]
    fn test_non_object_body_is_skipped() {
        let (body, shaped) = shape(json!([1, 2, 3]));
        assert!(shaped.is_none());
        assert_eq!(body, json!([1, 2, 3]));
    }

    #[test]
    fn test_inject_records_context() {
        let models = ModelProviderMap::builtin();
        let mut ctx = ExchangeContext::new(Method::POST, "/chat/completions");
        let mut body = json!({"model": "unknown-model-xyz", "stream": true});

        inject_provider(&mut ctx, &mut body, &models, "Capi", false);

        assert!(ctx.streaming_requested);
        assert!(!ctx.provider_already_set);
        assert_eq!(ctx.model.as_deref(), Some("unknown-model-xyz"));
        assert_eq!(ctx.provider.as_deref(), Some("Capi"));
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_request_summary() {
        let body = json!({
            "model": "gpt5",
            "provider": "Perplexity",
            "messages": [{"role": "user", "content": "hi"}, {"role": "assistant", "content": "yo"}],
            "temperature": 0.2,
        });
        let summary = request_summary(&body);
        assert_eq!(summary["messages_count"], 2);
        assert_eq!(summary["temperature"], 0.2);
        assert_eq!(summary["max_tokens"], Value::Null);
    }

    #[test]
    fn test_peek_routing() {
        let body = json!({"model": "gpt5", "provider": ""});
        let (model, provider) = peek_routing(body.as_object().unwrap());
        assert_eq!(model.as_deref(), Some("gpt5"));
        assert_eq!(provider, None);
    }
}
