//! Per-exchange state, created when a request arrives and dropped once the
//! response has been relayed.

use axum::http::Method;
use std::time::Instant;
use uuid::Uuid;

use crate::path;

#[derive(Debug, Clone)]
pub struct ExchangeContext {
    pub id: Uuid,
    pub method: Method,
    pub original_path: String,
    /// Normalized path plus the untouched query string.
    pub rewritten_path: String,
    pub streaming_requested: bool,
    pub provider_already_set: bool,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub started: Instant,
}

impl ExchangeContext {
    #[must_use]
    pub fn new(method: Method, original_path: &str) -> Self {
        let rewritten_path = path::normalize_path_and_query(original_path).into_owned();
        Self {
            id: Uuid::new_v4(),
            method,
            original_path: original_path.to_string(),
            rewritten_path,
            streaming_requested: false,
            provider_already_set: false,
            model: None,
            provider: None,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn was_rewritten(&self) -> bool {
        self.original_path != self.rewritten_path
    }

    /// Rewritten path without its query string.
    #[must_use]
    pub fn path(&self) -> &str {
        self.rewritten_path
            .split_once('?')
            .map_or(self.rewritten_path.as_str(), |(p, _)| p)
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.rewritten_path.split_once('?').map(|(_, q)| q)
    }

    #[must_use]
    pub fn is_chat_completions(&self) -> bool {
        path::is_chat_completions(self.path())
    }

    #[must_use]
    pub fn is_models(&self) -> bool {
        path::is_models(self.path())
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
