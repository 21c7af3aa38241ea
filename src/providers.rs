//! Model to provider routing table.
//!
//! The upstream requires a `provider` field on every chat completion. When a
//! caller omits it, the gateway infers one from the requested model using the
//! built-in table below, extended or overridden by the `[models]` table of the
//! config file.

use std::collections::HashMap;

/// A built-in routing entry: requests for `model` go to `provider`.
#[derive(Debug, Clone, Copy)]
pub struct ModelRoute {
    pub model: &'static str,
    pub provider: &'static str,
}

const fn route(model: &'static str, provider: &'static str) -> ModelRoute {
    ModelRoute { model, provider }
}

const BUILTIN_ROUTES: &[ModelRoute] = &[
    route("gpt5", "Perplexity"),
    route("gpt-5", "Perplexity"),
    route("claude45sonnetthinking", "Perplexity"),
    route("claude45sonnet", "Perplexity"),
    route("claude41opusthinking", "Perplexity"),
    route("claude40opusthinking", "Perplexity"),
    route("claude37sonnetthinking", "Perplexity"),
    route("o3", "Perplexity"),
    route("o3mini", "Perplexity"),
    route("o3pro", "Perplexity"),
    route("grok4", "Perplexity"),
    route("gemini2flash", "Perplexity"),
    route("pplx_reasoning", "Perplexity"),
    route("pplx_pro", "Perplexity"),
    route("turbo", "Perplexity"),
    route("experimental", "Perplexity"),
    route("gpt-5-nano", "PollinationsAI"),
    route("gpt-5-mini", "PollinationsAI"),
    route("o4-mini", "PollinationsAI"),
    route("deepseek-v3", "PollinationsAI"),
    route("midijourney", "PollinationsAI"),
    route("chickytutor", "PollinationsAI"),
    route("llama-roblox", "PollinationsAI"),
    route("meta-llama/Llama-3.3-70B-Instruct-Turbo", "DeepInfra"),
    route("meta-llama/Llama-3.3-70B-Instruct", "DeepInfra"),
    route("deepseek-ai/DeepSeek-V3-0324", "DeepInfra"),
    route("deepseek-ai/DeepSeek-R1-0528", "DeepInfra"),
    route("Qwen/Qwen3-Next-80B-A3B-Instruct", "DeepInfra"),
    route("moonshotai/Kimi-K2-Instruct-0905", "DeepInfra"),
    route("qwen-3-235b", "HuggingSpace"),
    route("qwen-3-32b", "HuggingSpace"),
    route("qwen-3-4b", "HuggingSpace"),
    route("qwen-3-1.7b", "HuggingSpace"),
    route("qwen-3-0.6b", "HuggingSpace"),
    route("ling", "HuggingSpace"),
    route("ling-1t", "HuggingSpace"),
    route("command-r-08-2024", "HuggingSpace"),
    route("command-r7b-12-2024", "HuggingSpace"),
    route("flux", "HuggingSpace"),
    route("flux-dev", "HuggingSpace"),
];

impl ModelRoute {
    #[must_use]
    pub fn builtin() -> &'static [ModelRoute] {
        BUILTIN_ROUTES
    }
}

/// Read-only lookup from model identifier to provider name.
///
/// Built once at startup and shared between all in-flight exchanges.
#[derive(Debug, Clone, Default)]
pub struct ModelProviderMap {
    routes: HashMap<String, String>,
}

impl ModelProviderMap {
    /// The built-in table with `overrides` applied on top.
    #[must_use]
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut routes: HashMap<String, String> = BUILTIN_ROUTES
            .iter()
            .map(|r| (r.model.to_string(), r.provider.to_string()))
            .collect();
        routes.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { routes }
    }

    #[must_use]
    pub fn builtin() -> Self {
        Self::with_overrides(&HashMap::new())
    }

    /// Exact, case-sensitive lookup.
    #[must_use]
    pub fn lookup(&self, model: &str) -> Option<&str> {
        self.routes.get(model).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Entries sorted by provider, then model.
    #[must_use]
    pub fn sorted(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .routes
            .iter()
            .map(|(m, p)| (m.as_str(), p.as_str()))
            .collect();
        entries.sort_by(|a, b| a.1.cmp(b.1).then(a.0.cmp(b.0)));
        entries
    }
}
