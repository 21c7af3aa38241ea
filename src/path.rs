//! Legacy path normalization.
//!
//! Some clients call the gateway without the `/v1` prefix the upstream
//! expects. `/models*` and `/chat/completions*` are moved under `/v1`; the
//! rest of the path and the query string are kept as they were.

use std::borrow::Cow;

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
pub const MODELS_PATH: &str = "/v1/models";

const REWRITES: &[(&str, &str)] = &[
    ("/models", MODELS_PATH),
    ("/chat/completions", CHAT_COMPLETIONS_PATH),
];

/// Rewrite a bare path (no query string).
#[must_use]
pub fn normalize_path(path: &str) -> Cow<'_, str> {
    for (legacy, versioned) in REWRITES {
        if let Some(rest) = path.strip_prefix(legacy) {
            return Cow::Owned(format!("{versioned}{rest}"));
        }
    }
    Cow::Borrowed(path)
}

/// Rewrite a path that may carry a query string. The query is never touched.
#[must_use]
pub fn normalize_path_and_query(path_and_query: &str) -> Cow<'_, str> {
    let Some((path, query)) = path_and_query.split_once('?') else {
        return normalize_path(path_and_query);
    };

    match normalize_path(path) {
        Cow::Borrowed(_) => Cow::Borrowed(path_and_query),
        Cow::Owned(rewritten) => Cow::Owned(format!("{rewritten}?{query}")),
    }
}

/// Whether a normalized path targets the chat completion endpoint or a
/// sub-path of it.
#[must_use]
pub fn is_chat_completions(path: &str) -> bool {
    path.strip_prefix(CHAT_COMPLETIONS_PATH)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Whether a normalized path targets the model listing.
#[must_use]
pub fn is_models(path: &str) -> bool {
    path.strip_prefix(MODELS_PATH)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_models_prefix() {
        assert_eq!(normalize_path("/models"), "/v1/models");
        assert_eq!(normalize_path("/models/gpt5"), "/v1/models/gpt5");
        assert_eq!(
            normalize_path_and_query("/models?provider=Perplexity"),
            "/v1/models?provider=Perplexity"
        );
    }

    #[test]
    fn test_chat_completions_prefix() {
        assert_eq!(normalize_path("/chat/completions"), "/v1/chat/completions");
        assert_eq!(
            normalize_path_and_query("/chat/completions?a=1&b=/models"),
            "/v1/chat/completions?a=1&b=/models"
        );
    }

    #[test]
    fn test_prefix_match_is_textual() {
        // Same behaviour as a `^/models` pattern: no segment boundary check
        assert_eq!(normalize_path("/modelsfoo"), "/v1/modelsfoo");
    }

    #[test]
    fn test_other_paths_unchanged() {
        for path in [
            "/",
            "/v1/models",
            "/v1/chat/completions",
            "/health",
            "/api/models",
            "/v1/embeddings?x=1",
        ] {
            let normalized = normalize_path_and_query(path);
            assert!(matches!(normalized, Cow::Borrowed(_)), "{path} was rewritten");
            assert_eq!(normalized, path);
        }
    }

    #[test]
    fn test_query_only_matches_are_ignored() {
        assert_eq!(normalize_path_and_query("/x?next=/models"), "/x?next=/models");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for path in ["/models", "/chat/completions?stream=1", "/other"] {
            let once = normalize_path_and_query(path).into_owned();
            let twice = normalize_path_and_query(&once).into_owned();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_endpoint_predicates() {
        assert!(is_chat_completions("/v1/chat/completions"));
        assert!(is_chat_completions("/v1/chat/completions/"));
        assert!(is_chat_completions("/v1/chat/completions/extra"));
        assert!(!is_chat_completions("/v1/chat/completionsX"));
        assert!(!is_chat_completions("/v1/chat"));

        assert!(is_models("/v1/models"));
        assert!(is_models("/v1/models/gpt5"));
        assert!(!is_models("/v1/modelsfoo"));
    }
}
