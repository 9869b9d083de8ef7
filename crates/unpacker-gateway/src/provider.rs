//! Provider wire formats.
//!
//! Three request/response dialects cover every configured backend:
//! Anthropic Messages, OpenAI-compatible chat completions (OpenAI and
//! DeepSeek) and Gemini `generateContent`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use unpacker_core::BackendId;

/// Anthropic API version header value
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const DEFAULT_MAX_TOKENS: u32 = 2048;

/// API dialect spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Anthropic,
    OpenAiCompatible,
    Gemini,
}

impl Provider {
    /// Request body for a system + user prompt pair.
    pub fn request_body(self, model: &str, max_tokens: u32, system: &str, user: &str) -> Value {
        match self {
            Provider::Anthropic => json!({
                "model": model,
                "max_tokens": max_tokens,
                "system": system,
                "messages": [{ "role": "user", "content": user }],
            }),
            Provider::OpenAiCompatible => json!({
                "model": model,
                "max_tokens": max_tokens,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": user },
                ],
            }),
            // Gemini has no separate system slot on this endpoint.
            Provider::Gemini => json!({
                "contents": [{ "parts": [{ "text": format!("{system}\n\n{user}") }] }],
                "generationConfig": { "maxOutputTokens": max_tokens },
            }),
        }
    }

    /// Pull the generated text out of a response body.
    pub fn extract_text(self, body: &Value) -> Option<&str> {
        let text = match self {
            Provider::Anthropic => body.pointer("/content/0/text"),
            Provider::OpenAiCompatible => body.pointer("/choices/0/message/content"),
            Provider::Gemini => body.pointer("/candidates/0/content/parts/0/text"),
        };
        text.and_then(Value::as_str)
    }
}

/// Everything needed to reach one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSpec {
    pub provider: Provider,
    pub model: String,
    /// Full request URL. For Gemini the model is part of the path.
    pub endpoint: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl BackendSpec {
    pub fn claude() -> Self {
        Self {
            provider: Provider::Anthropic,
            model: "claude-sonnet-4-20250514".to_string(),
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn gpt() -> Self {
        Self {
            provider: Provider::OpenAiCompatible,
            model: "gpt-4o-mini".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn deepseek() -> Self {
        Self {
            provider: Provider::OpenAiCompatible,
            model: "deepseek-chat".to_string(),
            endpoint: "https://api.deepseek.com/v1/chat/completions".to_string(),
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn gemini() -> Self {
        let model = "gemini-1.5-flash";
        Self {
            provider: Provider::Gemini,
            model: model.to_string(),
            endpoint: format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"
            ),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// The four stock backends, keyed by the ids the default roster uses.
    pub fn defaults() -> BTreeMap<BackendId, BackendSpec> {
        BTreeMap::from([
            (BackendId::new("claude"), Self::claude()),
            (BackendId::new("gpt"), Self::gpt()),
            (BackendId::new("deepseek"), Self::deepseek()),
            (BackendId::new("gemini"), Self::gemini()),
        ])
    }
}
