//! [`ModelGateway`] over vendor HTTP APIs.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};
use unpacker_core::{
    BackendId, BackendRoster, InvocationError, ModelGateway, OutputSchema, Prompt, Structured,
};

use crate::error::{GatewayError, Result};
use crate::extract::parse_output;
use crate::prompts::render;
use crate::provider::{BackendSpec, Provider, ANTHROPIC_VERSION};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP gateway holding one shared client for every backend.
pub struct HttpGateway {
    client: reqwest::Client,
    specs: BTreeMap<BackendId, BackendSpec>,
    keys: BTreeMap<BackendId, String>,
    timeout: Duration,
}

impl HttpGateway {
    /// Create a gateway with no API keys loaded.
    pub fn new(specs: BTreeMap<BackendId, BackendSpec>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("unpacker-gateway/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            specs,
            keys: BTreeMap::new(),
            timeout,
        })
    }

    /// Create a gateway and read each backend's key from its environment variable.
    ///
    /// Backends whose variable is unset are kept but unusable until
    /// [`check_roster`](Self::check_roster) or a call reports them.
    pub fn from_env(specs: BTreeMap<BackendId, BackendSpec>, timeout: Duration) -> Result<Self> {
        let mut gateway = Self::new(specs, timeout)?;
        let found: Vec<(BackendId, String)> = gateway
            .specs
            .iter()
            .filter_map(|(id, spec)| {
                std::env::var(&spec.api_key_env)
                    .ok()
                    .filter(|key| !key.trim().is_empty())
                    .map(|key| (id.clone(), key))
            })
            .collect();
        for (id, key) in found {
            debug!(backend = %id, "loaded API key");
            gateway.keys.insert(id, key);
        }
        Ok(gateway)
    }

    /// Set the API key for a backend.
    pub fn with_api_key(mut self, backend: impl Into<String>, key: impl Into<String>) -> Self {
        self.keys.insert(BackendId::new(backend), key.into());
        self
    }

    /// Fail fast when a role names a backend that is not configured or has no key.
    pub fn check_roster(&self, roster: &BackendRoster) -> Result<()> {
        for backend in roster_backends(roster) {
            let spec = self
                .specs
                .get(backend)
                .ok_or_else(|| GatewayError::UnknownBackend(backend.to_string()))?;
            if !self.keys.contains_key(backend) {
                return Err(GatewayError::MissingApiKey {
                    backend: backend.to_string(),
                    env: spec.api_key_env.clone(),
                });
            }
        }
        Ok(())
    }

    fn build_request(
        &self,
        spec: &BackendSpec,
        key: &str,
        body: &Value,
    ) -> reqwest::RequestBuilder {
        let request = self.client.post(&spec.endpoint).json(body);
        match spec.provider {
            Provider::Anthropic => request
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            Provider::OpenAiCompatible => request.bearer_auth(key),
            Provider::Gemini => request.header("x-goog-api-key", key),
        }
    }

    /// The URL is stripped so endpoint credentials never reach provenance.
    fn transport_error(&self, err: reqwest::Error) -> InvocationError {
        let err = err.without_url();
        if err.is_timeout() {
            InvocationError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            }
        } else {
            InvocationError::unavailable(err)
        }
    }
}

/// Every backend a roster refers to, in role order.
fn roster_backends(roster: &BackendRoster) -> impl Iterator<Item = &BackendId> {
    std::iter::once(&roster.generator)
        .chain(roster.scorers.iter())
        .chain([&roster.formatter, &roster.drafter, &roster.evaluator])
        .chain(roster.analyst.iter())
}

#[async_trait]
impl ModelGateway for HttpGateway {
    async fn invoke(
        &self,
        backend: &BackendId,
        prompt: &Prompt,
        schema: OutputSchema,
    ) -> std::result::Result<Structured, InvocationError> {
        let spec = self
            .specs
            .get(backend)
            .ok_or_else(|| InvocationError::unavailable(format!("backend {backend} is not configured")))?;
        let key = self
            .keys
            .get(backend)
            .ok_or_else(|| InvocationError::unavailable(format!("no API key for backend {backend}")))?;

        let rendered = render(prompt);
        let body = spec
            .provider
            .request_body(&spec.model, spec.max_tokens, &rendered.system, &rendered.user);

        debug!(backend = %backend, task = ?prompt.task, model = %spec.model, "sending request");
        let response = self
            .build_request(spec, key, &body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let detail = response.text().await.unwrap_or_default();
            warn!(backend = %backend, "rate limited");
            return Err(InvocationError::RateLimited {
                detail: format!("{status}: {detail}"),
            });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(backend = %backend, %status, "request failed");
            return Err(InvocationError::unavailable(format!("{status}: {detail}")));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;
        let text = spec.provider.extract_text(&envelope).ok_or_else(|| {
            InvocationError::schema_violation(schema, "response carried no text content")
        })?;

        parse_output(text, schema)
    }
}
