//! HTTP model gateway for Idea Unpacker.
//!
//! Implements [`unpacker_core::ModelGateway`] over the Anthropic, OpenAI,
//! DeepSeek and Gemini APIs. Prompt wording and output extraction live here
//! so the core only ever sees structured values.

pub mod error;
pub mod extract;
pub mod http;
pub mod prompts;
pub mod provider;

pub use error::{GatewayError, Result};
pub use extract::{parse_output, strip_fences};
pub use http::{HttpGateway, DEFAULT_TIMEOUT};
pub use prompts::{render, Rendered};
pub use provider::{BackendSpec, Provider};
