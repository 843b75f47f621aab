//! Text generation seam.
//!
//! Everything the engine asks of a language model goes through
//! [`GenerationService`]: streamed free text for turns and the summary, and
//! schema-constrained JSON for personas and the verdict.

pub mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::GenerationError;

pub use openai::OpenAiCompatClient;

/// Stream of text deltas.
pub type TokenStream = BoxStream<'static, Result<String, GenerationError>>;

/// A streamed free-text request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A schema-constrained JSON request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRequest {
    pub system: String,
    pub prompt: String,
    /// Name reported to the service alongside the schema.
    pub schema_name: String,
    pub schema: serde_json::Value,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Start a streamed completion. Errors before the first token are
    /// returned here; errors mid-stream arrive as stream items.
    async fn stream_text(&self, request: TextRequest) -> Result<TokenStream, GenerationError>;

    /// Produce one JSON value conforming to `request.schema`.
    async fn generate_object(
        &self,
        request: ObjectRequest,
    ) -> Result<serde_json::Value, GenerationError>;
}

/// Schema name and JSON schema for `T`.
pub fn schema_for<T: JsonSchema>() -> (String, serde_json::Value) {
    let root = schemars::schema_for!(T);
    let schema = serde_json::to_value(&root).unwrap_or(serde_json::Value::Null);
    (T::schema_name(), schema)
}

/// Typed structured generation: derive the schema from `T`, request it, and
/// deserialize the answer.
pub async fn generate_structured<T>(
    service: &dyn GenerationService,
    system: &str,
    prompt: &str,
    max_tokens: u32,
    temperature: f32,
) -> Result<T, GenerationError>
where
    T: JsonSchema + DeserializeOwned,
{
    let (schema_name, schema) = schema_for::<T>();
    let value = service
        .generate_object(ObjectRequest {
            system: system.to_string(),
            prompt: prompt.to_string(),
            schema_name: schema_name.clone(),
            schema,
            max_tokens,
            temperature,
        })
        .await?;
    serde_json::from_value(value).map_err(|e| GenerationError::Schema {
        schema: schema_name,
        message: e.to_string(),
    })
}

/// Drain a token stream into one string.
#[cfg(test)]
pub(crate) async fn collect_text(mut stream: TokenStream) -> Result<String, GenerationError> {
    use futures::StreamExt;

    let mut text = String::new();
    while let Some(token) = stream.next().await {
        text.push_str(&token?);
    }
    Ok(text)
}
