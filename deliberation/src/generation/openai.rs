//! OpenAI-compatible chat completions client.
//!
//! Works against any server that speaks `/chat/completions` with SSE
//! streaming and `response_format: json_schema`.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{GenerationService, ObjectRequest, TextRequest, TokenStream};
use crate::errors::GenerationError;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post(&self, body: serde_json::Value) -> Result<reqwest::Response, GenerationError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

fn messages<'a>(system: &'a str, prompt: &'a str) -> Vec<ChatMessage<'a>> {
    vec![
        ChatMessage {
            role: "system",
            content: system,
        },
        ChatMessage {
            role: "user",
            content: prompt,
        },
    ]
}

#[async_trait]
impl GenerationService for OpenAiCompatClient {
    async fn stream_text(&self, request: TextRequest) -> Result<TokenStream, GenerationError> {
        debug!(model = %self.model, max_tokens = request.max_tokens, "Streaming completion");

        let body = json!({
            "model": self.model,
            "messages": messages(&request.system, &request.prompt),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": true,
        });
        let response = self.post(body).await?;

        let tokens = response
            .bytes_stream()
            .map(|r| r.map_err(std::io::Error::other))
            .eventsource()
            .take_while(|event| {
                let done = matches!(event, Ok(e) if e.data == "[DONE]");
                futures::future::ready(!done)
            })
            .filter_map(|event| async move {
                match event {
                    Ok(event) => match serde_json::from_str::<ChatCompletionChunk>(&event.data) {
                        Ok(chunk) => chunk
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.delta.content)
                            .filter(|c| !c.is_empty())
                            .map(Ok),
                        Err(e) => {
                            warn!(error = %e, "Skipping unparseable completion chunk");
                            None
                        }
                    },
                    Err(e) => Some(Err(GenerationError::Stream(e.to_string()))),
                }
            });

        Ok(tokens.boxed())
    }

    async fn generate_object(
        &self,
        request: ObjectRequest,
    ) -> Result<serde_json::Value, GenerationError> {
        debug!(model = %self.model, schema = %request.schema_name, "Structured completion");

        let body = json!({
            "model": self.model,
            "messages": messages(&request.system, &request.prompt),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "schema": request.schema,
                    "strict": false,
                },
            },
        });
        let response = self.post(body).await?;

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationError::Schema {
                schema: request.schema_name.clone(),
                message: "no content returned".to_string(),
            })?;

        serde_json::from_str(&content).map_err(|e| GenerationError::Schema {
            schema: request.schema_name,
            message: e.to_string(),
        })
    }
}
