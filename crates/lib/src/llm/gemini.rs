//! Gemini API client (generateContent, non-streaming).

use crate::llm::{ChatMessage, ChatResponse, LlmBackend, LlmError};
use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    api_key: Option<Secret<String>>,
    temperature: f32,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, temperature: f32) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.map(Secret::new),
            temperature,
            client: reqwest::Client::new(),
        }
    }

    /// POST /v1beta/models/{model}:generateContent
    pub async fn generate(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatResponse, LlmError> {
        let api_key = self.api_key.as_ref().ok_or(LlmError::NotConfigured)?;
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        let body = build_request(messages, self.temperature);
        log::debug!(
            "gemini: model {} with {} content turn(s)",
            model,
            body.contents.len()
        );
        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key.expose_secret())
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{} {}", status, body)));
        }
        let data: GenerateContentResponse = res.json().await?;
        let text = data.text().ok_or(LlmError::EmptyReply)?;
        Ok(ChatResponse {
            message: Some(ChatMessage::assistant(text)),
        })
    }
}

#[async_trait]
impl LlmBackend for GeminiClient {
    async fn chat(&self, model: &str, messages: Vec<ChatMessage>) -> Result<ChatResponse, LlmError> {
        self.generate(model, &messages).await
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate; None when there is no text.
    fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// System messages become `systemInstruction`; assistant turns use Gemini's "model" role.
fn build_request(messages: &[ChatMessage], temperature: f32) -> GenerateContentRequest {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();
    for m in messages {
        match m.role.as_str() {
            "system" => {
                if !m.content.trim().is_empty() {
                    system_parts.push(Part {
                        text: m.content.clone(),
                    });
                }
            }
            "assistant" => contents.push(Content {
                role: Some("model".to_string()),
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            }),
            _ => contents.push(Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            }),
        }
    }
    GenerateContentRequest {
        contents,
        system_instruction: if system_parts.is_empty() {
            None
        } else {
            Some(Content {
                role: None,
                parts: system_parts,
            })
        },
        generation_config: GenerationConfig { temperature },
    }
}
