//! Chat-completions client used to ask for a corrected patch

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const MODEL_TIMEOUT_SECS: u64 = 120;
/// Low temperature keeps the diff close to the input
const TEMPERATURE: f32 = 0.1;

/// Something that turns a system + user prompt into text.
#[allow(async_fn_in_trait)]
pub trait PatchModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl ChatCompletionsClient {
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(MODEL_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

impl PatchModel for ChatCompletionsClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: TEMPERATURE,
            messages: vec![
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to reach the model API")?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = match status.as_u16() {
                401 => "Invalid API key (check OPENAI_API_KEY).".to_string(),
                429 => "Rate limited by the model API.".to_string(),
                500..=599 => format!(
                    "Model API server error ({}). The service may be temporarily unavailable.",
                    status
                ),
                _ => format!("API error {}: {}", status, crate::util::truncate(&text, 200)),
            };
            anyhow::bail!(message);
        }

        parse_completion(&text)
    }
}

fn parse_completion(text: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(text).with_context(|| {
        format!(
            "Failed to parse model response: {}",
            crate::util::truncate(text, 200)
        )
    })?;

    if let Some(usage) = &parsed.usage {
        tracing::info!(
            "model usage: {} prompt + {} completion tokens",
            usage.prompt_tokens,
            usage.completion_tokens
        );
    }

    Ok(parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default())
}
