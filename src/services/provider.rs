use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::llm::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, LlmConfig,
};
use crate::utils::http::build_llm_client;
use crate::utils::retry::retry_with_backoff;

#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Capability boundary over the external text-generation service. All four
/// model-dependent stages go through this, so tests can swap in a
/// deterministic stub.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn generate(&self, prompt: &str, options: GenerateOptions) -> Result<String>;
}

/// Production provider: OpenAI-compatible chat completions, non-streaming,
/// with backoff on transport failures. Callers still treat any Err as
/// recoverable and apply their stage fallback.
pub struct OpenAiProvider {
    config: LlmConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = build_llm_client(config.timeout_secs)?;
        Ok(Self { config, client })
    }

    async fn request_once(&self, prompt: &str, options: GenerateOptions) -> Result<String> {
        let req = ChatCompletionRequest {
            model: self.config.model_name.clone(),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: Some(options.max_tokens),
            temperature: Some(options.temperature),
        };

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(anyhow!("analysis API error ({}): {}", status, body));
        }

        let response: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            anyhow!(
                "analysis response parse error: {} body: {}",
                e,
                body.chars().take(200).collect::<String>()
            )
        })?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "token usage"
            );
        }

        response
            .choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.clone())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| anyhow!("analysis API returned empty content"))
    }
}

#[async_trait]
impl AnalysisProvider for OpenAiProvider {
    async fn generate(&self, prompt: &str, options: GenerateOptions) -> Result<String> {
        retry_with_backoff(self.config.max_retries, || {
            self.request_once(prompt, options)
        })
        .await
    }
}

/// Extract the first JSON array from a model reply, tolerating markdown
/// fences and surrounding prose.
pub fn extract_json_array(text: &str) -> Result<String> {
    let text = text.trim();
    if let Some(start) = text.find('[') {
        if let Some(end) = text.rfind(']') {
            if end > start {
                return Ok(text[start..=end].to_string());
            }
        }
    }
    Err(anyhow!("no JSON array in model response"))
}

/// Same, for a JSON object.
pub fn extract_json_object(text: &str) -> Result<String> {
    let text = text.trim();
    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            if end > start {
                return Ok(text[start..=end].to_string());
            }
        }
    }
    Err(anyhow!("no JSON object in model response"))
}

pub mod stub {
    //! Deterministic provider stub for tests and offline runs.

    use super::*;
    use std::sync::Mutex;

    /// Scripted provider: pops canned responses in order, then fails.
    /// `always_fail()` makes every call error, exercising stage fallbacks.
    pub struct StubProvider {
        responses: Mutex<Vec<String>>,
        always_fail: bool,
    }

    impl StubProvider {
        pub fn scripted(responses: Vec<String>) -> Self {
            let mut responses = responses;
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                always_fail: false,
            }
        }

        pub fn always_fail() -> Self {
            Self {
                responses: Mutex::new(Vec::new()),
                always_fail: true,
            }
        }
    }

    #[async_trait]
    impl AnalysisProvider for StubProvider {
        async fn generate(&self, _prompt: &str, _options: GenerateOptions) -> Result<String> {
            if self.always_fail {
                return Err(anyhow!("stub provider: simulated outage"));
            }
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow!("stub provider: no scripted response left"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_array_from_fenced_reply() {
        let reply = "Here you go:\n```json\n[{\"index\":1}]\n```";
        assert_eq!(extract_json_array(reply).unwrap(), "[{\"index\":1}]");
    }

    #[test]
    fn extracts_object_spanning_prose() {
        let reply = "analysis follows {\"trends\": []} hope that helps";
        assert_eq!(extract_json_object(reply).unwrap(), "{\"trends\": []}");
    }

    #[test]
    fn missing_array_is_an_error() {
        assert!(extract_json_array("no json here").is_err());
    }

    #[tokio::test]
    async fn stub_scripted_then_exhausted() {
        let p = stub::StubProvider::scripted(vec!["a".into(), "b".into()]);
        let opts = GenerateOptions {
            temperature: 0.0,
            max_tokens: 16,
        };
        assert_eq!(p.generate("x", opts).await.unwrap(), "a");
        assert_eq!(p.generate("x", opts).await.unwrap(), "b");
        assert!(p.generate("x", opts).await.is_err());
    }
}
