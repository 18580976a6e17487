//! The language-model client — out of scope per the orchestrator's own
//! boundary (§1): an HTTP call that returns a code string. Modeled as a
//! trait so the transport can be swapped without touching the runner.

use async_trait::async_trait;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Default implementation calling the Anthropic Messages API, in the
/// same shape the reference platform's own review-step provider uses.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: String, max_tokens: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            max_tokens,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("CAIRN_LLM_API_KEY")
            .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
            .map_err(|_| anyhow::anyhow!("CAIRN_LLM_API_KEY or ANTHROPIC_API_KEY must be set"))?;
        let model = std::env::var("CAIRN_LLM_MODEL").unwrap_or_else(|_| "claude-3-5-sonnet-latest".to_string());
        Ok(Self::new(api_key, model, 4096))
    }
}

#[derive(serde::Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(serde::Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(serde::Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(serde::Deserialize)]
struct ContentBlock {
    text: String,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Message { role: "user", content: prompt }],
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<MessagesResponse>()
            .await?;

        Ok(response
            .content
            .into_iter()
            .map(|b| b.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoClient;

    #[async_trait]
    impl LlmClient for EchoClient {
        async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
            Ok(format!("echo: {prompt}"))
        }
    }

    #[tokio::test]
    async fn trait_object_dispatches() {
        let client: std::sync::Arc<dyn LlmClient> = std::sync::Arc::new(EchoClient);
        assert_eq!(client.complete("hi").await.unwrap(), "echo: hi");
    }
}
