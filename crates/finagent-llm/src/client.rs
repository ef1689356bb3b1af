//! Chat completions over an OpenAI-compatible HTTP API

use crate::LlmError;
use finagent_core::{
    ChatMessage, CollaboratorError, GenerationRequest, Settings, TextGenerator, API_KEY_ENV,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the first choice's message text from a completion response body
pub fn parse_completion(body: &str) -> Result<String, LlmError> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|_| LlmError::EmptyCompletion)?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(LlmError::EmptyCompletion)
}

/// Blocking chat client. Each call drives the async request on a private
/// current-thread runtime.
pub struct ChatClient {
    http: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    endpoint: String,
    api_key: String,
}

impl ChatClient {
    /// `timeout` bounds each request from connect to the end of the body
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            runtime,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }

    /// Build from settings, reading the key from `GROQ_API_KEY`
    pub fn from_settings(settings: &Settings) -> Result<Self, LlmError> {
        let key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::MissingApiKey(API_KEY_ENV))?;
        Self::new(
            &settings.api_base_url,
            key,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&CompletionBody {
                model: &request.model,
                messages: &request.messages,
                temperature: request.temperature,
                max_tokens: request.max_tokens,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_completion(&body)
    }
}

impl TextGenerator for ChatClient {
    fn generate(&self, request: &GenerationRequest) -> Result<String, CollaboratorError> {
        tracing::debug!(model = %request.model, max_tokens = request.max_tokens, "chat completion");
        self.runtime
            .block_on(self.complete(request))
            .map_err(|e| CollaboratorError::Generation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion() {
        let body = r#"{"id":"x","choices":[
            {"index":0,"message":{"role":"assistant","content":"knowledge"}}
        ]}"#;
        assert_eq!(parse_completion(body).unwrap(), "knowledge");
    }

    #[test]
    fn test_parse_completion_rejects_empty() {
        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#),
            Err(LlmError::EmptyCompletion)
        ));
        assert!(parse_completion(r#"{"choices":[{"message":{"content":"  "}}]}"#).is_err());
        assert!(parse_completion("<html>").is_err());
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let client = ChatClient::new(
            "https://api.groq.com/openai/v1/",
            "key",
            Duration::from_secs(60),
        )
        .unwrap();
        assert_eq!(client.endpoint(), "https://api.groq.com/openai/v1/chat/completions");
    }

    #[test]
    fn test_unresponsive_server_times_out() {
        // Connections queue in the backlog but nothing ever answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let client = ChatClient::new(&base, "key", Duration::from_millis(200)).unwrap();

        let started = std::time::Instant::now();
        let result = client.generate(&GenerationRequest {
            messages: vec![ChatMessage::user("hi")],
            model: "m".to_string(),
            temperature: 0.1,
            max_tokens: 10,
        });

        assert!(matches!(result, Err(CollaboratorError::Generation(_))));
        assert!(started.elapsed() < Duration::from_secs(10));
        drop(listener);
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![
            ChatMessage::system("You are a query classifier."),
            ChatMessage::user("hi"),
        ];
        let body = CompletionBody {
            model: "llama-3.3-70b-versatile",
            messages: &messages,
            temperature: 0.1,
            max_tokens: 10,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["max_tokens"], 10);
    }
}
