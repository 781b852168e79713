//! External LLM provider calls.
//!
//! OpenAI and Groq share the chat-completions format. Anthropic and Gemini
//! each have their own request and response shapes.

use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::types::{ChatMessage, LLMProvider};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Malformed(String),
}

/// Sampling settings for one completion.
#[derive(Debug, Clone, Copy)]
pub struct CompletionParams {
    pub temperature: f64,
    pub max_tokens: usize,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 1024,
        }
    }
}

/// Request a single, non-streamed completion from `provider`.
pub async fn complete(
    client: &Client,
    provider: LLMProvider,
    messages: &[ChatMessage],
    model: &str,
    api_key: &str,
    params: CompletionParams,
) -> Result<String, ProviderError> {
    debug!("Requesting completion from {} with model {}", provider, model);

    let request = match provider {
        LLMProvider::OpenAI | LLMProvider::Groq => {
            let url = if provider == LLMProvider::OpenAI {
                OPENAI_URL
            } else {
                GROQ_URL
            };
            client
                .post(url)
                .bearer_auth(api_key)
                .json(&openai_body(messages, model, params))
        }
        LLMProvider::Anthropic => client
            .post(ANTHROPIC_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&anthropic_body(messages, model, params)),
        LLMProvider::Gemini => client
            .post(format!("{}/{}:generateContent", GEMINI_BASE_URL, model))
            .header("x-goog-api-key", api_key)
            .json(&gemini_body(messages, params)),
    };

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body,
        });
    }

    let parsed: Value = response.json().await?;
    match provider {
        LLMProvider::OpenAI | LLMProvider::Groq => parse_openai(&parsed),
        LLMProvider::Anthropic => parse_anthropic(&parsed),
        LLMProvider::Gemini => parse_gemini(&parsed),
    }
}

fn openai_body(messages: &[ChatMessage], model: &str, params: CompletionParams) -> Value {
    let msgs: Vec<Value> = messages
        .iter()
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect();
    json!({
        "model": model,
        "messages": msgs,
        "temperature": params.temperature,
        "max_tokens": params.max_tokens,
    })
}

fn anthropic_body(messages: &[ChatMessage], model: &str, params: CompletionParams) -> Value {
    let system = system_prompt(messages);
    let conv: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != "system")
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect();

    let mut body = json!({
        "model": model,
        "messages": conv,
        "temperature": params.temperature,
        "max_tokens": params.max_tokens,
    });
    if let Some(sys) = system {
        body["system"] = json!(sys);
    }
    body
}

fn gemini_body(messages: &[ChatMessage], params: CompletionParams) -> Value {
    let contents: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != "system")
        .map(|m| {
            let role = if m.role == "assistant" { "model" } else { "user" };
            json!({"role": role, "parts": [{"text": m.content}]})
        })
        .collect();

    let mut body = json!({
        "contents": contents,
        "generationConfig": {
            "temperature": params.temperature,
            "maxOutputTokens": params.max_tokens,
        },
    });
    if let Some(sys) = system_prompt(messages) {
        body["systemInstruction"] = json!({"parts": [{"text": sys}]});
    }
    body
}

fn system_prompt(messages: &[ChatMessage]) -> Option<String> {
    let parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == "system")
        .map(|m| m.content.as_str())
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n\n"))
}

fn parse_openai(body: &Value) -> Result<String, ProviderError> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ProviderError::Malformed("missing choices[0].message.content".into()))
}

fn parse_anthropic(body: &Value) -> Result<String, ProviderError> {
    let blocks = body["content"]
        .as_array()
        .ok_or_else(|| ProviderError::Malformed("missing content blocks".into()))?;
    Ok(blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .collect::<Vec<_>>()
        .join(""))
}

fn parse_gemini(body: &Value) -> Result<String, ProviderError> {
    let parts = body["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| {
            let reason = body["promptFeedback"]["blockReason"]
                .as_str()
                .unwrap_or("no candidates");
            ProviderError::Malformed(format!("Gemini returned no content ({})", reason))
        })?;
    Ok(parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .join(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("Use the document."),
            ChatMessage::user("What is the revenue?"),
        ]
    }

    #[test]
    fn test_openai_body_keeps_system_message() {
        let body = openai_body(&conversation(), "gpt-4o-mini", CompletionParams::default());
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "What is the revenue?");
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_anthropic_body_lifts_system_prompt() {
        let body = anthropic_body(&conversation(), "claude", CompletionParams::default());
        assert_eq!(body["system"], "Use the document.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_gemini_body() {
        let params = CompletionParams {
            temperature: 0.0,
            max_tokens: 64,
        };
        let body = gemini_body(&conversation(), params);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Use the document.");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "What is the revenue?");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 64);
    }

    #[test]
    fn test_parse_responses() {
        let openai = json!({"choices": [{"message": {"role": "assistant", "content": "42"}}]});
        assert_eq!(parse_openai(&openai).unwrap(), "42");

        let anthropic = json!({"content": [
            {"type": "text", "text": "Revenue "},
            {"type": "text", "text": "grew."}
        ]});
        assert_eq!(parse_anthropic(&anthropic).unwrap(), "Revenue grew.");

        let gemini = json!({"candidates": [{"content": {"parts": [{"text": "Margins held."}]}}]});
        assert_eq!(parse_gemini(&gemini).unwrap(), "Margins held.");
    }

    #[test]
    fn test_parse_malformed_responses() {
        assert!(matches!(
            parse_openai(&json!({"choices": []})),
            Err(ProviderError::Malformed(_))
        ));

        let blocked = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = parse_gemini(&blocked).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }
}
