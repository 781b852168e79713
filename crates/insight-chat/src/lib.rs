//! Document Q&A over external LLM providers, and durable chat history.
//!
//! LLM calls go to external APIs (OpenAI, Anthropic, Groq, Gemini).

pub mod answer;
pub mod config;
pub mod history;
pub mod providers;
pub mod types;

pub use answer::{AnswerError, Answerer, LlmAnswerer};
pub use config::LLMConfig;
pub use history::{ChatEntry, ChatLogger};
pub use types::*;
