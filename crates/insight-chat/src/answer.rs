//! Answering questions about a stored document.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::config::LLMConfig;
use crate::providers::{complete, CompletionParams, ProviderError};
use crate::types::ChatMessage;
use insight_store::{Chunk, SqliteStore};

/// Largest amount of document text placed in one prompt, in characters.
pub const DEFAULT_CONTEXT_CHARS: usize = 60_000;

#[derive(Debug, thiserror::Error)]
pub enum AnswerError {
    #[error("no LLM provider is configured")]
    NotConfigured,

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("database error: {0}")]
    Database(#[from] insight_core::Error),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Maps a question about a document to an answer.
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(&self, document_id: &str, question: &str) -> Result<String, AnswerError>;
}

/// Answers from the document's stored chunks using the configured LLM provider.
pub struct LlmAnswerer {
    store: Arc<SqliteStore>,
    config: LLMConfig,
    client: Client,
    context_chars: usize,
    params: CompletionParams,
}

impl LlmAnswerer {
    pub fn new(store: Arc<SqliteStore>, config: LLMConfig) -> Self {
        Self {
            store,
            config,
            client: Client::new(),
            context_chars: DEFAULT_CONTEXT_CHARS,
            params: CompletionParams::default(),
        }
    }

    /// Whether any provider has a usable key.
    pub fn is_configured(&self) -> bool {
        self.config.resolve_provider().is_some()
    }
}

#[async_trait]
impl Answerer for LlmAnswerer {
    async fn answer(&self, document_id: &str, question: &str) -> Result<String, AnswerError> {
        let resolved = self.config.resolve_provider().ok_or(AnswerError::NotConfigured)?;

        let doc = self
            .store
            .get_document(document_id)?
            .ok_or_else(|| AnswerError::DocumentNotFound(document_id.to_string()))?;
        let chunks = self.store.get_chunks_for_document(document_id)?;
        let messages = build_messages(&doc.file_name, &chunks, question, self.context_chars);
        debug!(
            "Answering over {} chunks of {} via {}",
            chunks.len(),
            document_id,
            resolved.provider
        );

        let answer = complete(
            &self.client,
            resolved.provider,
            &messages,
            &resolved.model,
            &resolved.api_key,
            self.params,
        )
        .await?;

        info!("Answered question on document {} ({} chars)", document_id, answer.len());
        Ok(answer)
    }
}

/// Build the prompt: a system message carrying the document text, then the
/// question. Chunks are joined in order; text beyond `context_chars` is dropped.
pub fn build_messages(
    file_name: &str,
    chunks: &[Chunk],
    question: &str,
    context_chars: usize,
) -> Vec<ChatMessage> {
    let mut context = String::new();
    let mut remaining = context_chars;
    for chunk in chunks {
        if remaining == 0 {
            break;
        }
        if !context.is_empty() {
            context.push_str("\n\n");
        }
        let taken: String = chunk.content.chars().take(remaining).collect();
        remaining -= taken.chars().count();
        context.push_str(&taken);
    }

    let system = format!(
        "You are a strategic business analyst. Answer the user's question using only the \
         document below. If the document does not contain the answer, say so.\n\n\
         Document: {}\n---\n{}\n---",
        file_name, context
    );
    vec![ChatMessage::system(system), ChatMessage::user(question)]
}
