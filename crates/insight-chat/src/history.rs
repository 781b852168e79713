//! Background chat-history writer.
//!
//! Question/answer pairs are queued after the answer has been sent and written
//! by a fixed pool of workers. A full queue drops the pair with a warning; a
//! failed write is logged and leaves no partial pair behind.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use insight_core::ChatLogConfig;
use insight_store::SqliteStore;

/// One question and the answer that was returned for it.
#[derive(Debug, Clone)]
pub struct ChatEntry {
    pub document_id: String,
    pub user_id: String,
    pub question: String,
    pub answer: String,
}

pub struct ChatLogger {
    sender: Mutex<Option<mpsc::Sender<ChatEntry>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ChatLogger {
    /// Spawn the writer workers. Must be called inside a tokio runtime.
    pub fn start(store: Arc<SqliteStore>, config: ChatLogConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..config.workers)
            .map(|worker_id| {
                let rx = rx.clone();
                let store = store.clone();
                tokio::spawn(async move {
                    loop {
                        let entry = rx.lock().await.recv().await;
                        match entry {
                            Some(entry) => write_entry(&store, entry).await,
                            None => break,
                        }
                    }
                    debug!("Chat log worker {} stopped", worker_id);
                })
            })
            .collect();

        info!(
            "Chat logger started: {} workers, queue capacity {}",
            config.workers, config.queue_capacity
        );

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    /// Queue a pair for writing without waiting. Returns whether it was queued.
    pub fn log_turn(&self, document_id: &str, user_id: &str, question: &str, answer: &str) -> bool {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            warn!("Chat logger is shut down, dropping turn for document {}", document_id);
            return false;
        };

        let entry = ChatEntry {
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
            question: question.to_string(),
            answer: answer.to_string(),
        };
        match sender.try_send(entry) {
            Ok(()) => true,
            Err(TrySendError::Full(entry)) => {
                warn!("Chat log queue full, dropping turn for document {}", entry.document_id);
                false
            }
            Err(TrySendError::Closed(entry)) => {
                warn!("Chat log queue closed, dropping turn for document {}", entry.document_id);
                false
            }
        }
    }

    /// Stop accepting turns and wait until everything already queued is written.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                error!("Chat log worker panicked: {}", e);
            }
        }
        info!("Chat logger drained");
    }
}

async fn write_entry(store: &Arc<SqliteStore>, entry: ChatEntry) {
    let store = store.clone();
    let document_id = entry.document_id.clone();
    let result = tokio::task::spawn_blocking(move || {
        store.append_chat_pair(&entry.document_id, &entry.user_id, &entry.question, &entry.answer)
    })
    .await;

    match result {
        Ok(Ok(())) => debug!("Saved chat history for document {}", document_id),
        Ok(Err(e)) => error!("Failed to save chat history for document {}: {}", document_id, e),
        Err(e) => error!("Chat history task failed for document {}: {}", document_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insight_store::{MessageRole, NewDocument};
    use tempfile::TempDir;

    fn seeded_store() -> (Arc<SqliteStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("insight.db")).unwrap());
        store.upsert_user("u1", "u1@example.com").unwrap();
        store
            .insert_document_with_chunks(
                &NewDocument {
                    id: "d1".into(),
                    user_id: "u1".into(),
                    file_name: "f.txt".into(),
                    storage_path: "u1/d1/f.txt".into(),
                },
                &["text".to_string()],
            )
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_turns_are_written_in_order() {
        let (store, _dir) = seeded_store();
        let logger = ChatLogger::start(store.clone(), ChatLogConfig::default());

        assert!(logger.log_turn("d1", "u1", "What is this?", "A report."));
        logger.shutdown().await;

        let history = store.get_chat_history("d1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[0].content, "What is this?");
        assert_eq!(history[1].role, MessageRole::Ai);
        assert_eq!(history[1].content, "A report.");
    }

    #[tokio::test]
    async fn test_full_queue_drops_turns() {
        let (store, _dir) = seeded_store();
        let logger = ChatLogger::start(
            store.clone(),
            ChatLogConfig {
                queue_capacity: 1,
                workers: 1,
            },
        );

        // The current-thread runtime does not run the worker until we yield.
        assert!(logger.log_turn("d1", "u1", "q1", "a1"));
        assert!(!logger.log_turn("d1", "u1", "q2", "a2"));
        logger.shutdown().await;

        assert_eq!(store.count_chat_turns("d1").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_write_is_swallowed() {
        let (store, _dir) = seeded_store();
        let logger = ChatLogger::start(store.clone(), ChatLogConfig::default());

        assert!(logger.log_turn("missing-doc", "u1", "q", "a"));
        assert!(logger.log_turn("d1", "u1", "q", "a"));
        logger.shutdown().await;

        assert_eq!(store.count_chat_turns("missing-doc").unwrap(), 0);
        assert_eq!(store.count_chat_turns("d1").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_log_after_shutdown_is_dropped() {
        let (store, _dir) = seeded_store();
        let logger = ChatLogger::start(store.clone(), ChatLogConfig::default());
        logger.shutdown().await;

        assert!(!logger.log_turn("d1", "u1", "q", "a"));
        assert_eq!(store.count_chat_turns("d1").unwrap(), 0);
    }
}
