//! Send-message orchestration for RAG chats.
//!
//! One exchange = persist the user message, run retrieval-augmented
//! answering, persist the assistant message. The user message is written
//! before the completion request goes out; the assistant message is written
//! only after a successful response. After the first exchange the chat gets a
//! generated title — that step is best-effort and never fails the exchange.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::answer;
use crate::auth::Identity;
use crate::chats;
use crate::completion::{ChatMessage, Completer};
use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::messages;
use crate::models::{Chat, Message, MessageRole, NEW_CHAT_TITLE};
use crate::result::{ActionError, ActionResult};
use crate::vector::VectorIndex;

/// Result of one completed exchange.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageOutcome {
    pub chat: Chat,
    pub user_message: Message,
    pub assistant_message: Message,
}

/// Run one exchange in `namespace_id`. When `chat_id` is `None` a chat is
/// created lazily with the placeholder title.
#[allow(clippy::too_many_arguments)]
pub async fn send_message(
    pool: &SqlitePool,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    completer: &dyn Completer,
    retrieval: &RetrievalConfig,
    identity: &Identity,
    namespace_id: &str,
    chat_id: Option<&str>,
    content: &str,
) -> ActionResult<SendMessageOutcome> {
    if content.trim().is_empty() {
        return Err(ActionError::validation("Message content is required"));
    }

    // Resolve or lazily create the chat
    let chat = match chat_id {
        Some(id) => {
            let chat = chats::get_chat(pool, identity, id).await?;
            if chat.namespace_id != namespace_id {
                return Err(ActionError::validation(
                    "Chat does not belong to the given namespace",
                ));
            }
            chat
        }
        None => chats::create_chat(pool, identity, namespace_id, NEW_CHAT_TITLE).await?,
    };

    // Prior turns, oldest first, before this exchange is added
    let prior = messages::list_messages(pool, identity, &chat.id).await?;
    let history: Vec<ChatMessage> = prior
        .iter()
        .map(|m| match m.sender {
            MessageRole::User => ChatMessage::user(&m.content),
            MessageRole::Assistant => ChatMessage::assistant(&m.content),
        })
        .collect();
    let first_exchange = prior.is_empty();

    // User message is persisted before the completion request is issued
    let user_message = messages::create_message(
        pool,
        identity,
        &chat.id,
        namespace_id,
        MessageRole::User,
        content,
        None,
    )
    .await?;

    let rag = answer::answer(
        embedder,
        index,
        completer,
        retrieval,
        namespace_id,
        content,
        &history,
    )
    .await?;

    // Assistant message only after a successful completion
    let assistant_message = messages::create_message(
        pool,
        identity,
        &chat.id,
        namespace_id,
        MessageRole::Assistant,
        &rag.answer,
        Some(&rag.source_docs),
    )
    .await?;

    chats::touch_chat(pool, identity, &chat.id).await?;

    // First exchange complete — generate a title. Best-effort: a failure
    // leaves the placeholder and the exchange still succeeds.
    let chat = if first_exchange {
        match generate_chat_title(pool, completer, identity, &chat.id, content, &rag.answer).await {
            Ok(updated) => updated,
            Err(e) => {
                eprintln!("title generation failed for chat {}: {}", chat.id, e);
                chat
            }
        }
    } else {
        chats::get_chat(pool, identity, &chat.id).await?
    };

    Ok(SendMessageOutcome {
        chat,
        user_message,
        assistant_message,
    })
}

/// Ask the completion collaborator for a short title summarizing the first
/// exchange, then store it on the chat.
pub async fn generate_chat_title(
    pool: &SqlitePool,
    completer: &dyn Completer,
    identity: &Identity,
    chat_id: &str,
    user_content: &str,
    assistant_content: &str,
) -> ActionResult<Chat> {
    let prompt = vec![
        ChatMessage::system(
            "You are a helpful assistant that generates short, descriptive titles for \
             conversations. Generate a concise title (max 6 words) that captures the main \
             topic or theme of this conversation. Respond with just the title, nothing else.",
        ),
        ChatMessage::user(user_content),
        ChatMessage::assistant(assistant_content),
    ];

    let title = completer
        .complete(&prompt)
        .await
        .map_err(|e| ActionError::collaborator(format!("title generation failed: {}", e)))?;

    let title = title.trim();
    if title.is_empty() {
        return Err(ActionError::collaborator("empty title generated"));
    }

    chats::update_chat_title(pool, identity, chat_id, title).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::create_namespace;
    use crate::result::ErrorKind;
    use crate::vector::MemoryVectorIndex;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Returns queued responses in order; errors once the queue is empty.
    struct ScriptedCompleter {
        responses: Mutex<Vec<&'static str>>,
        calls: AtomicUsize,
    }

    impl ScriptedCompleter {
        fn new(responses: Vec<&'static str>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Completer for ScriptedCompleter {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                bail!("completion unavailable");
            }
            Ok(responses.remove(0).to_string())
        }
    }

    async fn setup() -> (SqlitePool, Identity, String) {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        let identity = Identity {
            user_id: "user-1".to_string(),
            email: "a@example.com".to_string(),
        };
        let ns = create_namespace(&pool, &identity, "Docs", None)
            .await
            .unwrap();
        (pool, identity, ns.id)
    }

    fn retrieval() -> RetrievalConfig {
        RetrievalConfig {
            top_k: 5,
            similarity_threshold: 0.7,
        }
    }

    #[tokio::test]
    async fn first_send_creates_chat_and_generates_title_once() {
        let (pool, identity, ns_id) = setup().await;
        let index = MemoryVectorIndex::new();
        let completer = ScriptedCompleter::new(vec!["Hi! How can I help?", "Friendly greeting"]);

        let outcome = send_message(
            &pool,
            &FixedEmbedder,
            &index,
            &completer,
            &retrieval(),
            &identity,
            &ns_id,
            None,
            "Hello",
        )
        .await
        .unwrap();

        assert_eq!(outcome.user_message.content, "Hello");
        assert_eq!(outcome.user_message.sender, MessageRole::User);
        assert_eq!(outcome.assistant_message.sender, MessageRole::Assistant);
        assert_eq!(outcome.chat.title, "Friendly greeting");
        // one answer call + exactly one title call
        assert_eq!(completer.call_count(), 2);

        let stored = messages::list_messages(&pool, &identity, &outcome.chat.id)
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn title_failure_is_non_fatal() {
        let (pool, identity, ns_id) = setup().await;
        let index = MemoryVectorIndex::new();
        // answer succeeds, then the title call finds the queue empty
        let completer = ScriptedCompleter::new(vec!["Hi!"]);

        let outcome = send_message(
            &pool,
            &FixedEmbedder,
            &index,
            &completer,
            &retrieval(),
            &identity,
            &ns_id,
            None,
            "Hello",
        )
        .await
        .unwrap();

        assert_eq!(outcome.chat.title, NEW_CHAT_TITLE);
        assert_eq!(completer.call_count(), 2);
    }

    #[tokio::test]
    async fn second_exchange_does_not_regenerate_title() {
        let (pool, identity, ns_id) = setup().await;
        let index = MemoryVectorIndex::new();
        let completer =
            ScriptedCompleter::new(vec!["first answer", "Generated title", "second answer"]);

        let first = send_message(
            &pool,
            &FixedEmbedder,
            &index,
            &completer,
            &retrieval(),
            &identity,
            &ns_id,
            None,
            "Hello",
        )
        .await
        .unwrap();
        assert_eq!(completer.call_count(), 2);

        let second = send_message(
            &pool,
            &FixedEmbedder,
            &index,
            &completer,
            &retrieval(),
            &identity,
            &ns_id,
            Some(&first.chat.id),
            "Tell me more",
        )
        .await
        .unwrap();

        // only the answer call this time
        assert_eq!(completer.call_count(), 3);
        assert_eq!(second.chat.title, "Generated title");

        let stored = messages::list_messages(&pool, &identity, &first.chat.id)
            .await
            .unwrap();
        assert_eq!(stored.len(), 4);
    }

    #[tokio::test]
    async fn completion_failure_keeps_user_message_only() {
        let (pool, identity, ns_id) = setup().await;
        let index = MemoryVectorIndex::new();
        let completer = ScriptedCompleter::new(vec![]);

        let err = send_message(
            &pool,
            &FixedEmbedder,
            &index,
            &completer,
            &retrieval(),
            &identity,
            &ns_id,
            None,
            "Hello",
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Collaborator);

        // the lazily created chat holds the user message and nothing else
        let chat_list = chats::list_chats(&pool, &identity, &ns_id).await.unwrap();
        assert_eq!(chat_list.len(), 1);
        let stored = messages::list_messages(&pool, &identity, &chat_list[0].id)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].sender, MessageRole::User);
    }

    #[tokio::test]
    async fn chat_must_match_namespace() {
        let (pool, identity, ns_id) = setup().await;
        let other_ns = create_namespace(&pool, &identity, "Other", None)
            .await
            .unwrap();
        let chat = chats::create_chat(&pool, &identity, &other_ns.id, NEW_CHAT_TITLE)
            .await
            .unwrap();

        let index = MemoryVectorIndex::new();
        let completer = ScriptedCompleter::new(vec!["answer"]);
        let err = send_message(
            &pool,
            &FixedEmbedder,
            &index,
            &completer,
            &retrieval(),
            &identity,
            &ns_id,
            Some(&chat.id),
            "Hello",
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
