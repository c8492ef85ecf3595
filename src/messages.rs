//! Message store: owner-scoped CRUD over the `messages` table.
//!
//! Messages are ordered by creation time within their chat. Retrieval
//! citations ride along as a JSON column.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::auth::Identity;
use crate::models::{format_ts_iso, now_ts, Message, MessageRole, SourceDoc};
use crate::result::{ActionError, ActionResult};

pub async fn create_message(
    pool: &SqlitePool,
    identity: &Identity,
    chat_id: &str,
    namespace_id: &str,
    sender: MessageRole,
    content: &str,
    source_docs: Option<&[SourceDoc]>,
) -> ActionResult<Message> {
    if content.trim().is_empty() {
        return Err(ActionError::validation("Message content is required"));
    }

    // The chat must exist and belong to the caller.
    let owned: Option<String> =
        sqlx::query_scalar("SELECT id FROM chats WHERE id = ? AND owner_id = ?")
            .bind(chat_id)
            .bind(&identity.user_id)
            .fetch_optional(pool)
            .await?;
    if owned.is_none() {
        return Err(ActionError::not_found("Chat not found"));
    }

    let id = Uuid::new_v4().to_string();
    let now = now_ts();
    let source_docs_json = match source_docs {
        Some(docs) if !docs.is_empty() => Some(
            serde_json::to_string(docs)
                .map_err(|e| ActionError::collaborator(format!("serialize source docs: {}", e)))?,
        ),
        _ => None,
    };

    sqlx::query(
        r#"
        INSERT INTO messages (id, chat_id, namespace_id, owner_id, sender, content, source_docs_json, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(chat_id)
    .bind(namespace_id)
    .bind(&identity.user_id)
    .bind(sender.as_str())
    .bind(content)
    .bind(&source_docs_json)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(Message {
        id,
        chat_id: chat_id.to_string(),
        namespace_id: namespace_id.to_string(),
        owner_id: identity.user_id.clone(),
        sender,
        content: content.to_string(),
        source_docs: source_docs.filter(|d| !d.is_empty()).map(|d| d.to_vec()),
        created_at: format_ts_iso(now),
        updated_at: format_ts_iso(now),
    })
}

/// List a chat's messages in creation order.
pub async fn list_messages(
    pool: &SqlitePool,
    identity: &Identity,
    chat_id: &str,
) -> ActionResult<Vec<Message>> {
    // Scope the listing through chat ownership as well, so a foreign chat id
    // yields NotFound rather than an empty page.
    let owned: Option<String> =
        sqlx::query_scalar("SELECT id FROM chats WHERE id = ? AND owner_id = ?")
            .bind(chat_id)
            .bind(&identity.user_id)
            .fetch_optional(pool)
            .await?;
    if owned.is_none() {
        return Err(ActionError::not_found("Chat not found"));
    }

    let rows = sqlx::query(
        r#"
        SELECT id, chat_id, namespace_id, owner_id, sender, content, source_docs_json, created_at, updated_at
        FROM messages WHERE chat_id = ? AND owner_id = ?
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(chat_id)
    .bind(&identity.user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_message).collect()
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> ActionResult<Message> {
    let sender_str: String = row.get("sender");
    let sender = MessageRole::parse(&sender_str)
        .ok_or_else(|| ActionError::collaborator(format!("unknown sender role: {}", sender_str)))?;

    let source_docs_json: Option<String> = row.get("source_docs_json");
    let source_docs = match source_docs_json {
        Some(json) => Some(
            serde_json::from_str::<Vec<SourceDoc>>(&json)
                .map_err(|e| ActionError::collaborator(format!("parse source docs: {}", e)))?,
        ),
        None => None,
    };

    let created_at: i64 = row.get("created_at");
    let updated_at: i64 = row.get("updated_at");

    Ok(Message {
        id: row.get("id"),
        chat_id: row.get("chat_id"),
        namespace_id: row.get("namespace_id"),
        owner_id: row.get("owner_id"),
        sender,
        content: row.get("content"),
        source_docs,
        created_at: format_ts_iso(created_at),
        updated_at: format_ts_iso(updated_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chats::create_chat;
    use crate::models::NEW_CHAT_TITLE;
    use crate::namespaces::create_namespace;
    use crate::result::ErrorKind;

    async fn test_pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        pool
    }

    fn owner(n: u32) -> Identity {
        Identity {
            user_id: format!("user-{}", n),
            email: format!("user{}@example.com", n),
        }
    }

    async fn setup_chat(pool: &SqlitePool, identity: &Identity) -> (String, String) {
        let ns = create_namespace(pool, identity, "Docs", None).await.unwrap();
        let chat = create_chat(pool, identity, &ns.id, NEW_CHAT_TITLE)
            .await
            .unwrap();
        (ns.id, chat.id)
    }

    #[tokio::test]
    async fn messages_listed_in_creation_order() {
        let pool = test_pool().await;
        let alice = owner(1);
        let (ns_id, chat_id) = setup_chat(&pool, &alice).await;

        create_message(&pool, &alice, &chat_id, &ns_id, MessageRole::User, "Hello", None)
            .await
            .unwrap();
        create_message(
            &pool,
            &alice,
            &chat_id,
            &ns_id,
            MessageRole::Assistant,
            "Hi! How can I help?",
            None,
        )
        .await
        .unwrap();

        let messages = list_messages(&pool, &alice, &chat_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, MessageRole::User);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[1].sender, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn source_docs_roundtrip() {
        let pool = test_pool().await;
        let alice = owner(1);
        let (ns_id, chat_id) = setup_chat(&pool, &alice).await;

        let docs = vec![SourceDoc {
            text: "relevant excerpt".to_string(),
            filename: "report.pdf".to_string(),
            source: "report.pdf".to_string(),
        }];
        create_message(
            &pool,
            &alice,
            &chat_id,
            &ns_id,
            MessageRole::Assistant,
            "Grounded answer",
            Some(&docs),
        )
        .await
        .unwrap();

        let messages = list_messages(&pool, &alice, &chat_id).await.unwrap();
        assert_eq!(messages[0].source_docs.as_ref().unwrap(), &docs);
    }

    #[tokio::test]
    async fn empty_content_rejected() {
        let pool = test_pool().await;
        let alice = owner(1);
        let (ns_id, chat_id) = setup_chat(&pool, &alice).await;

        let err = create_message(&pool, &alice, &chat_id, &ns_id, MessageRole::User, "  ", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn cross_owner_chat_is_not_found() {
        let pool = test_pool().await;
        let alice = owner(1);
        let (ns_id, chat_id) = setup_chat(&pool, &alice).await;

        let mallory = owner(2);
        let err = create_message(
            &pool,
            &mallory,
            &chat_id,
            &ns_id,
            MessageRole::User,
            "hello",
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let err = list_messages(&pool, &mallory, &chat_id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
