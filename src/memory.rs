//! Agent memory: conversations that replay their full history to the model.
//!
//! Unlike RAG chats there is no retrieval step — memory is the conversation
//! itself. Every turn sends the entire message history to the completion
//! collaborator. Conversations and messages are owner-scoped like every other
//! store.

use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::auth::Identity;
use crate::completion::{ChatMessage, Completer};
use crate::models::{format_ts_iso, now_ts, MessageRole};
use crate::result::{ActionError, ActionResult};

/// Placeholder title for a fresh conversation.
pub const NEW_CONVERSATION_TITLE: &str = "New Conversation";

#[derive(Debug, Clone, Serialize)]
pub struct MemoryConversation {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub last_message_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: String,
}

/// One exchange: the stored user message and the assistant reply.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryExchange {
    pub user_message: MemoryMessage,
    pub assistant_message: MemoryMessage,
}

pub async fn create_conversation(
    pool: &SqlitePool,
    identity: &Identity,
) -> ActionResult<MemoryConversation> {
    let id = Uuid::new_v4().to_string();
    let now = now_ts();

    sqlx::query(
        r#"
        INSERT INTO memory_conversations (id, owner_id, title, last_message_at, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&identity.user_id)
    .bind(NEW_CONVERSATION_TITLE)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(MemoryConversation {
        id,
        owner_id: identity.user_id.clone(),
        title: NEW_CONVERSATION_TITLE.to_string(),
        last_message_at: format_ts_iso(now),
        created_at: format_ts_iso(now),
    })
}

/// List the caller's conversations, most recent activity first.
pub async fn list_conversations(
    pool: &SqlitePool,
    identity: &Identity,
) -> ActionResult<Vec<MemoryConversation>> {
    let rows = sqlx::query(
        r#"
        SELECT id, owner_id, title, last_message_at, created_at
        FROM memory_conversations WHERE owner_id = ?
        ORDER BY last_message_at DESC, created_at DESC
        "#,
    )
    .bind(&identity.user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_conversation).collect())
}

async fn get_owned_conversation(
    pool: &SqlitePool,
    identity: &Identity,
    id: &str,
) -> ActionResult<MemoryConversation> {
    if Uuid::parse_str(id).is_err() {
        return Err(ActionError::validation("Invalid conversation ID format"));
    }

    let row = sqlx::query(
        r#"
        SELECT id, owner_id, title, last_message_at, created_at
        FROM memory_conversations WHERE id = ? AND owner_id = ?
        "#,
    )
    .bind(id)
    .bind(&identity.user_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| row_to_conversation(&r))
        .ok_or_else(|| ActionError::not_found("Conversation not found"))
}

/// Fetch a conversation's messages in creation order.
pub async fn get_messages(
    pool: &SqlitePool,
    identity: &Identity,
    conversation_id: &str,
) -> ActionResult<Vec<MemoryMessage>> {
    get_owned_conversation(pool, identity, conversation_id).await?;

    let rows = sqlx::query(
        r#"
        SELECT id, conversation_id, role, content, created_at
        FROM memory_messages WHERE conversation_id = ?
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_message).collect()
}

pub async fn delete_conversation(
    pool: &SqlitePool,
    identity: &Identity,
    conversation_id: &str,
) -> ActionResult<()> {
    let conversation = get_owned_conversation(pool, identity, conversation_id).await?;

    sqlx::query("DELETE FROM memory_messages WHERE conversation_id = ?")
        .bind(&conversation.id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM memory_conversations WHERE id = ? AND owner_id = ?")
        .bind(&conversation.id)
        .bind(&identity.user_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Append a user turn, complete over the whole history, and store the reply.
/// After the first exchange the conversation is titled, best-effort.
pub async fn send_prompt(
    pool: &SqlitePool,
    completer: &dyn Completer,
    identity: &Identity,
    conversation_id: &str,
    content: &str,
) -> ActionResult<MemoryExchange> {
    if content.trim().is_empty() {
        return Err(ActionError::validation("Message content is required"));
    }

    let conversation = get_owned_conversation(pool, identity, conversation_id).await?;
    let prior = get_messages(pool, identity, &conversation.id).await?;

    let user_message = insert_message(pool, &conversation.id, MessageRole::User, content).await?;

    // Full-history replay: system prompt, then every turn so far
    let mut prompt = vec![ChatMessage::system("You are a helpful assistant.")];
    for m in &prior {
        prompt.push(match m.role {
            MessageRole::User => ChatMessage::user(&m.content),
            MessageRole::Assistant => ChatMessage::assistant(&m.content),
        });
    }
    prompt.push(ChatMessage::user(content));

    let reply = completer
        .complete(&prompt)
        .await
        .map_err(|e| ActionError::collaborator(format!("completion failed: {}", e)))?;

    let assistant_message =
        insert_message(pool, &conversation.id, MessageRole::Assistant, &reply).await?;

    sqlx::query("UPDATE memory_conversations SET last_message_at = ? WHERE id = ?")
        .bind(now_ts())
        .bind(&conversation.id)
        .execute(pool)
        .await?;

    // First exchange — title the conversation, non-fatally
    if prior.is_empty() {
        if let Err(e) =
            generate_conversation_title(pool, completer, identity, &conversation.id).await
        {
            eprintln!(
                "title generation failed for conversation {}: {}",
                conversation.id, e
            );
        }
    }

    Ok(MemoryExchange {
        user_message,
        assistant_message,
    })
}

/// Ask for a <= 6-word title over the whole conversation and store it.
pub async fn generate_conversation_title(
    pool: &SqlitePool,
    completer: &dyn Completer,
    identity: &Identity,
    conversation_id: &str,
) -> ActionResult<String> {
    let history = get_messages(pool, identity, conversation_id).await?;
    if history.is_empty() {
        return Err(ActionError::validation("No messages to generate title from"));
    }

    let mut prompt = vec![ChatMessage::system(
        "You are a helpful assistant that generates short, descriptive titles for \
         conversations. Generate a concise title (max 6 words) that captures the main \
         topic or theme of this conversation. Respond with just the title, nothing else.",
    )];
    for m in &history {
        prompt.push(match m.role {
            MessageRole::User => ChatMessage::user(&m.content),
            MessageRole::Assistant => ChatMessage::assistant(&m.content),
        });
    }

    let title = completer
        .complete(&prompt)
        .await
        .map_err(|e| ActionError::collaborator(format!("title generation failed: {}", e)))?;
    let title = title.trim().to_string();
    if title.is_empty() {
        return Err(ActionError::collaborator("empty title generated"));
    }

    sqlx::query("UPDATE memory_conversations SET title = ? WHERE id = ? AND owner_id = ?")
        .bind(&title)
        .bind(conversation_id)
        .bind(&identity.user_id)
        .execute(pool)
        .await?;

    Ok(title)
}

async fn insert_message(
    pool: &SqlitePool,
    conversation_id: &str,
    role: MessageRole,
    content: &str,
) -> ActionResult<MemoryMessage> {
    let id = Uuid::new_v4().to_string();
    let now = now_ts();

    sqlx::query(
        r#"
        INSERT INTO memory_messages (id, conversation_id, role, content, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(conversation_id)
    .bind(role.as_str())
    .bind(content)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(MemoryMessage {
        id,
        conversation_id: conversation_id.to_string(),
        role,
        content: content.to_string(),
        created_at: format_ts_iso(now),
    })
}

fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> MemoryConversation {
    let last_message_at: i64 = row.get("last_message_at");
    let created_at: i64 = row.get("created_at");
    MemoryConversation {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        title: row.get("title"),
        last_message_at: format_ts_iso(last_message_at),
        created_at: format_ts_iso(created_at),
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> ActionResult<MemoryMessage> {
    let role_str: String = row.get("role");
    let role = MessageRole::parse(&role_str)
        .ok_or_else(|| ActionError::collaborator(format!("unknown role: {}", role_str)))?;
    let created_at: i64 = row.get("created_at");
    Ok(MemoryMessage {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        role,
        content: row.get("content"),
        created_at: format_ts_iso(created_at),
    })
}
