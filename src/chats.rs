//! Chat store: owner-scoped CRUD over the `chats` table.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::auth::Identity;
use crate::models::{format_ts_iso, now_ts, Chat};
use crate::result::{ActionError, ActionResult};

pub async fn create_chat(
    pool: &SqlitePool,
    identity: &Identity,
    namespace_id: &str,
    title: &str,
) -> ActionResult<Chat> {
    // The namespace must exist and belong to the caller.
    let owned: Option<String> =
        sqlx::query_scalar("SELECT id FROM namespaces WHERE id = ? AND owner_id = ?")
            .bind(namespace_id)
            .bind(&identity.user_id)
            .fetch_optional(pool)
            .await?;
    if owned.is_none() {
        return Err(ActionError::not_found("Namespace not found"));
    }

    let id = Uuid::new_v4().to_string();
    let now = now_ts();

    sqlx::query(
        r#"
        INSERT INTO chats (id, owner_id, namespace_id, title, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&identity.user_id)
    .bind(namespace_id)
    .bind(title)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(Chat {
        id,
        owner_id: identity.user_id.clone(),
        namespace_id: namespace_id.to_string(),
        title: title.to_string(),
        created_at: format_ts_iso(now),
        updated_at: format_ts_iso(now),
    })
}

/// List the caller's chats in a namespace, most recent activity first.
pub async fn list_chats(
    pool: &SqlitePool,
    identity: &Identity,
    namespace_id: &str,
) -> ActionResult<Vec<Chat>> {
    let rows = sqlx::query(
        r#"
        SELECT id, owner_id, namespace_id, title, created_at, updated_at
        FROM chats WHERE owner_id = ? AND namespace_id = ?
        ORDER BY updated_at DESC, created_at DESC
        "#,
    )
    .bind(&identity.user_id)
    .bind(namespace_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_chat).collect())
}

pub async fn get_chat(pool: &SqlitePool, identity: &Identity, id: &str) -> ActionResult<Chat> {
    let row = sqlx::query(
        r#"
        SELECT id, owner_id, namespace_id, title, created_at, updated_at
        FROM chats WHERE id = ? AND owner_id = ?
        "#,
    )
    .bind(id)
    .bind(&identity.user_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| row_to_chat(&r))
        .ok_or_else(|| ActionError::not_found("Chat not found"))
}

/// Replace the chat title (used by title generation).
pub async fn update_chat_title(
    pool: &SqlitePool,
    identity: &Identity,
    id: &str,
    title: &str,
) -> ActionResult<Chat> {
    let result = sqlx::query("UPDATE chats SET title = ?, updated_at = ? WHERE id = ? AND owner_id = ?")
        .bind(title)
        .bind(now_ts())
        .bind(id)
        .bind(&identity.user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ActionError::not_found("Chat not found"));
    }

    get_chat(pool, identity, id).await
}

/// Bump the chat's activity timestamp (called after each message).
pub async fn touch_chat(pool: &SqlitePool, identity: &Identity, id: &str) -> ActionResult<()> {
    sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ? AND owner_id = ?")
        .bind(now_ts())
        .bind(id)
        .bind(&identity.user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_chat(pool: &SqlitePool, identity: &Identity, id: &str) -> ActionResult<()> {
    let result = sqlx::query("DELETE FROM chats WHERE id = ? AND owner_id = ?")
        .bind(id)
        .bind(&identity.user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ActionError::not_found("Chat not found"));
    }

    // Messages of the chat go with it; separate statement, not a transaction.
    sqlx::query("DELETE FROM messages WHERE chat_id = ? AND owner_id = ?")
        .bind(id)
        .bind(&identity.user_id)
        .execute(pool)
        .await?;

    Ok(())
}

fn row_to_chat(row: &sqlx::sqlite::SqliteRow) -> Chat {
    let created_at: i64 = row.get("created_at");
    let updated_at: i64 = row.get("updated_at");
    Chat {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        namespace_id: row.get("namespace_id"),
        title: row.get("title"),
        created_at: format_ts_iso(created_at),
        updated_at: format_ts_iso(updated_at),
    }
}
