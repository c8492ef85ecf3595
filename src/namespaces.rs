//! Namespace store: owner-scoped CRUD over the `namespaces` table.
//!
//! A namespace is the isolation boundary for one owner's uploaded documents
//! and chats. Deletion cascades to chats, messages, and vectors as separate
//! best-effort operations — not transactionally (a partial failure can leave
//! orphans; known limitation).

use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::auth::Identity;
use crate::models::{format_ts_iso, now_ts, Namespace};
use crate::result::{ActionError, ActionResult};
use crate::vector::VectorIndex;

pub async fn create_namespace(
    pool: &SqlitePool,
    identity: &Identity,
    name: &str,
    description: Option<&str>,
) -> ActionResult<Namespace> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ActionError::validation("Namespace name is required"));
    }

    let id = Uuid::new_v4().to_string();
    let now = now_ts();

    sqlx::query(
        r#"
        INSERT INTO namespaces (id, owner_id, name, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&identity.user_id)
    .bind(name)
    .bind(description)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(Namespace {
        id,
        owner_id: identity.user_id.clone(),
        name: name.to_string(),
        description: description.map(|d| d.to_string()),
        created_at: format_ts_iso(now),
        updated_at: format_ts_iso(now),
    })
}

/// List the caller's namespaces, most recently created first.
pub async fn list_namespaces(
    pool: &SqlitePool,
    identity: &Identity,
) -> ActionResult<Vec<Namespace>> {
    let rows = sqlx::query(
        r#"
        SELECT id, owner_id, name, description, created_at, updated_at
        FROM namespaces WHERE owner_id = ? ORDER BY created_at DESC
        "#,
    )
    .bind(&identity.user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_namespace).collect())
}

/// Fetch one namespace. A namespace owned by someone else is reported as
/// absent, never returned.
pub async fn get_namespace(
    pool: &SqlitePool,
    identity: &Identity,
    id: &str,
) -> ActionResult<Namespace> {
    let row = sqlx::query(
        r#"
        SELECT id, owner_id, name, description, created_at, updated_at
        FROM namespaces WHERE id = ? AND owner_id = ?
        "#,
    )
    .bind(id)
    .bind(&identity.user_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| row_to_namespace(&r))
        .ok_or_else(|| ActionError::not_found("Namespace not found"))
}

/// Counts reported back from a namespace purge.
#[derive(Debug, Clone, Serialize)]
pub struct NamespacePurge {
    pub namespace_id: String,
    pub chats_deleted: u64,
    pub messages_deleted: u64,
    pub vectors_deleted: bool,
}

/// Delete a namespace along with its vectors, messages, and chats. Each
/// deletion is a separate operation; a failure partway leaves the remainder
/// in place.
pub async fn delete_namespace(
    pool: &SqlitePool,
    index: &dyn VectorIndex,
    identity: &Identity,
    id: &str,
) -> ActionResult<NamespacePurge> {
    // Ownership check up front so an unowned id never touches the index.
    get_namespace(pool, identity, id).await?;

    index
        .delete_namespace(id)
        .await
        .map_err(|e| ActionError::collaborator(format!("vector delete failed: {}", e)))?;

    let messages = sqlx::query("DELETE FROM messages WHERE namespace_id = ? AND owner_id = ?")
        .bind(id)
        .bind(&identity.user_id)
        .execute(pool)
        .await?
        .rows_affected();

    let chats = sqlx::query("DELETE FROM chats WHERE namespace_id = ? AND owner_id = ?")
        .bind(id)
        .bind(&identity.user_id)
        .execute(pool)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM namespaces WHERE id = ? AND owner_id = ?")
        .bind(id)
        .bind(&identity.user_id)
        .execute(pool)
        .await?;

    Ok(NamespacePurge {
        namespace_id: id.to_string(),
        chats_deleted: chats,
        messages_deleted: messages,
        vectors_deleted: true,
    })
}

fn row_to_namespace(row: &sqlx::sqlite::SqliteRow) -> Namespace {
    let created_at: i64 = row.get("created_at");
    let updated_at: i64 = row.get("updated_at");
    Namespace {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        name: row.get("name"),
        description: row.get("description"),
        created_at: format_ts_iso(created_at),
        updated_at: format_ts_iso(updated_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ErrorKind;
    use crate::vector::MemoryVectorIndex;

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

    #[tokio::test]
    async fn create_and_get() {
        let pool = test_pool().await;
        let alice = owner(1);
        let ns = create_namespace(&pool, &alice, "Docs", Some("work notes"))
            .await
            .unwrap();
        let fetched = get_namespace(&pool, &alice, &ns.id).await.unwrap();
        assert_eq!(fetched.name, "Docs");
        assert_eq!(fetched.description.as_deref(), Some("work notes"));
    }

    #[tokio::test]
    async fn empty_name_rejected() {
        let pool = test_pool().await;
        let err = create_namespace(&pool, &owner(1), "  ", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn cross_owner_access_reports_not_found() {
        let pool = test_pool().await;
        let ns = create_namespace(&pool, &owner(1), "Docs", None)
            .await
            .unwrap();

        let err = get_namespace(&pool, &owner(2), &ns.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let index = MemoryVectorIndex::new();
        let err = delete_namespace(&pool, &index, &owner(2), &ns.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        // still present for the real owner
        assert!(get_namespace(&pool, &owner(1), &ns.id).await.is_ok());
    }

    #[tokio::test]
    async fn list_is_owner_scoped_and_recent_first() {
        let pool = test_pool().await;
        let alice = owner(1);
        create_namespace(&pool, &alice, "First", None).await.unwrap();
        create_namespace(&pool, &alice, "Second", None)
            .await
            .unwrap();
        create_namespace(&pool, &owner(2), "Other", None)
            .await
            .unwrap();

        let list = list_namespaces(&pool, &alice).await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|n| n.owner_id == alice.user_id));
    }

    #[tokio::test]
    async fn delete_removes_namespace_row() {
        let pool = test_pool().await;
        let alice = owner(1);
        let index = MemoryVectorIndex::new();
        let ns = create_namespace(&pool, &alice, "Docs", None).await.unwrap();

        let purge = delete_namespace(&pool, &index, &alice, &ns.id)
            .await
            .unwrap();
        assert_eq!(purge.namespace_id, ns.id);
        assert!(purge.vectors_deleted);

        let err = get_namespace(&pool, &alice, &ns.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
