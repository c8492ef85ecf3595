//! Login rate limiting backed by the shared store.
//!
//! Counters live in the `login_attempts` table rather than process memory,
//! so lockout state survives restarts and is shared across instances. The
//! limiter is constructed once and injected into the auth layer.

use sqlx::SqlitePool;

use crate::models::now_ts;
use crate::result::{ActionError, ActionResult};

const MAX_ATTEMPTS: i64 = 5;
const LOCKOUT_SECS: i64 = 15 * 60;

#[derive(Clone)]
pub struct RateLimiter {
    pool: SqlitePool,
}

impl RateLimiter {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fails with the minutes remaining when the key has exhausted its
    /// attempts inside the lockout window. Expired windows are reset.
    pub async fn check(&self, key: &str) -> ActionResult<()> {
        let row: Option<(i64, i64)> =
            sqlx::query_as("SELECT count, last_attempt FROM login_attempts WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        let (count, last_attempt) = match row {
            Some(r) => r,
            None => return Ok(()),
        };

        let now = now_ts();
        if now - last_attempt > LOCKOUT_SECS {
            self.clear(key).await?;
            return Ok(());
        }

        if count >= MAX_ATTEMPTS {
            let minutes_left = (LOCKOUT_SECS - (now - last_attempt) + 59) / 60;
            return Err(ActionError::unauthorized(format!(
                "Too many attempts. Please try again in {} minutes",
                minutes_left.max(1)
            )));
        }

        Ok(())
    }

    /// Record one failed attempt for the key.
    pub async fn record_failure(&self, key: &str) -> ActionResult<()> {
        let now = now_ts();
        sqlx::query(
            r#"
            INSERT INTO login_attempts (key, count, last_attempt) VALUES (?, 1, ?)
            ON CONFLICT(key) DO UPDATE SET count = count + 1, last_attempt = excluded.last_attempt
            "#,
        )
        .bind(key)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Forget the key (successful login or expired window).
    pub async fn clear(&self, key: &str) -> ActionResult<()> {
        sqlx::query("DELETE FROM login_attempts WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[tokio::test]
    async fn allows_until_limit_reached() {
        let limiter = RateLimiter::new(test_pool().await);
        for _ in 0..4 {
            limiter.record_failure("a@example.com").await.unwrap();
            limiter.check("a@example.com").await.unwrap();
        }
        limiter.record_failure("a@example.com").await.unwrap();

        let err = limiter.check("a@example.com").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
        assert!(err.message.contains("Too many attempts"));
    }

    #[tokio::test]
    async fn clear_resets_the_counter() {
        let limiter = RateLimiter::new(test_pool().await);
        for _ in 0..5 {
            limiter.record_failure("b@example.com").await.unwrap();
        }
        assert!(limiter.check("b@example.com").await.is_err());

        limiter.clear("b@example.com").await.unwrap();
        assert!(limiter.check("b@example.com").await.is_ok());
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = RateLimiter::new(test_pool().await);
        for _ in 0..5 {
            limiter.record_failure("locked@example.com").await.unwrap();
        }
        assert!(limiter.check("locked@example.com").await.is_err());
        assert!(limiter.check("other@example.com").await.is_ok());
    }
}
