//! Authentication and identity resolution.
//!
//! Registration validates email shape and password strength, then stores a
//! salted PBKDF2-HMAC-SHA256 hash. Login is guarded by the injected
//! [`RateLimiter`](crate::ratelimit::RateLimiter) and issues a bearer token
//! `user_id.expiry.signature` signed with HMAC-SHA256 (`hmac` + `sha2`).
//! Every store operation requires a resolved [`Identity`].

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::models::now_ts;
use crate::ratelimit::RateLimiter;
use crate::result::{ActionError, ActionResult};

type HmacSha256 = Hmac<Sha256>;

const PBKDF2_ITERATIONS: u32 = 100_000;

/// The authenticated owner of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
}

/// Issued on successful login.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub expires_at: i64,
}

/// Register a new user. Returns the new user id.
pub async fn register(
    pool: &SqlitePool,
    email: &str,
    password: &str,
    name: &str,
) -> ActionResult<String> {
    if email.is_empty() || password.is_empty() || name.is_empty() {
        return Err(ActionError::validation("All fields are required"));
    }
    if !is_valid_email(email) {
        return Err(ActionError::validation("Invalid email format"));
    }
    if let Err(message) = check_password_strength(password) {
        return Err(ActionError::validation(message));
    }

    let existing: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Err(ActionError::validation("Email already exists"));
    }

    let id = Uuid::new_v4().to_string();
    let password_hash = hash_password(password);

    sqlx::query(
        "INSERT INTO users (id, email, name, password_hash, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(email)
    .bind(name)
    .bind(&password_hash)
    .bind(now_ts())
    .execute(pool)
    .await?;

    Ok(id)
}

/// Verify credentials and issue a signed session token. Failed attempts feed
/// the rate limiter; success clears it.
pub async fn login(
    pool: &SqlitePool,
    limiter: &RateLimiter,
    auth: &AuthConfig,
    email: &str,
    password: &str,
) -> ActionResult<Session> {
    if email.is_empty() || password.is_empty() {
        return Err(ActionError::validation("Missing credentials"));
    }

    limiter.check(email).await?;

    let row: Option<(String, String, String)> =
        sqlx::query_as("SELECT id, name, password_hash FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(pool)
            .await?;

    let (user_id, name, password_hash) = match row {
        Some(r) => r,
        None => {
            limiter.record_failure(email).await?;
            return Err(ActionError::unauthorized("Invalid email or password"));
        }
    };

    if !verify_password(password, &password_hash) {
        limiter.record_failure(email).await?;
        return Err(ActionError::unauthorized("Invalid email or password"));
    }

    limiter.clear(email).await?;

    let expires_at = now_ts() + auth.token_ttl_secs;
    let token = issue_token(&auth.token_secret, &user_id, expires_at);

    Ok(Session {
        token,
        user_id,
        email: email.to_string(),
        name,
        expires_at,
    })
}

/// Resolve the request's identity from an `Authorization: Bearer` header
/// value. Fails with Unauthorized for missing, malformed, tampered, or
/// expired tokens.
pub async fn resolve_identity(
    pool: &SqlitePool,
    auth: &AuthConfig,
    authorization: Option<&str>,
) -> ActionResult<Identity> {
    let header = authorization.ok_or_else(|| ActionError::unauthorized("Not signed in"))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ActionError::unauthorized("Malformed authorization header"))?;

    let user_id = verify_token(&auth.token_secret, token)
        .ok_or_else(|| ActionError::unauthorized("Invalid or expired session"))?;

    let email: Option<String> = sqlx::query_scalar("SELECT email FROM users WHERE id = ?")
        .bind(&user_id)
        .fetch_optional(pool)
        .await?;

    match email {
        Some(email) => Ok(Identity { user_id, email }),
        None => Err(ActionError::unauthorized("Unknown user")),
    }
}

/// Token layout: `user_id.expiry.hex(hmac(secret, "user_id.expiry"))`.
pub fn issue_token(secret: &str, user_id: &str, expires_at: i64) -> String {
    let payload = format!("{}.{}", user_id, expires_at);
    let signature = hex::encode(hmac_sha256(secret.as_bytes(), payload.as_bytes()));
    format!("{}.{}", payload, signature)
}

/// Returns the user id when the signature matches and the token has not
/// expired.
pub fn verify_token(secret: &str, token: &str) -> Option<String> {
    let mut parts = token.rsplitn(2, '.');
    let signature_hex = parts.next()?;
    let payload = parts.next()?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(payload.as_bytes());
    let signature = hex::decode(signature_hex).ok()?;
    mac.verify_slice(&signature).ok()?;

    let (user_id, expiry_str) = payload.rsplit_once('.')?;
    let expires_at: i64 = expiry_str.parse().ok()?;
    if expires_at <= now_ts() {
        return None;
    }

    Some(user_id.to_string())
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
        && !domain.contains('@')
}

fn check_password_strength(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters long");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one number");
    }
    if password.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("Password must contain at least one special character");
    }
    Ok(())
}

/// Stored form: `pbkdf2$<iterations>$<salt_hex>$<hash_hex>`.
fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4();
    let salt_bytes = salt.as_bytes();
    let derived = pbkdf2_sha256(password.as_bytes(), salt_bytes, PBKDF2_ITERATIONS);
    format!(
        "pbkdf2${}${}${}",
        PBKDF2_ITERATIONS,
        hex::encode(salt_bytes),
        hex::encode(derived)
    )
}

fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some("pbkdf2"), Some(iter_str), Some(salt_hex), Some(hash_hex)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let Ok(iterations) = iter_str.parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(hash_hex)) else {
        return false;
    };
    pbkdf2_sha256(password.as_bytes(), &salt, iterations) == expected
}

/// Single-block PBKDF2 with HMAC-SHA256 (32-byte output).
fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
    let mut block = Vec::with_capacity(salt.len() + 4);
    block.extend_from_slice(salt);
    block.extend_from_slice(&1u32.to_be_bytes());

    let mut u = hmac_sha256(password, &block);
    let mut output = u.clone();
    for _ in 1..iterations {
        u = hmac_sha256(password, &u);
        for (o, b) in output.iter_mut().zip(u.iter()) {
            *o ^= b;
        }
    }
    output
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
