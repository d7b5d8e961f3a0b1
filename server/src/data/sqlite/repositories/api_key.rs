//! API key repository for SQLite operations
//!
//! Keys are opaque 64-character strings handed to span producers; the
//! internal auth gRPC service validates them by exact match.

use rand::Rng;
use rand::distributions::Alphanumeric;
use sqlx::SqlitePool;

use crate::core::constants::API_KEY_LENGTH;
use crate::data::sqlite::SqliteError;

/// A stored API key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyRow {
    pub id: String,
    pub key: String,
    pub name: String,
    pub created_at: i64,
}

/// Generate a new opaque API key
fn generate_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_LENGTH)
        .map(char::from)
        .collect()
}

/// Create a new API key with a freshly generated secret
pub async fn create_api_key(pool: &SqlitePool, name: &str) -> Result<ApiKeyRow, SqliteError> {
    let id = cuid2::create_id();
    let key = generate_key();
    let now = chrono::Utc::now().timestamp();

    sqlx::query("INSERT INTO api_keys (id, key, name, created_at) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(&key)
        .bind(name)
        .bind(now)
        .execute(pool)
        .await?;

    Ok(ApiKeyRow {
        id,
        key,
        name: name.to_string(),
        created_at: now,
    })
}

/// Look up an API key by its exact secret value
pub async fn get_by_key(pool: &SqlitePool, key: &str) -> Result<Option<ApiKeyRow>, SqliteError> {
    let row: Option<(String, String, String, i64)> =
        sqlx::query_as("SELECT id, key, name, created_at FROM api_keys WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(id, key, name, created_at)| ApiKeyRow {
        id,
        key,
        name,
        created_at,
    }))
}

/// List all API keys (newest first)
pub async fn list_api_keys(pool: &SqlitePool) -> Result<Vec<ApiKeyRow>, SqliteError> {
    let rows: Vec<(String, String, String, i64)> = sqlx::query_as(
        "SELECT id, key, name, created_at FROM api_keys ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, key, name, created_at)| ApiKeyRow {
            id,
            key,
            name,
            created_at,
        })
        .collect())
}

/// Delete an API key by ID
pub async fn delete_api_key(pool: &SqlitePool, id: &str) -> Result<bool, SqliteError> {
    let result = sqlx::query("DELETE FROM api_keys WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
