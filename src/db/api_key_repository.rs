//! API key repository

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::ApiKey;

#[derive(Debug, sqlx::FromRow)]
struct ApiKeyRow {
    id: String,
    workspace_id: String,
    created_by: String,
    name: String,
    preview: String,
    scopes: String,
    last_used_at: Option<String>,
    created_at: String,
}

impl ApiKeyRow {
    fn into_api_key(self) -> Result<ApiKey> {
        Ok(ApiKey {
            id: Uuid::parse_str(&self.id).context("Invalid api key id")?,
            workspace_id: self.workspace_id,
            created_by: self.created_by,
            name: self.name,
            preview: self.preview,
            scopes: serde_json::from_str(&self.scopes).context("Invalid api key scopes")?,
            last_used_at: self.last_used_at.as_deref().map(parse_db_timestamp),
            created_at: parse_db_timestamp(&self.created_at),
        })
    }
}

const SELECT_COLUMNS: &str =
    "id, workspace_id, created_by, name, preview, scopes, last_used_at, created_at";

pub struct ApiKeyRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ApiKeyRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a new key. The hash never leaves this layer; callers get
    /// back only preview and metadata.
    pub async fn create(&self, api_key: &ApiKey, key_hash: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_keys
                (id, workspace_id, created_by, name, key_hash, preview, scopes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(api_key.id.to_string())
        .bind(&api_key.workspace_id)
        .bind(&api_key.created_by)
        .bind(&api_key.name)
        .bind(key_hash)
        .bind(&api_key.preview)
        .bind(serde_json::to_string(&api_key.scopes).context("Failed to encode scopes")?)
        .bind(api_key.created_at.to_rfc3339())
        .execute(self.pool)
        .await
        .context("Failed to create api key")?;

        Ok(())
    }

    pub async fn list_for_workspace(&self, workspace_id: &str) -> Result<Vec<ApiKey>> {
        let rows = sqlx::query_as::<_, ApiKeyRow>(&format!(
            "SELECT {} FROM api_keys WHERE workspace_id = ? ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(workspace_id)
        .fetch_all(self.pool)
        .await
        .context("Failed to list api keys")?;

        rows.into_iter().map(ApiKeyRow::into_api_key).collect()
    }

    pub async fn get_by_id(&self, workspace_id: &str, id: Uuid) -> Result<Option<ApiKey>> {
        let row = sqlx::query_as::<_, ApiKeyRow>(&format!(
            "SELECT {} FROM api_keys WHERE workspace_id = ? AND id = ?",
            SELECT_COLUMNS
        ))
        .bind(workspace_id)
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to get api key")?;

        row.map(ApiKeyRow::into_api_key).transpose()
    }

    /// Authentication lookup: match a bearer credential by its hash
    pub async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        let row = sqlx::query_as::<_, ApiKeyRow>(&format!(
            "SELECT {} FROM api_keys WHERE key_hash = ?",
            SELECT_COLUMNS
        ))
        .bind(key_hash)
        .fetch_optional(self.pool)
        .await
        .context("Failed to look up api key by hash")?;

        row.map(ApiKeyRow::into_api_key).transpose()
    }

    pub async fn delete(&self, workspace_id: &str, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_keys WHERE workspace_id = ? AND id = ?")
            .bind(workspace_id)
            .bind(id.to_string())
            .execute(self.pool)
            .await
            .context("Failed to delete api key")?;

        Ok(result.rows_affected() > 0)
    }

    /// Record key usage; dispatched from a detached task, so failures are
    /// the caller's to log
    pub async fn touch_last_used(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(self.pool)
            .await
            .context("Failed to update api key last_used_at")?;

        Ok(())
    }
}

fn parse_db_timestamp(ts: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S") {
        return DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc);
    }
    Utc::now()
}
