use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{Location, PurifierId, PurifierRecord};

pub const MEMORY_DATABASE_URL: &str = "sqlite::memory:";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // An in-memory database lives only as long as its connection.
        let pool_options = if database_url.starts_with(MEMORY_DATABASE_URL) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Raw payload held in a named slot, if one was ever written.
    pub async fn read_slot(&self, slot: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT payload FROM snapshot_slots WHERE slot = ?")
            .bind(slot)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read snapshot slot '{slot}'"))?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    pub async fn write_slot(&self, slot: &str, payload: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO snapshot_slots (slot, payload, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(slot) DO UPDATE SET payload=excluded.payload, updated_at=excluded.updated_at",
        )
        .bind(slot)
        .bind(payload)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write snapshot slot '{slot}'"))?;
        Ok(())
    }

    pub async fn list_purifiers(&self) -> Result<Vec<PurifierRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, location_json, status, last_updated
             FROM purifiers
             ORDER BY position ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(purifier_from_row).collect()
    }

    pub async fn get_purifier(&self, id: &PurifierId) -> Result<Option<PurifierRecord>> {
        let row = sqlx::query(
            "SELECT id, name, location_json, status, last_updated FROM purifiers WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(purifier_from_row).transpose()
    }

    /// Inserts at the end, or overwrites in place when the id already exists.
    pub async fn upsert_purifier(&self, record: &PurifierRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO purifiers (id, name, location_json, status, last_updated)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name=excluded.name,
                location_json=excluded.location_json,
                status=excluded.status,
                last_updated=excluded.last_updated",
        )
        .bind(record.id.as_str())
        .bind(&record.name)
        .bind(location_json(&record.location)?)
        .bind(record.status)
        .bind(record.last_updated)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to upsert purifier {}", record.id))?;
        Ok(())
    }

    /// Returns false when no row carries `record.id`.
    pub async fn replace_purifier(&self, record: &PurifierRecord) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE purifiers
             SET name = ?, location_json = ?, status = ?, last_updated = ?
             WHERE id = ?",
        )
        .bind(&record.name)
        .bind(location_json(&record.location)?)
        .bind(record.status)
        .bind(record.last_updated)
        .bind(record.id.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to replace purifier {}", record.id))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_purifier_status(
        &self,
        id: &PurifierId,
        status: bool,
        last_updated: DateTime<Utc>,
    ) -> Result<Option<PurifierRecord>> {
        let row = sqlx::query(
            "UPDATE purifiers SET status = ?, last_updated = ?
             WHERE id = ?
             RETURNING id, name, location_json, status, last_updated",
        )
        .bind(status)
        .bind(last_updated)
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to set status of purifier {id}"))?;
        row.as_ref().map(purifier_from_row).transpose()
    }

    pub async fn delete_purifier(&self, id: &PurifierId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM purifiers WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn location_json(location: &Location) -> Result<String> {
    serde_json::to_string(location).context("failed to encode purifier location")
}

fn purifier_from_row(row: &SqliteRow) -> Result<PurifierRecord> {
    let raw_id: String = row.try_get("id")?;
    let id = PurifierId::parse(&raw_id)
        .with_context(|| format!("stored purifier id '{raw_id}' is malformed"))?;
    let location_json: String = row.try_get("location_json")?;
    let location = serde_json::from_str(&location_json)
        .with_context(|| format!("stored location of purifier {id} is malformed"))?;
    Ok(PurifierRecord {
        id,
        name: row.try_get("name")?,
        location,
        status: row.try_get("status")?,
        last_updated: row.try_get("last_updated")?,
    })
}

/// Accepts plain file paths as well as `sqlite:` URLs.
pub fn normalize_database_url(raw_database_url: &str, fallback: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return fallback.to_string();
    }

    if raw_database_url.starts_with(MEMORY_DATABASE_URL)
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == MEMORY_DATABASE_URL || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
