//! Posts: a small CRUD blog stored in SQLite.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub published: bool,
    pub created_at: String, // ISO8601
}

/// Body of a create or update request.
#[derive(Debug, Clone, Deserialize)]
pub struct PostInput {
    #[serde(default = "default_title")]
    pub title: String,
    pub content: String,
    #[serde(default = "default_published")]
    pub published: bool,
}

fn default_title() -> String {
    "Jane Doe".to_string()
}

fn default_published() -> bool {
    true
}

impl PostInput {
    pub fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            bail!("content must not be empty");
        }
        Ok(())
    }
}

const COLUMNS: &str = "id, title, content, published, created_at";

fn from_row(row: &SqliteRow) -> Post {
    Post {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        published: row.get("published"),
        created_at: format_ts_iso(row.get("created_at")),
    }
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<Post>> {
    let rows = sqlx::query(&format!("SELECT {} FROM posts ORDER BY id ASC", COLUMNS))
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(from_row).collect())
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<Post>> {
    let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(from_row))
}

pub async fn create(pool: &SqlitePool, input: &PostInput) -> Result<Post> {
    input.validate()?;
    let row = sqlx::query(&format!(
        "INSERT INTO posts (title, content, published, created_at) VALUES (?, ?, ?, ?) RETURNING {}",
        COLUMNS
    ))
    .bind(&input.title)
    .bind(&input.content)
    .bind(input.published)
    .bind(chrono::Utc::now().timestamp())
    .fetch_one(pool)
    .await?;
    Ok(from_row(&row))
}

/// Replace a post's fields. `None` when no post has `id`.
pub async fn update(pool: &SqlitePool, id: i64, input: &PostInput) -> Result<Option<Post>> {
    input.validate()?;
    let row = sqlx::query(&format!(
        "UPDATE posts SET title = ?, content = ?, published = ? WHERE id = ? RETURNING {}",
        COLUMNS
    ))
    .bind(&input.title)
    .bind(&input.content)
    .bind(input.published)
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(from_row))
}

/// Returns whether a post was deleted.
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}
