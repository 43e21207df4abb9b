//! Row-level CRUD for the `memories` table, across both backends.

use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::error::Result;
use crate::types::Memory;

use super::{Storage, Transaction};

/// Filters shared by recall, keyword fallback, and auto-link candidate
/// selection.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub instance_id: Option<String>,
    pub project: Option<String>,
    pub memory_type: Option<String>,
    pub subject: Option<String>,
    pub min_importance: Option<i32>,
    pub include_archived: bool,
    pub exclude_id: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct PgMemoryRow {
    id: i64,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    instance_id: String,
    project: String,
    memory_type: String,
    subject: Option<String>,
    content: String,
    keywords: Vec<String>,
    tags: Vec<String>,
    importance: i32,
    source_type: Option<String>,
    source_context: Option<String>,
    source_session_id: Option<String>,
    #[sqlx(try_from = "Option<pgvector::Vector>")]
    embedding: Option<Vec<f32>>,
    last_accessed_at: Option<DateTime<Utc>>,
    access_count: i32,
    expires_at: Option<DateTime<Utc>>,
    is_archived: bool,
}

impl From<PgMemoryRow> for Memory {
    fn from(r: PgMemoryRow) -> Self {
        Memory {
            id: r.id,
            created_at: r.created_at,
            updated_at: r.updated_at,
            instance_id: r.instance_id,
            project: r.project,
            memory_type: r.memory_type,
            subject: r.subject,
            content: r.content,
            keywords: r.keywords,
            tags: r.tags,
            importance: r.importance,
            source_type: r.source_type,
            source_context: r.source_context,
            source_session_id: r.source_session_id,
            embedding: r.embedding,
            last_accessed_at: r.last_accessed_at,
            access_count: r.access_count,
            expires_at: r.expires_at,
            is_archived: r.is_archived,
        }
    }
}

fn sqlite_row_to_memory(row: &sqlx::sqlite::SqliteRow) -> Memory {
    let keywords: String = row.get("keywords");
    let tags: String = row.get("tags");
    let embedding: Option<String> = row.get("embedding");
    Memory {
        id: row.get("id"),
        created_at: parse_ts(row.get("created_at")),
        updated_at: row
            .get::<Option<String>, _>("updated_at")
            .map(|s| parse_ts(&s)),
        instance_id: row.get("instance_id"),
        project: row.get("project"),
        memory_type: row.get("memory_type"),
        subject: row.get("subject"),
        content: row.get("content"),
        keywords: serde_json::from_str(&keywords).unwrap_or_default(),
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        importance: row.get("importance"),
        source_type: row.get("source_type"),
        source_context: row.get("source_context"),
        source_session_id: row.get("source_session_id"),
        embedding: embedding.and_then(|s| serde_json::from_str(&s).ok()),
        last_accessed_at: row
            .get::<Option<String>, _>("last_accessed_at")
            .map(|s| parse_ts(&s)),
        access_count: row.get("access_count"),
        expires_at: row
            .get::<Option<String>, _>("expires_at")
            .map(|s| parse_ts(&s)),
        is_archived: row.get::<i64, _>("is_archived") != 0,
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Insert a new memory row (without an embedding — `remember` commits the
/// row first and attempts embedding in a second step). Returns the new id.
pub async fn insert(storage: &Storage, memory: &Memory) -> Result<i64> {
    match storage {
        Storage::Postgres(pool) => {
            let row = sqlx::query(
                r#"INSERT INTO memories
                    (instance_id, project, memory_type, subject, content, keywords, tags,
                     importance, source_type, source_context, source_session_id)
                   VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
                   RETURNING id"#,
            )
            .bind(&memory.instance_id)
            .bind(&memory.project)
            .bind(&memory.memory_type)
            .bind(&memory.subject)
            .bind(&memory.content)
            .bind(&memory.keywords)
            .bind(&memory.tags)
            .bind(memory.importance)
            .bind(&memory.source_type)
            .bind(&memory.source_context)
            .bind(&memory.source_session_id)
            .fetch_one(pool)
            .await?;
            Ok(row.get("id"))
        }
        Storage::Sqlite(pool) => {
            let keywords = serde_json::to_string(&memory.keywords)?;
            let tags = serde_json::to_string(&memory.tags)?;
            let now = Utc::now().to_rfc3339();
            let result = sqlx::query(
                r#"INSERT INTO memories
                    (created_at, instance_id, project, memory_type, subject, content, keywords,
                     tags, importance, source_type, source_context, source_session_id)
                   VALUES (?,?,?,?,?,?,?,?,?,?,?,?)"#,
            )
            .bind(&now)
            .bind(&memory.instance_id)
            .bind(&memory.project)
            .bind(&memory.memory_type)
            .bind(&memory.subject)
            .bind(&memory.content)
            .bind(&keywords)
            .bind(&tags)
            .bind(memory.importance)
            .bind(&memory.source_type)
            .bind(&memory.source_context)
            .bind(&memory.source_session_id)
            .execute(pool)
            .await?;
            Ok(result.last_insert_rowid())
        }
    }
}

pub async fn set_embedding(storage: &Storage, id: i64, embedding: &[f32]) -> Result<()> {
    match storage {
        Storage::Postgres(pool) => {
            let vector = pgvector::Vector::from(embedding.to_vec());
            sqlx::query("UPDATE memories SET embedding = $1 WHERE id = $2")
                .bind(vector)
                .bind(id)
                .execute(pool)
                .await?;
        }
        Storage::Sqlite(pool) => {
            let json = serde_json::to_string(embedding)?;
            sqlx::query("UPDATE memories SET embedding = ? WHERE id = ?")
                .bind(json)
                .bind(id)
                .execute(pool)
                .await?;
        }
    }
    Ok(())
}

pub async fn get_by_id(storage: &Storage, id: i64) -> Result<Option<Memory>> {
    match storage {
        Storage::Postgres(pool) => {
            let row: Option<PgMemoryRow> =
                sqlx::query_as("SELECT * FROM memories WHERE id = $1")
                    .bind(id)
                    .fetch_optional(pool)
                    .await?;
            Ok(row.map(Memory::from))
        }
        Storage::Sqlite(pool) => {
            let row = sqlx::query("SELECT * FROM memories WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await?;
            Ok(row.map(|r| sqlite_row_to_memory(&r)))
        }
    }
}

pub async fn get_by_ids(storage: &Storage, ids: &[i64]) -> Result<Vec<Memory>> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    match storage {
        Storage::Postgres(pool) => {
            let rows: Vec<PgMemoryRow> =
                sqlx::query_as("SELECT * FROM memories WHERE id = ANY($1)")
                    .bind(ids)
                    .fetch_all(pool)
                    .await?;
            Ok(rows.into_iter().map(Memory::from).collect())
        }
        Storage::Sqlite(pool) => {
            let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!("SELECT * FROM memories WHERE id IN ({placeholders})");
            let mut q = sqlx::query(&sql);
            for id in ids {
                q = q.bind(id);
            }
            let rows = q.fetch_all(pool).await?;
            Ok(rows.iter().map(sqlite_row_to_memory).collect())
        }
    }
}

/// Fetch all rows matching `filter`, used by the keyword fallback, the
/// semantic-search pass, and auto-link candidate selection. Embedding
/// filtering (has/doesn't-have) is left to the caller since recall needs
/// both kinds present (un-embedded rows sort last via the -1.0 sentinel).
pub async fn fetch_filtered(storage: &Storage, filter: &MemoryFilter) -> Result<Vec<Memory>> {
    match storage {
        Storage::Postgres(pool) => {
            let mut sql = "SELECT * FROM memories WHERE 1=1".to_string();
            let mut idx = 1;
            if !filter.include_archived {
                sql.push_str(" AND is_archived = false");
            }
            if filter.instance_id.is_some() {
                sql.push_str(&format!(" AND instance_id = ${idx}"));
                idx += 1;
            }
            if filter.project.is_some() {
                sql.push_str(&format!(" AND project = ${idx}"));
                idx += 1;
            }
            if filter.memory_type.is_some() {
                sql.push_str(&format!(" AND memory_type = ${idx}"));
                idx += 1;
            }
            if filter.subject.is_some() {
                sql.push_str(&format!(" AND subject = ${idx}"));
                idx += 1;
            }
            if filter.min_importance.is_some() {
                sql.push_str(&format!(" AND importance >= ${idx}"));
                idx += 1;
            }
            if filter.exclude_id.is_some() {
                sql.push_str(&format!(" AND id != ${idx}"));
            }
            let mut q = sqlx::query_as::<_, PgMemoryRow>(&sql);
            if let Some(v) = &filter.instance_id {
                q = q.bind(v);
            }
            if let Some(v) = &filter.project {
                q = q.bind(v);
            }
            if let Some(v) = &filter.memory_type {
                q = q.bind(v);
            }
            if let Some(v) = &filter.subject {
                q = q.bind(v);
            }
            if let Some(v) = filter.min_importance {
                q = q.bind(v);
            }
            if let Some(v) = filter.exclude_id {
                q = q.bind(v);
            }
            let rows = q.fetch_all(pool).await?;
            Ok(rows.into_iter().map(Memory::from).collect())
        }
        Storage::Sqlite(pool) => {
            let mut sql = "SELECT * FROM memories WHERE 1=1".to_string();
            if !filter.include_archived {
                sql.push_str(" AND is_archived = 0");
            }
            if filter.instance_id.is_some() {
                sql.push_str(" AND instance_id = ?");
            }
            if filter.project.is_some() {
                sql.push_str(" AND project = ?");
            }
            if filter.memory_type.is_some() {
                sql.push_str(" AND memory_type = ?");
            }
            if filter.subject.is_some() {
                sql.push_str(" AND subject = ?");
            }
            if filter.min_importance.is_some() {
                sql.push_str(" AND importance >= ?");
            }
            if filter.exclude_id.is_some() {
                sql.push_str(" AND id != ?");
            }
            let mut q = sqlx::query(&sql);
            if let Some(v) = &filter.instance_id {
                q = q.bind(v);
            }
            if let Some(v) = &filter.project {
                q = q.bind(v);
            }
            if let Some(v) = &filter.memory_type {
                q = q.bind(v);
            }
            if let Some(v) = &filter.subject {
                q = q.bind(v);
            }
            if let Some(v) = filter.min_importance {
                q = q.bind(v);
            }
            if let Some(v) = filter.exclude_id {
                q = q.bind(v);
            }
            let rows = q.fetch_all(pool).await?;
            Ok(rows.iter().map(sqlite_row_to_memory).collect())
        }
    }
}

/// Rows with a null embedding, across all instances/projects (including
/// archived — backfill is exhaustive).
pub async fn fetch_missing_embeddings(storage: &Storage) -> Result<Vec<Memory>> {
    match storage {
        Storage::Postgres(pool) => {
            let rows: Vec<PgMemoryRow> =
                sqlx::query_as("SELECT * FROM memories WHERE embedding IS NULL")
                    .fetch_all(pool)
                    .await?;
            Ok(rows.into_iter().map(Memory::from).collect())
        }
        Storage::Sqlite(pool) => {
            let rows = sqlx::query("SELECT * FROM memories WHERE embedding IS NULL")
                .fetch_all(pool)
                .await?;
            Ok(rows.iter().map(sqlite_row_to_memory).collect())
        }
    }
}

pub async fn bump_access(storage: &Storage, ids: &[i64]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    match storage {
        Storage::Postgres(pool) => {
            let mut tx = pool.begin().await?;
            for id in ids {
                sqlx::query(
                    "UPDATE memories SET access_count = access_count + 1, last_accessed_at = now() WHERE id = $1",
                )
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
        }
        Storage::Sqlite(pool) => {
            let mut tx = pool.begin().await?;
            let now = Utc::now().to_rfc3339();
            for id in ids {
                sqlx::query(
                    "UPDATE memories SET access_count = access_count + 1, last_accessed_at = ? WHERE id = ?",
                )
                .bind(&now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
        }
    }
    Ok(())
}

pub async fn archive(storage: &Storage, id: i64, note: Option<&str>) -> Result<()> {
    let existing = get_by_id(storage, id).await?;
    let Some(existing) = existing else {
        return Ok(());
    };
    let source_context = match note {
        Some(n) => {
            let mut ctx = existing.source_context.unwrap_or_default();
            if !ctx.is_empty() {
                ctx.push(' ');
            }
            ctx.push_str(&format!("[ARCHIVED: {n}]"));
            Some(ctx)
        }
        None => existing.source_context,
    };
    match storage {
        Storage::Postgres(pool) => {
            sqlx::query("UPDATE memories SET is_archived = true, source_context = $1 WHERE id = $2")
                .bind(&source_context)
                .bind(id)
                .execute(pool)
                .await?;
        }
        Storage::Sqlite(pool) => {
            sqlx::query("UPDATE memories SET is_archived = 1, source_context = ? WHERE id = ?")
                .bind(&source_context)
                .bind(id)
                .execute(pool)
                .await?;
        }
    }
    Ok(())
}

/// Archive the old memory and append a `[SUPERSEDED by #N]` marker to its
/// source_context, called right after the `supersedes` edge insert.
pub async fn append_superseded_marker(storage: &Storage, id: i64, new_id: i64) -> Result<()> {
    let existing = get_by_id(storage, id).await?;
    let Some(existing) = existing else {
        return Ok(());
    };
    let mut ctx = existing.source_context.unwrap_or_default();
    if !ctx.is_empty() {
        ctx.push(' ');
    }
    ctx.push_str(&format!("[SUPERSEDED by #{new_id}]"));

    match storage {
        Storage::Postgres(pool) => {
            sqlx::query("UPDATE memories SET is_archived = true, source_context = $1 WHERE id = $2")
                .bind(&ctx)
                .bind(id)
                .execute(pool)
                .await?;
        }
        Storage::Sqlite(pool) => {
            sqlx::query("UPDATE memories SET is_archived = 1, source_context = ? WHERE id = ?")
                .bind(&ctx)
                .bind(id)
                .execute(pool)
                .await?;
        }
    }
    Ok(())
}

/// Transactional twin of `append_superseded_marker`: the caller reads the
/// old memory's current `source_context` first (a plain read, outside any
/// transaction) and passes it in here, so this half only ever does the
/// write — the half that must land atomically with the `supersedes` edge
/// insert via `Storage::transaction`.
pub async fn append_superseded_marker_tx(
    mut tx: Transaction<'_>,
    id: i64,
    new_id: i64,
    existing_source_context: Option<&str>,
) -> (Result<()>, Transaction<'_>) {
    let mut ctx = existing_source_context.unwrap_or_default().to_string();
    if !ctx.is_empty() {
        ctx.push(' ');
    }
    ctx.push_str(&format!("[SUPERSEDED by #{new_id}]"));

    let result = match &mut tx {
        Transaction::Postgres(t) => {
            sqlx::query("UPDATE memories SET is_archived = true, source_context = $1 WHERE id = $2")
                .bind(&ctx)
                .bind(id)
                .execute(&mut **t)
                .await
                .map(|_| ())
                .map_err(Into::into)
        }
        Transaction::Sqlite(t) => {
            sqlx::query("UPDATE memories SET is_archived = 1, source_context = ? WHERE id = ?")
                .bind(&ctx)
                .bind(id)
                .execute(&mut **t)
                .await
                .map(|_| ())
                .map_err(Into::into)
        }
    };
    (result, tx)
}

#[derive(Debug, Default, Clone)]
pub struct MemoryPatch {
    pub subject: Option<String>,
    pub content: Option<String>,
    pub memory_type: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub importance: Option<i32>,
}

impl MemoryPatch {
    pub fn touches_embedding_text(&self) -> bool {
        self.subject.is_some() || self.content.is_some() || self.memory_type.is_some()
    }
}

pub async fn update(storage: &Storage, id: i64, patch: &MemoryPatch) -> Result<()> {
    let Some(mut current) = get_by_id(storage, id).await? else {
        return Ok(());
    };
    if let Some(v) = &patch.subject {
        current.subject = Some(v.clone());
    }
    if let Some(v) = &patch.content {
        current.content = v.clone();
    }
    if let Some(v) = &patch.memory_type {
        current.memory_type = v.clone();
    }
    if let Some(v) = &patch.keywords {
        current.keywords = v.clone();
    }
    if let Some(v) = &patch.tags {
        current.tags = v.clone();
    }
    if let Some(v) = patch.importance {
        current.importance = v.clamp(1, 10);
    }

    match storage {
        Storage::Postgres(pool) => {
            sqlx::query(
                r#"UPDATE memories SET subject=$1, content=$2, memory_type=$3, keywords=$4,
                   tags=$5, importance=$6, updated_at=now() WHERE id=$7"#,
            )
            .bind(&current.subject)
            .bind(&current.content)
            .bind(&current.memory_type)
            .bind(&current.keywords)
            .bind(&current.tags)
            .bind(current.importance)
            .bind(id)
            .execute(pool)
            .await?;
        }
        Storage::Sqlite(pool) => {
            let keywords = serde_json::to_string(&current.keywords)?;
            let tags = serde_json::to_string(&current.tags)?;
            let now = Utc::now().to_rfc3339();
            sqlx::query(
                r#"UPDATE memories SET subject=?, content=?, memory_type=?, keywords=?,
                   tags=?, importance=?, updated_at=? WHERE id=?"#,
            )
            .bind(&current.subject)
            .bind(&current.content)
            .bind(&current.memory_type)
            .bind(&keywords)
            .bind(&tags)
            .bind(current.importance)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;
        }
    }
    Ok(())
}
