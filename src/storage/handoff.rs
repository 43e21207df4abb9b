//! Row-level CRUD for the `handoff_messages` table.

use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::error::Result;
use crate::types::HandoffMessage;

use super::Storage;

#[derive(sqlx::FromRow)]
struct PgHandoffRow {
    id: i64,
    created_at: DateTime<Utc>,
    from_instance: String,
    to_instance: String,
    message_type: String,
    subject: Option<String>,
    content: String,
    read_at: Option<DateTime<Utc>>,
    read_by: Option<String>,
}

impl From<PgHandoffRow> for HandoffMessage {
    fn from(r: PgHandoffRow) -> Self {
        HandoffMessage {
            id: r.id,
            created_at: r.created_at,
            from_instance: r.from_instance,
            to_instance: r.to_instance,
            message_type: r.message_type,
            subject: r.subject,
            content: r.content,
            read_at: r.read_at,
            read_by: r.read_by,
        }
    }
}

fn sqlite_row_to_handoff(row: &sqlx::sqlite::SqliteRow) -> HandoffMessage {
    let created_at: String = row.get("created_at");
    let read_at: Option<String> = row.get("read_at");
    HandoffMessage {
        id: row.get("id"),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        from_instance: row.get("from_instance"),
        to_instance: row.get("to_instance"),
        message_type: row.get("message_type"),
        subject: row.get("subject"),
        content: row.get("content"),
        read_at: read_at.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|d| d.with_timezone(&Utc))
                .ok()
        }),
        read_by: row.get("read_by"),
    }
}

pub async fn insert(
    storage: &Storage,
    from_instance: &str,
    to_instance: &str,
    message_type: &str,
    subject: Option<&str>,
    content: &str,
) -> Result<i64> {
    match storage {
        Storage::Postgres(pool) => {
            let row = sqlx::query(
                r#"INSERT INTO handoff_messages (from_instance, to_instance, message_type, subject, content)
                   VALUES ($1,$2,$3,$4,$5) RETURNING id"#,
            )
            .bind(from_instance)
            .bind(to_instance)
            .bind(message_type)
            .bind(subject)
            .bind(content)
            .fetch_one(pool)
            .await?;
            Ok(row.get("id"))
        }
        Storage::Sqlite(pool) => {
            let now = Utc::now().to_rfc3339();
            let result = sqlx::query(
                r#"INSERT INTO handoff_messages (created_at, from_instance, to_instance, message_type, subject, content)
                   VALUES (?,?,?,?,?,?)"#,
            )
            .bind(&now)
            .bind(from_instance)
            .bind(to_instance)
            .bind(message_type)
            .bind(subject)
            .bind(content)
            .execute(pool)
            .await?;
            Ok(result.last_insert_rowid())
        }
    }
}

pub async fn list_for_instance(
    storage: &Storage,
    instance_id: &str,
    unread_only: bool,
    message_type: Option<&str>,
    limit: i64,
) -> Result<Vec<HandoffMessage>> {
    match storage {
        Storage::Postgres(pool) => {
            let mut sql = "SELECT * FROM handoff_messages WHERE (to_instance = $1 OR to_instance = 'all')"
                .to_string();
            let mut idx = 2;
            if unread_only {
                sql.push_str(" AND read_at IS NULL");
            }
            if message_type.is_some() {
                sql.push_str(&format!(" AND message_type = ${idx}"));
                idx += 1;
            }
            sql.push_str(&format!(" ORDER BY created_at DESC LIMIT ${idx}"));
            let mut q = sqlx::query_as::<_, PgHandoffRow>(&sql).bind(instance_id);
            if let Some(mt) = message_type {
                q = q.bind(mt);
            }
            q = q.bind(limit);
            let rows = q.fetch_all(pool).await?;
            Ok(rows.into_iter().map(HandoffMessage::from).collect())
        }
        Storage::Sqlite(pool) => {
            let mut sql = "SELECT * FROM handoff_messages WHERE (to_instance = ? OR to_instance = 'all')"
                .to_string();
            if unread_only {
                sql.push_str(" AND read_at IS NULL");
            }
            if message_type.is_some() {
                sql.push_str(" AND message_type = ?");
            }
            sql.push_str(" ORDER BY created_at DESC LIMIT ?");
            let mut q = sqlx::query(&sql).bind(instance_id);
            if let Some(mt) = message_type {
                q = q.bind(mt);
            }
            q = q.bind(limit);
            let rows = q.fetch_all(pool).await?;
            Ok(rows.iter().map(sqlite_row_to_handoff).collect())
        }
    }
}

/// Stamp `read_at`/`read_by`. Not strictly idempotent: this implementation
/// overwrites `read_by` on a repeat call, the "last-writer-wins" resolution
/// of the ambiguity spec.md §9 flags — see DESIGN.md.
pub async fn mark_read(storage: &Storage, message_id: i64, read_by: &str) -> Result<()> {
    match storage {
        Storage::Postgres(pool) => {
            sqlx::query("UPDATE handoff_messages SET read_at = now(), read_by = $1 WHERE id = $2")
                .bind(read_by)
                .bind(message_id)
                .execute(pool)
                .await?;
        }
        Storage::Sqlite(pool) => {
            let now = Utc::now().to_rfc3339();
            sqlx::query("UPDATE handoff_messages SET read_at = ?, read_by = ? WHERE id = ?")
                .bind(&now)
                .bind(read_by)
                .bind(message_id)
                .execute(pool)
                .await?;
        }
    }
    Ok(())
}
