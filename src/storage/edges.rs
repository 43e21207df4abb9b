//! Row-level CRUD for the `memory_edges` table.

use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::error::{PalaceError, Result};
use crate::types::MemoryEdge;

use super::{Storage, Transaction};

#[derive(sqlx::FromRow)]
struct PgEdgeRow {
    id: i64,
    created_at: DateTime<Utc>,
    source_id: i64,
    target_id: i64,
    relation_type: String,
    strength: f32,
    bidirectional: bool,
    metadata: serde_json::Value,
    created_by: Option<String>,
}

impl From<PgEdgeRow> for MemoryEdge {
    fn from(r: PgEdgeRow) -> Self {
        MemoryEdge {
            id: r.id,
            created_at: r.created_at,
            source_id: r.source_id,
            target_id: r.target_id,
            relation_type: r.relation_type,
            strength: r.strength,
            bidirectional: r.bidirectional,
            metadata: r.metadata,
            created_by: r.created_by,
        }
    }
}

fn sqlite_row_to_edge(row: &sqlx::sqlite::SqliteRow) -> MemoryEdge {
    let metadata: String = row.get("metadata");
    let created_at: String = row.get("created_at");
    MemoryEdge {
        id: row.get("id"),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        source_id: row.get("source_id"),
        target_id: row.get("target_id"),
        relation_type: row.get("relation_type"),
        strength: row.get("strength"),
        bidirectional: row.get::<i64, _>("bidirectional") != 0,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        created_by: row.get("created_by"),
    }
}

/// Insert one edge. Rejects self-loops before hitting the database (also
/// enforced by a CHECK constraint); duplicate `(source, target,
/// relation_type)` triples surface as `PalaceError::Conflict` from the
/// unique-constraint violation.
pub async fn insert(
    storage: &Storage,
    source_id: i64,
    target_id: i64,
    relation_type: &str,
    strength: f32,
    bidirectional: bool,
    metadata: &serde_json::Value,
    created_by: Option<&str>,
) -> Result<i64> {
    if source_id == target_id {
        return Err(PalaceError::Validation(
            "an edge cannot connect a memory to itself".to_string(),
        ));
    }

    let result = match storage {
        Storage::Postgres(pool) => {
            sqlx::query(
                r#"INSERT INTO memory_edges
                    (source_id, target_id, relation_type, strength, bidirectional, metadata, created_by)
                   VALUES ($1,$2,$3,$4,$5,$6,$7)
                   RETURNING id"#,
            )
            .bind(source_id)
            .bind(target_id)
            .bind(relation_type)
            .bind(strength)
            .bind(bidirectional)
            .bind(metadata)
            .bind(created_by)
            .fetch_one(pool)
            .await
            .map(|row| row.get::<i64, _>("id"))
        }
        Storage::Sqlite(pool) => {
            let now = Utc::now().to_rfc3339();
            let metadata_str = serde_json::to_string(metadata)?;
            sqlx::query(
                r#"INSERT INTO memory_edges
                    (created_at, source_id, target_id, relation_type, strength, bidirectional, metadata, created_by)
                   VALUES (?,?,?,?,?,?,?,?)"#,
            )
            .bind(&now)
            .bind(source_id)
            .bind(target_id)
            .bind(relation_type)
            .bind(strength)
            .bind(bidirectional as i64)
            .bind(&metadata_str)
            .bind(created_by)
            .execute(pool)
            .await
            .map(|r| r.last_insert_rowid())
        }
    };

    result.map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => PalaceError::Conflict(
            format!("edge ({source_id} -> {target_id}, {relation_type}) already exists"),
        ),
        _ => PalaceError::Database(e),
    })
}

/// Transactional twin of `insert`, for callers that must land this edge in
/// the same transaction as another write (see `Storage::transaction`). Takes
/// the open transaction by value and hands it back alongside the result.
pub async fn insert_tx(
    mut tx: Transaction<'_>,
    source_id: i64,
    target_id: i64,
    relation_type: &str,
    strength: f32,
    bidirectional: bool,
    metadata: &serde_json::Value,
    created_by: Option<&str>,
) -> (Result<i64>, Transaction<'_>) {
    if source_id == target_id {
        return (
            Err(PalaceError::Validation(
                "an edge cannot connect a memory to itself".to_string(),
            )),
            tx,
        );
    }

    let now = Utc::now().to_rfc3339();
    let metadata_str = match serde_json::to_string(metadata) {
        Ok(s) => s,
        Err(e) => return (Err(PalaceError::from(e)), tx),
    };

    let result = match &mut tx {
        Transaction::Postgres(t) => {
            sqlx::query(
                r#"INSERT INTO memory_edges
                    (source_id, target_id, relation_type, strength, bidirectional, metadata, created_by)
                   VALUES ($1,$2,$3,$4,$5,$6,$7)
                   RETURNING id"#,
            )
            .bind(source_id)
            .bind(target_id)
            .bind(relation_type)
            .bind(strength)
            .bind(bidirectional)
            .bind(metadata)
            .bind(created_by)
            .fetch_one(&mut **t)
            .await
            .map(|row| row.get::<i64, _>("id"))
        }
        Transaction::Sqlite(t) => {
            sqlx::query(
                r#"INSERT INTO memory_edges
                    (created_at, source_id, target_id, relation_type, strength, bidirectional, metadata, created_by)
                   VALUES (?,?,?,?,?,?,?,?)"#,
            )
            .bind(&now)
            .bind(source_id)
            .bind(target_id)
            .bind(relation_type)
            .bind(strength)
            .bind(bidirectional as i64)
            .bind(&metadata_str)
            .bind(created_by)
            .execute(&mut **t)
            .await
            .map(|r| r.last_insert_rowid())
        }
    };

    let result = result.map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => PalaceError::Conflict(
            format!("edge ({source_id} -> {target_id}, {relation_type}) already exists"),
        ),
        _ => PalaceError::Database(e),
    });
    (result, tx)
}

pub async fn exists(
    storage: &Storage,
    source_id: i64,
    target_id: i64,
    relation_type: &str,
) -> Result<bool> {
    let count: i64 = match storage {
        Storage::Postgres(pool) => {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM memory_edges WHERE source_id=$1 AND target_id=$2 AND relation_type=$3",
            )
            .bind(source_id)
            .bind(target_id)
            .bind(relation_type)
            .fetch_one(pool)
            .await?
        }
        Storage::Sqlite(pool) => {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM memory_edges WHERE source_id=? AND target_id=? AND relation_type=?",
            )
            .bind(source_id)
            .bind(target_id)
            .bind(relation_type)
            .fetch_one(pool)
            .await?
        }
    };
    Ok(count > 0)
}

pub async fn list_for_source(storage: &Storage, source_id: i64) -> Result<Vec<MemoryEdge>> {
    match storage {
        Storage::Postgres(pool) => {
            let rows: Vec<PgEdgeRow> =
                sqlx::query_as("SELECT * FROM memory_edges WHERE source_id = $1")
                    .bind(source_id)
                    .fetch_all(pool)
                    .await?;
            Ok(rows.into_iter().map(MemoryEdge::from).collect())
        }
        Storage::Sqlite(pool) => {
            let rows = sqlx::query("SELECT * FROM memory_edges WHERE source_id = ?")
                .bind(source_id)
                .fetch_all(pool)
                .await?;
            Ok(rows.iter().map(sqlite_row_to_edge).collect())
        }
    }
}
