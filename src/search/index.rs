//! FTS5 index lifecycle: rebuild, integrity verification, repair and
//! compaction, one record kind at a time.

use crate::db::schema::{self, KindSchema};
use crate::db::ConnectionPool;
use crate::error::Result;
use crate::metrics::{INDEX_OPERATIONS_TOTAL, INDEX_UNHEALTHY_KINDS};
use crate::models::RecordKind;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Relative count mismatch above which an index is unhealthy
pub const MAX_COUNT_DRIFT: f64 = 0.10;

/// Index statistics for one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub kind: RecordKind,

    /// Rows in the base table
    pub base_count: u64,

    /// Rows known to the index
    pub index_count: u64,

    pub healthy: bool,

    /// Why the kind is unhealthy
    pub issue: Option<String>,

    pub last_rebuild: Option<DateTime<Utc>>,
}

/// Outcome of optimizing one kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeOutcome {
    pub kind: RecordKind,
    pub success: bool,
    pub error: Option<String>,
}

/// Manages the per-kind FTS5 indexes
#[derive(Clone)]
pub struct IndexManager {
    pool: ConnectionPool,
}

impl IndexManager {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Drop and recreate the index and sync triggers of `kinds` (all when
    /// `None`), repopulate from base tables and refresh planner statistics
    pub async fn rebuild_indexes(&self, kinds: Option<Vec<RecordKind>>) -> Result<()> {
        let kinds = kinds.unwrap_or_else(RecordKind::all);
        let mut conn = self.pool.acquire().await?;

        let rebuilt = kinds.clone();
        let result = conn
            .interact(move |conn| -> rusqlite::Result<()> {
                let tx = conn.transaction()?;
                for kind in &rebuilt {
                    schema::drop_index(&tx, *kind)?;
                    schema::create_index(&tx, *kind)?;
                    stamp_rebuild(&tx, *kind)?;
                }
                tx.commit()?;
                conn.execute_batch("ANALYZE;")
            })
            .await;

        let outcome = if result.is_ok() { "success" } else { "failure" };
        for kind in &kinds {
            INDEX_OPERATIONS_TOTAL
                .with_label_values(&["rebuild", kind.as_ref(), outcome])
                .inc();
        }
        result?;

        info!(kinds = ?kinds, "Indexes rebuilt");
        Ok(())
    }

    /// Run the FTS5 integrity check and compare base and index row counts
    /// per kind
    pub async fn verify_integrity(&self) -> Result<Vec<IndexStats>> {
        let mut conn = self.pool.acquire().await?;
        let stats = conn
            .interact(|conn| -> rusqlite::Result<Vec<IndexStats>> {
                RecordKind::all()
                    .into_iter()
                    .map(|kind| inspect(conn, kind))
                    .collect()
            })
            .await?;

        let unhealthy = stats.iter().filter(|s| !s.healthy).count();
        INDEX_UNHEALTHY_KINDS.set(unhealthy as f64);
        for stat in &stats {
            let outcome = if stat.healthy { "healthy" } else { "unhealthy" };
            INDEX_OPERATIONS_TOTAL
                .with_label_values(&["verify", stat.kind.as_ref(), outcome])
                .inc();
            if !stat.healthy {
                warn!(
                    kind = %stat.kind,
                    base_count = stat.base_count,
                    index_count = stat.index_count,
                    issue = stat.issue.as_deref().unwrap_or(""),
                    "Index failed integrity check"
                );
            }
        }
        Ok(stats)
    }

    /// Verify, rebuild every unhealthy kind from scratch and verify again.
    ///
    /// Returns one line per repaired kind.
    pub async fn repair_corrupted_indexes(&self) -> Result<Vec<String>> {
        let unhealthy: Vec<RecordKind> = self
            .verify_integrity()
            .await?
            .into_iter()
            .filter(|s| !s.healthy)
            .map(|s| s.kind)
            .collect();

        if unhealthy.is_empty() {
            return Ok(Vec::new());
        }

        self.rebuild_indexes(Some(unhealthy.clone())).await?;
        let after = self.verify_integrity().await?;

        let mut repaired = Vec::with_capacity(unhealthy.len());
        for kind in unhealthy {
            let healthy = after.iter().any(|s| s.kind == kind && s.healthy);
            let outcome = if healthy { "success" } else { "failure" };
            INDEX_OPERATIONS_TOTAL
                .with_label_values(&["repair", kind.as_ref(), outcome])
                .inc();
            if healthy {
                repaired.push(format!("rebuilt {} index", kind));
            } else {
                repaired.push(format!("{} index still unhealthy after rebuild", kind));
            }
        }

        info!(repaired = ?repaired, "Index repair finished");
        Ok(repaired)
    }

    /// Run FTS5 `optimize` on every kind, continuing past failures
    pub async fn optimize_indexes(&self) -> Result<Vec<OptimizeOutcome>> {
        let mut conn = self.pool.acquire().await?;
        let outcomes = conn
            .interact(|conn| -> rusqlite::Result<Vec<OptimizeOutcome>> {
                Ok(RecordKind::all()
                    .into_iter()
                    .map(|kind| match schema::optimize_index(conn, kind) {
                        Ok(()) => OptimizeOutcome {
                            kind,
                            success: true,
                            error: None,
                        },
                        Err(e) => OptimizeOutcome {
                            kind,
                            success: false,
                            error: Some(e.to_string()),
                        },
                    })
                    .collect())
            })
            .await?;

        for outcome in &outcomes {
            let label = if outcome.success { "success" } else { "failure" };
            INDEX_OPERATIONS_TOTAL
                .with_label_values(&["optimize", outcome.kind.as_ref(), label])
                .inc();
            if let Some(error) = &outcome.error {
                warn!(kind = %outcome.kind, error = %error, "Index optimize failed");
            }
        }
        Ok(outcomes)
    }
}

fn stamp_rebuild(conn: &Connection, kind: RecordKind) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO index_meta (kind, last_rebuild) VALUES (?1, ?2)
         ON CONFLICT(kind) DO UPDATE SET last_rebuild = excluded.last_rebuild",
        rusqlite::params![kind.as_ref(), Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn last_rebuild(conn: &Connection, kind: RecordKind) -> Option<DateTime<Utc>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT last_rebuild FROM index_meta WHERE kind = ?1",
            [kind.as_ref()],
            |row| row.get(0),
        )
        .optional()
        .ok()
        .flatten();
    raw.and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

fn count(conn: &Connection, table: &str) -> rusqlite::Result<u64> {
    conn.query_row(&format!("SELECT count(*) FROM {}", table), [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|n| n.max(0) as u64)
}

/// Health of one kind. Unreadable tables make the kind unhealthy rather
/// than failing the whole check.
fn inspect(conn: &Connection, kind: RecordKind) -> rusqlite::Result<IndexStats> {
    let schema = KindSchema::of(kind);
    let mut stats = IndexStats {
        kind,
        base_count: 0,
        index_count: 0,
        healthy: false,
        issue: None,
        last_rebuild: last_rebuild(conn, kind),
    };

    match count(conn, schema.table()) {
        Ok(n) => stats.base_count = n,
        Err(e) => {
            stats.issue = Some(format!("base table unreadable: {}", e));
            return Ok(stats);
        }
    }

    if !schema::table_exists(conn, schema.fts_table())? {
        stats.issue = Some("index missing".to_string());
        return Ok(stats);
    }

    match count(conn, &format!("{}_docsize", schema.fts_table())) {
        Ok(n) => stats.index_count = n,
        Err(e) => {
            stats.issue = Some(format!("index unreadable: {}", e));
            return Ok(stats);
        }
    }

    let drift = stats.base_count.abs_diff(stats.index_count) as f64
        / stats.base_count.max(1) as f64;
    if drift > MAX_COUNT_DRIFT {
        stats.issue = Some(format!(
            "index has {} rows for {} records",
            stats.index_count, stats.base_count
        ));
        return Ok(stats);
    }

    if let Err(e) = schema::check_index(conn, kind) {
        stats.issue = Some(format!("index corrupt: {}", e));
        return Ok(stats);
    }

    stats.healthy = true;
    Ok(stats)
}
