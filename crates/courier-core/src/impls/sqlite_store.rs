//! SqliteRequestStore - 永続ストア
//!
//! # 実装詳細
//! - 1 テーブル（名前は設定で指定）に 1 レコード 1 行
//! - タイムスタンプは `YYYY-MM-DDTHH:MM:SSZ` のテキストなので文字列比較で大小が決まる
//! - headers は JSON オブジェクト、execution_result は `{"code":..,"body":..}` のテキスト
//! - rusqlite は同期 API なので、Connection を Mutex で包み spawn_blocking で呼ぶ
//! - claim は `UPDATE .. WHERE locking = 0` の条件付き書き込み

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, ToSql, params};

use crate::domain::{RequestId, Response, ScheduledRequest, StoreError, StoreOp, timestamp};
use crate::ports::{Claim, RequestStore};

const COLUMNS: &str = "id, created_at, effective_after, locking, failure_reason, method, url, \
                       payload, headers, persistent_store, execution_result, executed_at";

/// Table names are interpolated into SQL, so only plain identifiers are accepted.
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Clone)]
pub struct SqliteRequestStore {
    conn: Arc<Mutex<Connection>>,
    table: Arc<str>,
}

impl SqliteRequestStore {
    /// Open (or create) the database file and make sure the table exists.
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::backend(StoreOp::Open, None, e))?;
        }
        let conn = Connection::open(path).map_err(|e| StoreError::backend(StoreOp::Open, None, e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| StoreError::backend(StoreOp::Open, None, e))?;
        Self::with_connection(conn, table)
    }

    pub fn open_in_memory(table: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::backend(StoreOp::Open, None, e))?;
        Self::with_connection(conn, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self, StoreError> {
        if !is_valid_table_name(table) {
            return Err(StoreError::backend(
                StoreOp::Open,
                None,
                format!("invalid table name {table:?}"),
            ));
        }
        ensure_schema(&conn, table).map_err(|e| StoreError::backend(StoreOp::Open, None, e))?;
        tracing::debug!(table, "sqlite store ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: Arc::from(table),
        })
    }

    /// Run `f` on the blocking pool with the connection locked.
    async fn with_conn<T, F>(&self, op: StoreOp, id: Option<&RequestId>, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let table = Arc::clone(&self.table);
        let owned_id = id.cloned();
        let joined = tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| {
                StoreError::backend(op, owned_id.as_ref(), "sqlite connection mutex poisoned")
            })?;
            f(&*guard, &*table)
        })
        .await;
        match joined {
            Ok(result) => result,
            Err(join_err) => Err(StoreError::backend(op, id, join_err)),
        }
    }

    /// Field update that fails with `NotFound` when no row matched.
    ///
    /// `values` bind `?1..?n` in `set_clause`; the id is bound last.
    async fn update_row(
        &self,
        op: StoreOp,
        id: &RequestId,
        set_clause: &'static str,
        mut values: Vec<Box<dyn ToSql + Send>>,
    ) -> Result<(), StoreError> {
        let owned = id.clone();
        self.with_conn(op, Some(id), move |conn, table| {
            values.push(Box::new(owned.as_str().to_string()));
            let sql = format!(
                "UPDATE {table} SET {set_clause} WHERE id = ?{}",
                values.len()
            );
            let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref() as &dyn ToSql).collect();
            let changed = conn
                .execute(&sql, refs.as_slice())
                .map_err(|e| StoreError::backend(op, Some(&owned), e))?;
            if changed == 0 {
                return Err(StoreError::NotFound { id: owned });
            }
            Ok(())
        })
        .await
    }
}

fn ensure_schema(conn: &Connection, table: &str) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "
        CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY NOT NULL,
            created_at TEXT NOT NULL,
            effective_after TEXT NOT NULL,
            locking INTEGER NOT NULL DEFAULT 0,
            failure_reason TEXT,
            method TEXT NOT NULL,
            url TEXT NOT NULL,
            payload TEXT NOT NULL DEFAULT '',
            headers TEXT NOT NULL DEFAULT '{{}}',
            persistent_store INTEGER NOT NULL DEFAULT 0,
            execution_result TEXT,
            executed_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_due
        ON {table} (locking, effective_after);
        "
    ))
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    timestamp::parse(&text).map_err(|e| conversion_error(idx, e))
}

fn row_to_request(row: &Row<'_>) -> rusqlite::Result<ScheduledRequest> {
    let headers_json: String = row.get(8)?;
    let headers: BTreeMap<String, String> =
        serde_json::from_str(&headers_json).map_err(|e| conversion_error(8, e))?;
    let executed_at = match row.get::<_, Option<String>>(11)? {
        Some(text) => Some(timestamp::parse(&text).map_err(|e| conversion_error(11, e))?),
        None => None,
    };

    Ok(ScheduledRequest {
        id: RequestId::new(row.get::<_, String>(0)?),
        created_at: parse_time(row, 1)?,
        effective_after: parse_time(row, 2)?,
        locking: row.get(3)?,
        failure_reason: row.get(4)?,
        method: row.get(5)?,
        url: row.get(6)?,
        payload: row.get(7)?,
        headers,
        persistent_store: row.get(9)?,
        execution_result: row.get(10)?,
        executed_at,
    })
}

#[async_trait]
impl RequestStore for SqliteRequestStore {
    async fn query_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledRequest>, StoreError> {
        let now_text = timestamp::format(&now);
        let due = self
            .with_conn(StoreOp::QueryDue, None, move |conn, table| {
                let backend = |e: rusqlite::Error| StoreError::backend(StoreOp::QueryDue, None, e);
                let sql = format!(
                    "SELECT {COLUMNS} FROM {table} WHERE effective_after <= ?1 AND locking = 0"
                );
                let mut stmt = conn.prepare(&sql).map_err(backend)?;
                let rows = stmt
                    .query_map(params![now_text], row_to_request)
                    .map_err(backend)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(backend)
            })
            .await?;
        tracing::debug!(
            table = %self.table,
            now = %timestamp::format(&now),
            found = due.len(),
            "queried due requests"
        );
        Ok(due)
    }

    async fn get(&self, id: &RequestId) -> Result<ScheduledRequest, StoreError> {
        let owned = id.clone();
        self.with_conn(StoreOp::Get, Some(id), move |conn, table| {
            let sql = format!("SELECT {COLUMNS} FROM {table} WHERE id = ?1");
            let found = conn
                .query_row(&sql, params![owned.as_str()], row_to_request)
                .optional()
                .map_err(|e| StoreError::backend(StoreOp::Get, Some(&owned), e))?;
            found.ok_or(StoreError::NotFound { id: owned })
        })
        .await
    }

    async fn create(&self, request: &ScheduledRequest) -> Result<(), StoreError> {
        let request = request.clone();
        let id = request.id.clone();
        self.with_conn(StoreOp::Create, Some(&id), move |conn, table| {
            let headers = serde_json::to_string(&request.headers)
                .map_err(|e| StoreError::backend(StoreOp::Create, Some(&request.id), e))?;
            let sql = format!("INSERT INTO {table} ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)");
            let inserted = conn.execute(
                &sql,
                params![
                    request.id.as_str(),
                    timestamp::format(&request.created_at),
                    timestamp::format(&request.effective_after),
                    request.locking,
                    request.failure_reason,
                    request.method,
                    request.url,
                    request.payload,
                    headers,
                    request.persistent_store,
                    request.execution_result,
                    request.executed_at.as_ref().map(timestamp::format),
                ],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::Duplicate { id: request.id })
                }
                Err(e) => Err(StoreError::backend(StoreOp::Create, Some(&request.id), e)),
            }
        })
        .await?;
        tracing::debug!(table = %self.table, %id, "stored request");
        Ok(())
    }

    async fn set_locking(&self, id: &RequestId, locking: bool) -> Result<(), StoreError> {
        tracing::debug!(table = %self.table, %id, locking, "set locking");
        self.update_row(StoreOp::SetLocking, id, "locking = ?1", vec![Box::new(locking)])
            .await
    }

    async fn claim(&self, id: &RequestId) -> Result<Claim, StoreError> {
        let owned = id.clone();
        let claim = self
            .with_conn(StoreOp::Claim, Some(id), move |conn, table| {
                let backend = |e: rusqlite::Error| StoreError::backend(StoreOp::Claim, Some(&owned), e);
                let changed = conn
                    .execute(
                        &format!("UPDATE {table} SET locking = 1 WHERE id = ?1 AND locking = 0"),
                        params![owned.as_str()],
                    )
                    .map_err(backend)?;
                if changed == 1 {
                    return Ok(Claim::Acquired);
                }
                let exists = conn
                    .query_row(
                        &format!("SELECT 1 FROM {table} WHERE id = ?1"),
                        params![owned.as_str()],
                        |_| Ok(()),
                    )
                    .optional()
                    .map_err(backend)?;
                match exists {
                    Some(()) => Ok(Claim::AlreadyClaimed),
                    None => Err(StoreError::NotFound { id: owned.clone() }),
                }
            })
            .await?;
        tracing::debug!(table = %self.table, %id, ?claim, "claim");
        Ok(claim)
    }

    async fn record_result(
        &self,
        id: &RequestId,
        response: &Response,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = response
            .to_json()
            .map_err(|e| StoreError::backend(StoreOp::RecordResult, Some(id), e))?;
        let executed_at = timestamp::format(&now);
        tracing::debug!(table = %self.table, %id, %response, "store execution result");
        self.update_row(
            StoreOp::RecordResult,
            id,
            "execution_result = ?1, executed_at = ?2",
            vec![Box::new(result), Box::new(executed_at)],
        )
        .await
    }

    async fn record_failure(&self, id: &RequestId, reason: &str) -> Result<(), StoreError> {
        let reason = reason.to_string();
        tracing::debug!(table = %self.table, %id, "store execution failure");
        self.update_row(StoreOp::RecordFailure, id, "failure_reason = ?1", vec![Box::new(reason)])
            .await
    }

    async fn remove(&self, id: &RequestId) -> Result<(), StoreError> {
        let owned = id.clone();
        tracing::debug!(table = %self.table, %id, "remove request");
        self.with_conn(StoreOp::Remove, Some(id), move |conn, table| {
            let changed = conn
                .execute(
                    &format!("DELETE FROM {table} WHERE id = ?1"),
                    params![owned.as_str()],
                )
                .map_err(|e| StoreError::backend(StoreOp::Remove, Some(&owned), e))?;
            if changed == 0 {
                return Err(StoreError::NotFound { id: owned });
            }
            Ok(())
        })
        .await
    }
}
