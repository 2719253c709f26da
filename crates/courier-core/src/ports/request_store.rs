//! RequestStore port - スケジュール済みリクエストの正本（source of truth）
//!
//! # 実装
//! - `InMemoryRequestStore`（開発・テスト用）
//! - `SqliteRequestStore`（永続化）
//!
//! # 設計原則
//! - 更新はすべてフィールド単位（レコード全体の置き換えはしない）
//! - `set_locking` は無条件の書き込み（last-writer-wins）
//! - `claim` は条件付き書き込み（locking = false のときだけ true にする）

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{RequestId, Response, ScheduledRequest, StoreError};

/// Result of a conditional claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// `locking` flipped from false to true by this call.
    Acquired,
    /// `locking` was already true; someone else owns the record.
    AlreadyClaimed,
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    /// All records with `effective_after <= now AND locking = false`, unordered.
    async fn query_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledRequest>, StoreError>;

    async fn get(&self, id: &RequestId) -> Result<ScheduledRequest, StoreError>;

    /// Insert a new record. Fails with `StoreError::Duplicate` if the id exists.
    async fn create(&self, request: &ScheduledRequest) -> Result<(), StoreError>;

    /// Unconditional write of the `locking` flag.
    async fn set_locking(&self, id: &RequestId, locking: bool) -> Result<(), StoreError>;

    /// Set `locking = true` only if it is currently false.
    async fn claim(&self, id: &RequestId) -> Result<Claim, StoreError>;

    /// Set `execution_result` (JSON) and `executed_at`.
    async fn record_result(
        &self,
        id: &RequestId,
        response: &Response,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn record_failure(&self, id: &RequestId, reason: &str) -> Result<(), StoreError>;

    async fn remove(&self, id: &RequestId) -> Result<(), StoreError>;
}
