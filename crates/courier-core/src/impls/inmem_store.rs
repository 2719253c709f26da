//! InMemoryRequestStore - 開発・テスト用のストア
//!
//! # 実装詳細
//! - HashMap<RequestId, ScheduledRequest> を tokio::sync::Mutex で保護
//! - claim はロック内で比較と書き込みを行うので、並行パス間でも 1 回しか成功しない
//! - ロックを保持したまま await しない

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{RequestId, Response, ScheduledRequest, StoreError, StoreOp, timestamp};
use crate::ports::{Claim, RequestStore};

#[derive(Default)]
pub struct InMemoryRequestStore {
    records: Mutex<HashMap<RequestId, ScheduledRequest>>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store; later duplicates overwrite earlier ones.
    pub fn with_requests(requests: impl IntoIterator<Item = ScheduledRequest>) -> Self {
        let records = requests
            .into_iter()
            .map(|request| (request.id.clone(), request))
            .collect();
        Self {
            records: Mutex::new(records),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Apply `update` to one record, or fail with `NotFound`.
    async fn update<F>(&self, id: &RequestId, update: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut ScheduledRequest),
    {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound { id: id.clone() })?;
        update(record);
        Ok(())
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn query_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledRequest>, StoreError> {
        let records = self.records.lock().await;
        let due: Vec<ScheduledRequest> = records
            .values()
            .filter(|record| record.is_due(now))
            .cloned()
            .collect();
        tracing::debug!(
            now = %timestamp::format(&now),
            found = due.len(),
            "queried due requests"
        );
        Ok(due)
    }

    async fn get(&self, id: &RequestId) -> Result<ScheduledRequest, StoreError> {
        self.records
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.clone() })
    }

    async fn create(&self, request: &ScheduledRequest) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&request.id) {
            return Err(StoreError::Duplicate {
                id: request.id.clone(),
            });
        }
        records.insert(request.id.clone(), request.clone());
        tracing::debug!(id = %request.id, "stored request");
        Ok(())
    }

    async fn set_locking(&self, id: &RequestId, locking: bool) -> Result<(), StoreError> {
        tracing::debug!(%id, locking, "set locking");
        self.update(id, |record| record.locking = locking).await
    }

    async fn claim(&self, id: &RequestId) -> Result<Claim, StoreError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound { id: id.clone() })?;
        if record.locking {
            return Ok(Claim::AlreadyClaimed);
        }
        record.locking = true;
        Ok(Claim::Acquired)
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
        tracing::debug!(%id, %response, "store execution result");
        self.update(id, |record| {
            record.execution_result = Some(result);
            record.executed_at = Some(timestamp::truncate(now));
        })
        .await
    }

    async fn record_failure(&self, id: &RequestId, reason: &str) -> Result<(), StoreError> {
        tracing::debug!(%id, "store execution failure");
        self.update(id, |record| record.failure_reason = Some(reason.to_string()))
            .await
    }

    async fn remove(&self, id: &RequestId) -> Result<(), StoreError> {
        tracing::debug!(%id, "remove request");
        self.records
            .lock()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound { id: id.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::request;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 9, 5, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn query_due_applies_time_and_lock_predicate() {
        let past = now() - chrono::Duration::days(1);
        let future = now() + chrono::Duration::days(1);
        let mut locked = request("locked", past);
        locked.locking = true;
        let store = InMemoryRequestStore::with_requests([
            request("past", past),
            request("boundary", now()),
            request("future", future),
            locked,
        ]);

        let mut ids: Vec<String> = store
            .query_due(now())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        ids.sort();

        assert_eq!(ids, vec!["boundary".to_string(), "past".to_string()]);
    }

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let store = InMemoryRequestStore::new();
        let req = request("a", now());
        store.create(&req).await.unwrap();

        let err = store.create(&req).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = InMemoryRequestStore::new();
        let err = store.get(&RequestId::new("nope")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn claim_is_conditional() {
        let store = InMemoryRequestStore::with_requests([request("a", now())]);
        let id = RequestId::new("a");

        assert_eq!(store.claim(&id).await.unwrap(), Claim::Acquired);
        assert_eq!(store.claim(&id).await.unwrap(), Claim::AlreadyClaimed);
        assert!(store.get(&id).await.unwrap().locking);
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let store = Arc::new(InMemoryRequestStore::with_requests([request("a", now())]));
        let mut joins = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            joins.push(tokio::spawn(async move {
                store.claim(&RequestId::new("a")).await.unwrap()
            }));
        }

        let mut acquired = 0;
        for join in joins {
            if join.await.unwrap() == Claim::Acquired {
                acquired += 1;
            }
        }
        assert_eq!(acquired, 1);
    }

    #[tokio::test]
    async fn set_locking_is_unconditional() {
        let store = InMemoryRequestStore::with_requests([request("a", now())]);
        let id = RequestId::new("a");

        store.set_locking(&id, true).await.unwrap();
        store.set_locking(&id, true).await.unwrap();
        assert!(store.get(&id).await.unwrap().locking);

        store.set_locking(&id, false).await.unwrap();
        assert!(!store.get(&id).await.unwrap().locking);
    }

    #[tokio::test]
    async fn record_result_leaves_other_fields_alone() {
        let mut original = request("a", now());
        original.locking = true;
        original.failure_reason = Some("earlier failure".to_string());
        let store = InMemoryRequestStore::with_requests([original.clone()]);

        store
            .record_result(&original.id, &Response::new(200, "ok"), now())
            .await
            .unwrap();

        let stored = store.get(&original.id).await.unwrap();
        assert_eq!(stored.execution_result.as_deref(), Some(r#"{"code":200,"body":"ok"}"#));
        assert_eq!(stored.executed_at, Some(now()));
        assert!(stored.locking);
        assert_eq!(stored.failure_reason, original.failure_reason);
        assert_eq!(stored.url, original.url);
    }

    #[tokio::test]
    async fn record_failure_sets_reason() {
        let store = InMemoryRequestStore::with_requests([request("a", now())]);
        let id = RequestId::new("a");

        store.record_failure(&id, "transport failure").await.unwrap();
        let stored = store.get(&id).await.unwrap();
        assert_eq!(stored.failure_reason.as_deref(), Some("transport failure"));
        assert_eq!(stored.execution_result, None);
    }

    #[tokio::test]
    async fn mutations_on_missing_records_are_not_found() {
        let store = InMemoryRequestStore::new();
        let id = RequestId::new("ghost");

        assert!(store.set_locking(&id, true).await.unwrap_err().is_not_found());
        assert!(store.claim(&id).await.unwrap_err().is_not_found());
        assert!(store.record_failure(&id, "x").await.unwrap_err().is_not_found());
        assert!(store.remove(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn remove_deletes_record() {
        let store = InMemoryRequestStore::with_requests([request("a", now())]);
        store.remove(&RequestId::new("a")).await.unwrap();
        assert!(store.is_empty().await);
    }
}
