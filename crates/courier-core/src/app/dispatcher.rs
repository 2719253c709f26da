//! Dispatcher - 1 回のディスパッチパス
//!
//! # 処理フロー（query → claim → execute → finalize）
//! 1. query_due(now) で期限到来かつ未ロックのレコードを取得（失敗はパス全体の失敗）
//! 2. レコードごとに 1 タスクを JoinSet に spawn（Semaphore で同時実行数を制限）
//! 3. 各タスク: claim → execute → persist（record_result）または remove
//! 4. join_next で全タスクの結果を集め、失敗を AggregateError にまとめる
//!
//! # 重要な制約
//! - 1 つのレコードの失敗で他のタスクを止めない（fail-fast しない）
//! - 実行失敗したレコードは locking = true のまま残る（自動リトライなし）
//! - キャンセルは watch チャネルで伝える。claim 済みのレコードは locked のまま
//! - claim 時に別のパスがレコードを削除済みなら Skipped として扱う

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;

use crate::domain::{
    AggregateError, DispatchError, PassError, RecordState, RequestId, ScheduledRequest, timestamp,
};
use crate::observability::PassSummary;
use crate::ports::{Claim, Clock, RequestExecutor, RequestStore};

pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Scheduled request dispatch engine.
///
/// Build one with [`DispatcherBuilder`](super::DispatcherBuilder).
pub struct Dispatcher {
    store: Arc<dyn RequestStore>,
    executor: Arc<dyn RequestExecutor>,
    clock: Arc<dyn Clock>,
    max_concurrency: usize,
}

/// A receiver that never signals cancellation.
pub fn uncancellable() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}

fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow()
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            // sender gone: cancellation can no longer happen
            std::future::pending::<()>().await;
        }
    }
}

/// Drive `fut` unless cancellation fires first.
async fn interruptible<F: Future>(cancel: &mut watch::Receiver<bool>, fut: F) -> Option<F::Output> {
    if is_cancelled(cancel) {
        return None;
    }
    tokio::select! {
        biased;
        _ = cancelled(cancel) => None,
        out = fut => Some(out),
    }
}

impl Dispatcher {
    pub(crate) fn from_parts(
        store: Arc<dyn RequestStore>,
        executor: Arc<dyn RequestExecutor>,
        clock: Arc<dyn Clock>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            store,
            executor,
            clock,
            max_concurrency,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run one pass at the clock's current time.
    pub async fn run_now(&self, cancel: watch::Receiver<bool>) -> Result<PassSummary, PassError> {
        let now = self.clock.now();
        self.run(now, cancel).await
    }

    /// Run one pass: every record due at `now` is claimed, executed and finalized.
    ///
    /// Returns `Ok` only if no record failed. A failing due query aborts the pass
    /// before anything is claimed.
    pub async fn run(
        &self,
        now: DateTime<Utc>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<PassSummary, PassError> {
        let now = timestamp::truncate(now);
        tracing::info!(now = %timestamp::format(&now), "dispatch pass started");

        let due = interruptible(&mut cancel, self.store.query_due(now))
            .await
            .ok_or(PassError::Cancelled)?
            .map_err(|err| {
                tracing::error!(error = %err, "due query failed");
                PassError::Query(err)
            })?;

        let mut summary = PassSummary::new(due.len());
        if due.is_empty() {
            tracing::info!("no due requests");
            return Ok(summary);
        }

        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        for request in due {
            let task = RecordTask {
                store: Arc::clone(&self.store),
                executor: Arc::clone(&self.executor),
                now,
                cancel: cancel.clone(),
            };
            let permits = Arc::clone(&permits);
            tasks.spawn(task.run(request, permits));
        }

        let mut errors = AggregateError::new();
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|join_err| Err(DispatchError::Panicked(join_err.to_string())));
            match outcome {
                Ok(state) => summary.observe(state),
                Err(err) => {
                    tracing::warn!(
                        id = err.id().map(RequestId::as_str).unwrap_or("-"),
                        state = %err.state(),
                        error = %err,
                        "scheduled request failed"
                    );
                    summary.observe(err.state());
                    errors.push(err);
                }
            }
        }

        tracing::info!(
            due = summary.due,
            persisted = summary.persisted,
            removed = summary.removed,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled = summary.cancelled,
            settled = summary.settled(),
            "dispatch pass finished"
        );

        if errors.is_empty() {
            Ok(summary)
        } else {
            Err(PassError::Records { errors, summary })
        }
    }
}

/// Everything one spawned task needs.
struct RecordTask {
    store: Arc<dyn RequestStore>,
    executor: Arc<dyn RequestExecutor>,
    now: DateTime<Utc>,
    cancel: watch::Receiver<bool>,
}

impl RecordTask {
    async fn run(
        mut self,
        request: ScheduledRequest,
        permits: Arc<Semaphore>,
    ) -> Result<RecordState, DispatchError> {
        let permit = interruptible(&mut self.cancel, permits.acquire_owned())
            .await
            .ok_or_else(|| DispatchError::Cancelled {
                id: request.id.clone(),
                stage: "waiting for a slot",
            })?;
        // the semaphore is never closed; a closed one just means no ceiling
        let _permit = permit.ok();
        self.process_one(request).await
    }

    /// claim → execute → finalize for one record.
    async fn process_one(mut self, request: ScheduledRequest) -> Result<RecordState, DispatchError> {
        let id = request.id.clone();
        let cancelled_at = |stage: &'static str| DispatchError::Cancelled {
            id: request.id.clone(),
            stage,
        };

        let claimed = interruptible(&mut self.cancel, self.store.claim(&id))
            .await
            .ok_or_else(|| cancelled_at("claiming"))?;
        let claim = match claimed {
            Ok(claim) => claim,
            // another pass claimed, executed and removed it after our due query
            Err(err) if err.is_not_found() => {
                tracing::debug!(%id, "removed by another pass, skipping");
                return Ok(RecordState::Skipped);
            }
            Err(source) => return Err(DispatchError::Claim { id, source }),
        };
        if claim == Claim::AlreadyClaimed {
            tracing::debug!(%id, "claimed by another pass, skipping");
            return Ok(RecordState::Skipped);
        }
        tracing::debug!(%id, method = %request.method, url = %request.url, "claimed");

        let executed = interruptible(
            &mut self.cancel,
            self.executor.execute(
                &request.method,
                &request.url,
                &request.headers,
                &request.payload,
            ),
        )
        .await
        .ok_or_else(|| cancelled_at("executing"))?;

        let response = match executed {
            Ok(response) => response,
            Err(source) => {
                // recorded even when cancelled, so the reason is not lost
                let reason = source.to_string();
                let record_failure = self.store.record_failure(&id, &reason).await.err();
                return Err(DispatchError::Execute {
                    id,
                    source,
                    record_failure,
                });
            }
        };
        tracing::debug!(%id, code = response.code, "executed");

        let (finalize, state) = if request.persistent_store {
            (
                interruptible(
                    &mut self.cancel,
                    self.store.record_result(&id, &response, self.now),
                )
                .await,
                RecordState::Persisted,
            )
        } else {
            (
                interruptible(&mut self.cancel, self.store.remove(&id)).await,
                RecordState::Removed,
            )
        };
        finalize
            .ok_or_else(|| cancelled_at("finalizing"))?
            .map_err(|source| DispatchError::Finalize {
                id: id.clone(),
                source,
            })?;

        tracing::debug!(%id, %state, "finalized");
        Ok(state)
    }
}
