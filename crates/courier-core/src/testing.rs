//! Test doubles shared by the unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ExecuteError, RequestId, Response, ScheduledRequest, StoreError, StoreOp, timestamp};
use crate::impls::InMemoryRequestStore;
use crate::ports::{Claim, RequestExecutor, RequestStore};

/// Unlocked, non-persistent `GET /<id>` due at `effective_after`.
pub fn request(id: &str, effective_after: DateTime<Utc>) -> ScheduledRequest {
    let effective_after = timestamp::truncate(effective_after);
    ScheduledRequest {
        id: RequestId::new(id),
        created_at: effective_after,
        effective_after,
        locking: false,
        failure_reason: None,
        method: "GET".to_string(),
        url: format!("/{id}"),
        payload: String::new(),
        headers: BTreeMap::new(),
        persistent_store: false,
        execution_result: None,
        executed_at: None,
    }
}

/// Executor that answers from a script and records every call by URL.
pub struct ScriptedExecutor {
    response: Response,
    failures: HashMap<String, String>,
    panics: HashSet<String>,
    delay: Option<Duration>,
    hang: bool,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            response: Response::new(200, "ok"),
            failures: HashMap::new(),
            panics: HashSet::new(),
            delay: None,
            hang: false,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn responding(mut self, response: Response) -> Self {
        self.response = response;
        self
    }

    /// Transport failure with `message` for `url`.
    pub fn failing(mut self, url: &str, message: &str) -> Self {
        self.failures.insert(url.to_string(), message.to_string());
        self
    }

    pub fn panicking(mut self, url: &str) -> Self {
        self.panics.insert(url.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Never answer.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        method: &str,
        url: &str,
        _headers: &BTreeMap<String, String>,
        _body: &str,
    ) -> Result<Response, ExecuteError> {
        self.calls.lock().unwrap().push(url.to_string());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if self.panics.contains(url) {
            panic!("scripted panic for {url}");
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.failures.get(url) {
            Some(message) => Err(ExecuteError::Transport {
                method: method.to_string(),
                url: url.to_string(),
                source: message.clone().into(),
            }),
            None => Ok(self.response.clone()),
        }
    }
}

/// In-memory store with injectable failures and a call log.
pub struct FaultyStore {
    inner: InMemoryRequestStore,
    failures: HashSet<(StoreOp, String)>,
    fail_query: bool,
    lose_claims: bool,
    vanish_on_claim: bool,
    calls: Mutex<Vec<(StoreOp, String)>>,
}

impl FaultyStore {
    pub fn new(inner: InMemoryRequestStore) -> Self {
        Self {
            inner,
            failures: HashSet::new(),
            fail_query: false,
            lose_claims: false,
            vanish_on_claim: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self, op: StoreOp, id: &str) -> Self {
        self.failures.insert((op, id.to_string()));
        self
    }

    pub fn failing_query(mut self) -> Self {
        self.fail_query = true;
        self
    }

    /// Every claim reports that another pass got there first.
    pub fn losing_claims(mut self) -> Self {
        self.lose_claims = true;
        self
    }

    /// Every claim finds the record already deleted.
    pub fn vanishing_on_claim(mut self) -> Self {
        self.vanish_on_claim = true;
        self
    }

    pub fn inner(&self) -> &InMemoryRequestStore {
        &self.inner
    }

    /// Ids passed to `op`, in call order.
    pub fn calls_for(&self, op: StoreOp) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(called, _)| *called == op)
            .map(|(_, id)| id.clone())
            .collect()
    }

    fn check(&self, op: StoreOp, id: &RequestId) -> Result<(), StoreError> {
        self.calls.lock().unwrap().push((op, id.to_string()));
        if self.failures.contains(&(op, id.to_string())) {
            return Err(StoreError::backend(op, Some(id), "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl RequestStore for FaultyStore {
    async fn query_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledRequest>, StoreError> {
        if self.fail_query {
            return Err(StoreError::backend(StoreOp::QueryDue, None, "injected failure"));
        }
        self.inner.query_due(now).await
    }

    async fn get(&self, id: &RequestId) -> Result<ScheduledRequest, StoreError> {
        self.check(StoreOp::Get, id)?;
        self.inner.get(id).await
    }

    async fn create(&self, request: &ScheduledRequest) -> Result<(), StoreError> {
        self.check(StoreOp::Create, &request.id)?;
        self.inner.create(request).await
    }

    async fn set_locking(&self, id: &RequestId, locking: bool) -> Result<(), StoreError> {
        self.check(StoreOp::SetLocking, id)?;
        self.inner.set_locking(id, locking).await
    }

    async fn claim(&self, id: &RequestId) -> Result<Claim, StoreError> {
        self.check(StoreOp::Claim, id)?;
        if self.lose_claims {
            return Ok(Claim::AlreadyClaimed);
        }
        if self.vanish_on_claim {
            return Err(StoreError::NotFound { id: id.clone() });
        }
        self.inner.claim(id).await
    }

    async fn record_result(
        &self,
        id: &RequestId,
        response: &Response,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check(StoreOp::RecordResult, id)?;
        self.inner.record_result(id, response, now).await
    }

    async fn record_failure(&self, id: &RequestId, reason: &str) -> Result<(), StoreError> {
        self.check(StoreOp::RecordFailure, id)?;
        self.inner.record_failure(id, reason).await
    }

    async fn remove(&self, id: &RequestId) -> Result<(), StoreError> {
        self.check(StoreOp::Remove, id)?;
        self.inner.remove(id).await
    }
}
