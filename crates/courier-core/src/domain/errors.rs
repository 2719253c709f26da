//! Errors - エラー型と分類
//!
//! # 分類
//! - StoreError: ストア（SQLite / InMemory）の読み書き失敗。操作名とレコード ID を持つ
//! - ExecuteError: HTTP 呼び出しの失敗（I/O 前の不正リクエスト / 通信 / ボディ読み取り）
//! - DispatchError: 1 レコード分の失敗（claim / execute / finalize）
//! - AggregateError: 1 パス分の DispatchError の集合
//! - PassError: パス全体の結果（クエリ失敗は致命的、レコード失敗は集約）

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::{RecordState, RequestId};
use crate::observability::PassSummary;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Store operation, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Open,
    QueryDue,
    Get,
    Create,
    SetLocking,
    Claim,
    RecordResult,
    RecordFailure,
    Remove,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOp::Open => "open",
            StoreOp::QueryDue => "query_due",
            StoreOp::Get => "get",
            StoreOp::Create => "create",
            StoreOp::SetLocking => "set_locking",
            StoreOp::Claim => "claim",
            StoreOp::RecordResult => "record_result",
            StoreOp::RecordFailure => "record_failure",
            StoreOp::Remove => "remove",
        };
        f.write_str(name)
    }
}

fn id_suffix(id: &Option<RequestId>) -> String {
    match id {
        Some(id) => format!(" id={id}"),
        None => String::new(),
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("scheduled request not found id={id}")]
    NotFound { id: RequestId },

    #[error("scheduled request already exists id={id}")]
    Duplicate { id: RequestId },

    #[error("store {op} failed{}: {source}", id_suffix(.id))]
    Backend {
        op: StoreOp,
        id: Option<RequestId>,
        #[source]
        source: BoxError,
    },
}

impl StoreError {
    pub fn backend(op: StoreOp, id: Option<&RequestId>, source: impl Into<BoxError>) -> Self {
        StoreError::Backend {
            op,
            id: id.cloned(),
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

#[derive(Debug, Error)]
pub enum ExecuteError {
    /// Method, URL or a header could not be built; nothing was sent.
    #[error("invalid request {method} {url}: {reason}")]
    InvalidRequest {
        method: String,
        url: String,
        reason: String,
    },

    #[error("transport failure {method} {url}: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("read response body {url}: {source}")]
    Read {
        url: String,
        #[source]
        source: BoxError,
    },
}

fn secondary(record_failure: &Option<StoreError>) -> String {
    match record_failure {
        Some(err) => format!("; additionally failed to record failure: {err}"),
        None => String::new(),
    }
}

/// Failure of one record inside a pass.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("claim id={id}: {source}")]
    Claim {
        id: RequestId,
        #[source]
        source: StoreError,
    },

    /// Execution failed. `record_failure` holds the error of the failure-reason
    /// write when that write failed too.
    #[error("execute id={id}: {source}{}", secondary(.record_failure))]
    Execute {
        id: RequestId,
        #[source]
        source: ExecuteError,
        record_failure: Option<StoreError>,
    },

    #[error("finalize id={id}: {source}")]
    Finalize {
        id: RequestId,
        #[source]
        source: StoreError,
    },

    #[error("cancelled id={id} while {stage}")]
    Cancelled { id: RequestId, stage: &'static str },

    #[error("dispatch task panicked: {0}")]
    Panicked(String),
}

impl DispatchError {
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            DispatchError::Claim { id, .. }
            | DispatchError::Execute { id, .. }
            | DispatchError::Finalize { id, .. }
            | DispatchError::Cancelled { id, .. } => Some(id),
            DispatchError::Panicked(_) => None,
        }
    }

    pub fn state(&self) -> RecordState {
        match self {
            DispatchError::Claim { .. } => RecordState::ClaimFailed,
            DispatchError::Execute { .. } | DispatchError::Panicked(_) => {
                RecordState::ExecutionFailed
            }
            DispatchError::Finalize { .. } => RecordState::FinalizeFailed,
            DispatchError::Cancelled { .. } => RecordState::Cancelled,
        }
    }
}

/// Every record-level failure of one pass.
///
/// Each individual message stays recoverable through `errors()` / `messages()`.
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<DispatchError>,
}

impl AggregateError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: DispatchError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[DispatchError] {
        &self.errors
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

impl FromIterator<DispatchError> for AggregateError {
    fn from_iter<I: IntoIterator<Item = DispatchError>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} scheduled request(s) failed", self.errors.len())?;
        for (i, err) in self.errors.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// Outcome of a failed pass.
#[derive(Debug, Error)]
pub enum PassError {
    /// Nothing was dispatched.
    #[error("query due requests: {0}")]
    Query(#[source] StoreError),

    #[error("pass cancelled before dispatch")]
    Cancelled,

    #[error("{errors}")]
    Records {
        errors: AggregateError,
        summary: PassSummary,
    },
}

impl PassError {
    pub fn aggregate(&self) -> Option<&AggregateError> {
        match self {
            PassError::Records { errors, .. } => Some(errors),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("request id must not be empty")]
    EmptyId,

    #[error("unsupported method {0:?} (expected GET, PUT, POST or DELETE)")]
    UnsupportedMethod(String),

    #[error("request url must not be empty")]
    EmptyUrl,

    #[error("effective_after {effective_after} is before created_at {created_at}")]
    EffectiveBeforeCreation {
        effective_after: String,
        created_at: String,
    },

    #[error("freeze duration {0:?} is out of range")]
    FreezeOutOfRange(Duration),

    #[error("{field} {value} is outside years 0000-9999")]
    TimestampOutOfRange { field: &'static str, value: String },

    #[error("malformed header {0:?} (expected key:value)")]
    MalformedHeader(String),
}
