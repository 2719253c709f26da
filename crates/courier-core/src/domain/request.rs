use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RequestId;
use super::timestamp;

/// The unit of work: one HTTP call to perform once `effective_after` has passed.
///
/// `locking` has two meanings that external tooling relies on:
/// - the record is claimed and being executed right now, or
/// - a previous execution failed and an operator has to unlock it.
///
/// Both keep the record out of the due query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledRequest {
    pub id: RequestId,

    #[serde(with = "timestamp::text")]
    pub created_at: DateTime<Utc>,

    /// Eligible once the current time reaches this value (second precision).
    #[serde(with = "timestamp::text")]
    pub effective_after: DateTime<Utc>,

    #[serde(default)]
    pub locking: bool,

    /// Last execution error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    pub method: String,

    /// Absolute, or relative to the executor's base URL.
    pub url: String,

    #[serde(default)]
    pub payload: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Keep the record (with its result) after a successful execution.
    #[serde(default)]
    pub persistent_store: bool,

    /// JSON text of the last successful `Response`; persistent records only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<String>,

    #[serde(
        default,
        with = "timestamp::text_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub executed_at: Option<DateTime<Utc>>,
}

impl ScheduledRequest {
    /// Due query predicate: `effective_after <= now AND locking = false`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.locking && timestamp::truncate(self.effective_after) <= timestamp::truncate(now)
    }

    /// Decode the stored execution result.
    pub fn response(&self) -> Option<Result<Response, serde_json::Error>> {
        self.execution_result
            .as_deref()
            .map(serde_json::from_str::<Response>)
    }
}

impl fmt::Display for ScheduledRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={} effective_after={} locking={}",
            self.id,
            timestamp::format(&self.effective_after),
            self.locking
        )
    }
}

/// Normalized outcome of one HTTP call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub code: u16,
    pub body: String,
}

impl Response {
    pub fn new(code: u16, body: impl Into<String>) -> Self {
        Self {
            code,
            body: body.into(),
        }
    }

    /// `{"code":<int>,"body":<string>}`
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code={} body={}", self.code, self.body)
    }
}
