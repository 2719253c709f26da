//! Input specs (what the administrative surface submits).
//!
//! `RequestSpec` はまだ保存されていないリクエストの記述です。
//! `into_request()` で検証しつつ `ScheduledRequest` に変換します。
//! `effective_after >= created_at` はここで保証され、ディスパッチャは検査しません。

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::errors::ValidationError;
use super::request::ScheduledRequest;
use super::{RequestId, timestamp};

/// Methods accepted at creation time.
pub const SUPPORTED_METHODS: [&str; 4] = ["GET", "PUT", "POST", "DELETE"];

/// Default freeze duration before a created request becomes due.
pub const DEFAULT_FREEZE: Duration = Duration::from_secs(60 * 60);

/// When a new request becomes eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Relative to the creation time.
    After(Duration),
    /// Absolute point in time.
    At(DateTime<Utc>),
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::After(DEFAULT_FREEZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    /// Explicit id; generated when `None`.
    pub id: Option<RequestId>,
    pub method: String,
    pub url: String,
    pub payload: String,
    pub headers: BTreeMap<String, String>,
    pub persistent_store: bool,
    pub schedule: Schedule,
}

impl RequestSpec {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            method: method.into(),
            url: url.into(),
            payload: String::new(),
            headers: BTreeMap::new(),
            persistent_store: false,
            schedule: Schedule::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<RequestId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn persistent(mut self, persistent_store: bool) -> Self {
        self.persistent_store = persistent_store;
        self
    }

    pub fn after(mut self, freeze: Duration) -> Self {
        self.schedule = Schedule::After(freeze);
        self
    }

    pub fn at(mut self, effective_after: DateTime<Utc>) -> Self {
        self.schedule = Schedule::At(effective_after);
        self
    }

    /// Validate and build the stored record.
    ///
    /// `id` is used only when `self.id` is `None`. Timestamps are truncated
    /// to whole seconds, matching the persisted encoding.
    pub fn into_request(
        self,
        id: RequestId,
        now: DateTime<Utc>,
    ) -> Result<ScheduledRequest, ValidationError> {
        let id = self.id.unwrap_or(id);
        if id.is_empty() {
            return Err(ValidationError::EmptyId);
        }

        let method = self.method.trim().to_ascii_uppercase();
        if !SUPPORTED_METHODS.contains(&method.as_str()) {
            return Err(ValidationError::UnsupportedMethod(self.method));
        }

        let url = self.url.trim().to_string();
        if url.is_empty() {
            return Err(ValidationError::EmptyUrl);
        }

        let created_at = timestamp::truncate(now);
        let effective_after = match self.schedule {
            Schedule::After(original) => {
                let freeze = chrono::Duration::from_std(original)
                    .map_err(|_| ValidationError::FreezeOutOfRange(original))?;
                let due = now
                    .checked_add_signed(freeze)
                    .ok_or(ValidationError::FreezeOutOfRange(original))?;
                timestamp::truncate(due)
            }
            Schedule::At(at) => timestamp::truncate(at),
        };
        for (field, at) in [("created_at", &created_at), ("effective_after", &effective_after)] {
            if !timestamp::is_encodable(at) {
                return Err(ValidationError::TimestampOutOfRange {
                    field,
                    value: at.to_rfc3339(),
                });
            }
        }
        if effective_after < created_at {
            return Err(ValidationError::EffectiveBeforeCreation {
                effective_after: timestamp::format(&effective_after),
                created_at: timestamp::format(&created_at),
            });
        }

        Ok(ScheduledRequest {
            id,
            created_at,
            effective_after,
            locking: false,
            failure_reason: None,
            method,
            url,
            payload: self.payload,
            headers: self.headers,
            persistent_store: self.persistent_store,
            execution_result: None,
            executed_at: None,
        })
    }
}

/// Parse a comma separated `key:value` list (e.g. `Accept:application/json,X-Trace:1`).
///
/// Only the first `:` splits, so values may contain colons.
pub fn parse_header_list(raw: &str) -> Result<BTreeMap<String, String>, ValidationError> {
    let mut headers = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((key, value)) = entry.split_once(':') else {
            return Err(ValidationError::MalformedHeader(entry.to_string()));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ValidationError::MalformedHeader(entry.to_string()));
        }
        headers.insert(key.to_string(), value.trim().to_string());
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + chrono::Duration::milliseconds(250)
    }

    #[test]
    fn default_schedule_freezes_for_an_hour() {
        let req = RequestSpec::new("get", "/reports")
            .into_request(RequestId::new("r-1"), now())
            .unwrap();

        assert_eq!(req.method, "GET");
        assert!(!req.locking);
        assert_eq!(timestamp::format(&req.created_at), "2024-01-01T12:00:00Z");
        assert_eq!(timestamp::format(&req.effective_after), "2024-01-01T13:00:00Z");
    }

    #[test]
    fn explicit_id_wins_over_generated() {
        let req = RequestSpec::new("POST", "/hook")
            .with_id("mine")
            .into_request(RequestId::new("generated"), now())
            .unwrap();
        assert_eq!(req.id.as_str(), "mine");
    }

    #[rstest]
    #[case::get("GET")]
    #[case::put("put")]
    #[case::post("Post")]
    #[case::delete("DELETE")]
    fn supported_methods_are_accepted(#[case] method: &str) {
        let req = RequestSpec::new(method, "/x")
            .into_request(RequestId::new("r"), now())
            .unwrap();
        assert_eq!(req.method, method.to_ascii_uppercase());
    }

    #[rstest]
    #[case::patch("PATCH")]
    #[case::empty("")]
    #[case::garbage("FETCH")]
    fn unsupported_methods_are_rejected(#[case] method: &str) {
        let err = RequestSpec::new(method, "/x")
            .into_request(RequestId::new("r"), now())
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedMethod(_)));
    }

    #[test]
    fn empty_url_is_rejected() {
        let err = RequestSpec::new("GET", "  ")
            .into_request(RequestId::new("r"), now())
            .unwrap_err();
        assert!(matches!(err, ValidationError::EmptyUrl));
    }

    #[test]
    fn empty_id_is_rejected() {
        let err = RequestSpec::new("GET", "/x")
            .into_request(RequestId::new(""), now())
            .unwrap_err();
        assert!(matches!(err, ValidationError::EmptyId));
    }

    #[test]
    fn effective_time_before_creation_is_rejected() {
        let err = RequestSpec::new("GET", "/x")
            .at(now() - chrono::Duration::minutes(5))
            .into_request(RequestId::new("r"), now())
            .unwrap_err();
        assert!(matches!(err, ValidationError::EffectiveBeforeCreation { .. }));
    }

    #[test]
    fn effective_time_in_same_second_is_accepted() {
        let req = RequestSpec::new("GET", "/x")
            .at(now() - chrono::Duration::milliseconds(100))
            .into_request(RequestId::new("r"), now())
            .unwrap();
        assert_eq!(req.effective_after, req.created_at);
    }

    #[rstest]
    #[case::freeze_past_year_9999(Schedule::After(Duration::from_secs(300_000_000_000)))]
    #[case::at_year_10000(Schedule::At(Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap()))]
    fn effective_time_past_year_9999_is_rejected(#[case] schedule: Schedule) {
        let mut spec = RequestSpec::new("GET", "/x");
        spec.schedule = schedule;
        let err = spec.into_request(RequestId::new("r"), now()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::TimestampOutOfRange { field: "effective_after", .. }
        ));
    }

    #[test]
    fn last_encodable_second_is_accepted() {
        let req = RequestSpec::new("GET", "/x")
            .at(Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap())
            .into_request(RequestId::new("r"), now())
            .unwrap();
        assert_eq!(timestamp::format(&req.effective_after), "9999-12-31T23:59:59Z");
    }

    #[test]
    fn freeze_beyond_calendar_range_is_an_error() {
        let freeze = Duration::from_secs(10_000_000_000_000);
        let err = RequestSpec::new("GET", "/x")
            .after(freeze)
            .into_request(RequestId::new("r"), now())
            .unwrap_err();
        assert!(matches!(err, ValidationError::FreezeOutOfRange(d) if d == freeze));
    }

    #[test]
    fn header_list_parsing() {
        let headers =
            parse_header_list("Accept:application/json, X-Callback: http://cb.local:8080/x").unwrap();
        assert_eq!(headers["Accept"], "application/json");
        assert_eq!(headers["X-Callback"], "http://cb.local:8080/x");
        assert!(parse_header_list("").unwrap().is_empty());
    }

    #[rstest]
    #[case::no_colon("Accept")]
    #[case::empty_key(":value")]
    fn malformed_header_entries(#[case] raw: &str) {
        assert!(matches!(
            parse_header_list(raw),
            Err(ValidationError::MalformedHeader(_))
        ));
    }
}
