//! Domain identifiers.
//!
//! # RequestId
//! ScheduledRequest の ID は文字列です。管理コマンドから明示的に渡されることもあれば、
//! `IdGenerator` が ULID ベースで生成することもあります（`req-<ULID>`）。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of a scheduled request (primary key in the store).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// 生成 ID のプレフィックス
    pub const PREFIX: &'static str = "req-";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// ULID から `req-<ULID>` 形式の ID を作成
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(format!("{}{}", Self::PREFIX, ulid))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
