//! Config - 環境変数からの設定読み込み
//!
//! | 変数 | 必須 | 既定値 |
//! |------|------|--------|
//! | `TABLE_NAME` | yes | - |
//! | `BASE_URL` | no | - |
//! | `API_TOKEN` | no | - |
//! | `USER_AGENT` | no | - |
//! | `COURIER_DATABASE` | no | `courier.db` |
//! | `COURIER_MAX_CONCURRENCY` | no | 16 |
//! | `COURIER_REQUEST_TIMEOUT_SECS` | no | 30 |
//!
//! 空文字は未設定として扱います。

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

use crate::impls::{HttpExecutorConfig, is_valid_table_name};

use super::dispatcher::DEFAULT_MAX_CONCURRENCY;

pub const TABLE_NAME: &str = "TABLE_NAME";
pub const BASE_URL: &str = "BASE_URL";
pub const API_TOKEN: &str = "API_TOKEN";
pub const USER_AGENT: &str = "USER_AGENT";
pub const DATABASE: &str = "COURIER_DATABASE";
pub const MAX_CONCURRENCY: &str = "COURIER_MAX_CONCURRENCY";
pub const REQUEST_TIMEOUT_SECS: &str = "COURIER_REQUEST_TIMEOUT_SECS";

pub const DEFAULT_DATABASE: &str = "courier.db";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub table_name: String,
    pub base_url: Option<Url>,
    pub api_token: Option<String>,
    pub user_agent: Option<String>,
    pub database: PathBuf,
    pub max_concurrency: usize,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let table_name = get(TABLE_NAME).ok_or(ConfigError::Missing(TABLE_NAME))?;
        let table_name = parse_table_name(table_name)?;

        let base_url = get(BASE_URL).map(parse_base_url).transpose()?;

        let max_concurrency = match get(MAX_CONCURRENCY) {
            Some(raw) => parse_positive(MAX_CONCURRENCY, raw)?,
            None => DEFAULT_MAX_CONCURRENCY,
        };
        let request_timeout = match get(REQUEST_TIMEOUT_SECS) {
            Some(raw) => Duration::from_secs(parse_positive(REQUEST_TIMEOUT_SECS, raw)? as u64),
            None => DEFAULT_REQUEST_TIMEOUT,
        };

        Ok(Self {
            table_name,
            base_url,
            api_token: get(API_TOKEN),
            user_agent: get(USER_AGENT),
            database: get(DATABASE)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            max_concurrency,
            request_timeout,
        })
    }

    pub fn executor_config(&self) -> HttpExecutorConfig {
        HttpExecutorConfig {
            base_url: self.base_url.clone(),
            token: self.api_token.clone(),
            user_agent: self.user_agent.clone(),
            timeout: Some(self.request_timeout),
        }
    }
}

pub fn parse_table_name(raw: String) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if is_valid_table_name(trimmed) {
        Ok(trimmed.to_string())
    } else {
        Err(ConfigError::Invalid {
            key: TABLE_NAME,
            value: raw,
            reason: "expected [A-Za-z_][A-Za-z0-9_]*".to_string(),
        })
    }
}

pub fn parse_base_url(raw: String) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
        key: BASE_URL,
        value: raw,
        reason: e.to_string(),
    })
}

fn parse_positive(key: &'static str, raw: String) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "must be at least 1".to_string(),
        }),
        Err(e) => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}
