//! DispatcherBuilder - Dispatcher の構築とワイヤリング
//!
//! # 設計
//! - Builder パターンで store / executor / clock / 同時実行数を受け取る
//! - 起動時検証（Fail-fast 設計）: 必須の部品が欠けていれば build() が BuildError を返す
//! - clock を省略すると SystemClock を使う

use std::sync::Arc;

use crate::ports::{Clock, RequestExecutor, RequestStore, SystemClock};

use super::dispatcher::{DEFAULT_MAX_CONCURRENCY, Dispatcher};

/// DispatcherBuilder は Dispatcher を構築
///
/// # 使用例
/// ```ignore
/// let dispatcher = DispatcherBuilder::new()
///     .store(Arc::new(SqliteRequestStore::open("courier.db", "scheduled_requests")?))
///     .executor(Arc::new(HttpExecutor::new(config)?))
///     .max_concurrency(8)
///     .build()?;
/// ```
pub struct DispatcherBuilder {
    store: Option<Arc<dyn RequestStore>>,
    executor: Option<Arc<dyn RequestExecutor>>,
    clock: Option<Arc<dyn Clock>>,
    max_concurrency: usize,
}

/// BuildError は Dispatcher 構築時のエラー
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("Missing request store. Call store() before build().")]
    MissingStore,

    #[error("Missing request executor. Call executor() before build().")]
    MissingExecutor,

    #[error("max_concurrency must be at least 1")]
    ZeroConcurrency,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            executor: None,
            clock: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn store(mut self, store: Arc<dyn RequestStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn RequestExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Upper bound on records executed at the same time within one pass.
    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// # 検証
    /// - store と executor が設定されているか
    /// - max_concurrency >= 1 か
    pub fn build(self) -> Result<Dispatcher, BuildError> {
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let executor = self.executor.ok_or(BuildError::MissingExecutor)?;
        if self.max_concurrency == 0 {
            return Err(BuildError::ZeroConcurrency);
        }
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        Ok(Dispatcher::from_parts(
            store,
            executor,
            clock,
            self.max_concurrency,
        ))
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
