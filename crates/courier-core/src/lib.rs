//! courier-core
//!
//! Core building blocks for the Courier scheduled request dispatcher.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, timestamp, request, spec, state, errors）
//! - **ports**: 抽象化レイヤー（RequestStore, RequestExecutor, Clock, IdGenerator）
//! - **impls**: 実装（InMemoryRequestStore, SqliteRequestStore, HttpExecutor）
//! - **app**: アプリケーションロジック（Dispatcher, DispatcherBuilder, Admin, Config）
//! - **observability**: パスごとの集計（PassSummary）

pub mod domain;
pub mod ports;
pub mod impls;
pub mod app;
pub mod observability;

#[cfg(test)]
pub(crate) mod testing;
