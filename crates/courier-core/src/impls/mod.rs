//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryRequestStore**: 開発・テスト用のストア
//! - **SqliteRequestStore**: 永続ストア（rusqlite）
//! - **HttpExecutor**: reqwest による RequestExecutor

pub mod http_executor;
pub mod inmem_store;
pub mod sqlite_store;

// 主要な型を再エクスポート
pub use self::http_executor::{HttpExecutor, HttpExecutorConfig};
pub use self::inmem_store::InMemoryRequestStore;
pub use self::sqlite_store::{SqliteRequestStore, is_valid_table_name};
