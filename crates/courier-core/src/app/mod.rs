//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **Dispatcher**: 1 回のディスパッチパス（query → claim → execute → finalize）
//! - **DispatcherBuilder**: Dispatcher の構築とワイヤリング
//! - **Admin**: 作成・参照・ロック/アンロック
//! - **Config**: 環境変数からの設定

pub mod admin;
pub mod builder;
pub mod config;
pub mod dispatcher;

// 主要な型を再エクスポート
pub use self::admin::{Admin, AdminError};
pub use self::builder::{BuildError, DispatcherBuilder};
pub use self::config::{Config, ConfigError};
pub use self::dispatcher::{DEFAULT_MAX_CONCURRENCY, Dispatcher, uncancellable};
