//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（SQLite, HTTP など）へのインターフェースを提供し、
//! 実装の詳細を隠蔽します。

pub mod clock;
pub mod executor;
pub mod id_generator;
pub mod request_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::executor::RequestExecutor;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::request_store::{Claim, RequestStore};
