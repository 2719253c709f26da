//! State - 1 パス内でレコードが行き着く最終状態
//!
//! # 状態遷移（due → claim → execute → finalize）
//! - claim → 実行 → Persisted（persistent_store = true）
//! - claim → 実行 → Removed（persistent_store = false）
//! - claim の書き込み失敗 → ClaimFailed（実行しない）
//! - 別のパスが先に claim した、または既に削除した → Skipped
//! - 実行失敗 → ExecutionFailed（locking = true のまま、手動 unlock 待ち）
//! - 結果の保存か削除に失敗 → FinalizeFailed
//! - どこからでも → Cancelled（claim 済みなら locking = true のまま）
//!
//! エンジン内に Unlock 遷移はありません。

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Executed; result and execution time stored.
    Persisted,

    /// Executed; record deleted.
    Removed,

    /// Another pass claimed the record first; not executed.
    Skipped,

    ClaimFailed,

    ExecutionFailed,

    /// Executed, but storing the result or deleting the record failed.
    FinalizeFailed,

    Cancelled,
}

impl RecordState {
    /// Does this state make the pass fail?
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            RecordState::ClaimFailed
                | RecordState::ExecutionFailed
                | RecordState::FinalizeFailed
                | RecordState::Cancelled
        )
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordState::Persisted => "persisted",
            RecordState::Removed => "removed",
            RecordState::Skipped => "skipped",
            RecordState::ClaimFailed => "claim_failed",
            RecordState::ExecutionFailed => "execution_failed",
            RecordState::FinalizeFailed => "finalize_failed",
            RecordState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
