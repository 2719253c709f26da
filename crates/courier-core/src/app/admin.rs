//! Admin - 管理操作（作成・参照・ロック/アンロック）
//!
//! ディスパッチャと同じ RequestStore の上で動く薄い層です。
//! 実行に失敗したレコードは locking = true のまま残るので、
//! オペレータは unlock() で次のパスに戻します。

use std::sync::Arc;

use thiserror::Error;

use crate::domain::{RequestId, RequestSpec, ScheduledRequest, StoreError, ValidationError};
use crate::ports::{Clock, IdGenerator, RequestStore};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct Admin {
    store: Arc<dyn RequestStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl Admin {
    pub fn new(
        store: Arc<dyn RequestStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self { store, clock, ids }
    }

    /// Validate `spec`, store it unlocked and return the stored record.
    pub async fn create(&self, spec: RequestSpec) -> Result<ScheduledRequest, AdminError> {
        let id = match &spec.id {
            Some(id) => id.clone(),
            None => self.ids.generate_request_id(),
        };
        let request = spec.into_request(id, self.clock.now())?;
        self.store.create(&request).await?;
        tracing::info!(
            id = %request.id,
            method = %request.method,
            url = %request.url,
            persistent = request.persistent_store,
            "scheduled request created"
        );
        Ok(request)
    }

    pub async fn get(&self, id: &RequestId) -> Result<ScheduledRequest, AdminError> {
        Ok(self.store.get(id).await?)
    }

    /// Records a pass started now would pick up.
    pub async fn list_due(&self) -> Result<Vec<ScheduledRequest>, AdminError> {
        let mut due = self.store.query_due(self.clock.now()).await?;
        due.sort_by(|a, b| {
            a.effective_after
                .cmp(&b.effective_after)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        Ok(due)
    }

    pub async fn lock(&self, id: &RequestId) -> Result<(), AdminError> {
        self.store.set_locking(id, true).await?;
        tracing::info!(%id, "scheduled request locked");
        Ok(())
    }

    /// Release a record so the next pass can pick it up again.
    pub async fn unlock(&self, id: &RequestId) -> Result<(), AdminError> {
        self.store.set_locking(id, false).await?;
        tracing::info!(%id, "scheduled request unlocked");
        Ok(())
    }
}
