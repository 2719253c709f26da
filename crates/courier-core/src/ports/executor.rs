//! RequestExecutor port - HTTP 呼び出しの抽象化
//!
//! # 実装
//! - `HttpExecutor`（reqwest）

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::{ExecuteError, Response};

/// Performs exactly the HTTP call a record describes.
///
/// Any upstream status code is a successful `Response`; only failures to build,
/// send or read the request are errors. The body is kept as text: bytes that are
/// not valid UTF-8 become U+FFFD, so binary responses are not stored faithfully.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(
        &self,
        method: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &str,
    ) -> Result<Response, ExecuteError>;
}
