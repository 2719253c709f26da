//! HttpExecutor - reqwest によるリクエスト実行
//!
//! # 実装詳細
//! - 相対 URL は base_url に対して解決、絶対 URL はそのまま
//! - 呼び出し元のヘッダを先に設定し、User-Agent と Authorization で上書き
//! - 4xx / 5xx もエラーではなく `Response` として返す
//! - タイムアウトは Client 単位（設定値）

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Method, Url};

use crate::domain::{ExecuteError, Response};
use crate::ports::RequestExecutor;

#[derive(Debug, Clone, Default)]
pub struct HttpExecutorConfig {
    /// Base for relative record URLs.
    pub base_url: Option<Url>,
    /// Sent as `Authorization: Bearer <token>`.
    pub token: Option<String>,
    pub user_agent: Option<String>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    config: HttpExecutorConfig,
}

impl HttpExecutor {
    pub fn new(config: HttpExecutorConfig) -> reqwest::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    fn resolve(&self, raw: &str) -> Result<Url, String> {
        match &self.config.base_url {
            Some(base) => base.join(raw).map_err(|e| e.to_string()),
            None => Url::parse(raw).map_err(|e| format!("{e} (no base url configured)")),
        }
    }

    fn build_headers(&self, headers: &BTreeMap<String, String>) -> Result<HeaderMap, String> {
        let mut map = HeaderMap::new();
        for (key, value) in headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| format!("header name {key:?}: {e}"))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| format!("header {key} value: {e}"))?;
            map.insert(name, value);
        }
        if let Some(user_agent) = &self.config.user_agent {
            let value = HeaderValue::from_str(user_agent)
                .map_err(|e| format!("user agent: {e}"))?;
            map.insert(USER_AGENT, value);
        }
        if let Some(token) = &self.config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| format!("authorization: {e}"))?;
            value.set_sensitive(true);
            map.insert(AUTHORIZATION, value);
        }
        Ok(map)
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn execute(
        &self,
        method: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &str,
    ) -> Result<Response, ExecuteError> {
        let invalid = |reason: String| ExecuteError::InvalidRequest {
            method: method.to_string(),
            url: url.to_string(),
            reason,
        };

        let http_method = Method::from_bytes(method.as_bytes())
            .map_err(|e| invalid(format!("method: {e}")))?;
        let target = self.resolve(url).map_err(|e| invalid(format!("url: {e}")))?;
        let header_map = self.build_headers(headers).map_err(invalid)?;

        tracing::debug!(%method, url = %target, "executing request");

        let mut request = self.client.request(http_method, target.clone()).headers(header_map);
        if !body.is_empty() {
            request = request.body(body.to_string());
        }

        let response = request.send().await.map_err(|e| ExecuteError::Transport {
            method: method.to_string(),
            url: target.to_string(),
            source: Box::new(e),
        })?;

        let code = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| ExecuteError::Read {
            url: target.to_string(),
            source: Box::new(e),
        })?;
        if std::str::from_utf8(&bytes).is_err() {
            tracing::warn!(
                url = %target,
                code,
                len = bytes.len(),
                "response body is not valid UTF-8, invalid bytes replaced"
            );
        }
        let body = String::from_utf8_lossy(&bytes).into_owned();

        tracing::debug!(%method, url = %target, code, "request finished");
        Ok(Response { code, body })
    }
}
