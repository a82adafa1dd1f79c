//! 打码服务客户端 - 业务能力层
//!
//! 对接外部打码服务的 HTTP 客户端。请求/应答走 JSON：
//! 提交 `{key, method, pageurl}`，应答 `{status, request}`，
//! `status == 1` 时 `request` 即解出的令牌。服务端报错一律
//! 映射为 [`SolverError`]，上层按解决失败处理。

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::captcha::detector::CaptchaKind;
use crate::captcha::handler::{CaptchaSolution, CaptchaSolverProvider};
use crate::error::SolverError;

/// HTTP 打码客户端
pub struct HttpSolver {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpSolver {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl CaptchaSolverProvider for HttpSolver {
    async fn solve(
        &self,
        kind: CaptchaKind,
        page_url: &str,
    ) -> Result<CaptchaSolution, SolverError> {
        let endpoint = format!("{}/solve", self.api_url.trim_end_matches('/'));
        debug!("请求打码服务: {} ({})", endpoint, kind);

        let response = self
            .client
            .post(&endpoint)
            .json(&json!({
                "key": self.api_key,
                "method": kind.label(),
                "pageurl": page_url,
            }))
            .send()
            .await
            .map_err(|e| SolverError::RequestFailed {
                endpoint: endpoint.clone(),
                source: Box::new(e),
            })?;

        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| SolverError::RequestFailed {
                    endpoint: endpoint.clone(),
                    source: Box::new(e),
                })?;

        if body["status"].as_u64() != Some(1) {
            return Err(SolverError::Rejected {
                message: body["request"]
                    .as_str()
                    .unwrap_or("unknown provider error")
                    .to_string(),
            });
        }

        match body["request"].as_str() {
            Some(token) if !token.is_empty() => Ok(CaptchaSolution {
                token: token.to_string(),
            }),
            _ => Err(SolverError::Rejected {
                message: "provider returned empty token".to_string(),
            }),
        }
    }
}
