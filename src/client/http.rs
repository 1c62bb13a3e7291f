//! HTTP 讲解客户端
//!
//! 所有请求都 POST 到同一个端点，按 action 区分 explain / arxiv；单次请求超时由配置决定。
//! 非 2xx 状态、传输错误与无法解析的响应体都映射为 RemoteFailure。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::client::wire::{parse_explain_response, parse_paper_list, ApiRequest};
use crate::client::ExplainClient;
use crate::config::ApiSection;
use crate::core::ExplainError;
use crate::model::{ExplanationResult, Level, Paper};

/// 错误信息中保留的响应体最大字符数
const MAX_ERROR_BODY_CHARS: usize = 200;

pub struct HttpExplainClient {
    client: Client,
    endpoint: String,
}

impl HttpExplainClient {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .user_agent(concat!("explainer/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn from_config(api: &ApiSection) -> Self {
        Self::new(api.endpoint.clone(), api.timeout_secs)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, request: &ApiRequest<'_>) -> Result<String, ExplainError> {
        tracing::debug!("POST {} action={:?}", self.endpoint, request.action);
        let resp = self.client.post(&self.endpoint).json(request).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            let snippet: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(ExplainError::remote(format!("HTTP {status}: {snippet}")));
        }
        Ok(body)
    }
}

#[async_trait]
impl ExplainClient for HttpExplainClient {
    async fn explain(&self, text: &str, level: Level) -> Result<ExplanationResult, ExplainError> {
        if text.trim().is_empty() {
            return Err(ExplainError::Validation("Text is required".to_string()));
        }
        let body = self.post(&ApiRequest::explain(text, level)).await?;
        parse_explain_response(&body)
    }

    async fn list_subjects(&self) -> Result<Vec<Paper>, ExplainError> {
        let body = self.post(&ApiRequest::list_subjects()).await?;
        parse_paper_list(&body)
    }
}
