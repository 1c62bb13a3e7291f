//! 讲解服务客户端抽象
//!
//! 只负责请求组装与响应解析，没有编排逻辑；失败统一以 ExplainError::RemoteFailure 返回，
//! 重试由调用方（RetryScheduler）负责。

use async_trait::async_trait;

use crate::core::ExplainError;
use crate::model::{ExplanationResult, Level, Paper};

#[async_trait]
pub trait ExplainClient: Send + Sync {
    /// 按层级讲解一段非空文本
    async fn explain(&self, text: &str, level: Level) -> Result<ExplanationResult, ExplainError>;

    /// 获取可供浏览的论文列表
    async fn list_subjects(&self) -> Result<Vec<Paper>, ExplainError>;
}
