//! 错误类型与错误分类
//!
//! ExplainError 在客户端与重试层之间传递；到编排器边界时折叠为 ErrorKind，
//! 作为 Failed 状态的数据供界面展示，而不是向外抛出。

use serde::Serialize;
use thiserror::Error;

/// 讲解流程中的错误（校验、远端失败、重试耗尽）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExplainError {
    /// 请求发出前就被拒绝（如空文本），不会算作远端失败
    #[error("Validation error: {0}")]
    Validation(String),

    /// 单次请求的传输错误或服务端错误
    #[error("Remote failure: {0}")]
    RemoteFailure(String),

    /// 重试次数用尽，携带最后一次失败
    #[error("Exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl ExplainError {
    pub fn remote(msg: impl Into<String>) -> Self {
        ExplainError::RemoteFailure(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ExplainError::Validation(_) => ErrorKind::Validation,
            ExplainError::RemoteFailure(_) => ErrorKind::RemoteFailure,
            ExplainError::Exhausted { .. } => ErrorKind::Exhausted,
        }
    }
}

impl From<reqwest::Error> for ExplainError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ExplainError::RemoteFailure(format!("Request timed out: {e}"))
        } else {
            ExplainError::RemoteFailure(format!("Request failed: {e}"))
        }
    }
}

/// Failed 状态携带的错误分类，每类对应一条可展示的提示
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Validation,
    RemoteFailure,
    Exhausted,
}

impl ErrorKind {
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "Please enter some text to explain.",
            ErrorKind::RemoteFailure => {
                "An error occurred while fetching the explanation. Please try again."
            }
            ErrorKind::Exhausted => "Failed to load arXiv papers. Please try again later.",
        }
    }
}
