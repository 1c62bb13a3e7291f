//! Explainer - 分层讲解客户端
//!
//! 模块划分：
//! - **client**: 远端讲解服务客户端抽象与实现（HTTP / Mock）及线上信封格式
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 缓存、重试、请求状态机、会话运行时
//! - **model**: 讲解对象、层级、论文与讲解结果
//! - **observability**: 日志初始化

pub mod client;
pub mod config;
pub mod core;
pub mod model;
pub mod observability;

pub use client::{ExplainClient, HttpExplainClient, MockExplainClient};
pub use core::{spawn_session, ExplainSession, RequestOrchestrator, SessionOptions, UiState};
pub use model::{ExplanationResult, Level, Mode, Paper, Subject};
