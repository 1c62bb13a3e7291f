//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `EXPLAINER__*` 覆盖（双下划线表示嵌套，如 `EXPLAINER__RETRY__DELAY_MS=500`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::RetryPolicy;
use crate::model::{Level, Mode};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiSection,
    pub retry: RetrySection,
    pub cache: CacheSection,
    pub session: SessionSection,
}

/// [api] 段：讲解服务端点与单次请求超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub endpoint: String,
    /// 单次请求超时（秒）
    pub timeout_secs: u64,
    /// 使用内置 Mock 客户端，不访问网络
    pub mock: bool,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/api".to_string(),
            timeout_secs: 60,
            mock: false,
        }
    }
}

/// [retry] 段：论文列表加载的重试策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// 总尝试次数（含第一次）
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 2000,
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.delay_ms))
    }
}

/// [cache] 段：每类缓存最多保留的主题数，未设置则不限
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub max_subjects: Option<usize>,
}

/// [session] 段：初始层级与模式
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub default_level: Level,
    pub default_mode: Mode,
}

/// 从 config 目录加载配置，环境变量 EXPLAINER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 EXPLAINER__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("EXPLAINER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
