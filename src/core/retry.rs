//! 有界重试：固定间隔、线性退避
//!
//! 策略（次数、间隔）是数据而不是控制流；失败耗尽后以 Exhausted 包装最后一次错误返回。

use std::future::Future;
use std::time::Duration;

use crate::core::ExplainError;

/// 重试策略：max_attempts 为总尝试次数（含第一次）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(2000))
    }
}

/// 重试调度器：持有策略，对任意异步操作执行有界重试
#[derive(Clone, Copy, Debug, Default)]
pub struct RetryScheduler {
    policy: RetryPolicy,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T, ExplainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExplainError>>,
    {
        self.run_with_hook(operation, |_, _| {}).await
    }

    /// 每次失败且仍有剩余次数时，先调用 on_retry(剩余次数, 错误)，再等待 delay 后重试
    pub async fn run_with_hook<T, F, Fut, H>(
        &self,
        mut operation: F,
        mut on_retry: H,
    ) -> Result<T, ExplainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExplainError>>,
        H: FnMut(u32, &ExplainError),
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts => {
                    let remaining = max_attempts - attempt;
                    tracing::warn!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        max_attempts,
                        err,
                        self.policy.delay
                    );
                    on_retry(remaining, &err);
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(err) => {
                    tracing::warn!("All {} attempts failed: {}", max_attempts, err);
                    return Err(ExplainError::Exhausted {
                        attempts: max_attempts,
                        last: err.to_string(),
                    });
                }
            }
        }
    }
}

/// 便捷函数：按给定次数与间隔执行有界重试
pub async fn run_with_retry<T, F, Fut>(
    operation: F,
    max_attempts: u32,
    delay: Duration,
) -> Result<T, ExplainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExplainError>>,
{
    RetryScheduler::new(RetryPolicy::new(max_attempts, delay))
        .run(operation)
        .await
}
