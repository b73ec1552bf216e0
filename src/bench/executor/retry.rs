use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use crate::bench::core::traits::OperationResult;
use crate::error::AppError;

/// 重试延迟策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RetryStrategy {
    /// 立即重试
    Immediate,

    /// 固定延迟重试
    Fixed { delay_ms: u64 },

    /// 指数退避重试
    Exponential {
        initial_delay_ms: u64,
        max_delay_ms: u64,
        multiplier: f64,
    },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Fixed { delay_ms: 500 }
    }
}

impl RetryStrategy {
    /// 获取第 `retry` 次重试（从 0 开始）之前的等待时间
    pub fn next_delay(&self, retry: u32) -> Duration {
        match self {
            RetryStrategy::Immediate => Duration::ZERO,
            RetryStrategy::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            RetryStrategy::Exponential {
                initial_delay_ms,
                max_delay_ms,
                multiplier,
            } => {
                let delay = (*initial_delay_ms as f64 * multiplier.powi(retry as i32)) as u64;
                Duration::from_millis(delay.min(*max_delay_ms))
            }
        }
    }

    /// 创建指数退避策略
    pub fn exponential(initial_delay_ms: u64, max_delay_ms: u64, multiplier: f64) -> Self {
        Self::Exponential {
            initial_delay_ms,
            max_delay_ms,
            multiplier,
        }
    }

    /// 创建固定延迟策略
    pub fn fixed(delay_ms: u64) -> Self {
        Self::Fixed { delay_ms }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if let RetryStrategy::Exponential {
            initial_delay_ms,
            max_delay_ms,
            multiplier,
        } = self
        {
            if !multiplier.is_finite() || *multiplier < 1.0 {
                return Err(AppError::InvalidConfig(format!(
                    "指数退避倍数必须 >= 1.0: {}",
                    multiplier
                )));
            }
            if max_delay_ms < initial_delay_ms {
                return Err(AppError::InvalidConfig(
                    "max_delay_ms 不能小于 initial_delay_ms".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// 单个操作的有界重试策略
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 首次尝试之外的最大重试次数
    pub max_retries: u32,
    pub strategy: RetryStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            strategy: RetryStrategy::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, strategy: RetryStrategy) -> Self {
        Self { max_retries, strategy }
    }

    /// 不重试
    pub fn none() -> Self {
        Self::new(0, RetryStrategy::Immediate)
    }

    /// 执行带重试的操作
    ///
    /// `status: failed` 的结果会在预算内重试；`Err` 视为后端致命错误，
    /// 立即返回不再重试。返回最后一次结果，`attempts` 记录总尝试次数。
    pub async fn execute<F, Fut>(&self, mut operation: F) -> Result<OperationResult, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<OperationResult, AppError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            let mut result = operation().await?;
            attempt += 1;
            result.attempts = attempt;

            if result.is_ok() {
                if attempt > 1 {
                    debug!("操作在第 {} 次尝试后成功: {}", attempt, result.kind);
                }
                return Ok(result);
            }

            warn!(
                "操作失败（第 {} 次尝试）: {} - {}",
                attempt,
                result.kind,
                result.error.as_deref().unwrap_or("unknown")
            );

            if attempt > self.max_retries {
                return Ok(result);
            }

            let delay = self.strategy.next_delay(attempt - 1);
            if !delay.is_zero() {
                debug!("等待 {:?} 后重试", delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
