use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use super::plan::resolve_plan;
use super::retry::RetryPolicy;
use crate::bench::core::traits::{BackendInfo, DeviceBackend};
use crate::bench::core::types::{FailureReason, TaskOutcome, TaskSpec};
use crate::error::AppError;

/// 任务执行器，负责把 TaskSpec 展开为操作序列并依次交给后端执行
///
/// 后端在构造时绑定，执行器生命周期内不可更换。
pub struct TaskExecutor {
    backend: Arc<dyn DeviceBackend>,
    retry: RetryPolicy,
}

impl TaskExecutor {
    /// 创建新的任务执行器
    pub fn new(backend: Arc<dyn DeviceBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    pub fn backend(&self) -> &Arc<dyn DeviceBackend> {
        &self.backend
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn describe_backend(&self) -> Result<BackendInfo, AppError> {
        self.backend.describe()
    }

    /// 执行单个任务
    ///
    /// 操作严格按顺序发出：第 n 个操作返回之后才会发出第 n+1 个。
    /// 无法解析的任务在调用后端之前直接返回配置错误结果。
    pub async fn run(&self, spec: &TaskSpec) -> TaskOutcome {
        let plan = match resolve_plan(spec) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("任务 {} 无法解析: {}", spec.id, e);
                return TaskOutcome::configuration_error(&spec.id, spec.category.clone(), &e);
            }
        };

        info!("开始执行任务: {} [{}], 共 {} 个操作", spec.id, spec.category, plan.len());

        let mut operations = Vec::with_capacity(plan.len());
        let mut failure = None;
        let start = Instant::now();

        for (step, request) in plan.iter().enumerate() {
            debug!("任务 {} 第 {}/{} 步: {}", spec.id, step + 1, plan.len(), request.description());

            match self.retry.execute(|| self.backend.perform(request)).await {
                Ok(result) if result.is_ok() => operations.push(result),
                Ok(result) => {
                    warn!(
                        "任务 {} 第 {} 步在 {} 次尝试后失败: {}",
                        spec.id,
                        step + 1,
                        result.attempts,
                        result.error.as_deref().unwrap_or("unknown")
                    );
                    failure = Some(FailureReason::OperationFailed {
                        step,
                        operation: result.kind.clone(),
                        error: result.error.clone().unwrap_or_else(|| "unknown".to_string()),
                        attempts: result.attempts,
                    });
                    operations.push(result);
                    break;
                }
                Err(e) => {
                    error!("任务 {} 第 {} 步后端不可用: {}", spec.id, step + 1, e);
                    failure = Some(FailureReason::backend_unreachable(step, &e));
                    break;
                }
            }
        }

        let elapsed = start.elapsed();
        let success = failure.is_none();

        if success {
            info!("任务 {} 执行成功，耗时 {:.2}s", spec.id, elapsed.as_secs_f64());
        } else if let Some(reason) = &failure {
            warn!("任务 {} 执行失败 ({}): {}", spec.id, reason.tag(), reason);
        }

        TaskOutcome {
            task_id: spec.id.clone(),
            category: spec.category.clone(),
            success,
            elapsed,
            operations,
            failure,
        }
    }
}
