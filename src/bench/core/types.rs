use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use super::traits::{OperationResult, duration_ms};
use crate::error::AppError;

/// 任务参数映射
pub type TaskParams = serde_json::Map<String, serde_json::Value>;

/// 任务类别
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskCategory {
    Recipe,
    Calendar,
    System,
    Other(String),
}

impl TaskCategory {
    pub fn as_str(&self) -> &str {
        match self {
            TaskCategory::Recipe => "recipe",
            TaskCategory::Calendar => "calendar",
            TaskCategory::System => "system",
            TaskCategory::Other(tag) => tag,
        }
    }
}

impl From<String> for TaskCategory {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "recipe" => TaskCategory::Recipe,
            "calendar" => TaskCategory::Calendar,
            "system" => TaskCategory::System,
            other => TaskCategory::Other(other.to_string()),
        }
    }
}

impl From<&str> for TaskCategory {
    fn from(value: &str) -> Self {
        TaskCategory::from(value.to_string())
    }
}

impl From<TaskCategory> for String {
    fn from(value: TaskCategory) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 由任务注册表声明的基准任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub category: TaskCategory,
    #[serde(default)]
    pub params: TaskParams,
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, category: TaskCategory) -> Self {
        Self {
            id: id.into(),
            category,
            params: TaskParams::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: serde_json::Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    /// 用调用方参数覆盖注册表默认参数，返回新的 TaskSpec
    pub fn with_overrides(&self, overrides: &TaskParams) -> Self {
        let mut spec = self.clone();
        for (key, value) in overrides {
            spec.params.insert(key.clone(), value.clone());
        }
        spec
    }
}

/// 任务失败原因
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum FailureReason {
    /// 在任何设备调用之前发现的配置错误
    #[serde(rename = "configuration-error")]
    Configuration { kind: String, detail: String },

    /// 操作在重试耗尽后仍然失败
    #[serde(rename = "operation-failed")]
    OperationFailed {
        step: usize,
        operation: String,
        error: String,
        attempts: u32,
    },

    /// 后端致命错误（连接丢失、超时）
    #[serde(rename = "backend-unreachable")]
    BackendUnreachable {
        step: usize,
        kind: String,
        detail: String,
    },
}

impl FailureReason {
    pub fn configuration(error: &AppError) -> Self {
        FailureReason::Configuration {
            kind: error.kind().to_string(),
            detail: error.to_string(),
        }
    }

    pub fn backend_unreachable(step: usize, error: &AppError) -> Self {
        FailureReason::BackendUnreachable {
            step,
            kind: error.kind().to_string(),
            detail: error.to_string(),
        }
    }

    /// 失败类别标签
    pub fn tag(&self) -> &'static str {
        match self {
            FailureReason::Configuration { .. } => "configuration-error",
            FailureReason::OperationFailed { .. } => "operation-failed",
            FailureReason::BackendUnreachable { .. } => "backend-unreachable",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Configuration { kind, detail } => {
                write!(f, "configuration-error[{}]: {}", kind, detail)
            }
            FailureReason::OperationFailed { step, operation, error, attempts } => write!(
                f,
                "operation-failed: 第 {} 步 {} 在 {} 次尝试后失败: {}",
                step, operation, attempts, error
            ),
            FailureReason::BackendUnreachable { step, kind, detail } => {
                write!(f, "backend-unreachable[{}]: 第 {} 步: {}", kind, step, detail)
            }
        }
    }
}

/// 单个任务的执行结果，创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub category: TaskCategory,
    pub success: bool,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    pub operations: Vec<OperationResult>,
    pub failure: Option<FailureReason>,
}

impl TaskOutcome {
    /// 配置错误结果：未发起任何操作
    pub fn configuration_error(task_id: &str, category: TaskCategory, error: &AppError) -> Self {
        Self {
            task_id: task_id.to_string(),
            category,
            success: false,
            elapsed: Duration::ZERO,
            operations: Vec::new(),
            failure: Some(FailureReason::configuration(error)),
        }
    }

    pub fn failure_tag(&self) -> Option<&'static str> {
        self.failure.as_ref().map(FailureReason::tag)
    }

    pub fn is_configuration_error(&self) -> bool {
        matches!(self.failure, Some(FailureReason::Configuration { .. }))
    }
}

/// 单个类别的统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub total: usize,
    pub succeeded: usize,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl CategoryStats {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }
}

/// 一次批量运行的汇总统计，按结果到达顺序增量构建
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    #[serde(with = "duration_ms")]
    pub total_elapsed: Duration,
    pub by_category: BTreeMap<TaskCategory, CategoryStats>,
    pub configuration_errors: usize,
    pub operation_failures: usize,
    pub backend_failures: usize,
    pub outcomes: Vec<TaskOutcome>,
    pub cancelled: bool,
    pub finished: bool,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// 合并一个任务结果
    pub fn record(&mut self, outcome: TaskOutcome) {
        self.total += 1;
        self.total_elapsed += outcome.elapsed;

        let stats = self.by_category.entry(outcome.category.clone()).or_default();
        stats.total += 1;
        stats.elapsed += outcome.elapsed;

        if outcome.success {
            self.succeeded += 1;
            stats.succeeded += 1;
        }

        match &outcome.failure {
            Some(FailureReason::Configuration { .. }) => self.configuration_errors += 1,
            Some(FailureReason::OperationFailed { .. }) => self.operation_failures += 1,
            Some(FailureReason::BackendUnreachable { .. }) => self.backend_failures += 1,
            None => {}
        }

        self.outcomes.push(outcome);
    }

    /// 运行结束，标记汇总完成
    pub fn finalize(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
        self.finished = true;
    }

    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }
}
