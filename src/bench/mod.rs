//! Android 基准测试执行模块
//!
//! 将基准任务展开为设备操作序列，在 Mock 或远程设备后端上执行并汇总结果。

pub mod core;
pub mod backend;
pub mod executor;
pub mod config;
pub mod registry;
pub mod bridge;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出核心类型
pub use self::core::{
    traits::{BackendInfo, BackendKind, DeviceBackend, DeviceHandle, OperationRequest, OperationResult, OperationStatus},
    types::{CategoryStats, FailureReason, RunSummary, TaskCategory, TaskOutcome, TaskParams, TaskSpec},
    session::with_session,
};

pub use backend::{MockBackend, RemoteBackend, create_backend};
pub use executor::{RetryPolicy, RetryStrategy, TaskExecutor, resolve_plan};
pub use config::{BackendChoice, BenchConfig, ConfigError};
pub use registry::{RegistryError, StaticRegistry, TaskRegistry};
pub use bridge::{BenchmarkBridge, BridgeEvent, TaskSelection};
