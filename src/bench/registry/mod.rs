//! 任务注册表
//!
//! 提供任务 id 到 TaskSpec（类别和默认参数）的只读查询。

pub mod catalogue;

pub use catalogue::{StaticRegistry, infer_category};

use crate::bench::core::types::TaskSpec;

/// 任务注册表 trait
pub trait TaskRegistry: Send + Sync {
    /// 按声明顺序返回全部任务 id
    fn task_ids(&self) -> Vec<String>;

    /// 查询任务，未注册时返回 None
    fn lookup(&self, task_id: &str) -> Option<TaskSpec>;

    fn contains(&self, task_id: &str) -> bool {
        self.lookup(task_id).is_some()
    }
}

/// 任务目录加载错误
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("IO 错误: {0}")]
    IoError(String),

    #[error("解析错误: {0}")]
    ParseError(String),

    #[error("任务重复注册: {0}")]
    DuplicateTask(String),

    #[error("无效的任务条目: {0}")]
    InvalidEntry(String),
}
