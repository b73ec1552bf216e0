use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use crate::bench::executor::retry::{RetryPolicy, RetryStrategy};

pub const ENV_API_KEY: &str = "GBOX_API_KEY";
pub const ENV_BASE_URL: &str = "GBOX_BASE_URL";
pub const ENV_DEVICE_ID: &str = "DROID_BENCH_DEVICE_ID";

/// 后端选择
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// 配置了 api_key 时使用远程后端，否则使用 Mock
    #[default]
    Auto,
    Mock,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// 每个操作的模拟延迟（毫秒）
    pub delay_ms: u64,
    pub device_id: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            delay_ms: crate::bench::backend::DEFAULT_MOCK_DELAY_MS,
            device_id: "emulator-5554".to_string(),
        }
    }
}

/// 远程设备控制服务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
    pub device_id: String,
    /// 单个请求超时（秒）
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://gbox.ai/api/v1".to_string(),
            api_key: String::new(),
            device_id: "emulator-5554".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendChoice,
    pub mock: MockConfig,
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// 单个操作的最大重试次数
    pub max_retries: u32,
    pub retry: RetryStrategy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            retry: policy.strategy,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// 单次批量运行的任务上限，0 表示不限制
    pub max_tasks: usize,
    /// 任务之间的等待时间（毫秒）
    pub inter_task_delay_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// 任务目录文件，未设置时使用内置目录
    pub path: Option<PathBuf>,
}

impl RegistryConfig {
    pub fn catalogue_path(&self) -> Option<&Path> {
        self.path.as_deref().filter(|p| !p.as_os_str().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// 按天滚动的日志目录，未设置时只输出到终端
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl LoggingConfig {
    pub fn file_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref().filter(|p| !p.as_os_str().is_empty())
    }
}

/// 完整的基准测试配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub backend: BackendConfig,
    pub executor: ExecutorConfig,
    pub run: RunConfig,
    pub registry: RegistryConfig,
    pub logging: LoggingConfig,
}

impl BenchConfig {
    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从文件加载，并使用环境变量覆盖
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// 使用默认配置，并使用环境变量覆盖
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// 应用环境变量覆盖，空值忽略
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(api_key) = lookup(ENV_API_KEY) {
            self.backend.remote.api_key = api_key;
        }

        if let Some(base_url) = lookup(ENV_BASE_URL) {
            self.backend.remote.base_url = base_url;
        }

        if let Some(device_id) = lookup(ENV_DEVICE_ID) {
            self.backend.mock.device_id = device_id.clone();
            self.backend.remote.device_id = device_id;
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.remote.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "backend.remote.timeout_secs 必须大于 0".to_string(),
            ));
        }

        if self.backend.kind == BackendChoice::Remote && self.backend.remote.api_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "选择了远程后端但未配置 api_key（可通过 {} 设置）",
                ENV_API_KEY
            )));
        }

        self.executor
            .retry
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(())
    }

    /// 保存到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.executor.max_retries, self.executor.retry.clone())
    }
}

/// 配置错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO 错误: {0}")]
    IoError(String),

    #[error("解析错误: {0}")]
    ParseError(String),

    #[error("序列化错误: {0}")]
    SerializeError(String),

    #[error("验证错误: {0}")]
    ValidationError(String),
}
