pub mod bench_config;

pub use bench_config::{
    BackendChoice, BackendConfig, BenchConfig, ConfigError, ExecutorConfig, LoggingConfig,
    MockConfig, RegistryConfig, RemoteConfig, RunConfig, ENV_API_KEY, ENV_BASE_URL, ENV_DEVICE_ID,
};
