use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use crate::bench::config::LoggingConfig;
use crate::error::AppError;

/// 日志文件名前缀，按天滚动生成 `droid-bench.log.YYYY-MM-DD`
pub const LOG_FILE_PREFIX: &str = "droid-bench.log";

/// 初始化日志系统
///
/// 终端输出始终开启；配置了 `log_dir` 时额外写入按天滚动的日志文件。
/// 返回的 guard 需要持有到进程退出，否则文件日志可能丢失。
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>, AppError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directives(&config.level)))
        .map_err(|e| AppError::InvalidConfig(format!("无效的日志级别 '{}': {}", config.level, e)))?;

    let (file_layer, guard) = match config.file_dir() {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::InvalidConfig(format!("日志系统初始化失败: {}", e)))?;

    Ok(guard)
}

/// 配置级别加上对 HTTP 依赖的降噪
pub fn filter_directives(level: &str) -> String {
    let level = match level.trim() {
        "" => "info",
        other => other,
    };
    format!("{},hyper_util=info,reqwest=info", level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives() {
        assert_eq!(filter_directives("debug"), "debug,hyper_util=info,reqwest=info");
        assert_eq!(filter_directives("  "), "info,hyper_util=info,reqwest=info");
        assert!(EnvFilter::try_new(filter_directives("warn")).is_ok());
    }
}
