use thiserror::Error;

/// 应用程序统一错误类型
///
/// 分为两类：配置错误（在任何设备调用之前发现）和后端致命错误
/// （结束当前任务，但不会中止整个运行）。
#[derive(Error, Debug)]
pub enum AppError {
    /// 缺少远程后端凭证
    #[error("缺少后端凭证: {0}")]
    MissingCredentials(String),

    /// 未知任务
    #[error("任务未找到: {0}")]
    UnknownTask(String),

    /// 配置无效
    #[error("配置无效: {0}")]
    InvalidConfig(String),

    /// 任务参数无效
    #[error("任务参数无效: {0}")]
    InvalidParams(String),

    /// 运行开始前连接后端失败，整个运行中止
    #[error("连接后端失败，运行中止: {0}")]
    ConnectFailed(#[source] Box<AppError>),

    /// 后端不可达（连接断开、传输失败）
    #[error("后端不可达: {0}")]
    BackendUnreachable(String),

    /// 请求超时
    #[error("请求超时: {0} 秒")]
    Timeout(u64),

    /// 鉴权失败
    #[error("鉴权失败: {0}")]
    Unauthorized(String),

    /// 请求格式错误
    #[error("请求格式错误: {0}")]
    MalformedRequest(String),

    /// 会话已丢失，需要重新连接
    #[error("会话已丢失: {0}")]
    SessionLost(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON 错误
    #[error("JSON 错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// AppError 的 Result 类型别名
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// 是否为后端致命错误（结束当前任务，不结束运行）
    pub fn is_backend_fatal(&self) -> bool {
        matches!(
            self,
            AppError::BackendUnreachable(_)
                | AppError::Timeout(_)
                | AppError::Unauthorized(_)
                | AppError::MalformedRequest(_)
                | AppError::SessionLost(_)
                | AppError::IoError(_)
        )
    }

    /// 是否为配置错误
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AppError::MissingCredentials(_)
                | AppError::UnknownTask(_)
                | AppError::InvalidConfig(_)
                | AppError::InvalidParams(_)
                | AppError::ConnectFailed(_)
                | AppError::JsonError(_)
        )
    }

    /// 连接失败时的底层原因
    pub fn connect_cause(&self) -> Option<&AppError> {
        match self {
            AppError::ConnectFailed(cause) => Some(&**cause),
            _ => None,
        }
    }

    /// 错误类型标签，写入 TaskOutcome 的失败原因
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::MissingCredentials(_) => "missing-credentials",
            AppError::UnknownTask(_) => "unknown-task",
            AppError::InvalidConfig(_) => "invalid-config",
            AppError::InvalidParams(_) => "invalid-params",
            AppError::ConnectFailed(_) => "connect-failed",
            AppError::BackendUnreachable(_) => "unreachable",
            AppError::Timeout(_) => "timeout",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::MalformedRequest(_) => "malformed-request",
            AppError::SessionLost(_) => "session-lost",
            AppError::IoError(_) => "io",
            AppError::JsonError(_) => "json",
        }
    }
}
