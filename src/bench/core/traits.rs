use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use crate::error::AppError;

/// 设备后端抽象 trait，定义 Mock 与远程后端共同的能力集合
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// 建立设备会话。首次调用时获取会话，之后返回同一个句柄
    async fn connect(&self) -> Result<DeviceHandle, AppError>;

    /// 执行单个设备操作
    ///
    /// 设备层面的预期失败（元素不存在、应用未安装、操作被拒绝）以
    /// `OperationStatus::Failed` 返回；只有后端不可达类错误才返回 `Err`。
    async fn perform(&self, request: &OperationRequest) -> Result<OperationResult, AppError>;

    /// 后端身份与版本信息，不发起网络请求
    fn describe(&self) -> Result<BackendInfo, AppError>;

    /// 查询设备详情，远程后端会请求设备信息接口
    async fn device_info(&self) -> Result<serde_json::Value, AppError> {
        Ok(serde_json::to_value(self.describe()?)?)
    }

    /// 释放会话，重复调用为空操作
    async fn release(&self) -> Result<(), AppError>;

    /// 已处理的 perform 调用次数
    fn call_count(&self) -> u64;
}

/// 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Mock,
    Remote,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Mock => write!(f, "mock"),
            BackendKind::Remote => write!(f, "remote"),
        }
    }
}

/// 已绑定的设备会话句柄
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHandle {
    pub backend: BackendKind,
    pub device_id: String,
    pub session_id: String,
}

/// 后端诊断信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendInfo {
    pub kind: BackendKind,
    pub name: String,
    pub version: String,
    pub device_id: String,
    pub endpoint: Option<String>,
    pub session_id: Option<String>,
}

/// 单个原子设备操作
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationRequest {
    Tap { x: u32, y: u32 },
    Swipe {
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
        #[serde(default = "default_swipe_ms")]
        duration_ms: u64,
    },
    TypeText { text: String },
    PressKey { key: String },
    LaunchApp { package: String },
    QueryState,
}

/// 滑动默认持续时间（毫秒）
pub const DEFAULT_SWIPE_MS: u64 = 500;

fn default_swipe_ms() -> u64 {
    DEFAULT_SWIPE_MS
}

impl OperationRequest {
    /// 以默认持续时间从 `from` 滑动到 `to`
    pub fn swipe((x1, y1): (u32, u32), (x2, y2): (u32, u32)) -> Self {
        OperationRequest::Swipe {
            x1,
            y1,
            x2,
            y2,
            duration_ms: DEFAULT_SWIPE_MS,
        }
    }

    /// 操作类型名称
    pub fn kind(&self) -> &'static str {
        match self {
            OperationRequest::Tap { .. } => "tap",
            OperationRequest::Swipe { .. } => "swipe",
            OperationRequest::PressKey { .. } => "press_key",
            OperationRequest::TypeText { .. } => "type_text",
            OperationRequest::LaunchApp { .. } => "launch_app",
            OperationRequest::QueryState => "query_state",
        }
    }

    /// 获取操作描述
    pub fn description(&self) -> String {
        match self {
            OperationRequest::Tap { x, y } => format!("点击 ({}, {})", x, y),
            OperationRequest::Swipe { x1, y1, x2, y2, duration_ms } => {
                format!("滑动 ({}, {}) -> ({}, {}), {}ms", x1, y1, x2, y2, duration_ms)
            }
            OperationRequest::PressKey { key } => format!("按键: {}", key),
            OperationRequest::TypeText { text } => format!("输入文本: {}", text),
            OperationRequest::LaunchApp { package } => format!("启动应用: {}", package),
            OperationRequest::QueryState => "查询设备状态".to_string(),
        }
    }
}

/// 操作状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Ok,
    Failed,
}

/// 操作执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub kind: String,
    pub status: OperationStatus,
    pub state: Option<String>,
    pub error: Option<String>,
    /// 执行器为该操作发起的尝试次数
    pub attempts: u32,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl OperationResult {
    pub fn ok(request: &OperationRequest, state: Option<String>) -> Self {
        Self {
            kind: request.kind().to_string(),
            status: OperationStatus::Ok,
            state,
            error: None,
            attempts: 1,
            duration: Duration::ZERO,
        }
    }

    pub fn failed(request: &OperationRequest, error: impl Into<String>) -> Self {
        Self {
            kind: request.kind().to_string(),
            status: OperationStatus::Failed,
            state: None,
            error: Some(error.into()),
            attempts: 1,
            duration: Duration::ZERO,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == OperationStatus::Ok
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Duration 以毫秒整数序列化
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_request_wire_shape() {
        let request = OperationRequest::Tap { x: 500, y: 1200 };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "tap", "x": 500, "y": 1200}));

        let json = serde_json::to_value(OperationRequest::QueryState).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "query_state"}));

        let json = serde_json::to_value(OperationRequest::PressKey { key: "back".to_string() }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "press_key", "key": "back"}));
    }

    #[test]
    fn test_swipe_duration_defaults() {
        let swipe: OperationRequest = serde_json::from_value(serde_json::json!({
            "kind": "swipe", "x1": 540, "y1": 1800, "x2": 540, "y2": 600
        }))
        .unwrap();
        assert_eq!(swipe, OperationRequest::swipe((540, 1800), (540, 600)));
        assert_eq!(swipe.kind(), "swipe");

        let json = serde_json::to_value(&swipe).unwrap();
        assert_eq!(json["duration_ms"], 500);
    }

    #[test]
    fn test_operation_result_constructors() {
        let request = OperationRequest::LaunchApp { package: "com.android.settings".to_string() };

        let ok = OperationResult::ok(&request, None);
        assert!(ok.is_ok());
        assert_eq!(ok.kind, "launch_app");

        let failed = OperationResult::failed(&request, "app-not-installed");
        assert!(!failed.is_ok());
        assert_eq!(failed.error.as_deref(), Some("app-not-installed"));
    }

    #[test]
    fn test_operation_result_duration_serialized_as_ms() {
        let result = OperationResult::ok(&OperationRequest::QueryState, Some("Home".to_string()))
            .with_duration(Duration::from_millis(42));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["duration"], 42);
        assert_eq!(json["status"], "ok");
    }
}
