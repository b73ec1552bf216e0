use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use crate::bench::config::RemoteConfig;
use crate::bench::core::traits::{
    BackendInfo, BackendKind, DeviceBackend, DeviceHandle, OperationRequest, OperationResult,
    OperationStatus,
};
use crate::error::AppError;

/// 打开会话的响应
#[derive(Debug, Deserialize)]
struct OpenSessionResponse {
    session_id: String,
}

/// 执行操作的响应，与 OperationResult 一一对应
#[derive(Debug, Deserialize)]
struct ActionResponse {
    status: OperationStatus,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// 远程设备控制 API 的错误响应体
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(alias = "kind", alias = "message")]
    error: String,
}

/// 远程设备后端
///
/// 每个 OperationRequest 转换为一次对远程设备控制 API 的 HTTP 调用，
/// 以会话 ID 为键，使用预先提供的 Bearer token 鉴权。
pub struct RemoteBackend {
    client: Client,
    config: RemoteConfig,
    session: RwLock<Option<DeviceHandle>>,
    connect_lock: Mutex<()>,
    calls: AtomicU64,
}

impl RemoteBackend {
    /// 创建新的远程后端，此时不检查凭证也不发起网络请求
    pub fn new(config: RemoteConfig) -> Result<Self, AppError> {
        if config.timeout_secs == 0 {
            return Err(AppError::InvalidConfig("timeout_secs 必须大于 0".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::InvalidConfig(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            client,
            config,
            session: RwLock::new(None),
            connect_lock: Mutex::new(()),
            calls: AtomicU64::new(0),
        })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// 检查凭证，缺失时返回配置错误
    fn credentials(&self) -> Result<(&str, &str), AppError> {
        if self.config.api_key.trim().is_empty() {
            return Err(AppError::MissingCredentials("GBOX_API_KEY".to_string()));
        }
        if self.config.device_id.trim().is_empty() {
            return Err(AppError::MissingCredentials("device_id".to_string()));
        }
        Ok((self.config.api_key.as_str(), self.config.device_id.as_str()))
    }

    fn current_session(&self) -> Option<DeviceHandle> {
        self.session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn store_session(&self, handle: Option<DeviceHandle>) -> Option<DeviceHandle> {
        let mut session = self.session.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *session, handle)
    }

    /// 将传输层错误映射为后端致命错误
    fn map_transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.config.timeout_secs)
        } else {
            AppError::BackendUnreachable(format!("发送请求失败: {}", e))
        }
    }

    /// 读取错误响应体中的错误类型
    async fn error_detail(response: Response) -> String {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(body) => body.error,
            Err(_) if text.trim().is_empty() => status.to_string(),
            Err(_) => text.trim().to_string(),
        }
    }
}

#[async_trait]
impl DeviceBackend for RemoteBackend {
    async fn connect(&self) -> Result<DeviceHandle, AppError> {
        let (api_key, device_id) = self.credentials()?;

        let _guard = self.connect_lock.lock().await;
        if let Some(handle) = self.current_session() {
            return Ok(handle);
        }

        let url = format!("{}/devices/{}/sessions", self.base_url(), device_id);
        debug!("打开远程会话: {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = Self::error_detail(response).await;
            error!("打开远程会话失败: {} - {}", status, detail);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Unauthorized(detail),
                StatusCode::BAD_REQUEST => AppError::MalformedRequest(detail),
                StatusCode::NOT_FOUND => AppError::BackendUnreachable(format!("设备不存在: {}", device_id)),
                _ => AppError::BackendUnreachable(format!("{} - {}", status, detail)),
            });
        }

        let body: OpenSessionResponse = response
            .json()
            .await
            .map_err(|e| AppError::BackendUnreachable(format!("解析会话响应失败: {}", e)))?;

        let handle = DeviceHandle {
            backend: BackendKind::Remote,
            device_id: device_id.to_string(),
            session_id: body.session_id,
        };
        info!("远程会话已建立: {} -> {}", handle.device_id, handle.session_id);
        self.store_session(Some(handle.clone()));
        Ok(handle)
    }

    async fn perform(&self, request: &OperationRequest) -> Result<OperationResult, AppError> {
        let (api_key, _) = self.credentials()?;
        let handle = self
            .current_session()
            .ok_or_else(|| AppError::SessionLost("尚未建立会话".to_string()))?;

        let url = format!("{}/sessions/{}/actions", self.base_url(), handle.session_id);
        debug!("远程执行: {} -> {}", request.description(), url);

        let start = Instant::now();
        self.calls.fetch_add(1, Ordering::SeqCst);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        match status {
            s if s.is_success() => {
                let body: ActionResponse = response
                    .json()
                    .await
                    .map_err(|e| AppError::BackendUnreachable(format!("解析操作响应失败: {}", e)))?;

                let result = match body.status {
                    OperationStatus::Ok => OperationResult::ok(request, body.state),
                    OperationStatus::Failed => {
                        let error = body.error.unwrap_or_else(|| "rejected".to_string());
                        warn!("设备拒绝操作 {}: {}", request.kind(), error);
                        OperationResult::failed(request, error)
                    }
                };
                Ok(result.with_duration(start.elapsed()))
            }
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                let error = Self::error_detail(response).await;
                warn!("设备拒绝操作 {}: {}", request.kind(), error);
                Ok(OperationResult::failed(request, error).with_duration(start.elapsed()))
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                // 服务端已回收会话，本地句柄随之失效
                self.store_session(None);
                error!("远程会话已失效: {}", handle.session_id);
                Err(AppError::SessionLost(handle.session_id))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(AppError::Unauthorized(Self::error_detail(response).await))
            }
            StatusCode::BAD_REQUEST => {
                Err(AppError::MalformedRequest(Self::error_detail(response).await))
            }
            _ => {
                let detail = Self::error_detail(response).await;
                error!("远程操作失败: {} - {}", status, detail);
                Err(AppError::BackendUnreachable(format!("{} - {}", status, detail)))
            }
        }
    }

    fn describe(&self) -> Result<BackendInfo, AppError> {
        let (_, device_id) = self.credentials()?;

        Ok(BackendInfo {
            kind: BackendKind::Remote,
            name: "gbox-remote".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            device_id: device_id.to_string(),
            endpoint: Some(self.base_url().to_string()),
            session_id: self.current_session().map(|handle| handle.session_id),
        })
    }

    async fn device_info(&self) -> Result<serde_json::Value, AppError> {
        let (api_key, device_id) = self.credentials()?;
        let url = format!("{}/devices/{}", self.base_url(), device_id);
        debug!("查询设备信息: {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = Self::error_detail(response).await;
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Unauthorized(detail),
                StatusCode::NOT_FOUND => AppError::BackendUnreachable(format!("设备不存在: {}", device_id)),
                _ => AppError::BackendUnreachable(format!("{} - {}", status, detail)),
            });
        }

        response
            .json()
            .await
            .map_err(|e| AppError::BackendUnreachable(format!("解析设备信息失败: {}", e)))
    }

    async fn release(&self) -> Result<(), AppError> {
        let Some(handle) = self.store_session(None) else {
            return Ok(());
        };
        let (api_key, _) = self.credentials()?;

        let url = format!("{}/sessions/{}", self.base_url(), handle.session_id);
        debug!("关闭远程会话: {}", url);

        let response = self
            .client
            .delete(&url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            info!("远程会话已释放: {}", handle.session_id);
            Ok(())
        } else {
            let detail = Self::error_detail(response).await;
            Err(AppError::BackendUnreachable(format!("关闭会话失败: {} - {}", status, detail)))
        }
    }

    fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}
