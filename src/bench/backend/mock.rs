use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use crate::bench::core::traits::{
    BackendInfo, BackendKind, DeviceBackend, DeviceHandle, OperationRequest, OperationResult,
};
use crate::error::AppError;

/// 默认的人工延迟（毫秒）
pub const DEFAULT_MOCK_DELAY_MS: u64 = 50;

/// Mock 设备后端
///
/// 纯内存实现，不做任何外部 I/O：每个操作在固定延迟后返回 ok 和确定性的
/// 预设数据，同时记录调用次数和调用顺序供测试断言。
pub struct MockBackend {
    device_id: String,
    delay: Duration,
    calls: AtomicU64,
    call_log: Mutex<Vec<OperationRequest>>,
    session: Mutex<Option<DeviceHandle>>,
    sessions_opened: AtomicU32,
    releases: AtomicU32,
}

impl MockBackend {
    /// 创建新的 Mock 后端
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            delay: Duration::from_millis(DEFAULT_MOCK_DELAY_MS),
            calls: AtomicU64::new(0),
            call_log: Mutex::new(Vec::new()),
            session: Mutex::new(None),
            sessions_opened: AtomicU32::new(0),
            releases: AtomicU32::new(0),
        }
    }

    /// 设置人工延迟
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay = Duration::from_millis(delay_ms);
        self
    }

    /// 按调用顺序返回所有已执行的请求
    pub fn call_log(&self) -> Vec<OperationRequest> {
        self.call_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_connected(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// 会话被真正释放的次数
    pub fn release_count(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }

    fn canned_state(&self, request: &OperationRequest) -> String {
        match request {
            OperationRequest::Tap { x, y } => format!("tapped ({}, {})", x, y),
            OperationRequest::Swipe { x1, y1, x2, y2, duration_ms } => {
                format!("swiped ({}, {}) -> ({}, {}) in {}ms", x1, y1, x2, y2, duration_ms)
            }
            OperationRequest::PressKey { key } => format!("pressed {}", key),
            OperationRequest::TypeText { text } => format!("typed {} chars", text.chars().count()),
            OperationRequest::LaunchApp { package } => format!("launched {}", package),
            OperationRequest::QueryState => {
                format!("device={} screen=1080x2400 orientation=portrait", self.device_id)
            }
        }
    }
}

#[async_trait]
impl DeviceBackend for MockBackend {
    async fn connect(&self) -> Result<DeviceHandle, AppError> {
        let mut session = self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = session.as_ref() {
            return Ok(handle.clone());
        }

        let number = self.sessions_opened.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = DeviceHandle {
            backend: BackendKind::Mock,
            device_id: self.device_id.clone(),
            session_id: format!("mock-session-{}", number),
        };
        info!("Mock 后端已连接: {}", handle.session_id);
        *session = Some(handle.clone());
        Ok(handle)
    }

    async fn perform(&self, request: &OperationRequest) -> Result<OperationResult, AppError> {
        debug!("Mock 执行: {}", request.description());

        let start = Instant::now();
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        Ok(OperationResult::ok(request, Some(self.canned_state(request)))
            .with_duration(start.elapsed()))
    }

    fn describe(&self) -> Result<BackendInfo, AppError> {
        let session_id = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|handle| handle.session_id.clone());

        Ok(BackendInfo {
            kind: BackendKind::Mock,
            name: "mock".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            device_id: self.device_id.clone(),
            endpoint: None,
            session_id,
        })
    }

    async fn release(&self) -> Result<(), AppError> {
        let released = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(handle) = released {
            self.releases.fetch_add(1, Ordering::SeqCst);
            info!("Mock 会话已释放: {}", handle.session_id);
        }
        Ok(())
    }

    fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_always_ok_and_counts() {
        let backend = MockBackend::new("emulator-5554").with_delay_ms(0);

        let tap = OperationRequest::Tap { x: 500, y: 1200 };
        let result = backend.perform(&tap).await.unwrap();
        assert!(result.is_ok());
        assert_eq!(result.state.as_deref(), Some("tapped (500, 1200)"));

        backend.perform(&OperationRequest::QueryState).await.unwrap();
        assert_eq!(backend.call_count(), 2);
        assert_eq!(backend.call_log(), vec![tap, OperationRequest::QueryState]);
    }

    #[tokio::test]
    async fn test_mock_canned_payload_is_deterministic() {
        let a = MockBackend::new("emulator-5554").with_delay_ms(0);
        let b = MockBackend::new("emulator-5554").with_delay_ms(0);

        let request = OperationRequest::QueryState;
        let ra = a.perform(&request).await.unwrap();
        let rb = b.perform(&request).await.unwrap();
        assert_eq!(ra.state, rb.state);
    }

    #[tokio::test]
    async fn test_mock_delay_applied() {
        let backend = MockBackend::new("emulator-5554").with_delay_ms(20);

        let start = Instant::now();
        backend.perform(&OperationRequest::QueryState).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_mock_connect_is_idempotent_and_release_once() {
        let backend = MockBackend::new("emulator-5554");

        let first = backend.connect().await.unwrap();
        let second = backend.connect().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.describe().unwrap().session_id, Some(first.session_id.clone()));

        backend.release().await.unwrap();
        backend.release().await.unwrap();
        assert_eq!(backend.release_count(), 1);
        assert!(backend.describe().unwrap().session_id.is_none());
    }

    #[tokio::test]
    async fn test_device_info_falls_back_to_describe() {
        let backend = MockBackend::new("pixel-7");
        let info = backend.device_info().await.unwrap();
        assert_eq!(info["kind"], "mock");
        assert_eq!(info["device_id"], "pixel-7");
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_swipe_and_key_payloads() {
        let backend = MockBackend::new("emulator-5554").with_delay_ms(0);

        let swiped = backend
            .perform(&OperationRequest::swipe((540, 1800), (540, 600)))
            .await
            .unwrap();
        assert_eq!(swiped.kind, "swipe");
        assert_eq!(swiped.state.as_deref(), Some("swiped (540, 1800) -> (540, 600) in 500ms"));

        let pressed = backend
            .perform(&OperationRequest::PressKey { key: "home".to_string() })
            .await
            .unwrap();
        assert!(pressed.is_ok());
        assert_eq!(pressed.state.as_deref(), Some("pressed home"));
        assert_eq!(backend.call_count(), 2);
    }
}
