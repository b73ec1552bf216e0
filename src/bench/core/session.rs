use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, warn};
use super::traits::{DeviceBackend, DeviceHandle};
use crate::error::AppError;

/// 在设备会话作用域内执行 `f`
///
/// 先 connect，`f` 结束后无论成功、失败还是 panic 都会 release 会话。
/// connect 失败时直接返回错误，`f` 不会被调用。
/// panic 时的释放依赖 unwind，release 配置不能使用 `panic = "abort"`。
pub async fn with_session<B, F, Fut, T>(backend: &B, f: F) -> Result<T, AppError>
where
    B: DeviceBackend + ?Sized,
    F: FnOnce(DeviceHandle) -> Fut,
    Fut: Future<Output = T>,
{
    let handle = backend.connect().await?;
    debug!("会话已建立: {}/{}", handle.device_id, handle.session_id);

    let result = AssertUnwindSafe(f(handle)).catch_unwind().await;

    if let Err(e) = backend.release().await {
        warn!("释放会话失败: {}", e);
    }

    match result {
        Ok(value) => Ok(value),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::backend::MockBackend;
    use crate::bench::core::traits::OperationRequest;

    #[tokio::test]
    async fn test_session_released_after_closure() {
        let backend = MockBackend::new("emulator-5554").with_delay_ms(0);

        let calls = with_session(&backend, |handle| {
            let backend = &backend;
            async move {
                assert_eq!(handle.device_id, "emulator-5554");
                backend.perform(&OperationRequest::QueryState).await.unwrap();
                backend.call_count()
            }
        })
        .await
        .unwrap();

        assert_eq!(calls, 1);
        assert!(!backend.is_connected());
        assert_eq!(backend.release_count(), 1);
    }

    #[tokio::test]
    async fn test_session_released_on_panic() {
        let backend = MockBackend::new("emulator-5554").with_delay_ms(0);

        let result = AssertUnwindSafe(with_session(&backend, |_handle| async {
            let blow_up = true;
            if blow_up {
                panic!("task blew up");
            }
        }))
        .catch_unwind()
        .await;

        assert!(result.is_err());
        assert!(!backend.is_connected());
        assert_eq!(backend.release_count(), 1);
    }

    #[test]
    fn test_release_profile_keeps_unwinding() {
        let manifest: toml::Table = toml::from_str(include_str!("../../../Cargo.toml")).unwrap();
        let strategy = manifest
            .get("profile")
            .and_then(|p| p.get("release"))
            .and_then(|r| r.get("panic"))
            .and_then(|v| v.as_str());
        assert_ne!(strategy, Some("abort"));
    }
}
