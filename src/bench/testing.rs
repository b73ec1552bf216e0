//! 测试用的脚本化后端

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use crate::bench::core::traits::{
    BackendInfo, BackendKind, DeviceBackend, DeviceHandle, OperationRequest, OperationResult,
};
use crate::error::AppError;

/// 单次 perform 调用的预设行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Ok,
    Fail,
    Fatal,
}

/// 按脚本依次返回结果的后端，脚本用完后一律返回 ok
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicU64,
    fail_connect: bool,
}

impl ScriptedBackend {
    pub fn new(script: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicU64::new(0),
            fail_connect: false,
        }
    }

    /// connect 总是失败的后端
    pub fn unreachable() -> Self {
        Self {
            fail_connect: true,
            ..Self::new([])
        }
    }
}

#[async_trait]
impl DeviceBackend for ScriptedBackend {
    async fn connect(&self) -> Result<DeviceHandle, AppError> {
        if self.fail_connect {
            return Err(AppError::MissingCredentials("GBOX_API_KEY".to_string()));
        }
        Ok(DeviceHandle {
            backend: BackendKind::Mock,
            device_id: "scripted".to_string(),
            session_id: "scripted-session".to_string(),
        })
    }

    async fn perform(&self, request: &OperationRequest) -> Result<OperationResult, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Ok);
        match step {
            Step::Ok => Ok(OperationResult::ok(request, None)),
            Step::Fail => Ok(OperationResult::failed(request, "element-not-found")),
            Step::Fatal => Err(AppError::BackendUnreachable("connection reset".to_string())),
        }
    }

    fn describe(&self) -> Result<BackendInfo, AppError> {
        Ok(BackendInfo {
            kind: BackendKind::Mock,
            name: "scripted".to_string(),
            version: "test".to_string(),
            device_id: "scripted".to_string(),
            endpoint: None,
            session_id: None,
        })
    }

    async fn release(&self) -> Result<(), AppError> {
        Ok(())
    }

    fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}
