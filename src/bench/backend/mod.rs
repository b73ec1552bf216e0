pub mod mock;
pub mod remote;

pub use mock::*;
pub use remote::*;

use std::sync::Arc;
use tracing::info;
use crate::bench::config::{BackendChoice, BackendConfig};
use crate::bench::core::traits::DeviceBackend;
use crate::error::AppError;

/// 创建设备后端（工厂函数）
///
/// `auto` 在提供了远程凭证时选择远程后端，否则回退到 Mock 后端。
/// 显式选择 `remote` 但缺少凭证时返回配置错误，不会发起任何请求。
pub fn create_backend(config: &BackendConfig) -> Result<Arc<dyn DeviceBackend>, AppError> {
    let use_remote = match config.kind {
        BackendChoice::Mock => false,
        BackendChoice::Remote => {
            if config.remote.api_key.trim().is_empty() {
                return Err(AppError::MissingCredentials("GBOX_API_KEY".to_string()));
            }
            true
        }
        BackendChoice::Auto => !config.remote.api_key.trim().is_empty(),
    };

    if use_remote {
        info!("使用远程后端: {} ({})", config.remote.base_url, config.remote.device_id);
        Ok(Arc::new(RemoteBackend::new(config.remote.clone())?))
    } else {
        info!("使用 Mock 后端 (延迟 {}ms)", config.mock.delay_ms);
        Ok(Arc::new(
            MockBackend::new(config.mock.device_id.clone()).with_delay_ms(config.mock.delay_ms),
        ))
    }
}
