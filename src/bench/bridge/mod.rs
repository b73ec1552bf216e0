//! 基准测试桥接层
//!
//! 从任务注册表解析任务，依次交给 TaskExecutor 执行，并汇总结果。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use crate::bench::config::RunConfig;
use crate::bench::core::traits::{BackendInfo, DeviceBackend};
use crate::bench::core::types::{RunSummary, TaskCategory, TaskOutcome, TaskParams};
use crate::bench::executor::{RetryPolicy, TaskExecutor};
use crate::bench::registry::{TaskRegistry, infer_category};
use crate::error::AppError;

/// 桥接层事件
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// 批量运行开始
    RunStarted { run_id: String, total: usize },

    /// 任务开始
    TaskStarted { run_id: String, index: usize, task_id: String },

    /// 任务结束
    TaskFinished { run_id: String, index: usize, outcome: TaskOutcome },

    /// 批量运行结束
    RunFinished { run_id: String, summary: RunSummary },
}

/// 批量运行的任务选择
#[derive(Debug, Clone, Default)]
pub struct TaskSelection {
    /// 显式任务列表，未设置时取注册表全部任务
    pub ids: Option<Vec<String>>,
    /// 类别过滤，只作用于注册表中的任务
    pub category: Option<TaskCategory>,
    pub limit: Option<usize>,
}

impl TaskSelection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: Some(ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: TaskCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

pub struct BenchmarkBridge {
    registry: Arc<dyn TaskRegistry>,
    executor: TaskExecutor,
    run_config: RunConfig,
    summary: Arc<RwLock<RunSummary>>,
    history: RwLock<Vec<TaskOutcome>>,
    executed: AtomicUsize,
    run_lock: Mutex<()>,
    cancel: CancellationToken,
    event_tx: broadcast::Sender<BridgeEvent>,
}

impl BenchmarkBridge {
    pub fn new(
        registry: Arc<dyn TaskRegistry>,
        backend: Arc<dyn DeviceBackend>,
        retry: RetryPolicy,
        run_config: RunConfig,
    ) -> Self {
        let (event_tx, _event_rx) = broadcast::channel(100);

        Self {
            registry,
            executor: TaskExecutor::new(backend, retry),
            run_config,
            summary: Arc::new(RwLock::new(RunSummary::new())),
            history: RwLock::new(Vec::new()),
            executed: AtomicUsize::new(0),
            run_lock: Mutex::new(()),
            cancel: CancellationToken::new(),
            event_tx,
        }
    }

    pub fn registry(&self) -> &Arc<dyn TaskRegistry> {
        &self.registry
    }

    pub fn describe_backend(&self) -> Result<BackendInfo, AppError> {
        self.executor.describe_backend()
    }

    /// 桥接层生命周期内执行过的任务数（含 run_one 和配置错误）
    pub fn tasks_executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    /// 按执行顺序返回全部任务结果
    pub async fn history(&self) -> Vec<TaskOutcome> {
        self.history.read().await.clone()
    }

    /// 运行级取消令牌，在每个任务派发前检查，正在执行的任务总会完成
    ///
    /// 令牌与桥接层同生命周期，取消后后续的批量运行都会立即结束。
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 订阅桥接层事件
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.event_tx.subscribe()
    }

    /// 当前（或最近一次）批量运行的汇总快照
    pub async fn summary_snapshot(&self) -> RunSummary {
        self.summary.read().await.clone()
    }

    /// 运行单个任务，调用方参数覆盖注册表中的默认参数
    ///
    /// 只有连接后端失败时返回 `Err`。
    pub async fn run_one(&self, task_id: &str, params: &TaskParams) -> Result<TaskOutcome, AppError> {
        let _guard = self.run_lock.lock().await;

        if !self.registry.contains(task_id) {
            let outcome = self.unknown_task(task_id);
            self.remember(&outcome).await;
            return Ok(outcome);
        }

        self.connect().await?;
        let outcome = self.execute_task(task_id, params).await;
        self.remember(&outcome).await;
        Ok(outcome)
    }

    /// 依次运行一组任务
    ///
    /// 先连接后端，连接失败时整个运行以 `AppError::ConnectFailed` 结束。单个任务的失败不影响后续任务。
    pub async fn run_many(&self, selection: TaskSelection) -> Result<RunSummary, AppError> {
        let _guard = self.run_lock.lock().await;

        let task_ids = self.select(&selection);
        let run_id = Uuid::new_v4().to_string();

        *self.summary.write().await = RunSummary::new();

        if task_ids.is_empty() {
            warn!("没有匹配的任务");
            return Ok(self.finish(&run_id, false).await);
        }

        self.connect().await?;

        info!("开始批量运行 {}: {} 个任务", run_id, task_ids.len());
        let _ = self.event_tx.send(BridgeEvent::RunStarted {
            run_id: run_id.clone(),
            total: task_ids.len(),
        });

        let delay = Duration::from_millis(self.run_config.inter_task_delay_ms);
        let mut cancelled = false;

        for (index, task_id) in task_ids.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            if self.cancel.is_cancelled() {
                warn!("批量运行 {} 已取消，剩余 {} 个任务未执行", run_id, task_ids.len() - index);
                cancelled = true;
                break;
            }

            let _ = self.event_tx.send(BridgeEvent::TaskStarted {
                run_id: run_id.clone(),
                index,
                task_id: task_id.clone(),
            });

            let outcome = self.execute_task(task_id, &TaskParams::new()).await;
            self.remember(&outcome).await;
            self.summary.write().await.record(outcome.clone());

            let _ = self.event_tx.send(BridgeEvent::TaskFinished {
                run_id: run_id.clone(),
                index,
                outcome,
            });
        }

        Ok(self.finish(&run_id, cancelled).await)
    }

    /// 释放后端会话
    pub async fn shutdown(&self) -> Result<(), AppError> {
        let _guard = self.run_lock.lock().await;
        info!("释放后端会话");
        self.executor.backend().release().await
    }

    async fn connect(&self) -> Result<(), AppError> {
        match self.executor.backend().connect().await {
            Ok(handle) => {
                debug!("后端已连接: {} ({})", handle.device_id, handle.session_id);
                Ok(())
            }
            Err(e) => {
                error!("连接后端失败: {}", e);
                Err(AppError::ConnectFailed(Box::new(e)))
            }
        }
    }

    async fn remember(&self, outcome: &TaskOutcome) {
        self.executed.fetch_add(1, Ordering::SeqCst);
        self.history.write().await.push(outcome.clone());
    }

    fn select(&self, selection: &TaskSelection) -> Vec<String> {
        let mut ids = match &selection.ids {
            Some(ids) => ids.clone(),
            None => self
                .registry
                .task_ids()
                .into_iter()
                .filter(|id| match &selection.category {
                    Some(category) => self
                        .registry
                        .lookup(id)
                        .is_some_and(|spec| &spec.category == category),
                    None => true,
                })
                .collect(),
        };

        let configured = (self.run_config.max_tasks > 0).then_some(self.run_config.max_tasks);
        let limit = match (selection.limit, configured) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        if let Some(limit) = limit {
            ids.truncate(limit);
        }
        ids
    }

    async fn execute_task(&self, task_id: &str, params: &TaskParams) -> TaskOutcome {
        match self.registry.lookup(task_id) {
            Some(spec) => self.executor.run(&spec.with_overrides(params)).await,
            None => self.unknown_task(task_id),
        }
    }

    fn unknown_task(&self, task_id: &str) -> TaskOutcome {
        warn!("未注册的任务: {}", task_id);
        TaskOutcome::configuration_error(
            task_id,
            infer_category(task_id),
            &AppError::UnknownTask(task_id.to_string()),
        )
    }

    async fn finish(&self, run_id: &str, cancelled: bool) -> RunSummary {
        let summary = {
            let mut summary = self.summary.write().await;
            summary.finalize(cancelled);
            summary.clone()
        };

        info!(
            "批量运行 {} 结束: {}/{} 成功 ({:.1}%)",
            run_id,
            summary.succeeded,
            summary.total,
            summary.success_rate() * 100.0
        );

        let _ = self.event_tx.send(BridgeEvent::RunFinished {
            run_id: run_id.to_string(),
            summary: summary.clone(),
        });

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::backend::MockBackend;
    use crate::bench::core::traits::OperationRequest;
    use crate::bench::core::types::TaskSpec;
    use crate::bench::executor::RetryStrategy;
    use crate::bench::registry::StaticRegistry;
    use crate::bench::testing::{ScriptedBackend, Step};
    use serde_json::json;

    fn registry() -> Arc<dyn TaskRegistry> {
        Arc::new(
            StaticRegistry::from_specs([
                TaskSpec::new("SystemWifiTurnOn", TaskCategory::System),
                TaskSpec::new("SystemBluetoothTurnOff", TaskCategory::System),
                TaskSpec::new("SystemBrightnessMax", TaskCategory::System),
                TaskSpec::new("RecipeAddSingleRecipe", TaskCategory::Recipe),
                TaskSpec::new("ExpenseAddSingle", TaskCategory::from("expense")),
            ])
            .unwrap(),
        )
    }

    fn bridge(backend: Arc<dyn DeviceBackend>, run_config: RunConfig) -> BenchmarkBridge {
        BenchmarkBridge::new(
            registry(),
            backend,
            RetryPolicy::new(1, RetryStrategy::Immediate),
            run_config,
        )
    }

    #[tokio::test]
    async fn test_fatal_task_does_not_stop_run() {
        // 每个 system 任务两个操作，第二个任务第一步致命错误
        let backend = Arc::new(ScriptedBackend::new([Step::Ok, Step::Ok, Step::Fatal]));
        let bridge = bridge(backend.clone(), RunConfig::default());

        let summary = bridge
            .run_many(TaskSelection::ids(["SystemWifiTurnOn", "SystemBluetoothTurnOff", "SystemBrightnessMax"]))
            .await
            .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.backend_failures, 1);
        assert_eq!(summary.outcomes[1].failure_tag(), Some("backend-unreachable"));
        assert!(summary.finished);
        assert!(!summary.cancelled);
        assert_eq!(backend.call_count(), 5);
    }

    #[tokio::test]
    async fn test_unknown_task_makes_no_backend_calls() {
        let backend = Arc::new(MockBackend::new("emulator-5554").with_delay_ms(0));
        let bridge = bridge(backend.clone(), RunConfig::default());

        let outcome = bridge.run_one("NoSuchTask", &TaskParams::new()).await.unwrap();

        assert!(!outcome.success);
        assert!(outcome.is_configuration_error());
        assert!(outcome.operations.is_empty());
        assert_eq!(backend.call_count(), 0);
        assert!(!backend.is_connected());
    }

    #[tokio::test]
    async fn test_unknown_and_unplannable_tasks_in_batch() {
        let backend = Arc::new(MockBackend::new("emulator-5554").with_delay_ms(0));
        let bridge = bridge(backend.clone(), RunConfig::default());

        let summary = bridge
            .run_many(TaskSelection::ids(["NoSuchTask", "ExpenseAddSingle", "SystemWifiTurnOn"]))
            .await
            .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.configuration_errors, 2);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_run_one_overlays_params() {
        let backend = Arc::new(MockBackend::new("emulator-5554").with_delay_ms(0));
        let bridge = bridge(backend.clone(), RunConfig::default());

        let mut params = TaskParams::new();
        params.insert("recipe_name".to_string(), json!("Ramen"));

        let outcome = bridge.run_one("RecipeAddSingleRecipe", &params).await.unwrap();

        assert!(outcome.success);
        assert!(backend.call_log().contains(&OperationRequest::TypeText {
            text: "Ramen".to_string()
        }));
    }

    #[tokio::test]
    async fn test_connect_failure_aborts_run() {
        let backend = Arc::new(ScriptedBackend::unreachable());
        let bridge = bridge(backend.clone(), RunConfig::default());

        let result = bridge.run_many(TaskSelection::all()).await;

        let err = result.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(err.kind(), "connect-failed");
        assert!(matches!(err.connect_cause(), Some(AppError::MissingCredentials(_))));
        assert_eq!(backend.call_count(), 0);
        assert_eq!(bridge.summary_snapshot().await.total, 0);

        let result = bridge.run_one("SystemWifiTurnOn", &TaskParams::new()).await;
        assert!(matches!(result, Err(AppError::ConnectFailed(_))));
        assert_eq!(bridge.tasks_executed(), 0);
    }

    #[tokio::test]
    async fn test_selection_by_category_and_limit() {
        let backend = Arc::new(MockBackend::new("emulator-5554").with_delay_ms(0));
        let bridge = bridge(backend, RunConfig::default());

        let summary = bridge
            .run_many(TaskSelection::all().with_category(TaskCategory::System).with_limit(2))
            .await
            .unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(summary.outcomes[0].task_id, "SystemWifiTurnOn");
        assert_eq!(summary.outcomes[1].task_id, "SystemBluetoothTurnOff");
        assert_eq!(summary.by_category[&TaskCategory::System].total, 2);
        assert_eq!(bridge.summary_snapshot().await, summary);
    }

    #[tokio::test]
    async fn test_configured_max_tasks() {
        let backend = Arc::new(MockBackend::new("emulator-5554").with_delay_ms(0));
        let bridge = bridge(backend, RunConfig { max_tasks: 1, inter_task_delay_ms: 0 });

        let summary = bridge.run_many(TaskSelection::all().with_limit(3)).await.unwrap();
        assert_eq!(summary.total, 1);
    }

    #[tokio::test]
    async fn test_cancel_before_run() {
        let backend = Arc::new(MockBackend::new("emulator-5554").with_delay_ms(0));
        let bridge = bridge(backend.clone(), RunConfig::default());

        bridge.cancel_token().cancel();
        let summary = bridge.run_many(TaskSelection::all()).await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.total, 0);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_after_first_task() {
        let backend = Arc::new(MockBackend::new("emulator-5554").with_delay_ms(0));
        let bridge = bridge(backend, RunConfig { max_tasks: 0, inter_task_delay_ms: 200 });

        let mut events = bridge.subscribe();
        let token = bridge.cancel_token();
        let watcher = tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let BridgeEvent::TaskFinished { index: 0, .. } = event {
                    token.cancel();
                    break;
                }
            }
        });

        let summary = bridge.run_many(TaskSelection::all()).await.unwrap();
        watcher.await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.total, 1);
        assert!(summary.outcomes[0].success);
    }

    #[tokio::test]
    async fn test_summary_visible_mid_run() {
        let backend = Arc::new(MockBackend::new("emulator-5554").with_delay_ms(0));
        let bridge = Arc::new(bridge(backend, RunConfig { max_tasks: 0, inter_task_delay_ms: 200 }));

        let mut events = bridge.subscribe();
        let observer = Arc::clone(&bridge);
        let watcher = tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let BridgeEvent::TaskFinished { index: 0, .. } = event {
                    return Some(observer.summary_snapshot().await);
                }
            }
            None
        });

        let summary = bridge
            .run_many(TaskSelection::ids(["SystemWifiTurnOn", "SystemBluetoothTurnOff"]))
            .await
            .unwrap();
        let partial = watcher.await.unwrap().unwrap();

        assert_eq!(partial.total, 1);
        assert_eq!(partial.succeeded, 1);
        assert_eq!(partial.outcomes.len(), 1);
        assert!(!partial.finished);

        assert_eq!(summary.total, 2);
        assert!(summary.finished);
    }

    #[tokio::test]
    async fn test_history_counts_every_execution() {
        let backend = Arc::new(ScriptedBackend::new([Step::Fatal]));
        let bridge = bridge(backend, RunConfig::default());

        bridge.run_one("SystemWifiTurnOn", &TaskParams::new()).await.unwrap();
        bridge.run_one("NoSuchTask", &TaskParams::new()).await.unwrap();
        bridge
            .run_many(TaskSelection::ids(["SystemBluetoothTurnOff", "SystemBrightnessMax"]))
            .await
            .unwrap();

        assert_eq!(bridge.tasks_executed(), 4);
        let history = bridge.history().await;
        let ids: Vec<_> = history.iter().map(|o| o.task_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["SystemWifiTurnOn", "NoSuchTask", "SystemBluetoothTurnOff", "SystemBrightnessMax"]
        );
        assert_eq!(history[0].failure_tag(), Some("backend-unreachable"));
        assert!(history[1].is_configuration_error());
    }

    #[tokio::test]
    async fn test_events_cover_run() {
        let backend = Arc::new(MockBackend::new("emulator-5554").with_delay_ms(0));
        let bridge = bridge(backend, RunConfig::default());
        let mut events = bridge.subscribe();

        bridge.run_many(TaskSelection::ids(["SystemWifiTurnOn"])).await.unwrap();

        assert!(matches!(events.recv().await.unwrap(), BridgeEvent::RunStarted { total: 1, .. }));
        assert!(matches!(events.recv().await.unwrap(), BridgeEvent::TaskStarted { index: 0, .. }));
        assert!(matches!(events.recv().await.unwrap(), BridgeEvent::TaskFinished { index: 0, .. }));
        match events.recv().await.unwrap() {
            BridgeEvent::RunFinished { summary, .. } => assert_eq!(summary.succeeded, 1),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_runs_serialize() {
        let registry: Arc<dyn TaskRegistry> = Arc::new(
            StaticRegistry::from_specs([
                TaskSpec::new("SystemA", TaskCategory::System).with_param("target", json!([1, 1])),
                TaskSpec::new("SystemB", TaskCategory::System).with_param("target", json!([2, 2])),
            ])
            .unwrap(),
        );
        let backend = Arc::new(MockBackend::new("emulator-5554").with_delay_ms(2));
        let bridge = BenchmarkBridge::new(registry, backend.clone(), RetryPolicy::none(), RunConfig::default());

        let (a, b) = tokio::join!(
            bridge.run_many(TaskSelection::ids(["SystemA"])),
            bridge.run_many(TaskSelection::ids(["SystemB"])),
        );
        assert!(a.unwrap().succeeded == 1 && b.unwrap().succeeded == 1);

        let log = backend.call_log();
        assert_eq!(log.len(), 6);
        for chunk in log.chunks(3) {
            assert!(matches!(chunk[0], OperationRequest::LaunchApp { .. }));
            assert!(matches!(chunk[1], OperationRequest::Tap { .. }));
            assert_eq!(chunk[2], OperationRequest::QueryState);
        }
    }

    #[tokio::test]
    async fn test_shutdown_releases_session() {
        let backend = Arc::new(MockBackend::new("emulator-5554").with_delay_ms(0));
        let bridge = bridge(backend.clone(), RunConfig::default());

        bridge.run_one("SystemWifiTurnOn", &TaskParams::new()).await.unwrap();
        assert!(backend.is_connected());

        bridge.shutdown().await.unwrap();
        assert!(!backend.is_connected());
        assert_eq!(backend.release_count(), 1);
    }

    #[test]
    fn test_describe_backend() {
        let backend = Arc::new(MockBackend::new("pixel-7"));
        let bridge = bridge(backend, RunConfig::default());
        let info = bridge.describe_backend().unwrap();
        assert_eq!(info.device_id, "pixel-7");
    }
}
