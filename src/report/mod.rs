//! JSONL 运行报告
//!
//! 每个任务结果一行，每次批量运行的汇总一行。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};
use uuid::Uuid;
use crate::bench::bridge::BridgeEvent;
use crate::bench::core::types::{RunSummary, TaskOutcome};

/// 报告行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub timestamp: DateTime<Utc>,
    pub report_id: String,
    #[serde(flatten)]
    pub event: ReportEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReportEvent {
    RunStart { run_id: String, total: usize },
    TaskOutcome { run_id: Option<String>, outcome: TaskOutcome },
    /// 汇总行不重复包含各任务结果
    RunSummary { run_id: String, summary: RunSummary },
}

/// JSONL 报告记录器
pub struct JsonlReporter {
    report_id: String,
    path: PathBuf,
    file: Mutex<std::fs::File>,
}

impl JsonlReporter {
    /// 以追加方式打开报告文件
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            report_id: Uuid::new_v4().to_string(),
            path,
            file: Mutex::new(file),
        })
    }

    pub fn report_id(&self) -> &str {
        &self.report_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 记录单个任务结果
    pub async fn record_outcome(&self, run_id: Option<&str>, outcome: &TaskOutcome) -> Result<(), std::io::Error> {
        self.write(ReportEvent::TaskOutcome {
            run_id: run_id.map(str::to_string),
            outcome: outcome.clone(),
        })
        .await
    }

    /// 记录批量运行汇总
    pub async fn record_summary(&self, run_id: &str, summary: &RunSummary) -> Result<(), std::io::Error> {
        let mut summary = summary.clone();
        summary.outcomes.clear();
        self.write(ReportEvent::RunSummary {
            run_id: run_id.to_string(),
            summary,
        })
        .await
    }

    /// 根据桥接层事件写入报告，任务开始事件不记录
    pub async fn record_event(&self, event: &BridgeEvent) -> Result<(), std::io::Error> {
        match event {
            BridgeEvent::RunStarted { run_id, total } => {
                self.write(ReportEvent::RunStart {
                    run_id: run_id.clone(),
                    total: *total,
                })
                .await
            }
            BridgeEvent::TaskStarted { .. } => Ok(()),
            BridgeEvent::TaskFinished { run_id, outcome, .. } => {
                self.record_outcome(Some(run_id), outcome).await
            }
            BridgeEvent::RunFinished { run_id, summary } => self.record_summary(run_id, summary).await,
        }
    }

    /// 持续消费事件直到发送端关闭
    pub async fn follow(&self, mut events: broadcast::Receiver<BridgeEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = self.record_event(&event).await {
                        warn!("写入报告失败: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("报告落后，丢失了 {} 个事件", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn write(&self, event: ReportEvent) -> Result<(), std::io::Error> {
        let entry = ReportEntry {
            timestamp: Utc::now(),
            report_id: self.report_id.clone(),
            event,
        };

        let line = format!("{}\n", serde_json::to_string(&entry)?);

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())?;
        file.flush()?;

        debug!("报告已写入: {}", self.path.display());
        Ok(())
    }
}

/// 读取报告文件中的全部条目
pub fn read_entries<P: AsRef<Path>>(path: P) -> Result<Vec<ReportEntry>, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(std::io::Error::from))
        .collect()
}
