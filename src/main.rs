use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

use droid_bench::bench::{
    BackendChoice, BenchConfig, BenchmarkBridge, DeviceBackend, RunSummary, StaticRegistry, TaskCategory,
    TaskOutcome, TaskParams, TaskRegistry, TaskSelection, create_backend, with_session,
};
use droid_bench::logger;
use droid_bench::report::JsonlReporter;

/// Android 基准任务执行工具
#[derive(Parser)]
#[command(name = "droid-bench", version)]
#[command(about = "Run Android benchmark tasks against a mock or remote device", long_about = None)]
struct Cli {
    /// 配置文件路径（TOML）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 覆盖配置中的后端选择
    #[arg(short, long, global = true, value_enum)]
    backend: Option<BackendArg>,

    /// 追加写入 JSONL 报告
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Auto,
    Mock,
    Remote,
}

impl From<BackendArg> for BackendChoice {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Auto => BackendChoice::Auto,
            BackendArg::Mock => BackendChoice::Mock,
            BackendArg::Remote => BackendChoice::Remote,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// 列出注册表中的任务
    List {
        #[arg(long)]
        category: Option<String>,
    },

    /// 显示后端信息
    Describe {
        /// 同时向后端查询设备详情
        #[arg(long)]
        probe: bool,
    },

    /// 运行单个任务
    Run {
        task: String,

        /// 任务参数，格式 key=value，value 可以是 JSON
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, serde_json::Value)>,
    },

    /// 依次运行多个任务
    #[command(name = "run-many")]
    RunMany {
        /// 任务 id，省略时运行注册表中的全部任务
        tasks: Vec<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },
}

fn parse_param(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("参数应为 key=value 格式: {}", raw))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("参数名不能为空: {}", raw));
    }

    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("错误: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => BenchConfig::from_file_with_env(path)
            .with_context(|| format!("加载配置失败: {}", path.display()))?,
        None => BenchConfig::from_env(),
    };
    if let Some(backend) = cli.backend {
        config.backend.kind = backend.into();
    }
    config.validate()?;

    let _log_guard = logger::init(&config.logging)?;

    let registry = match config.registry.catalogue_path() {
        Some(path) => StaticRegistry::from_file(path)?,
        None => StaticRegistry::builtin()?,
    };

    if let Commands::List { category } = &cli.command {
        list_tasks(&registry, category.as_deref().map(TaskCategory::from));
        return Ok(ExitCode::SUCCESS);
    }

    let backend = create_backend(&config.backend)?;

    if let Commands::Describe { probe } = &cli.command {
        let info = if *probe {
            backend.device_info().await?
        } else {
            serde_json::to_value(backend.describe()?)?
        };
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(ExitCode::SUCCESS);
    }

    let registry: Arc<dyn TaskRegistry> = Arc::new(registry);
    let bridge = BenchmarkBridge::new(registry, backend.clone(), config.retry_policy(), config.run.clone());

    let reporter = cli
        .report
        .as_ref()
        .map(|path| {
            JsonlReporter::create(path).with_context(|| format!("无法打开报告文件: {}", path.display()))
        })
        .transpose()?
        .map(Arc::new);

    let follower = reporter.clone().map(|reporter| {
        let events = bridge.subscribe();
        tokio::spawn(async move { reporter.follow(events).await })
    });

    let failed = match cli.command {
        Commands::Run { task, params } => {
            let params: TaskParams = params.into_iter().collect();
            let outcome = with_session(backend.as_ref(), |_| bridge.run_one(&task, &params)).await??;

            if let Some(reporter) = &reporter {
                reporter.record_outcome(None, &outcome).await?;
            }
            print_outcome(&outcome);
            !outcome.success
        }
        Commands::RunMany { tasks, category, limit } => {
            let mut selection = if tasks.is_empty() {
                TaskSelection::all()
            } else {
                TaskSelection::ids(tasks)
            };
            selection.category = category.as_deref().map(TaskCategory::from);
            selection.limit = limit;

            let token = bridge.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("收到中断信号，当前任务完成后停止");
                    token.cancel();
                }
            });

            let summary = with_session(backend.as_ref(), |_| bridge.run_many(selection)).await??;
            print_summary(&summary);
            summary.failed() > 0
        }
        Commands::List { .. } | Commands::Describe { .. } => false,
    };

    // 关闭事件通道，等待报告写完
    drop(bridge);
    if let Some(follower) = follower {
        follower.await?;
    }
    if let Some(reporter) = &reporter {
        info!("报告已写入 {}", reporter.path().display());
    }

    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn list_tasks(registry: &StaticRegistry, category: Option<TaskCategory>) {
    for spec in registry.tasks() {
        if category.as_ref().is_some_and(|c| c != &spec.category) {
            continue;
        }
        println!("{:<40} {}", spec.id, spec.category.as_str());
    }
}

fn print_outcome(outcome: &TaskOutcome) {
    let status = if outcome.success { "OK" } else { "FAIL" };
    println!(
        "{:<4} {:<40} {:>5} ops {:>8.2}s",
        status,
        outcome.task_id,
        outcome.operations.len(),
        outcome.elapsed.as_secs_f64()
    );
    if let Some(reason) = &outcome.failure {
        println!("     {}", reason);
    }
}

fn print_summary(summary: &RunSummary) {
    for outcome in &summary.outcomes {
        print_outcome(outcome);
    }

    println!();
    println!(
        "总计 {} 个任务，成功 {}，失败 {}，成功率 {:.1}%，耗时 {:.2}s",
        summary.total,
        summary.succeeded,
        summary.failed(),
        summary.success_rate() * 100.0,
        summary.total_elapsed.as_secs_f64()
    );
    println!(
        "配置错误 {}，操作失败 {}，后端不可用 {}",
        summary.configuration_errors, summary.operation_failures, summary.backend_failures
    );
    for (category, stats) in &summary.by_category {
        println!(
            "  {:<12} {}/{} ({:.1}%)",
            category.as_str(),
            stats.succeeded,
            stats.total,
            stats.success_rate() * 100.0
        );
    }
    if summary.cancelled {
        println!("运行已取消");
    }
}
