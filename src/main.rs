use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use processor_core::config::LogFormat;
use processor_core::{init_logging, validate_error_codes, AppConfig};
use task_processor::app::{AppMode, Application};
use task_processor::shutdown::{wait_for_shutdown_signal, ShutdownManager};
use tracing::{error, info, warn};

/// 任务处理系统
#[derive(Debug, Parser)]
#[command(name = "task-processor", version, about = "任务处理系统")]
struct Cli {
    /// 配置文件路径，缺省时依次查找 config/processor.toml、processor.toml
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// 运行模式
    #[arg(short, long, value_enum, default_value_t = AppMode::All)]
    mode: AppMode,

    /// 日志级别，覆盖配置文件
    #[arg(short, long, value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// 日志格式，覆盖配置文件
    #[arg(long, value_parser = ["json", "pretty"])]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("加载配置失败")?;
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    if let Some(format) = cli.log_format.as_deref() {
        config.observability.log_format = match format {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
    }

    init_logging(
        &config.observability.log_level,
        config.observability.log_format,
    )?;

    info!("Starting task processor in {:?} mode", cli.mode);
    validate_error_codes().context("错误码表无效")?;

    let metrics = if config.observability.metrics_enabled {
        Some(install_metrics_recorder()?)
    } else {
        None
    };

    let app = Arc::new(Application::new(config, cli.mode, metrics).await?);
    let shutdown_manager = ShutdownManager::new();

    let mut app_handle = {
        let app = Arc::clone(&app);
        let shutdown_rx = shutdown_manager.subscribe().await;
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    // 组件失败时进程以错误退出，不等待信号
    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("Shutdown signal received, stopping gracefully");
        }
        result = &mut app_handle => {
            return match result {
                Ok(Ok(())) => {
                    info!("Application stopped");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!("Application failed: {:#}", e);
                    Err(e)
                }
                Err(e) => Err(anyhow::anyhow!("应用任务异常退出: {e}")),
            };
        }
    }

    shutdown_manager.shutdown().await;

    // 正在执行的任务不会被打断，给足时间完成
    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(Ok(()))) => info!("Application shut down gracefully"),
        Ok(Ok(Err(e))) => error!("Application failed during shutdown: {:#}", e),
        Ok(Err(e)) => error!("Application task panicked: {}", e),
        Err(_) => warn!("Shutdown timed out, exiting"),
    }

    Ok(())
}

/// 安装全局指标记录器，并定期清理直方图桶
fn install_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("安装Prometheus指标记录器失败")?;

    let upkeep = handle.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            upkeep.run_upkeep();
        }
    });

    Ok(handle)
}
