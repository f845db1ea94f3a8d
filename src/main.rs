use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use tokio::signal;
use tracing::{error, info, warn};

use orchestrator_core::logging::init_logging;
use orchestrator_core::{task_fn, OrchestratorConfig, ServiceRegistration};
use orchestrator_scheduler::TaskOptions;
use service_orchestrator::{ServiceHost, ShutdownManager};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("orchestrator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("进程内服务编排")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，不指定时尝试默认位置"),
        )
        .arg(
            Arg::new("service")
                .short('s')
                .long("service")
                .value_name("NAME")
                .help("宿主服务名")
                .default_value("orchestrator"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .default_value("info"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(["json", "pretty", "compact"])
                .default_value("pretty"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let service_name = matches
        .get_one::<String>("service")
        .cloned()
        .unwrap_or_else(|| "orchestrator".to_string());
    let log_level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("info");
    let log_format = matches
        .get_one::<String>("log-format")
        .map(String::as_str)
        .unwrap_or("pretty");

    init_logging(log_level, log_format)?;

    let config = OrchestratorConfig::load(config_path).context("加载编排配置失败")?;
    let host = Arc::new(ServiceHost::builder(service_name.clone(), config).build()?);

    host.registry()
        .register_service(ServiceRegistration::new(
            &service_name,
            &service_name,
            "orchestrator",
            env!("CARGO_PKG_VERSION"),
        ))
        .await;

    // 宿主自身的心跳，保证巡检不会把它判为离线
    let registry = host.registry().clone();
    let heartbeat_id = service_name.clone();
    host.scheduler()
        .schedule_task(
            "self-heartbeat",
            "*/10 * * * * *",
            task_fn(move || {
                let registry = registry.clone();
                let id = heartbeat_id.clone();
                async move {
                    if !registry.heartbeat(&id).await {
                        anyhow::bail!("宿主服务未注册: {id}");
                    }
                    Ok(())
                }
            }),
            TaskOptions::default().without_health_check(),
        )
        .await?;

    let shutdown_manager = ShutdownManager::new();
    let host_handle = {
        let shutdown_rx = shutdown_manager.subscribe().await;
        let host = Arc::clone(&host);
        tokio::spawn(async move {
            if let Err(e) = host.run(shutdown_rx).await {
                error!("编排运行失败: {e:#}");
            }
        })
    };

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), host_handle).await {
        Ok(Ok(())) => info!("已优雅关闭"),
        Ok(Err(e)) => error!("关闭时发生错误: {e}"),
        Err(_) => warn!("关闭超时，强制退出"),
    }
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("监听Ctrl+C信号失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到Ctrl+C信号"),
        _ = terminate => info!("收到SIGTERM信号"),
    }
}
