use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;
use tracing::info;

use orchestrator_core::{
    ConfigValidator, CronTaskRunner, HealthChecker, Notifier, OrchestratorConfig,
    TokioCronRunner,
};
use orchestrator_recovery::RecoveryManager;
use orchestrator_registry::{ServiceDiscovery, ServiceRegistry};
use orchestrator_scheduler::ServiceScheduler;

/// 组装注册中心、发现、调度器与恢复管理器
///
/// 四个组件共享同一个通知器；调度器默认使用 [`TokioCronRunner`]。
pub struct ServiceHost {
    service_name: String,
    config: OrchestratorConfig,
    registry: ServiceRegistry,
    discovery: ServiceDiscovery,
    scheduler: ServiceScheduler,
    recovery: RecoveryManager,
}

pub struct ServiceHostBuilder {
    service_name: String,
    config: OrchestratorConfig,
    notifier: Option<Arc<dyn Notifier>>,
    health_checker: Option<Arc<dyn HealthChecker>>,
    cron_runner: Option<Arc<dyn CronTaskRunner>>,
}

impl ServiceHostBuilder {
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_health_checker(mut self, checker: Arc<dyn HealthChecker>) -> Self {
        self.health_checker = Some(checker);
        self
    }

    pub fn with_cron_runner(mut self, runner: Arc<dyn CronTaskRunner>) -> Self {
        self.cron_runner = Some(runner);
        self
    }

    /// 校验配置并创建全部组件
    pub fn build(self) -> anyhow::Result<ServiceHost> {
        self.config.validate().context("编排配置校验失败")?;

        let registry = ServiceRegistry::new(self.config.registry.clone(), self.notifier.clone());
        let discovery = ServiceDiscovery::new(registry.clone());
        let runner = self
            .cron_runner
            .unwrap_or_else(|| Arc::new(TokioCronRunner::new()) as Arc<dyn CronTaskRunner>);
        let scheduler = ServiceScheduler::new(
            self.config.scheduler.clone(),
            runner,
            self.health_checker,
            self.notifier.clone(),
        );
        let recovery = RecoveryManager::new(
            self.service_name.clone(),
            self.config.recovery.clone(),
            self.notifier,
        );

        info!(service = %self.service_name, "服务编排组件已创建");
        Ok(ServiceHost {
            service_name: self.service_name,
            config: self.config,
            registry,
            discovery,
            scheduler,
            recovery,
        })
    }
}

impl ServiceHost {
    pub fn builder(service_name: impl Into<String>, config: OrchestratorConfig) -> ServiceHostBuilder {
        ServiceHostBuilder {
            service_name: service_name.into(),
            config,
            notifier: None,
            health_checker: None,
            cron_runner: None,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn discovery(&self) -> &ServiceDiscovery {
        &self.discovery
    }

    pub fn scheduler(&self) -> &ServiceScheduler {
        &self.scheduler
    }

    pub fn recovery(&self) -> &RecoveryManager {
        &self.recovery
    }

    /// 启动注册中心健康巡检与调度器
    pub async fn start(&self) {
        self.registry.start_health_monitor().await;
        self.scheduler.start().await;
        info!(service = %self.service_name, "服务编排已启动");
    }

    /// 停止并销毁调度器、停止健康巡检、清理恢复管理器
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        self.scheduler.destroy().await;
        self.registry.stop_health_monitor().await;
        self.recovery.cleanup().await;
        info!(service = %self.service_name, "服务编排已关闭");
    }

    /// 启动后一直运行到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        self.start().await;

        // 发送端被丢弃同样视为关闭
        let _ = shutdown_rx.recv().await;
        info!(service = %self.service_name, "收到关闭信号");

        self.shutdown().await;
        Ok(())
    }
}

impl std::fmt::Debug for ServiceHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHost")
            .field("service_name", &self.service_name)
            .field("config", &self.config)
            .finish()
    }
}
