//! 服务发现模式
//!
//! 建立在 [`ServiceRegistry`] 查询之上的组合操作，本身不持有状态。

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use orchestrator_core::{OrchestratorError, OrchestratorResult, ServiceQuery, ServiceRegistration};

use crate::registry::ServiceRegistry;
use crate::version::satisfies_min_version;

/// 依赖检查结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyCheckReport {
    pub service_id: String,
    /// 未注册的依赖
    pub missing: Vec<String>,
    /// 已注册但不健康的依赖（仅在要求健康时检查）
    pub unhealthy: Vec<String>,
    /// 可用的依赖
    pub available: Vec<String>,
    /// 必需依赖中没有缺失或不健康的
    pub satisfied: bool,
}

/// 服务发现
#[derive(Debug, Clone)]
pub struct ServiceDiscovery {
    registry: ServiceRegistry,
}

impl ServiceDiscovery {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// 选择指定名称的最佳实例
    ///
    /// `prefer_healthy` 时先只看健康实例，没有则退回全部实例；多个候选取 `last_seen` 最新的。
    pub async fn find_best_service(
        &self,
        service_name: &str,
        prefer_healthy: bool,
    ) -> Option<ServiceRegistration> {
        let query = ServiceQuery::by_name(service_name).healthy_only(prefer_healthy);
        let mut candidates = self.registry.find_services(&query).await;

        if candidates.is_empty() && prefer_healthy {
            debug!(service_name = %service_name, "没有健康实例，退回全部实例");
            candidates = self
                .registry
                .find_services(&ServiceQuery::by_name(service_name))
                .await;
        }

        Self::most_recent(candidates)
    }

    pub async fn find_services_by_type(
        &self,
        service_type: &str,
        healthy_only: bool,
    ) -> Vec<ServiceRegistration> {
        let query = ServiceQuery::by_type(service_type).healthy_only(healthy_only);
        self.registry.find_services(&query).await
    }

    /// 按能力查找服务，可选要求能力版本不低于 `min_version`
    pub async fn find_services_by_capability(
        &self,
        capability: &str,
        min_version: Option<&str>,
        healthy_only: bool,
    ) -> Vec<ServiceRegistration> {
        let query = ServiceQuery::new()
            .with_capability(capability)
            .healthy_only(healthy_only);
        let services = self.registry.find_services(&query).await;

        match min_version {
            Some(min_version) => services
                .into_iter()
                .filter(|service| {
                    service
                        .capability(capability)
                        .is_some_and(|c| satisfies_min_version(&c.version, min_version))
                })
                .collect(),
            None => services,
        }
    }

    /// 启动顺序，尽力而为：依赖解析失败时记录警告并退回注册顺序
    pub async fn get_startup_order(&self, service_ids: Option<&[String]>) -> Vec<String> {
        match self.registry.resolve_dependency_order(service_ids).await {
            Ok(order) => order,
            Err(e) => {
                warn!(error = %e, "依赖顺序解析失败，使用注册顺序");
                let registered = self.registry.get_all_services().await;
                let requested: Option<HashSet<&str>> =
                    service_ids.map(|ids| ids.iter().map(String::as_str).collect());
                registered
                    .into_iter()
                    .map(|s| s.service_id)
                    .filter(|id| requested.as_ref().map_or(true, |set| set.contains(id.as_str())))
                    .collect()
            }
        }
    }

    /// 检查服务声明的依赖
    ///
    /// `recursive` 时沿已注册的依赖继续向下检查，遇到环不会重复访问。
    pub async fn check_dependencies(
        &self,
        service_id: &str,
        require_healthy: bool,
        recursive: bool,
    ) -> OrchestratorResult<DependencyCheckReport> {
        let root = self
            .registry
            .get_service(service_id)
            .await
            .ok_or_else(|| OrchestratorError::service_not_found(service_id))?;

        let mut report = DependencyCheckReport {
            service_id: service_id.to_string(),
            satisfied: true,
            ..Default::default()
        };
        let mut visited = HashSet::from([service_id.to_string()]);
        let mut checked = visited.clone();
        let mut pending = vec![root];

        while let Some(service) = pending.pop() {
            for dependency in &service.dependencies {
                if !checked.insert(dependency.service_id.clone()) {
                    continue;
                }

                let Some(target) = self.registry.get_service(&dependency.service_id).await else {
                    report.missing.push(dependency.service_id.clone());
                    report.satisfied &= !dependency.required;
                    continue;
                };

                let healthy = self
                    .registry
                    .get_service_health(&dependency.service_id)
                    .await
                    .is_some_and(|h| h.status.is_healthy());

                if require_healthy && !healthy {
                    report.unhealthy.push(dependency.service_id.clone());
                    report.satisfied &= !dependency.required;
                } else {
                    report.available.push(dependency.service_id.clone());
                }

                if recursive && visited.insert(target.service_id.clone()) {
                    pending.push(target);
                }
            }
        }

        Ok(report)
    }

    /// 轮询等待服务出现，超时返回 None
    pub async fn wait_for_service(
        &self,
        service_name: &str,
        timeout: Duration,
        interval: Duration,
        require_healthy: bool,
    ) -> Option<ServiceRegistration> {
        let deadline = Instant::now() + timeout;

        loop {
            let found = if require_healthy {
                let query = ServiceQuery::by_name(service_name).healthy_only(true);
                Self::most_recent(self.registry.find_services(&query).await)
            } else {
                self.find_best_service(service_name, false).await
            };
            if found.is_some() {
                return found;
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(service_name = %service_name, "等待服务超时");
                return None;
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
        }
    }

    fn most_recent(candidates: Vec<ServiceRegistration>) -> Option<ServiceRegistration> {
        candidates.into_iter().max_by_key(|s| s.last_seen)
    }
}
