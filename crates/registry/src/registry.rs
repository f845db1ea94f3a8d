use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::gauge;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use orchestrator_core::{
    HealthCheckResult, HealthRecord, HealthStatus, NotificationDispatcher, Notifier,
    OrchestratorError, OrchestratorResult, RegistryConfig, ServiceCapability, ServiceDependency,
    ServiceQuery, ServiceRegistration,
};

use crate::dependency::topological_order;

/// 注册中心内部状态，由一把读写锁整体保护
#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    pub(crate) services: HashMap<String, ServiceRegistration>,
    /// 注册顺序；重复注册保留原位置
    pub(crate) order: Vec<String>,
    pub(crate) health: HashMap<String, HealthRecord>,
    pub(crate) dependencies: HashMap<String, Vec<ServiceDependency>>,
    pub(crate) capabilities: HashMap<String, Vec<ServiceCapability>>,
}

impl RegistryState {
    fn is_healthy(&self, service_id: &str) -> bool {
        self.health
            .get(service_id)
            .is_some_and(|record| record.status.is_healthy())
    }

    fn matches(&self, registration: &ServiceRegistration, query: &ServiceQuery) -> bool {
        if let Some(name) = &query.service_name {
            if &registration.service_name != name {
                return false;
            }
        }
        if let Some(service_type) = &query.service_type {
            if &registration.service_type != service_type {
                return false;
            }
        }
        if query.healthy_only && !self.is_healthy(&registration.service_id) {
            return false;
        }

        let capabilities = self.capabilities.get(&registration.service_id);
        let has_all_capabilities = query.required_capabilities.iter().all(|required| {
            capabilities.is_some_and(|caps| caps.iter().any(|c| &c.name == required))
        });
        if !has_all_capabilities {
            return false;
        }

        query
            .metadata
            .iter()
            .all(|(key, value)| registration.metadata.get(key) == Some(value))
    }
}

/// 健康状态变化（边沿触发），用于决定是否发送通知
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HealthTransition {
    pub(crate) previous: HealthStatus,
    pub(crate) current: HealthStatus,
}

/// 注册中心状态汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryStatus {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub services: Vec<ServiceSummary>,
}

/// 单个服务的扁平摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub service_id: String,
    pub service_name: String,
    pub service_type: String,
    pub version: String,
    pub health: HealthStatus,
    pub last_seen: DateTime<Utc>,
}

/// 服务注册中心
///
/// 维护同进程内服务实例的注册信息、能力、依赖与推断出的健康状态。
/// 句柄可廉价克隆，所有克隆共享同一份状态。
#[derive(Clone)]
pub struct ServiceRegistry {
    pub(crate) config: RegistryConfig,
    pub(crate) state: Arc<RwLock<RegistryState>>,
    pub(crate) notifications: NotificationDispatcher,
    pub(crate) monitor_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ServiceRegistry {
    /// 创建新的注册中心
    pub fn new(config: RegistryConfig, notifier: Option<Arc<dyn Notifier>>) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(RegistryState::default())),
            notifications: NotificationDispatcher::new(notifier, "service-registry"),
            monitor_handle: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// 注册服务
    ///
    /// 同一 `service_id` 重复注册时直接覆盖旧记录（保留其注册顺序位置），只记录警告。
    pub async fn register_service(&self, registration: ServiceRegistration) {
        let service_id = registration.service_id.clone();
        let service_name = registration.service_name.clone();
        let service_type = registration.service_type.clone();
        let version = registration.version.clone();

        let total = {
            let mut state = self.state.write().await;
            if state.services.contains_key(&service_id) {
                warn!(service_id = %service_id, "服务重复注册，覆盖已有注册信息");
            } else {
                state.order.push(service_id.clone());
            }
            state
                .capabilities
                .insert(service_id.clone(), registration.capabilities.clone());
            state
                .dependencies
                .insert(service_id.clone(), registration.dependencies.clone());
            state.services.insert(service_id.clone(), registration);
            state.services.len()
        };

        gauge!("orchestrator_registry_services").set(total as f64);
        info!(service_id = %service_id, service_name = %service_name, "服务已注册");
        self.notifications
            .info(
                format!("服务已注册: {service_name}"),
                json!({
                    "service_id": service_id,
                    "service_type": service_type,
                    "version": version,
                }),
            )
            .await;
    }

    /// 注销服务，未知 id 返回 false
    pub async fn deregister_service(&self, service_id: &str) -> bool {
        self.deregister_service_if(service_id, |_| true).await
    }

    /// 在写锁内对当前注册信息求值 `condition`，为真才注销
    pub(crate) async fn deregister_service_if<F>(&self, service_id: &str, condition: F) -> bool
    where
        F: FnOnce(&ServiceRegistration) -> bool,
    {
        let (removed, total) = {
            let mut state = self.state.write().await;
            let matched = state.services.get(service_id).is_some_and(condition);
            let removed = if matched {
                state.services.remove(service_id)
            } else {
                None
            };
            if removed.is_some() {
                state.order.retain(|id| id != service_id);
                state.health.remove(service_id);
                state.dependencies.remove(service_id);
                state.capabilities.remove(service_id);
            }
            (removed, state.services.len())
        };

        let Some(registration) = removed else {
            debug!(service_id = %service_id, "服务未知或不满足注销条件，忽略");
            return false;
        };

        gauge!("orchestrator_registry_services").set(total as f64);
        info!(service_id = %service_id, "服务已注销");
        self.notifications
            .info(
                format!("服务已注销: {}", registration.service_name),
                json!({ "service_id": service_id }),
            )
            .await;
        true
    }

    /// 更新服务健康状态
    ///
    /// 总会刷新 `last_seen`；只有状态与上一次记录不同才发送通知。
    /// 未知服务记录警告并返回 false。
    pub async fn update_service_health(&self, service_id: &str, result: HealthCheckResult) -> bool {
        let now = Utc::now();
        let transition = {
            let mut state = self.state.write().await;
            let Some(registration) = state.services.get_mut(service_id) else {
                warn!(service_id = %service_id, "更新未知服务的健康状态，忽略");
                return false;
            };
            registration.last_seen = now;
            Self::record_health(&mut state, service_id, result.status, now)
        };

        if let Some(transition) = transition {
            self.notify_transition(service_id, transition, result.message.as_deref())
                .await;
        }
        true
    }

    /// 心跳：只刷新 `last_seen`
    pub async fn heartbeat(&self, service_id: &str) -> bool {
        let mut state = self.state.write().await;
        match state.services.get_mut(service_id) {
            Some(registration) => {
                registration.last_seen = Utc::now();
                true
            }
            None => false,
        }
    }

    /// 写入一条健康记录，状态发生变化时返回变化
    pub(crate) fn record_health(
        state: &mut RegistryState,
        service_id: &str,
        status: HealthStatus,
        now: DateTime<Utc>,
    ) -> Option<HealthTransition> {
        let previous = state.health.get(service_id);
        let previous_status = previous.map_or(HealthStatus::Unknown, |r| r.status);
        let record = HealthRecord::next(previous, status, now);
        state.health.insert(service_id.to_string(), record);

        (previous_status != status).then_some(HealthTransition {
            previous: previous_status,
            current: status,
        })
    }

    pub(crate) async fn notify_transition(
        &self,
        service_id: &str,
        transition: HealthTransition,
        message: Option<&str>,
    ) {
        let data = json!({
            "service_id": service_id,
            "previous": transition.previous.to_string(),
            "current": transition.current.to_string(),
            "message": message,
        });

        if transition.current.is_healthy() {
            info!(service_id = %service_id, previous = %transition.previous, "服务恢复健康");
            self.notifications
                .info(format!("服务恢复健康: {service_id}"), data)
                .await;
        } else {
            warn!(service_id = %service_id, current = %transition.current, "服务健康状态异常");
            self.notifications
                .warn(format!("服务健康状态异常: {service_id}"), data)
                .await;
        }
    }

    pub async fn get_service(&self, service_id: &str) -> Option<ServiceRegistration> {
        self.state.read().await.services.get(service_id).cloned()
    }

    /// 按注册顺序返回全部服务
    pub async fn get_all_services(&self) -> Vec<ServiceRegistration> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.services.get(id).cloned())
            .collect()
    }

    pub async fn get_service_health(&self, service_id: &str) -> Option<HealthRecord> {
        self.state.read().await.health.get(service_id).cloned()
    }

    /// 声明依赖 `service_id` 的服务，按注册顺序
    pub async fn get_dependents(&self, service_id: &str) -> Vec<String> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter(|id| {
                state
                    .dependencies
                    .get(*id)
                    .is_some_and(|deps| deps.iter().any(|d| d.service_id == service_id))
            })
            .cloned()
            .collect()
    }

    /// 按条件查询服务，所有条件 AND 组合，结果按注册顺序
    pub async fn find_services(&self, query: &ServiceQuery) -> Vec<ServiceRegistration> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.services.get(id))
            .filter(|registration| state.matches(registration, query))
            .cloned()
            .collect()
    }

    /// 计算依赖顺序（被依赖的服务在前）
    ///
    /// `service_ids` 为空时使用全部已注册服务（注册顺序）。包含未注册的 id 时返回
    /// `ServiceNotFound`，存在循环依赖时返回 `CircularDependency`。
    pub async fn resolve_dependency_order(
        &self,
        service_ids: Option<&[String]>,
    ) -> OrchestratorResult<Vec<String>> {
        let state = self.state.read().await;
        let ids = match service_ids {
            Some(ids) => {
                if let Some(unknown) = ids.iter().find(|id| !state.services.contains_key(*id)) {
                    return Err(OrchestratorError::service_not_found(unknown.as_str()));
                }
                ids.to_vec()
            }
            None => state.order.clone(),
        };

        topological_order(&ids, &state.dependencies)
    }

    /// 注册中心状态汇总
    pub async fn get_status(&self) -> RegistryStatus {
        let state = self.state.read().await;
        let services: Vec<ServiceSummary> = state
            .order
            .iter()
            .filter_map(|id| state.services.get(id))
            .map(|registration| ServiceSummary {
                service_id: registration.service_id.clone(),
                service_name: registration.service_name.clone(),
                service_type: registration.service_type.clone(),
                version: registration.version.clone(),
                health: state
                    .health
                    .get(&registration.service_id)
                    .map_or(HealthStatus::Unknown, |r| r.status),
                last_seen: registration.last_seen,
            })
            .collect();

        let count = |status: HealthStatus| services.iter().filter(|s| s.health == status).count();
        RegistryStatus {
            total: services.len(),
            healthy: count(HealthStatus::Healthy),
            unhealthy: count(HealthStatus::Unhealthy),
            unknown: count(HealthStatus::Unknown),
            services,
        }
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("config", &self.config)
            .field("notifications", &self.notifications)
            .finish()
    }
}
