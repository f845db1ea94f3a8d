use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 服务注册信息
///
/// 描述一个已知的、正在运行的服务实例。由注册中心持有，心跳与健康更新时原地修改，
/// 返回给调用方的总是副本。
///
/// # 字段说明
///
/// - `service_id`: 服务实例唯一标识（注册中心主键）
/// - `service_name`: 服务名称，同名服务可以有多个实例
/// - `service_type`: 服务类型，如 "api"、"worker"
/// - `version`: 服务版本，点分数字格式
/// - `endpoint`: 可选的访问地址
/// - `capabilities`: 服务对外提供的能力
/// - `dependencies`: 服务声明的依赖
/// - `metadata`: 任意键值元数据，可用于精确匹配查询
/// - `registered_at`: 注册时间
/// - `last_seen`: 最近一次心跳或健康更新的时间
///
/// # 使用示例
///
/// ```rust
/// use orchestrator_core::models::{ServiceCapability, ServiceDependency, ServiceRegistration};
///
/// let registration = ServiceRegistration::new("api-1", "api", "http", "1.2.0")
///     .with_endpoint("http://127.0.0.1:8080")
///     .with_capability(ServiceCapability::new("rest", "1.0.0"))
///     .with_dependency(ServiceDependency::required("db-1"))
///     .with_metadata("zone", "a");
///
/// assert_eq!(registration.dependencies.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRegistration {
    pub service_id: String,
    pub service_name: String,
    pub service_type: String,
    pub version: String,
    pub endpoint: Option<String>,
    pub capabilities: Vec<ServiceCapability>,
    pub dependencies: Vec<ServiceDependency>,
    pub metadata: HashMap<String, String>,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl ServiceRegistration {
    pub fn new(
        service_id: impl Into<String>,
        service_name: impl Into<String>,
        service_type: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            service_id: service_id.into(),
            service_name: service_name.into(),
            service_type: service_type.into(),
            version: version.into(),
            endpoint: None,
            capabilities: Vec::new(),
            dependencies: Vec::new(),
            metadata: HashMap::new(),
            registered_at: now,
            last_seen: now,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_capability(mut self, capability: ServiceCapability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_dependency(mut self, dependency: ServiceDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_last_seen(mut self, last_seen: DateTime<Utc>) -> Self {
        self.last_seen = last_seen;
        self
    }

    /// 是否声明了指定名称的能力（忽略版本）
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.name == name)
    }

    pub fn capability(&self, name: &str) -> Option<&ServiceCapability> {
        self.capabilities.iter().find(|c| c.name == name)
    }

    pub fn depends_on(&self, service_id: &str) -> bool {
        self.dependencies.iter().any(|d| d.service_id == service_id)
    }
}

/// 服务依赖声明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDependency {
    pub service_id: String,
    pub required: bool,
    pub min_version: Option<String>,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
}

impl ServiceDependency {
    /// 必需依赖
    pub fn required(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            required: true,
            min_version: None,
            required_capabilities: Vec::new(),
        }
    }

    /// 可选依赖
    pub fn optional(service_id: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(service_id)
        }
    }

    pub fn with_min_version(mut self, version: impl Into<String>) -> Self {
        self.min_version = Some(version.into());
        self
    }

    pub fn with_required_capability(mut self, capability: impl Into<String>) -> Self {
        self.required_capabilities.push(capability.into());
        self
    }
}

/// 服务能力
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCapability {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
}

impl ServiceCapability {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// 服务查询条件，所有条件按 AND 组合；空查询匹配全部服务
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceQuery {
    pub service_name: Option<String>,
    pub service_type: Option<String>,
    pub healthy_only: bool,
    pub required_capabilities: Vec<String>,
    pub metadata: HashMap<String, String>,
}

impl ServiceQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            service_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn by_type(service_type: impl Into<String>) -> Self {
        Self {
            service_type: Some(service_type.into()),
            ..Self::default()
        }
    }

    pub fn healthy_only(mut self, healthy_only: bool) -> Self {
        self.healthy_only = healthy_only;
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.required_capabilities.push(capability.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
