//! Test data builders for service registrations
//!
//! Builders start from sensible defaults so a test only spells out the fields
//! it actually cares about.

use chrono::{DateTime, Duration, Utc};
use orchestrator_core::{ServiceCapability, ServiceDependency, ServiceRegistration};

/// Builder for creating test ServiceRegistration entities
pub struct RegistrationBuilder {
    registration: ServiceRegistration,
}

impl RegistrationBuilder {
    /// `service_name` defaults to the id, type to "api", version to "1.0.0"
    pub fn new(service_id: &str) -> Self {
        Self {
            registration: ServiceRegistration::new(service_id, service_id, "api", "1.0.0"),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.registration.service_name = name.to_string();
        self
    }

    pub fn with_type(mut self, service_type: &str) -> Self {
        self.registration.service_type = service_type.to_string();
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.registration.version = version.to_string();
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.registration.endpoint = Some(endpoint.to_string());
        self
    }

    /// Add a required dependency
    pub fn depends_on(mut self, service_id: &str) -> Self {
        self.registration
            .dependencies
            .push(ServiceDependency::required(service_id));
        self
    }

    pub fn optionally_depends_on(mut self, service_id: &str) -> Self {
        self.registration
            .dependencies
            .push(ServiceDependency::optional(service_id));
        self
    }

    pub fn with_dependency(mut self, dependency: ServiceDependency) -> Self {
        self.registration.dependencies.push(dependency);
        self
    }

    pub fn with_capability(mut self, name: &str, version: &str) -> Self {
        self.registration
            .capabilities
            .push(ServiceCapability::new(name, version));
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.registration
            .metadata
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_last_seen(mut self, last_seen: DateTime<Utc>) -> Self {
        self.registration.last_seen = last_seen;
        self
    }

    /// Set `last_seen` to `age` before now
    pub fn last_seen_ago(self, age: Duration) -> Self {
        self.with_last_seen(Utc::now() - age)
    }

    pub fn build(self) -> ServiceRegistration {
        self.registration
    }
}

/// A linear chain where each service depends on the previous one
pub fn dependency_chain(ids: &[&str]) -> Vec<ServiceRegistration> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            let builder = RegistrationBuilder::new(id);
            match i.checked_sub(1) {
                Some(prev) => builder.depends_on(ids[prev]).build(),
                None => builder.build(),
            }
        })
        .collect()
}
