//! Process-wide service identity.

use super::attributes::{AttributeValue, Attributes};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Well-known resource attribute keys.
pub mod keys {
    /// Logical service name.
    pub const SERVICE_NAME: &str = "service.name";
    /// Service version.
    pub const SERVICE_VERSION: &str = "service.version";
    /// Deployment environment (e.g. `lab`, `production`).
    pub const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment";
    /// Unique identifier of one running instance.
    pub const SERVICE_INSTANCE_ID: &str = "service.instance.id";
}

/// Identity attached to every span, metric point and log record emitted by
/// one service instance.
///
/// Created once at process start and shared as `Arc<Resource>`.
///
/// # Example
///
/// ```
/// use shared::models::Resource;
///
/// let resource = Resource::new("flask-backend")
///     .with_version("1.0.0")
///     .with_environment("lab");
///
/// assert_eq!(resource.attribute("service.name").as_deref(), Some("flask-backend"));
/// assert!(resource.validate_resource().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Resource {
    /// Logical service name.
    #[serde(rename = "service.name")]
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Service version.
    #[serde(
        rename = "service.version",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub service_version: Option<String>,

    /// Deployment environment.
    #[serde(
        rename = "deployment.environment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub deployment_environment: Option<String>,

    /// Instance identifier.
    #[serde(
        rename = "service.instance.id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub service_instance_id: Option<String>,

    /// Any other resource attributes.
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

/// Errors that can occur during resource validation.
#[derive(Debug, Error)]
pub enum ResourceValidationError {
    /// The service name is empty.
    #[error("Service name cannot be empty")]
    EmptyServiceName,

    /// Validation failed with details.
    #[error("Validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

impl Resource {
    /// Creates a resource with only a service name.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: None,
            deployment_environment: None,
            service_instance_id: None,
            attributes: Attributes::new(),
        }
    }

    /// Sets the service version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = Some(version.into());
        self
    }

    /// Sets the deployment environment.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.deployment_environment = Some(environment.into());
        self
    }

    /// Sets the instance identifier.
    #[must_use]
    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.service_instance_id = Some(instance_id.into());
        self
    }

    /// Adds an extra attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Looks up any resource attribute by its dotted key, including the
    /// well-known identity fields, rendered as a string.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<String> {
        match key {
            keys::SERVICE_NAME => Some(self.service_name.clone()),
            keys::SERVICE_VERSION => self.service_version.clone(),
            keys::DEPLOYMENT_ENVIRONMENT => self.deployment_environment.clone(),
            keys::SERVICE_INSTANCE_ID => self.service_instance_id.clone(),
            other => self.attributes.get(other).map(ToString::to_string),
        }
    }

    /// Returns true if the attribute is set.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        match key {
            keys::SERVICE_NAME => true,
            keys::SERVICE_VERSION => self.service_version.is_some(),
            keys::DEPLOYMENT_ENVIRONMENT => self.deployment_environment.is_some(),
            keys::SERVICE_INSTANCE_ID => self.service_instance_id.is_some(),
            other => self.attributes.contains_key(other),
        }
    }

    /// Sets an attribute only if it is not already present.
    ///
    /// Returns true if the attribute was inserted.
    pub fn insert_if_absent(&mut self, key: &str, value: impl Into<AttributeValue>) -> bool {
        if self.contains(key) {
            return false;
        }
        let value = value.into();
        match key {
            keys::SERVICE_VERSION => self.service_version = Some(value.to_string()),
            keys::DEPLOYMENT_ENVIRONMENT => self.deployment_environment = Some(value.to_string()),
            keys::SERVICE_INSTANCE_ID => self.service_instance_id = Some(value.to_string()),
            other => {
                self.attributes.insert(other.to_string(), value);
            }
        }
        true
    }

    /// Validates the resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the service name is empty.
    pub fn validate_resource(&self) -> Result<(), ResourceValidationError> {
        if self.service_name.is_empty() {
            return Err(ResourceValidationError::EmptyServiceName);
        }
        self.validate()?;
        Ok(())
    }
}
