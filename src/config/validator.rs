//! Configuration validation for topology specs.
//!
//! The validator collects every problem it finds before failing, so that a
//! single `validate` run reports all errors and warnings at once.

use crate::error::{ConfigError, DeployError, Result};
use tracing::debug;

use super::spec::{
    AutoscalerSpec, ClusterSpec, NodePoolSpec, ServiceSpec, StateBackend, StateConfig,
    TopologyConfig, WorkloadSpec,
};

/// Kubernetes object names are limited to 63 characters (DNS label).
const MAX_NAME_LEN: usize = 63;

/// Validator for topology configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a topology configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any check fails.
    pub fn validate(&self, config: &TopologyConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(DeployError::Config(ConfigError::validation(
                first_error.message.clone(),
                first_error.field.clone(),
            )))
        }
    }

    /// Runs every check and returns all findings without failing.
    #[must_use]
    pub fn check(&self, config: &TopologyConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        if !is_valid_name(&config.project.name) {
            result.error(
                "project.name",
                format!(
                    "Stack name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    config.project.name
                ),
            );
        }

        Self::validate_state(&config.state, &mut result);
        Self::validate_cluster(&config.cluster, &mut result);
        Self::validate_node_pool(&config.node_pool, &config.cluster, &mut result);
        Self::check_name("namespace.name", &config.namespace.name, &mut result);
        Self::validate_workload(&config.workload, &mut result);
        if let Some(autoscaler) = &config.autoscaler {
            Self::validate_autoscaler(autoscaler, &config.workload, &mut result);
        }
        Self::validate_service(&config.service, &config.workload, &mut result);

        if config.rollout.address_poll_secs == 0 {
            result.error("rollout.address_poll_secs", "Poll interval must be at least 1 second");
        }
        if config.rollout.address_timeout_secs == 0 {
            result.warnings.push(String::from(
                "rollout.address_timeout_secs: 0 waits for the load balancer indefinitely",
            ));
        }

        result
    }

    /// Validates state configuration.
    fn validate_state(state: &StateConfig, result: &mut ValidationResult) {
        if state.backend == StateBackend::S3 && state.bucket.as_ref().is_none_or(String::is_empty)
        {
            result.error("state.bucket", "S3 bucket name is required when using S3 backend");
        }
    }

    /// Validates cluster configuration.
    fn validate_cluster(cluster: &ClusterSpec, result: &mut ValidationResult) {
        Self::check_name("cluster.name", &cluster.name, result);

        if cluster.location.is_empty() {
            result.error("cluster.location", "Cluster location cannot be empty");
        }

        if cluster.initial_node_count == 0 {
            result.error("cluster.initial_node_count", "Initial node count must be at least 1");
        }

        if let Some(autoscaling) = &cluster.autoscaling {
            if autoscaling.cpu.min > autoscaling.cpu.max {
                result.error(
                    "cluster.autoscaling.cpu",
                    format!(
                        "CPU minimum {} exceeds maximum {}",
                        autoscaling.cpu.min, autoscaling.cpu.max
                    ),
                );
            }
            if autoscaling.memory_gb.min > autoscaling.memory_gb.max {
                result.error(
                    "cluster.autoscaling.memory_gb",
                    format!(
                        "Memory minimum {} exceeds maximum {}",
                        autoscaling.memory_gb.min, autoscaling.memory_gb.max
                    ),
                );
            }
            if !matches!(autoscaling.profile.as_str(), "BALANCED" | "OPTIMIZE_UTILIZATION") {
                result.warnings.push(format!(
                    "cluster.autoscaling.profile: Unknown autoscaling profile '{}'",
                    autoscaling.profile
                ));
            }
        }
    }

    /// Validates node pool configuration.
    fn validate_node_pool(pool: &NodePoolSpec, cluster: &ClusterSpec, result: &mut ValidationResult) {
        Self::check_name("node_pool.name", &pool.name, result);

        if pool.location != cluster.location {
            result.warnings.push(format!(
                "node_pool.location: '{}' differs from cluster location '{}'",
                pool.location, cluster.location
            ));
        }

        if let Some(autoscaling) = &pool.autoscaling {
            if autoscaling.min_node_count > autoscaling.max_node_count {
                result.error(
                    "node_pool.autoscaling",
                    format!(
                        "Minimum node count {} exceeds maximum {}",
                        autoscaling.min_node_count, autoscaling.max_node_count
                    ),
                );
            }
            if pool.initial_node_count < autoscaling.min_node_count
                || pool.initial_node_count > autoscaling.max_node_count
            {
                result.warnings.push(format!(
                    "node_pool.initial_node_count: {} is outside the autoscaling bounds",
                    pool.initial_node_count
                ));
            }
        } else if pool.initial_node_count == 0 {
            result.error(
                "node_pool.initial_node_count",
                "A fixed-size node pool needs at least 1 node",
            );
        }
    }

    /// Validates workload configuration.
    fn validate_workload(workload: &WorkloadSpec, result: &mut ValidationResult) {
        Self::check_name("workload.name", &workload.name, result);
        Self::check_name("workload.container.name", &workload.container.name, result);

        if workload.container.image.is_empty() {
            result.error("workload.container.image", "Container image cannot be empty");
        } else if workload.container.image.ends_with(":latest")
            || !workload.container.image.contains(':')
        {
            result.warnings.push(String::from(
                "workload.container.image: Image is not pinned to a tag",
            ));
        }

        // The label set is the join key for the Service selector and the autoscaler.
        if workload.labels.is_empty() {
            result.error("workload.labels", "Workload needs at least one label for selection");
        }
        for (key, value) in &workload.labels {
            if key.is_empty() || value.len() > MAX_NAME_LEN {
                result.error(
                    format!("workload.labels.{key}"),
                    "Label keys must be non-empty and values at most 63 characters",
                );
            }
        }
    }

    /// Validates autoscaler configuration.
    fn validate_autoscaler(
        autoscaler: &AutoscalerSpec,
        workload: &WorkloadSpec,
        result: &mut ValidationResult,
    ) {
        Self::check_name("autoscaler.name", &autoscaler.name, result);

        if autoscaler.min_replicas == 0 {
            result.error("autoscaler.min_replicas", "Minimum replicas must be at least 1");
        }
        if autoscaler.min_replicas > autoscaler.max_replicas {
            result.error(
                "autoscaler.max_replicas",
                format!(
                    "Maximum replicas {} is below minimum {}",
                    autoscaler.max_replicas, autoscaler.min_replicas
                ),
            );
        }
        if !(1..=100).contains(&autoscaler.target_cpu_utilization) {
            result.error(
                "autoscaler.target_cpu_utilization",
                "Utilization target must be between 1 and 100 percent",
            );
        }
        if workload.container.cpu_request.is_none() {
            result.warnings.push(String::from(
                "workload.container.cpu_request: CPU utilization scaling needs a CPU request",
            ));
        }
    }

    /// Validates service configuration.
    fn validate_service(service: &ServiceSpec, workload: &WorkloadSpec, result: &mut ValidationResult) {
        Self::check_name("service.name", &service.name, result);

        if service.port == 0 {
            result.error("service.port", "Service port must be between 1 and 65535");
        }
        if service.target_port == 0 {
            result.error("service.target_port", "Target port must be between 1 and 65535");
        }
        if let Some(container_port) = workload.container.port
            && container_port != service.target_port
        {
            result.warnings.push(format!(
                "service.target_port: {} does not match container port {container_port}",
                service.target_port
            ));
        }
    }

    /// Records an error if the name is not a valid Kubernetes name.
    fn check_name(field: &str, name: &str, result: &mut ValidationResult) {
        if !is_valid_name(name) {
            result.error(
                field,
                format!("Name '{name}' is invalid. Must be lowercase alphanumeric with hyphens."),
            );
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }

    let mut chars = name.chars();

    // First character must be a letter
    if let Some(first) = chars.next()
        && !first.is_ascii_lowercase()
    {
        return false;
    }

    // Rest must be lowercase alphanumeric or hyphen
    for c in chars {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
            return false;
        }
    }

    // Cannot end with hyphen
    if name.ends_with('-') {
        return false;
    }

    // Cannot have consecutive hyphens
    !name.contains("--")
}

impl ValidationResult {
    /// Records an error for a field.
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Scenario, StateBackend};

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("load-testing"));
        assert!(is_valid_name("primary-node-pool"));
        assert!(is_valid_name("a"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Load-Testing")); // uppercase
        assert!(!is_valid_name("1-pool")); // starts with number
        assert!(!is_valid_name("app_ns")); // underscore
        assert!(!is_valid_name("app-")); // ends with hyphen
        assert!(!is_valid_name("app--ns")); // consecutive hyphens
        assert!(!is_valid_name(&"a".repeat(64)));
    }

    #[test]
    fn test_builtin_scenarios_are_valid() {
        let validator = ConfigValidator::new();
        for scenario in [Scenario::Autoscaled, Scenario::Fixed] {
            let result = validator.validate(&scenario.topology()).unwrap();
            assert!(result.is_valid(), "{scenario} should validate");
        }
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut topology = Scenario::Autoscaled.topology();
        if let Some(autoscaler) = topology.autoscaler.as_mut() {
            autoscaler.min_replicas = 10;
            autoscaler.max_replicas = 2;
        }
        if let Some(pool) = topology.node_pool.autoscaling.as_mut() {
            pool.min_node_count = 5;
        }

        let result = ConfigValidator::new().check(&topology);
        assert_eq!(result.error_count(), 2);
        assert!(result.errors.iter().any(|e| e.field == "autoscaler.max_replicas"));
        assert!(result.errors.iter().any(|e| e.field == "node_pool.autoscaling"));
    }

    #[test]
    fn test_utilization_out_of_range() {
        let mut topology = Scenario::Autoscaled.topology();
        if let Some(autoscaler) = topology.autoscaler.as_mut() {
            autoscaler.target_cpu_utilization = 0;
        }

        let err = ConfigValidator::new().validate(&topology).unwrap_err();
        assert!(err.to_string().contains("between 1 and 100"));
    }

    #[test]
    fn test_empty_labels_rejected() {
        let mut topology = Scenario::Fixed.topology();
        topology.workload.labels.clear();

        let result = ConfigValidator::new().check(&topology);
        assert!(result.errors.iter().any(|e| e.field == "workload.labels"));
    }

    #[test]
    fn test_s3_backend_requires_bucket() {
        let mut topology = Scenario::Fixed.topology();
        topology.state.backend = StateBackend::S3;

        let result = ConfigValidator::new().check(&topology);
        assert!(result.errors.iter().any(|e| e.field == "state.bucket"));
    }

    #[test]
    fn test_port_mismatch_warns() {
        let mut topology = Scenario::Fixed.topology();
        topology.service.target_port = 9090;

        let result = ConfigValidator::new().check(&topology);
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1);
    }
}
