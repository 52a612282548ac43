//! Configuration module for the topology planner.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `loadtest.deploy.yaml`
//! - The built-in `autoscaled` and `fixed` scenarios
//! - Validation of configuration values
//! - Computing configuration hashes for change detection

mod spec;
mod scenarios;
mod parser;
mod validator;
mod hash;

pub use spec::{
    AutoscalerSpec, ClusterAutoscaling, ClusterSpec, ContainerSpec, NamespaceSpec, NodeConfig,
    NodePoolAutoscaling, NodePoolSpec, ProjectConfig, ResourceBounds, RolloutConfig, ServiceSpec,
    ServiceType, StateBackend, StateConfig, TopologyConfig, WorkloadSpec,
};
pub use scenarios::Scenario;
pub use parser::{ACCESS_TOKEN_ENV, ConfigParser, DEFAULT_CONFIG_FILES, GCP_PROJECT_ENV, find_config_file};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
pub use hash::ConfigHasher;
