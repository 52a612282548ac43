//! Configuration specification types for the deployment topology.
//!
//! This module defines all the structs that map to the `loadtest.deploy.yaml`
//! file. Each resource section is a declarative descriptor: identities assigned
//! by the platform never appear here, resources reference each other through
//! the plan's dependency graph instead.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The root configuration structure for a topology deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopologyConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// State backend configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Managed cluster.
    pub cluster: ClusterSpec,
    /// Node pool backing the cluster.
    pub node_pool: NodePoolSpec,
    /// Namespace holding every workload resource.
    pub namespace: NamespaceSpec,
    /// The load-testing Deployment.
    pub workload: WorkloadSpec,
    /// Optional Horizontal Pod Autoscaler targeting the workload.
    #[serde(default)]
    pub autoscaler: Option<AutoscalerSpec>,
    /// Service exposing the workload.
    pub service: ServiceSpec,
    /// Polling and timeout settings for provider operations.
    #[serde(default)]
    pub rollout: RolloutConfig,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Name of the stack.
    pub name: String,
    /// Scenario the configuration was generated from.
    #[serde(default = "default_scenario")]
    pub scenario: String,
    /// Google Cloud project id that owns the cluster.
    #[serde(default)]
    pub gcp_project: Option<String>,
}

/// State backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StateConfig {
    /// Backend type (local or s3).
    #[serde(default)]
    pub backend: StateBackend,
    /// S3 bucket name (required for s3 backend).
    #[serde(default)]
    pub bucket: Option<String>,
    /// S3 key prefix (optional).
    #[serde(default)]
    pub prefix: Option<String>,
    /// S3 region (optional, uses AWS default if not specified).
    #[serde(default)]
    pub region: Option<String>,
    /// Local state directory (for local backend).
    #[serde(default)]
    pub path: Option<String>,
}

/// State backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// Local file-based state storage.
    #[default]
    Local,
    /// AWS S3-based state storage.
    S3,
}

/// Managed Kubernetes cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterSpec {
    /// Cluster name, used as its reference once created.
    pub name: String,
    /// Zone or region of the cluster.
    pub location: String,
    /// Node count of the default pool created with the cluster.
    #[serde(default = "default_node_count")]
    pub initial_node_count: u32,
    /// Whether the default node pool is removed after creation.
    #[serde(default)]
    pub remove_default_node_pool: bool,
    /// Cluster-level node auto-provisioning.
    #[serde(default)]
    pub autoscaling: Option<ClusterAutoscaling>,
}

/// Cluster-level autoscaling bounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterAutoscaling {
    /// Whether node auto-provisioning is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Autoscaling profile (e.g. `OPTIMIZE_UTILIZATION`, `BALANCED`).
    #[serde(default = "default_profile")]
    pub profile: String,
    /// CPU bounds in cores.
    pub cpu: ResourceBounds,
    /// Memory bounds in GB.
    pub memory_gb: ResourceBounds,
}

/// Inclusive minimum/maximum pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceBounds {
    /// Lower bound.
    pub min: u32,
    /// Upper bound.
    pub max: u32,
}

/// Node pool attached to the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodePoolSpec {
    /// Node pool name.
    pub name: String,
    /// Zone or region of the pool.
    pub location: String,
    /// Initial number of nodes.
    #[serde(default = "default_node_count")]
    pub initial_node_count: u32,
    /// Pool-level autoscaling bounds, distinct from the cluster autoscaler.
    #[serde(default)]
    pub autoscaling: Option<NodePoolAutoscaling>,
    /// Per-node configuration.
    #[serde(default)]
    pub node_config: NodeConfig,
}

/// Node pool autoscaling bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodePoolAutoscaling {
    /// Minimum node count.
    pub min_node_count: u32,
    /// Maximum node count.
    pub max_node_count: u32,
}

/// Per-node configuration of a node pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NodeConfig {
    /// Kubernetes labels applied to every node.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Instance metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// OAuth scopes granted to the node service account.
    #[serde(default)]
    pub oauth_scopes: Vec<String>,
    /// Network tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Namespace holding the workload resources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamespaceSpec {
    /// Kubernetes namespace name.
    pub name: String,
}

/// The Deployment running the load-testing container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkloadSpec {
    /// Deployment name.
    pub name: String,
    /// Desired replica count.
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    /// The single container of the pod template.
    pub container: ContainerSpec,
    /// Labels used for selection by the Service and the autoscaler.
    pub labels: BTreeMap<String, String>,
}

/// Container of the workload pod template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Port the container listens on.
    #[serde(default)]
    pub port: Option<u16>,
    /// CPU request (e.g. `100m`).
    #[serde(default)]
    pub cpu_request: Option<String>,
    /// Memory request (e.g. `128Mi`).
    #[serde(default)]
    pub memory_request: Option<String>,
}

/// Horizontal Pod Autoscaler targeting the workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutoscalerSpec {
    /// Autoscaler name.
    pub name: String,
    /// Minimum replica count.
    pub min_replicas: u32,
    /// Maximum replica count.
    pub max_replicas: u32,
    /// Average CPU utilization (percent) that triggers scaling.
    pub target_cpu_utilization: u32,
}

/// Service exposing the workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Service name.
    pub name: String,
    /// Exposed port.
    pub port: u16,
    /// Container port receiving the traffic.
    pub target_port: u16,
    /// Exposure mode.
    #[serde(default, rename = "type")]
    pub service_type: ServiceType,
}

/// Kubernetes Service exposure mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ServiceType {
    /// Externally routable load-balanced address.
    #[default]
    LoadBalancer,
    /// Port on every node.
    NodePort,
    /// Cluster-internal address only.
    #[serde(rename = "ClusterIP")]
    ClusterIp,
}

/// Polling settings for long-running provider work.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RolloutConfig {
    /// Seconds between polls of a GKE operation.
    #[serde(default = "default_operation_poll")]
    pub operation_poll_secs: u64,
    /// Seconds between polls of the Service load balancer status.
    #[serde(default = "default_address_poll")]
    pub address_poll_secs: u64,
    /// Maximum seconds to wait for the external address (0 waits forever).
    #[serde(default = "default_address_timeout")]
    pub address_timeout_secs: u64,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            operation_poll_secs: default_operation_poll(),
            address_poll_secs: default_address_poll(),
            address_timeout_secs: default_address_timeout(),
        }
    }
}

// Default value functions

const fn default_node_count() -> u32 {
    1
}

const fn default_replicas() -> u32 {
    1
}

const fn default_true() -> bool {
    true
}

const fn default_operation_poll() -> u64 {
    10
}

const fn default_address_poll() -> u64 {
    5
}

const fn default_address_timeout() -> u64 {
    600
}

fn default_profile() -> String {
    String::from("BALANCED")
}

fn default_scenario() -> String {
    String::from("custom")
}

impl TopologyConfig {
    /// Returns true if the topology carries an autoscaler.
    #[must_use]
    pub const fn is_autoscaled(&self) -> bool {
        self.autoscaler.is_some()
    }
}

impl ServiceSpec {
    /// Returns true if the Service is expected to receive an external address.
    #[must_use]
    pub const fn exposes_external_address(&self) -> bool {
        matches!(self.service_type, ServiceType::LoadBalancer)
    }
}

impl ClusterSpec {
    /// Name of the kubeconfig context generated for this cluster.
    #[must_use]
    pub fn context_name(&self) -> String {
        format!("demo_{}", self.name)
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::LoadBalancer => "LoadBalancer",
            Self::NodePort => "NodePort",
            Self::ClusterIp => "ClusterIP",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type_names() {
        assert_eq!(ServiceType::LoadBalancer.to_string(), "LoadBalancer");
        assert_eq!(ServiceType::ClusterIp.to_string(), "ClusterIP");

        let parsed: ServiceType = serde_yaml::from_str("ClusterIP").unwrap();
        assert_eq!(parsed, ServiceType::ClusterIp);
    }

    #[test]
    fn test_rollout_defaults() {
        let rollout: RolloutConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(rollout, RolloutConfig::default());
        assert_eq!(rollout.address_timeout_secs, 600);
    }

    #[test]
    fn test_context_name() {
        let cluster = ClusterSpec {
            name: String::from("load-testing"),
            location: String::from("asia-east1-b"),
            initial_node_count: 1,
            remove_default_node_pool: true,
            autoscaling: None,
        };
        assert_eq!(cluster.context_name(), "demo_load-testing");
    }
}
