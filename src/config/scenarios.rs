//! Built-in topology scenarios.
//!
//! Two alternative configurations of the same system: `autoscaled` adds
//! cluster-level node auto-provisioning, node pool autoscaling and a
//! Horizontal Pod Autoscaler; `fixed` runs a fixed replica count on a plain
//! fixed-size node pool. Both are thin definitions over [`base_topology`].

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::ConfigError;

use super::spec::{
    AutoscalerSpec, ClusterAutoscaling, ClusterSpec, ContainerSpec, NamespaceSpec, NodeConfig,
    NodePoolAutoscaling, NodePoolSpec, ProjectConfig, ResourceBounds, RolloutConfig, ServiceSpec,
    ServiceType, StateConfig, TopologyConfig, WorkloadSpec,
};

const CLUSTER_NAME: &str = "load-testing";
const LOCATION: &str = "asia-east1-b";
const NODE_POOL_NAME: &str = "primary-node-pool";
const NAMESPACE_NAME: &str = "load-testing-ns";
const DEPLOYMENT_NAME: &str = "load-testing-app";
const CONTAINER_NAME: &str = "load-testing-dep";
const IMAGE: &str = "scottxxx666/gin-load-testing:0.0.1";
const AUTOSCALER_NAME: &str = "load-testing-hpa";
const SERVICE_NAME: &str = "app-service";

/// A named built-in topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Scenario {
    /// Cluster autoscaling, node pool autoscaling and an HPA.
    Autoscaled,
    /// Fixed replica count on a fixed-size node pool.
    Fixed,
}

impl Scenario {
    /// Returns the scenario name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Autoscaled => "autoscaled",
            Self::Fixed => "fixed",
        }
    }

    /// Builds the full topology for this scenario.
    #[must_use]
    pub fn topology(self) -> TopologyConfig {
        match self {
            Self::Autoscaled => autoscaled(),
            Self::Fixed => fixed(),
        }
    }
}

impl FromStr for Scenario {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "autoscaled" => Ok(Self::Autoscaled),
            "fixed" => Ok(Self::Fixed),
            other => Err(ConfigError::UnknownScenario {
                name: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Resources shared by both scenarios.
fn base_topology(scenario: Scenario) -> TopologyConfig {
    let labels = BTreeMap::from([(String::from("app"), String::from(CLUSTER_NAME))]);

    TopologyConfig {
        project: ProjectConfig {
            name: String::from(CLUSTER_NAME),
            scenario: scenario.name().to_string(),
            gcp_project: None,
        },
        state: StateConfig::default(),
        cluster: ClusterSpec {
            name: String::from(CLUSTER_NAME),
            location: String::from(LOCATION),
            initial_node_count: 1,
            remove_default_node_pool: true,
            autoscaling: None,
        },
        node_pool: NodePoolSpec {
            name: String::from(NODE_POOL_NAME),
            location: String::from(LOCATION),
            initial_node_count: 1,
            autoscaling: None,
            node_config: NodeConfig {
                labels: BTreeMap::from([(String::from("env"), String::from("test"))]),
                metadata: BTreeMap::from([(
                    String::from("disable-legacy-endpoints"),
                    String::from("true"),
                )]),
                oauth_scopes: vec![
                    String::from("https://www.googleapis.com/auth/logging.write"),
                    String::from("https://www.googleapis.com/auth/monitoring"),
                ],
                tags: vec![String::from("foo"), String::from("bar")],
            },
        },
        namespace: NamespaceSpec {
            name: String::from(NAMESPACE_NAME),
        },
        workload: WorkloadSpec {
            name: String::from(DEPLOYMENT_NAME),
            replicas: 1,
            container: ContainerSpec {
                name: String::from(CONTAINER_NAME),
                image: String::from(IMAGE),
                port: Some(8080),
                cpu_request: Some(String::from("100m")),
                memory_request: None,
            },
            labels,
        },
        autoscaler: None,
        service: ServiceSpec {
            name: String::from(SERVICE_NAME),
            port: 80,
            target_port: 8080,
            service_type: ServiceType::LoadBalancer,
        },
        rollout: RolloutConfig::default(),
    }
}

fn autoscaled() -> TopologyConfig {
    let mut topology = base_topology(Scenario::Autoscaled);

    topology.cluster.autoscaling = Some(ClusterAutoscaling {
        enabled: true,
        profile: String::from("OPTIMIZE_UTILIZATION"),
        cpu: ResourceBounds { min: 1, max: 4 },
        memory_gb: ResourceBounds { min: 1, max: 40 },
    });
    topology.node_pool.autoscaling = Some(NodePoolAutoscaling {
        min_node_count: 1,
        max_node_count: 4,
    });
    topology.autoscaler = Some(AutoscalerSpec {
        name: String::from(AUTOSCALER_NAME),
        min_replicas: 1,
        max_replicas: 50,
        target_cpu_utilization: 50,
    });

    topology
}

fn fixed() -> TopologyConfig {
    let mut topology = base_topology(Scenario::Fixed);

    // Plain node-backed cluster: the default pool is replaced by a fixed-size one.
    topology.node_pool.initial_node_count = 3;
    topology.workload.replicas = 3;

    topology
}
