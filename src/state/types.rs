//! State types for tracking deployed resources.
//!
//! The state records, for every applied resource, the identifier the
//! platform assigned, the hash of the request it was created from and the
//! values later resources or outputs were derived from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::outputs::StackOutputs;
use crate::planner::ResourceKind;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Maximum number of history entries kept.
const MAX_HISTORY: usize = 100;

/// Output keys recorded on resources.
pub mod keys {
    /// API server address of a cluster.
    pub const ENDPOINT: &str = "endpoint";
    /// Base64 CA certificate of a cluster.
    pub const CA_CERTIFICATE: &str = "ca_certificate";
    /// Zone or region.
    pub const LOCATION: &str = "location";
    /// Owning cluster of a node pool.
    pub const CLUSTER: &str = "cluster";
    /// Namespace of a Kubernetes object.
    pub const NAMESPACE: &str = "namespace";
    /// Short name of a workload.
    pub const SHORT_NAME: &str = "short_name";
    /// Workload targeted by an autoscaler.
    pub const TARGET: &str = "target";
    /// External address of a Service.
    pub const ADDRESS: &str = "address";
}

/// The complete deployment state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentState {
    /// State format version.
    pub version: String,
    /// Project name.
    pub project: String,
    /// Scenario the resources were applied from.
    pub scenario: String,
    /// Hash of the last applied configuration.
    pub config_hash: String,
    /// Applied resources by key (`<kind>/<name>`).
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceState>,
    /// Exported stack outputs.
    #[serde(default)]
    pub outputs: StackOutputs,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Deployment history (recent entries).
    #[serde(default)]
    pub history: Vec<DeploymentHistoryEntry>,
}

/// State of a single resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceState {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Resource name.
    pub name: String,
    /// Identifier assigned by the platform.
    pub id: String,
    /// Hash of the request the resource was applied from.
    pub spec_hash: String,
    /// Current status.
    pub status: ResourceStatus,
    /// Values recorded when the resource was applied.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    /// When the resource was created.
    pub created_at: DateTime<Utc>,
    /// When the resource was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Resource status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    /// Accepted by the platform.
    Ready,
    /// Applied, but a follow-up step (such as address assignment) failed.
    Degraded,
    /// Being deleted.
    Deleting,
}

/// A single entry in the deployment history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentHistoryEntry {
    /// When the deployment occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: DeploymentOperation,
    /// Configuration hash at time of deployment.
    pub config_hash: String,
    /// Resources affected.
    pub resources: Vec<String>,
    /// Whether the deployment succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of deployment operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentOperation {
    /// Apply of a plan.
    Apply,
    /// Destruction.
    Destroy,
}

impl DeploymentState {
    /// Creates a new empty deployment state.
    #[must_use]
    pub fn new(project: &str, scenario: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            project: project.to_string(),
            scenario: scenario.to_string(),
            config_hash: String::new(),
            resources: BTreeMap::new(),
            outputs: StackOutputs::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a resource by key.
    #[must_use]
    pub fn get_resource(&self, key: &str) -> Option<&ResourceState> {
        self.resources.get(key)
    }

    /// Gets a mutable resource by key.
    pub fn get_resource_mut(&mut self, key: &str) -> Option<&mut ResourceState> {
        self.resources.get_mut(key)
    }

    /// Adds or updates a resource, keeping its creation time.
    pub fn set_resource(&mut self, key: &str, mut resource: ResourceState) {
        if let Some(existing) = self.resources.get(key) {
            resource.created_at = existing.created_at;
        }
        self.resources.insert(key.to_string(), resource);
        self.last_updated = Utc::now();
    }

    /// Removes a resource by key.
    pub fn remove_resource(&mut self, key: &str) -> Option<ResourceState> {
        let result = self.resources.remove(key);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Resources of one kind.
    pub fn resources_of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = (&String, &ResourceState)> {
        self.resources.iter().filter(move |(_, r)| r.kind == kind)
    }

    /// Adds a history entry.
    pub fn add_history(&mut self, entry: DeploymentHistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// Returns true if no resources are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ResourceState {
    /// Creates a ready resource record.
    #[must_use]
    pub fn new(kind: ResourceKind, name: &str, id: &str, spec_hash: &str) -> Self {
        let now = Utc::now();
        Self {
            kind,
            name: name.to_string(),
            id: id.to_string(),
            spec_hash: spec_hash.to_string(),
            status: ResourceStatus::Ready,
            outputs: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds a recorded value.
    #[must_use]
    pub fn with_output(mut self, key: &str, value: &str) -> Self {
        self.outputs.insert(key.to_string(), value.to_string());
        self
    }

    /// Gets a recorded value.
    #[must_use]
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }

    /// Updates the status.
    pub fn set_status(&mut self, status: ResourceStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

impl DeploymentHistoryEntry {
    /// Creates a new history entry.
    #[must_use]
    pub fn new(operation: DeploymentOperation, config_hash: &str, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            config_hash: config_hash.to_string(),
            resources,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(
        operation: DeploymentOperation,
        config_hash: &str,
        resources: Vec<String>,
        error: &str,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            config_hash: config_hash.to_string(),
            resources,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Deleting => "deleting",
        };
        write!(f, "{status}")
    }
}

impl std::fmt::Display for DeploymentOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        };
        write!(f, "{op}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_resource_keeps_creation_time() {
        let mut state = DeploymentState::new("load-testing", "fixed");
        let first = ResourceState::new(ResourceKind::Cluster, "c", "id-1", "h1");
        let created = first.created_at;
        state.set_resource("cluster/c", first);

        let second = ResourceState::new(ResourceKind::Cluster, "c", "id-1", "h2");
        state.set_resource("cluster/c", second);

        let stored = state.get_resource("cluster/c").unwrap();
        assert_eq!(stored.created_at, created);
        assert_eq!(stored.spec_hash, "h2");
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = DeploymentState::new("p", "fixed");
        for i in 0..(MAX_HISTORY + 5) {
            state.add_history(DeploymentHistoryEntry::new(
                DeploymentOperation::Apply,
                &i.to_string(),
                vec![],
            ));
        }

        assert_eq!(state.history.len(), MAX_HISTORY);
        assert_eq!(state.history[0].config_hash, "5");
    }

    #[test]
    fn test_state_serializes_kinds() {
        let mut state = DeploymentState::new("p", "autoscaled");
        state.set_resource(
            "hpa/load-testing-hpa",
            ResourceState::new(ResourceKind::HorizontalPodAutoscaler, "load-testing-hpa", "ns/load-testing-hpa", "h")
                .with_output(keys::TARGET, "load-testing-app"),
        );
        state.outputs.export("url", "203.0.113.10");

        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains(r#""kind":"hpa""#));
        assert!(json.contains(r#""url":"203.0.113.10""#));

        let parsed: DeploymentState = serde_json::from_str(&json).unwrap();
        let hpa = parsed.get_resource("hpa/load-testing-hpa").unwrap();
        assert_eq!(hpa.output(keys::TARGET), Some("load-testing-app"));
        assert_eq!(parsed.resources_of_kind(ResourceKind::HorizontalPodAutoscaler).count(), 1);
    }
}
