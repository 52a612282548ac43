//! Configuration hashing for change detection.
//!
//! This module provides deterministic hashing of the topology and of each
//! resource section, so that re-running `apply` against an unchanged
//! configuration is a no-op.

use sha2::{Digest, Sha256};

use super::spec::{
    AutoscalerSpec, ClusterSpec, NamespaceSpec, NodePoolSpec, ServiceSpec, TopologyConfig,
    WorkloadSpec,
};

/// Hasher for computing configuration hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the entire topology.
    ///
    /// This hash changes when any resource section changes.
    #[must_use]
    pub fn hash_config(&self, config: &TopologyConfig) -> String {
        let mut hasher = Sha256::new();

        hasher.update(config.project.name.as_bytes());
        if let Some(project) = &config.project.gcp_project {
            hasher.update(project.as_bytes());
        }

        hasher.update(self.hash_cluster(&config.cluster).as_bytes());
        hasher.update(self.hash_node_pool(&config.node_pool).as_bytes());
        hasher.update(self.hash_namespace(&config.namespace).as_bytes());
        hasher.update(self.hash_workload(&config.workload).as_bytes());
        if let Some(autoscaler) = &config.autoscaler {
            hasher.update(self.hash_autoscaler(autoscaler, &config.workload).as_bytes());
        }
        hasher.update(self.hash_service(&config.service, &config.workload).as_bytes());

        hex::encode(hasher.finalize())
    }

    /// Hashes the cluster section.
    #[must_use]
    pub fn hash_cluster(&self, cluster: &ClusterSpec) -> String {
        let mut hasher = Sha256::new();

        hasher.update(cluster.name.as_bytes());
        hasher.update(cluster.location.as_bytes());
        hasher.update(cluster.initial_node_count.to_be_bytes());
        hasher.update([u8::from(cluster.remove_default_node_pool)]);

        if let Some(autoscaling) = &cluster.autoscaling {
            hasher.update([u8::from(autoscaling.enabled)]);
            hasher.update(autoscaling.profile.as_bytes());
            hasher.update(autoscaling.cpu.min.to_be_bytes());
            hasher.update(autoscaling.cpu.max.to_be_bytes());
            hasher.update(autoscaling.memory_gb.min.to_be_bytes());
            hasher.update(autoscaling.memory_gb.max.to_be_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Hashes the node pool section.
    #[must_use]
    pub fn hash_node_pool(&self, pool: &NodePoolSpec) -> String {
        let mut hasher = Sha256::new();

        hasher.update(pool.name.as_bytes());
        hasher.update(pool.location.as_bytes());
        hasher.update(pool.initial_node_count.to_be_bytes());

        if let Some(autoscaling) = &pool.autoscaling {
            hasher.update(autoscaling.min_node_count.to_be_bytes());
            hasher.update(autoscaling.max_node_count.to_be_bytes());
        }

        // BTreeMaps iterate in key order, so no sorting is needed
        for (key, value) in &pool.node_config.labels {
            update_pair(&mut hasher, key, value);
        }
        for (key, value) in &pool.node_config.metadata {
            update_pair(&mut hasher, key, value);
        }

        let mut scopes: Vec<_> = pool.node_config.oauth_scopes.iter().collect();
        scopes.sort_unstable();
        for scope in scopes {
            hasher.update(scope.as_bytes());
        }

        let mut tags: Vec<_> = pool.node_config.tags.iter().collect();
        tags.sort_unstable();
        for tag in tags {
            hasher.update(tag.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Hashes the namespace section.
    #[must_use]
    pub fn hash_namespace(&self, namespace: &NamespaceSpec) -> String {
        let mut hasher = Sha256::new();
        hasher.update(namespace.name.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Hashes the workload section.
    #[must_use]
    pub fn hash_workload(&self, workload: &WorkloadSpec) -> String {
        let mut hasher = Sha256::new();

        hasher.update(workload.name.as_bytes());
        hasher.update(workload.replicas.to_be_bytes());
        hasher.update(workload.container.name.as_bytes());
        hasher.update(workload.container.image.as_bytes());
        if let Some(port) = workload.container.port {
            hasher.update(port.to_be_bytes());
        }
        if let Some(cpu) = &workload.container.cpu_request {
            hasher.update(cpu.as_bytes());
        }
        if let Some(memory) = &workload.container.memory_request {
            hasher.update(memory.as_bytes());
        }
        for (key, value) in &workload.labels {
            update_pair(&mut hasher, key, value);
        }

        hex::encode(hasher.finalize())
    }

    /// Hashes the autoscaler section, including the labels it inherits.
    #[must_use]
    pub fn hash_autoscaler(&self, autoscaler: &AutoscalerSpec, workload: &WorkloadSpec) -> String {
        let mut hasher = Sha256::new();

        hasher.update(autoscaler.name.as_bytes());
        hasher.update(autoscaler.min_replicas.to_be_bytes());
        hasher.update(autoscaler.max_replicas.to_be_bytes());
        hasher.update(autoscaler.target_cpu_utilization.to_be_bytes());
        hasher.update(workload.name.as_bytes());
        for (key, value) in &workload.labels {
            update_pair(&mut hasher, key, value);
        }

        hex::encode(hasher.finalize())
    }

    /// Hashes the service section, including the selector it inherits.
    #[must_use]
    pub fn hash_service(&self, service: &ServiceSpec, workload: &WorkloadSpec) -> String {
        let mut hasher = Sha256::new();

        hasher.update(service.name.as_bytes());
        hasher.update(service.port.to_be_bytes());
        hasher.update(service.target_port.to_be_bytes());
        hasher.update(service.service_type.to_string().as_bytes());
        for (key, value) in &workload.labels {
            update_pair(&mut hasher, key, value);
        }

        hex::encode(hasher.finalize())
    }

    /// Hashes an arbitrary text artifact (such as a credential document).
    #[must_use]
    pub fn hash_text(&self, text: &str) -> String {
        hex::encode(Sha256::digest(text.as_bytes()))
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}

/// Feeds a key/value pair with a separator so that `("ab", "c")` and
/// `("a", "bc")` hash differently.
fn update_pair(hasher: &mut Sha256, key: &str, value: &str) {
    hasher.update(key.as_bytes());
    hasher.update([0u8]);
    hasher.update(value.as_bytes());
    hasher.update([0u8]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scenario;

    #[test]
    fn test_config_hash_deterministic() {
        let hasher = ConfigHasher::new();
        let topology = Scenario::Autoscaled.topology();

        assert_eq!(hasher.hash_config(&topology), hasher.hash_config(&topology));
    }

    #[test]
    fn test_scenarios_hash_differently() {
        let hasher = ConfigHasher::new();
        let autoscaled = hasher.hash_config(&Scenario::Autoscaled.topology());
        let fixed = hasher.hash_config(&Scenario::Fixed.topology());

        assert_ne!(autoscaled, fixed);
    }

    #[test]
    fn test_label_change_touches_dependents() {
        let hasher = ConfigHasher::new();
        let topology = Scenario::Autoscaled.topology();
        let mut relabeled = topology.clone();
        relabeled
            .workload
            .labels
            .insert(String::from("tier"), String::from("web"));

        assert_ne!(
            hasher.hash_service(&topology.service, &topology.workload),
            hasher.hash_service(&relabeled.service, &relabeled.workload)
        );
        assert_eq!(
            hasher.hash_namespace(&topology.namespace),
            hasher.hash_namespace(&relabeled.namespace)
        );
    }

    #[test]
    fn test_pair_separator() {
        let hasher = ConfigHasher::new();
        let mut a = Scenario::Fixed.topology();
        let mut b = a.clone();
        a.workload.labels = [(String::from("ab"), String::from("c"))].into();
        b.workload.labels = [(String::from("a"), String::from("bc"))].into();

        assert_ne!(hasher.hash_workload(&a.workload), hasher.hash_workload(&b.workload));
    }

    #[test]
    fn test_short_hash() {
        let hasher = ConfigHasher::new();
        let short = hasher.short_hash("abcdef1234567890abcdef1234567890");

        assert_eq!(short, "abcdef12");
    }
}
