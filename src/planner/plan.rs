//! Deployment plan types and construction.
//!
//! A plan is a resource graph built from a [`TopologyConfig`]. Each builder
//! method adds one node and the edges to the nodes it depends on, then
//! returns the new node's id so later resources can reference it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::{
    AutoscalerSpec, ClusterSpec, ConfigHasher, NamespaceSpec, NodePoolSpec, RolloutConfig,
    ServiceSpec, TopologyConfig, WorkloadSpec,
};
use crate::error::{PlanError, Result};
use crate::platform::ManifestKind;

use super::graph::{NodeId, ResourceGraph};

/// Kind of a plan node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Managed cluster.
    Cluster,
    /// Node pool of the cluster.
    NodePool,
    /// Authenticated Kubernetes client built from the credential document.
    KubeProvider,
    /// Kubernetes namespace.
    Namespace,
    /// Kubernetes Deployment.
    Deployment,
    /// Kubernetes `HorizontalPodAutoscaler`.
    #[serde(rename = "hpa")]
    HorizontalPodAutoscaler,
    /// Kubernetes Service.
    Service,
}

impl ResourceKind {
    /// Stable lowercase name, used in state keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cluster => "cluster",
            Self::NodePool => "node_pool",
            Self::KubeProvider => "kube_provider",
            Self::Namespace => "namespace",
            Self::Deployment => "deployment",
            Self::HorizontalPodAutoscaler => "hpa",
            Self::Service => "service",
        }
    }

    /// Whether the node is a platform resource (everything but the client).
    #[must_use]
    pub const fn is_resource(self) -> bool {
        !matches!(self, Self::KubeProvider)
    }

    /// The Kubernetes object kind, for resources living inside the cluster.
    #[must_use]
    pub const fn manifest_kind(self) -> Option<ManifestKind> {
        match self {
            Self::Namespace => Some(ManifestKind::Namespace),
            Self::Deployment => Some(ManifestKind::Deployment),
            Self::HorizontalPodAutoscaler => Some(ManifestKind::HorizontalPodAutoscaler),
            Self::Service => Some(ManifestKind::Service),
            Self::Cluster | Self::NodePool | Self::KubeProvider => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a node asks the platform to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRequest {
    /// Cluster creation with its capacity bounds.
    Cluster(ClusterSpec),
    /// Node pool creation; the owning cluster is the node's dependency.
    NodePool(NodePoolSpec),
    /// Client construction from the credential document of the cluster.
    KubeProvider {
        /// Context name of the credential document.
        context: String,
    },
    /// Namespace creation.
    Namespace(NamespaceSpec),
    /// Deployment creation inside the namespace dependency.
    Deployment(WorkloadSpec),
    /// Autoscaler creation targeting the workload dependency.
    HorizontalPodAutoscaler {
        /// Autoscaler settings.
        spec: AutoscalerSpec,
        /// Labels copied from the workload.
        labels: BTreeMap<String, String>,
    },
    /// Service creation inside the namespace dependency.
    Service {
        /// Service settings.
        spec: ServiceSpec,
        /// Selector copied from the workload labels.
        selector: BTreeMap<String, String>,
    },
}

impl ResourceRequest {
    /// Kind of the request.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Cluster(_) => ResourceKind::Cluster,
            Self::NodePool(_) => ResourceKind::NodePool,
            Self::KubeProvider { .. } => ResourceKind::KubeProvider,
            Self::Namespace(_) => ResourceKind::Namespace,
            Self::Deployment(_) => ResourceKind::Deployment,
            Self::HorizontalPodAutoscaler { .. } => ResourceKind::HorizontalPodAutoscaler,
            Self::Service { .. } => ResourceKind::Service,
        }
    }

    /// Label set carried by the request, if it has one.
    #[must_use]
    pub const fn labels(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Deployment(workload) => Some(&workload.labels),
            Self::HorizontalPodAutoscaler { labels, .. } => Some(labels),
            Self::Service { selector, .. } => Some(selector),
            _ => None,
        }
    }
}

/// A node of the plan graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNode {
    /// Name the resource is created with.
    pub name: String,
    /// Creation request.
    pub request: ResourceRequest,
    /// Hash of the request, compared against recorded state.
    pub spec_hash: String,
}

impl ResourceNode {
    /// Kind of the node.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.request.kind()
    }

    /// Key identifying the resource in state (`<kind>/<name>`).
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.kind(), self.name)
    }
}

impl fmt::Display for ResourceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A complete deployment plan.
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Project name.
    pub project: String,
    /// Scenario name.
    pub scenario: String,
    /// Configuration hash this plan is based on.
    pub config_hash: String,
    /// Resource graph.
    pub graph: ResourceGraph<ResourceNode>,
    /// Nodes in dependency order.
    pub order: Vec<NodeId>,
    /// Polling settings used while executing the plan.
    pub rollout: RolloutConfig,
}

impl DeploymentPlan {
    /// Builds the plan for a topology.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting graph cannot be ordered.
    pub fn build(config: &TopologyConfig) -> Result<Self> {
        let mut builder = PlanBuilder::new(config);

        let cluster = builder.create_cluster();
        let node_pool = builder.create_node_pool(cluster)?;
        let provider = builder.create_provider(cluster, node_pool)?;
        let namespace = builder.create_namespace(provider)?;
        let workload = builder.create_workload(provider, namespace)?;
        builder.create_autoscaler(provider, namespace, workload)?;
        builder.create_service(provider, namespace)?;

        builder.finish()
    }

    /// Gets a node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&ResourceNode> {
        self.graph.node(id)
    }

    /// Iterates over the nodes in dependency order.
    pub fn ordered_nodes(&self) -> impl Iterator<Item = (NodeId, &ResourceNode)> {
        self.order
            .iter()
            .filter_map(|id| self.graph.node(*id).map(|node| (*id, node)))
    }

    /// Platform resource creation requests, in dependency order.
    ///
    /// The authenticated client node is not a platform resource and is left
    /// out.
    #[must_use]
    pub fn resource_requests(&self) -> Vec<&ResourceNode> {
        self.ordered_nodes()
            .map(|(_, node)| node)
            .filter(|node| node.kind().is_resource())
            .collect()
    }

    /// Finds the first node of a kind.
    #[must_use]
    pub fn find(&self, kind: ResourceKind) -> Option<NodeId> {
        self.graph
            .nodes()
            .find(|(_, node)| node.kind() == kind)
            .map(|(id, _)| id)
    }

    /// Returns the first direct dependency of `id` with the given kind.
    #[must_use]
    pub fn dependency_of_kind(&self, id: NodeId, kind: ResourceKind) -> Option<NodeId> {
        self.graph
            .dependencies(id)
            .into_iter()
            .find(|dep| self.graph.node(*dep).is_some_and(|n| n.kind() == kind))
    }

    /// Checks that the workload labels, the Service selector and the
    /// autoscaler labels are identical.
    #[must_use]
    pub fn labels_consistent(&self) -> bool {
        let mut label_sets = self
            .graph
            .nodes()
            .filter_map(|(_, node)| node.request.labels());

        match label_sets.next() {
            Some(first) => label_sets.all(|other| other == first),
            None => true,
        }
    }

    /// Returns true if the plan contains an autoscaler.
    #[must_use]
    pub fn is_autoscaled(&self) -> bool {
        self.find(ResourceKind::HorizontalPodAutoscaler).is_some()
    }
}

impl fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Plan for {} ({})", self.project, self.scenario)?;
        for (position, (id, node)) in self.ordered_nodes().enumerate() {
            let deps = self
                .graph
                .dependencies(id)
                .into_iter()
                .filter_map(|dep| self.graph.node(dep).map(ResourceNode::key))
                .collect::<Vec<_>>();

            write!(f, "  {}. {}", position + 1, node.key())?;
            if !deps.is_empty() {
                write!(f, " <- {}", deps.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Builds a [`DeploymentPlan`] one resource at a time.
#[derive(Debug)]
pub struct PlanBuilder<'a> {
    config: &'a TopologyConfig,
    hasher: ConfigHasher,
    graph: ResourceGraph<ResourceNode>,
}

impl<'a> PlanBuilder<'a> {
    /// Creates a builder for a topology.
    #[must_use]
    pub const fn new(config: &'a TopologyConfig) -> Self {
        Self {
            config,
            hasher: ConfigHasher::new(),
            graph: ResourceGraph::new(),
        }
    }

    /// Adds the cluster.
    pub fn create_cluster(&mut self) -> NodeId {
        let cluster = &self.config.cluster;
        self.graph.add_node(ResourceNode {
            name: cluster.name.clone(),
            spec_hash: self.hasher.hash_cluster(cluster),
            request: ResourceRequest::Cluster(cluster.clone()),
        })
    }

    /// Adds the node pool, owned by `cluster`.
    ///
    /// # Errors
    ///
    /// Returns an error if `cluster` is not a node of this plan.
    pub fn create_node_pool(&mut self, cluster: NodeId) -> Result<NodeId> {
        let pool = &self.config.node_pool;
        let id = self.graph.add_node(ResourceNode {
            name: pool.name.clone(),
            spec_hash: self.hasher.hash_node_pool(pool),
            request: ResourceRequest::NodePool(pool.clone()),
        });
        self.graph.add_edge(cluster, id)?;
        Ok(id)
    }

    /// Adds the authenticated client node.
    ///
    /// The client is only usable once the cluster has an endpoint and the
    /// node pool exists to schedule onto.
    ///
    /// # Errors
    ///
    /// Returns an error if either dependency is not a node of this plan.
    pub fn create_provider(&mut self, cluster: NodeId, node_pool: NodeId) -> Result<NodeId> {
        let context = self.config.cluster.context_name();
        let id = self.graph.add_node(ResourceNode {
            name: String::from("k8s-provider"),
            spec_hash: self.hasher.hash_text(&context),
            request: ResourceRequest::KubeProvider { context },
        });
        self.graph.add_edge(cluster, id)?;
        self.graph.add_edge(node_pool, id)?;
        Ok(id)
    }

    /// Adds the namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if `provider` is not a node of this plan.
    pub fn create_namespace(&mut self, provider: NodeId) -> Result<NodeId> {
        let namespace = &self.config.namespace;
        let id = self.graph.add_node(ResourceNode {
            name: namespace.name.clone(),
            spec_hash: self.hasher.hash_namespace(namespace),
            request: ResourceRequest::Namespace(namespace.clone()),
        });
        self.graph.add_edge(provider, id)?;
        Ok(id)
    }

    /// Adds the workload Deployment.
    ///
    /// # Errors
    ///
    /// Returns an error if a dependency is not a node of this plan.
    pub fn create_workload(&mut self, provider: NodeId, namespace: NodeId) -> Result<NodeId> {
        let workload = &self.config.workload;
        let id = self.graph.add_node(ResourceNode {
            name: workload.name.clone(),
            spec_hash: self.hasher.hash_workload(workload),
            request: ResourceRequest::Deployment(workload.clone()),
        });
        self.graph.add_edge(provider, id)?;
        self.graph.add_edge(namespace, id)?;
        Ok(id)
    }

    /// Adds the autoscaler targeting `workload`, if the topology has one.
    ///
    /// # Errors
    ///
    /// Returns an error if a dependency is not a node of this plan.
    pub fn create_autoscaler(
        &mut self,
        provider: NodeId,
        namespace: NodeId,
        workload: NodeId,
    ) -> Result<Option<NodeId>> {
        let Some(spec) = &self.config.autoscaler else {
            return Ok(None);
        };

        let id = self.graph.add_node(ResourceNode {
            name: spec.name.clone(),
            spec_hash: self.hasher.hash_autoscaler(spec, &self.config.workload),
            request: ResourceRequest::HorizontalPodAutoscaler {
                spec: spec.clone(),
                labels: self.config.workload.labels.clone(),
            },
        });
        self.graph.add_edge(provider, id)?;
        self.graph.add_edge(namespace, id)?;
        self.graph.add_edge(workload, id)?;
        Ok(Some(id))
    }

    /// Adds the Service; its selector is the workload label set.
    ///
    /// # Errors
    ///
    /// Returns an error if a dependency is not a node of this plan.
    pub fn create_service(&mut self, provider: NodeId, namespace: NodeId) -> Result<NodeId> {
        let service = &self.config.service;
        let id = self.graph.add_node(ResourceNode {
            name: service.name.clone(),
            spec_hash: self.hasher.hash_service(service, &self.config.workload),
            request: ResourceRequest::Service {
                spec: service.clone(),
                selector: self.config.workload.labels.clone(),
            },
        });
        self.graph.add_edge(provider, id)?;
        self.graph.add_edge(namespace, id)?;
        Ok(id)
    }

    /// Orders the graph and produces the plan.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::DependencyCycle`] if the graph cannot be ordered,
    /// or [`PlanError::UnresolvedDependency`] if no cluster was added.
    pub fn finish(self) -> Result<DeploymentPlan> {
        if !self
            .graph
            .nodes()
            .any(|(_, node)| node.kind() == ResourceKind::Cluster)
        {
            return Err(PlanError::UnresolvedDependency {
                resource: self.config.project.name.clone(),
                missing: String::from("cluster"),
            }
            .into());
        }

        let order = self.graph.topological_order()?;

        Ok(DeploymentPlan {
            created_at: Utc::now(),
            project: self.config.project.name.clone(),
            scenario: self.config.project.scenario.clone(),
            config_hash: self.hasher.hash_config(self.config),
            graph: self.graph,
            order,
            rollout: self.config.rollout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scenario;

    fn kinds(plan: &DeploymentPlan) -> Vec<ResourceKind> {
        plan.resource_requests().iter().map(|n| n.kind()).collect()
    }

    #[test]
    fn test_fixed_plan_has_five_requests() {
        let plan = DeploymentPlan::build(&Scenario::Fixed.topology()).unwrap();

        assert_eq!(
            kinds(&plan),
            vec![
                ResourceKind::Cluster,
                ResourceKind::NodePool,
                ResourceKind::Namespace,
                ResourceKind::Deployment,
                ResourceKind::Service,
            ]
        );
        assert!(!plan.is_autoscaled());
    }

    #[test]
    fn test_autoscaled_plan_has_six_requests() {
        let plan = DeploymentPlan::build(&Scenario::Autoscaled.topology()).unwrap();

        assert_eq!(
            kinds(&plan),
            vec![
                ResourceKind::Cluster,
                ResourceKind::NodePool,
                ResourceKind::Namespace,
                ResourceKind::Deployment,
                ResourceKind::HorizontalPodAutoscaler,
                ResourceKind::Service,
            ]
        );
        assert_eq!(plan.graph.len(), 7);
    }

    #[test]
    fn test_provider_precedes_kubernetes_resources() {
        let plan = DeploymentPlan::build(&Scenario::Autoscaled.topology()).unwrap();
        let provider = plan.find(ResourceKind::KubeProvider).unwrap();
        let provider_pos = plan.order.iter().position(|id| *id == provider).unwrap();

        for (position, (_, node)) in plan.ordered_nodes().enumerate() {
            if node.kind().manifest_kind().is_some() {
                assert!(position > provider_pos, "{} applied before provider", node.key());
            }
        }
    }

    #[test]
    fn test_labels_copied_from_workload() {
        let plan = DeploymentPlan::build(&Scenario::Autoscaled.topology()).unwrap();
        assert!(plan.labels_consistent());

        let service = plan.find(ResourceKind::Service).unwrap();
        let selector = plan.node(service).unwrap().request.labels().unwrap();
        assert_eq!(selector.get("app").map(String::as_str), Some("load-testing"));
    }

    #[test]
    fn test_labels_inconsistency_detected() {
        let mut plan = DeploymentPlan::build(&Scenario::Fixed.topology()).unwrap();
        let service = plan.find(ResourceKind::Service).unwrap();

        let mut graph = ResourceGraph::new();
        for (id, node) in plan.graph.nodes() {
            let mut node = node.clone();
            if id == service
                && let ResourceRequest::Service { selector, .. } = &mut node.request
            {
                selector.insert(String::from("app"), String::from("other"));
            }
            graph.add_node(node);
        }
        plan.graph = graph;

        assert!(!plan.labels_consistent());
    }

    #[test]
    fn test_dependency_lookup() {
        let plan = DeploymentPlan::build(&Scenario::Autoscaled.topology()).unwrap();
        let hpa = plan.find(ResourceKind::HorizontalPodAutoscaler).unwrap();

        let workload = plan.dependency_of_kind(hpa, ResourceKind::Deployment).unwrap();
        assert_eq!(plan.node(workload).unwrap().name, "load-testing-app");
        assert!(plan.dependency_of_kind(hpa, ResourceKind::Cluster).is_none());
    }

    #[test]
    fn test_finish_requires_cluster() {
        let topology = Scenario::Fixed.topology();
        let builder = PlanBuilder::new(&topology);
        assert!(builder.finish().is_err());
    }

    #[test]
    fn test_display_lists_order() {
        let plan = DeploymentPlan::build(&Scenario::Fixed.topology()).unwrap();
        let text = plan.to_string();

        assert!(text.contains("1. cluster/load-testing"));
        assert!(text.contains("node_pool/primary-node-pool <- cluster/load-testing"));
    }
}
