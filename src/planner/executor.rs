//! Plan executor for applying and destroying deployment plans.
//!
//! Nodes are applied one at a time in topological order. Every provider call
//! is awaited before the next node starts, and each applied resource is
//! written to state as soon as it completes, so a failed run leaves the
//! resources it did create recorded. The first failure aborts the run.

use std::cmp::Reverse;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::RolloutConfig;
use crate::error::{DeployError, PlanError, PlatformError, Result, StateError};
use crate::kubeconfig::{CredentialDocument, build_credential_document};
use crate::outputs::{StackOutputs, URL_OUTPUT, extract_external_address, resolve_workload_short_name};
use crate::platform::{CloudProvider, ClusterApi, Manifest, manifests};
use crate::state::{
    DeploymentHistoryEntry, DeploymentOperation, DeploymentState, ResourceState, ResourceStatus,
    StateStore, keys,
};

use super::diff::DiffResult;
use super::graph::NodeId;
use super::plan::{DeploymentPlan, ResourceKind, ResourceNode, ResourceRequest};

/// Executor for deployment plans.
pub struct PlanExecutor<'a> {
    provider: &'a dyn CloudProvider,
    store: Option<&'a dyn StateStore>,
}

/// Result of executing a plan or destroying a stack.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Keys of the resources that were applied.
    pub applied: Vec<String>,
    /// Keys of the resources left untouched.
    pub unchanged: Vec<String>,
    /// Keys of the resources that were deleted.
    pub deleted: Vec<String>,
    /// Exported stack outputs.
    pub outputs: StackOutputs,
    /// Credential document used to reach the cluster, if one was built.
    pub credential_document: Option<CredentialDocument>,
}

impl std::fmt::Debug for PlanExecutor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanExecutor")
            .field("provider", &self.provider.name())
            .field("store", &self.store.map(|s| s.backend_type()))
            .finish()
    }
}

/// Renders the credential document for a recorded cluster.
///
/// # Errors
///
/// Returns an error if the record is not a cluster or lacks its endpoint or
/// CA certificate.
pub fn credential_document_for(cluster: &ResourceState) -> Result<CredentialDocument> {
    if cluster.kind != ResourceKind::Cluster {
        return Err(DeployError::internal(format!(
            "{} {} is not a cluster",
            cluster.kind, cluster.name
        )));
    }

    let field = |key: &str| {
        cluster.output(key).ok_or_else(|| {
            StateError::corrupted(format!("cluster {} has no recorded {key}", cluster.name))
        })
    };

    Ok(build_credential_document(
        field(keys::ENDPOINT)?,
        &cluster.name,
        field(keys::CA_CERTIFICATE)?,
    ))
}

/// Finds the recorded state of the dependency of `id` with the given kind.
fn dependency_record<'s>(
    plan: &DeploymentPlan,
    id: NodeId,
    kind: ResourceKind,
    state: &'s DeploymentState,
) -> Result<&'s ResourceState> {
    let resource = plan.node(id).map_or_else(|| id.to_string(), ResourceNode::key);
    let unresolved = |missing: String| PlanError::UnresolvedDependency {
        resource: resource.clone(),
        missing,
    };

    let dependency = plan
        .dependency_of_kind(id, kind)
        .ok_or_else(|| unresolved(kind.to_string()))?;
    let key = plan
        .node(dependency)
        .map(ResourceNode::key)
        .ok_or(PlanError::UnknownNode {
            id: dependency.index(),
        })?;

    match state.get_resource(&key) {
        Some(record) => Ok(record),
        None => Err(unresolved(key).into()),
    }
}

/// Builds the manifest of a Kubernetes node and the values to record with it.
fn manifest_for(
    plan: &DeploymentPlan,
    id: NodeId,
    node: &ResourceNode,
    state: &DeploymentState,
) -> Result<(Manifest, Vec<(&'static str, String)>)> {
    let namespace_of = || -> Result<String> {
        Ok(dependency_record(plan, id, ResourceKind::Namespace, state)?
            .name
            .clone())
    };

    match &node.request {
        ResourceRequest::Namespace(spec) => Ok((manifests::namespace(&spec.name), Vec::new())),
        ResourceRequest::Deployment(workload) => {
            let namespace = namespace_of()?;
            let manifest = manifests::deployment(&namespace, workload);
            Ok((manifest, vec![(keys::NAMESPACE, namespace)]))
        }
        ResourceRequest::HorizontalPodAutoscaler { spec, labels } => {
            let namespace = namespace_of()?;
            let workload = dependency_record(plan, id, ResourceKind::Deployment, state)?;
            let target = workload.output(keys::SHORT_NAME).map_or_else(
                || resolve_workload_short_name(&workload.id).to_string(),
                str::to_string,
            );
            let manifest = manifests::autoscaler(&namespace, spec, &target, labels);
            Ok((manifest, vec![(keys::NAMESPACE, namespace), (keys::TARGET, target)]))
        }
        ResourceRequest::Service { spec, selector } => {
            let namespace = namespace_of()?;
            let manifest = manifests::service(&namespace, spec, selector);
            Ok((manifest, vec![(keys::NAMESPACE, namespace)]))
        }
        ResourceRequest::Cluster(_)
        | ResourceRequest::NodePool(_)
        | ResourceRequest::KubeProvider { .. } => Err(DeployError::internal(format!(
            "{} is not a Kubernetes object",
            node.key()
        ))),
    }
}

impl<'a> PlanExecutor<'a> {
    /// Creates an executor running against `provider`.
    #[must_use]
    pub const fn new(provider: &'a dyn CloudProvider) -> Self {
        Self {
            provider,
            store: None,
        }
    }

    /// Persists state to `store` after every resource.
    #[must_use]
    pub const fn with_store(mut self, store: &'a dyn StateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Applies a plan.
    ///
    /// Resources the diff reports as unchanged are skipped and their recorded
    /// values reused; resources recorded but no longer planned are deleted
    /// after the walk.
    ///
    /// # Errors
    ///
    /// Returns the first provider or state error unchanged. State is saved
    /// with a failed history entry before returning.
    pub async fn apply(
        &self,
        plan: &DeploymentPlan,
        diff: &DiffResult,
        state: &mut DeploymentState,
    ) -> Result<ExecutionResult> {
        info!(
            "Applying plan for {} ({}) on {} provider",
            plan.project,
            plan.scenario,
            self.provider.name()
        );
        state.project.clone_from(&plan.project);
        state.scenario.clone_from(&plan.scenario);

        let mut result = ExecutionResult::default();
        let outcome = self.walk(plan, diff, state, &mut result).await;

        let entry = match &outcome {
            Ok(()) => {
                state.outputs = result.outputs.clone();
                state.config_hash.clone_from(&plan.config_hash);
                DeploymentHistoryEntry::new(
                    DeploymentOperation::Apply,
                    &plan.config_hash,
                    result.applied.clone(),
                )
            }
            Err(e) => {
                error!("Apply failed: {e}");
                DeploymentHistoryEntry::failed(
                    DeploymentOperation::Apply,
                    &plan.config_hash,
                    result.applied.clone(),
                    &e.to_string(),
                )
            }
        };
        state.add_history(entry);

        match outcome {
            Ok(()) => {
                self.persist(state).await?;
                info!(
                    "Apply complete: {} applied, {} unchanged, {} deleted",
                    result.applied.len(),
                    result.unchanged.len(),
                    result.deleted.len()
                );
                Ok(result)
            }
            Err(e) => {
                if let Err(save_error) = self.persist(state).await {
                    warn!("Failed to save state after failed apply: {save_error}");
                }
                Err(e)
            }
        }
    }

    /// Deletes every recorded resource.
    ///
    /// Kinds are declared in dependency order, so deleting in descending kind
    /// order visits dependents before their dependencies. Missing resources
    /// count as already deleted.
    ///
    /// # Errors
    ///
    /// Returns the first provider or state error unchanged.
    pub async fn destroy(&self, state: &mut DeploymentState) -> Result<ExecutionResult> {
        info!("Destroying {} recorded resources of {}", state.resources.len(), state.project);

        let mut order: Vec<(ResourceKind, String)> = state
            .resources
            .iter()
            .map(|(key, record)| (record.kind, key.clone()))
            .collect();
        order.sort_by_key(|(kind, _)| Reverse(*kind));

        let mut result = ExecutionResult::default();
        let needs_client = order.iter().any(|(kind, _)| kind.manifest_kind().is_some());
        let client = match state.resources_of_kind(ResourceKind::Cluster).next() {
            Some((_, cluster)) if needs_client => {
                let document = credential_document_for(cluster)?;
                let client = self.provider.connect(&document).await?;
                result.credential_document = Some(document);
                Some(client)
            }
            _ => None,
        };

        let mut outcome = Ok(());
        for (_, key) in &order {
            if let Err(e) = self.delete_recorded(key, state, client.as_deref()).await {
                outcome = Err(e);
                break;
            }
            result.deleted.push(key.clone());
        }

        let config_hash = state.config_hash.clone();
        let entry = match &outcome {
            Ok(()) => {
                state.outputs = StackOutputs::new();
                DeploymentHistoryEntry::new(DeploymentOperation::Destroy, &config_hash, result.deleted.clone())
            }
            Err(e) => DeploymentHistoryEntry::failed(
                DeploymentOperation::Destroy,
                &config_hash,
                result.deleted.clone(),
                &e.to_string(),
            ),
        };
        state.add_history(entry);
        self.persist(state).await?;

        outcome.map(|()| {
            info!("Destroyed {} resources", result.deleted.len());
            result
        })
    }

    async fn walk(
        &self,
        plan: &DeploymentPlan,
        diff: &DiffResult,
        state: &mut DeploymentState,
        result: &mut ExecutionResult,
    ) -> Result<()> {
        let mut client: Option<Box<dyn ClusterApi>> = None;

        for (id, node) in plan.ordered_nodes() {
            let key = node.key();

            if !diff.needs_apply(id) {
                debug!("{key} is up to date");
                if let Some(address) = state.get_resource(&key).and_then(|r| r.output(keys::ADDRESS)) {
                    result.outputs.export(URL_OUTPUT, address);
                }
                result.unchanged.push(key);
                continue;
            }

            if let ResourceRequest::KubeProvider { context } = &node.request {
                let cluster = dependency_record(plan, id, ResourceKind::Cluster, state)?;
                let document = credential_document_for(cluster)?;
                debug!("Connecting to cluster through context {context}");
                client = Some(self.provider.connect(&document).await?);
                result.credential_document = Some(document);
                continue;
            }

            let record = self
                .apply_resource(plan, id, node, state, client.as_deref())
                .await?;
            state.set_resource(&key, record);
            self.persist(state).await?;
            result.applied.push(key.clone());

            if let ResourceRequest::Service { spec, .. } = &node.request
                && spec.exposes_external_address()
            {
                let namespace = dependency_record(plan, id, ResourceKind::Namespace, state)?
                    .name
                    .clone();
                let client = client.as_deref().ok_or_else(|| PlanError::UnresolvedDependency {
                    resource: key.clone(),
                    missing: ResourceKind::KubeProvider.to_string(),
                })?;

                match self
                    .wait_for_address(client, &namespace, &spec.name, &plan.rollout)
                    .await
                {
                    Ok(address) => {
                        info!("Service {} is reachable at {address}", spec.name);
                        if let Some(record) = state.get_resource_mut(&key) {
                            record.outputs.insert(keys::ADDRESS.to_string(), address.clone());
                        }
                        result.outputs.export(URL_OUTPUT, address);
                        self.persist(state).await?;
                    }
                    Err(e) => {
                        if let Some(record) = state.get_resource_mut(&key) {
                            record.set_status(ResourceStatus::Degraded);
                        }
                        return Err(e);
                    }
                }
            }
        }

        let mut deletions: Vec<_> = diff.deletions().collect();
        deletions.sort_by_key(|d| Reverse(d.kind));
        for deletion in deletions {
            debug!("{} is no longer planned: {}", deletion.key, deletion.reason);
            self.delete_recorded(&deletion.key, state, client.as_deref())
                .await?;
            result.deleted.push(deletion.key.clone());
        }

        Ok(())
    }

    async fn apply_resource(
        &self,
        plan: &DeploymentPlan,
        id: NodeId,
        node: &ResourceNode,
        state: &DeploymentState,
        client: Option<&dyn ClusterApi>,
    ) -> Result<ResourceState> {
        let kind = node.kind();

        match &node.request {
            ResourceRequest::Cluster(spec) => {
                info!("Applying cluster {} in {}", spec.name, spec.location);
                let cluster = self.provider.apply_cluster(spec).await?;
                Ok(ResourceState::new(kind, &node.name, &cluster.id, &node.spec_hash)
                    .with_output(keys::ENDPOINT, &cluster.endpoint)
                    .with_output(keys::CA_CERTIFICATE, &cluster.ca_certificate)
                    .with_output(keys::LOCATION, &cluster.location))
            }
            ResourceRequest::NodePool(spec) => {
                let cluster = dependency_record(plan, id, ResourceKind::Cluster, state)?
                    .name
                    .clone();
                info!("Applying node pool {} in cluster {cluster}", spec.name);
                let pool = self.provider.apply_node_pool(&cluster, spec).await?;
                Ok(ResourceState::new(kind, &node.name, &pool.id, &node.spec_hash)
                    .with_output(keys::CLUSTER, &cluster)
                    .with_output(keys::LOCATION, &spec.location))
            }
            _ => {
                let client = client.ok_or_else(|| PlanError::UnresolvedDependency {
                    resource: node.key(),
                    missing: ResourceKind::KubeProvider.to_string(),
                })?;
                let (manifest, outputs) = manifest_for(plan, id, node, state)?;

                info!("Applying {} {}", manifest.kind, manifest.identifier());
                let applied = client.apply(&manifest).await?;

                let mut record = ResourceState::new(kind, &node.name, &applied.id, &node.spec_hash);
                for (key, value) in outputs {
                    record = record.with_output(key, &value);
                }
                if kind == ResourceKind::Deployment {
                    record = record.with_output(keys::SHORT_NAME, resolve_workload_short_name(&applied.id));
                }
                Ok(record)
            }
        }
    }

    /// Polls the Service until it reports an external address.
    ///
    /// A zero timeout waits indefinitely.
    async fn wait_for_address(
        &self,
        client: &dyn ClusterApi,
        namespace: &str,
        service: &str,
        rollout: &RolloutConfig,
    ) -> Result<String> {
        let interval = Duration::from_secs(rollout.address_poll_secs);
        let deadline = (rollout.address_timeout_secs > 0)
            .then(|| Instant::now() + Duration::from_secs(rollout.address_timeout_secs));

        loop {
            let status = client.service_status(namespace, service).await?;
            match extract_external_address(service, &status) {
                Ok(address) => return Ok(address),
                Err(DeployError::Platform(PlatformError::AddressNotAssigned { .. })) => {}
                Err(e) => return Err(e),
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                warn!(
                    "Service {namespace}/{service} got no address within {}s",
                    rollout.address_timeout_secs
                );
                return Err(PlatformError::AddressNotAssigned {
                    service: service.to_string(),
                }
                .into());
            }

            debug!("Waiting for an address on {namespace}/{service}");
            tokio::time::sleep(interval).await;
        }
    }

    async fn delete_recorded(
        &self,
        key: &str,
        state: &mut DeploymentState,
        client: Option<&dyn ClusterApi>,
    ) -> Result<()> {
        let Some(record) = state.get_resource_mut(key) else {
            return Ok(());
        };
        record.set_status(ResourceStatus::Deleting);
        let record = record.clone();
        self.persist(state).await?;

        let recorded = |field: &str| {
            record
                .output(field)
                .ok_or_else(|| StateError::corrupted(format!("{key} has no recorded {field}")))
        };

        info!("Deleting {key}");
        match (record.kind, record.kind.manifest_kind()) {
            (_, Some(manifest_kind)) => match client {
                Some(client) => {
                    client
                        .delete(manifest_kind, record.output(keys::NAMESPACE), &record.name)
                        .await?;
                }
                None => warn!("No cluster connection, {key} goes away with its cluster"),
            },
            (ResourceKind::NodePool, None) => {
                self.provider
                    .delete_node_pool(recorded(keys::CLUSTER)?, recorded(keys::LOCATION)?, &record.name)
                    .await?;
            }
            (ResourceKind::Cluster, None) => {
                self.provider
                    .delete_cluster(recorded(keys::LOCATION)?, &record.name)
                    .await?;
            }
            (_, None) => {}
        }

        state.remove_resource(key);
        self.persist(state).await
    }

    async fn persist(&self, state: &DeploymentState) -> Result<()> {
        if let Some(store) = self.store {
            store.save(state).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Scenario, TopologyConfig};
    use crate::planner::DiffEngine;
    use crate::platform::{ManifestKind, SimulatedProvider};
    use crate::state::LocalStateStore;
    use tempfile::TempDir;

    fn topology(scenario: Scenario) -> TopologyConfig {
        let mut topology = scenario.topology();
        topology.rollout.address_poll_secs = 0;
        topology
    }

    async fn apply(
        provider: &SimulatedProvider,
        topology: &TopologyConfig,
        state: &mut DeploymentState,
    ) -> Result<ExecutionResult> {
        let plan = DeploymentPlan::build(topology).unwrap();
        let diff = DiffEngine::new().compute_diff(&plan, Some(state));
        PlanExecutor::new(provider).apply(&plan, &diff, state).await
    }

    #[tokio::test]
    async fn test_apply_fixed_exports_url() {
        let provider = SimulatedProvider::new().with_address_after_polls(2);
        let mut state = DeploymentState::new("load-testing", "fixed");

        let result = apply(&provider, &topology(Scenario::Fixed), &mut state)
            .await
            .unwrap();

        assert_eq!(result.applied.len(), 5);
        assert_eq!(result.outputs.url(), Some("203.0.113.10"));
        assert_eq!(state.outputs.url(), Some("203.0.113.10"));
        assert!(result.credential_document.is_some());

        let polls = provider
            .calls()
            .await
            .iter()
            .filter(|c| c.starts_with("service_status"))
            .count();
        assert_eq!(polls, 3);
    }

    #[tokio::test]
    async fn test_url_follows_assigned_ip() {
        let provider = SimulatedProvider::new().with_ip("198.51.100.7");
        let mut state = DeploymentState::new("load-testing", "fixed");

        let result = apply(&provider, &topology(Scenario::Fixed), &mut state)
            .await
            .unwrap();

        assert_eq!(result.outputs.url(), Some("198.51.100.7"));
        let service = state.get_resource("service/app-service").unwrap();
        assert_eq!(service.output(keys::ADDRESS), Some("198.51.100.7"));
    }

    #[tokio::test]
    async fn test_cluster_ip_service_is_not_polled() {
        let provider = SimulatedProvider::new();
        let mut topology = topology(Scenario::Fixed);
        topology.service.service_type = crate::config::ServiceType::ClusterIp;
        let mut state = DeploymentState::new("load-testing", "fixed");

        let result = apply(&provider, &topology, &mut state).await.unwrap();

        assert_eq!(result.applied.len(), 5);
        assert_eq!(result.outputs.url(), None);
        assert!(!provider.calls().await.iter().any(|c| c.starts_with("service_status")));
    }

    #[tokio::test]
    async fn test_autoscaler_targets_short_name() {
        let provider = SimulatedProvider::new();
        let mut state = DeploymentState::new("load-testing", "autoscaled");

        apply(&provider, &topology(Scenario::Autoscaled), &mut state)
            .await
            .unwrap();

        let hpa = provider
            .object(ManifestKind::HorizontalPodAutoscaler, Some("load-testing-ns"), "load-testing-hpa")
            .await
            .unwrap();
        assert_eq!(
            hpa.pointer("/spec/scaleTargetRef/name").and_then(|v| v.as_str()),
            Some("load-testing-app")
        );

        let deployment = state.get_resource("deployment/load-testing-app").unwrap();
        assert_eq!(deployment.id, "load-testing-ns/load-testing-app");
        assert_eq!(deployment.output(keys::SHORT_NAME), Some("load-testing-app"));
    }

    #[tokio::test]
    async fn test_reapply_skips_unchanged_resources() {
        let provider = SimulatedProvider::new();
        let topology = topology(Scenario::Fixed);
        let mut state = DeploymentState::new("load-testing", "fixed");

        apply(&provider, &topology, &mut state).await.unwrap();
        let calls_before = provider.calls().await.len();

        let second = apply(&provider, &topology, &mut state).await.unwrap();

        assert!(second.applied.is_empty());
        assert_eq!(second.unchanged.len(), 5);
        assert_eq!(second.outputs.url(), Some("203.0.113.10"));

        let new_calls = provider.calls().await[calls_before..].to_vec();
        assert_eq!(new_calls, vec![String::from("connect demo_load-testing")]);
        assert_eq!(state.history.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_aborts_and_keeps_applied_resources() {
        let temp = TempDir::new().unwrap();
        let store = LocalStateStore::with_base_dir(temp.path());
        let provider = SimulatedProvider::new().with_failure("apply Deployment");
        let plan = DeploymentPlan::build(&topology(Scenario::Fixed)).unwrap();
        let diff = DiffEngine::new().compute_diff(&plan, None);
        let mut state = DeploymentState::new("load-testing", "fixed");

        let err = PlanExecutor::new(&provider)
            .with_store(&store)
            .apply(&plan, &diff, &mut state)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeployError::Platform(PlatformError::ApiRequestFailed { status: 500, .. })
        ));

        let saved = store.load().await.unwrap().unwrap();
        assert_eq!(saved.resources.len(), 3);
        assert!(saved.get_resource("namespace/load-testing-ns").is_some());
        assert!(saved.get_resource("deployment/load-testing-app").is_none());
        assert!(!saved.history.last().unwrap().success);

        let calls = provider.calls().await;
        assert!(!calls.iter().any(|c| c.starts_with("apply Service")));
    }

    #[tokio::test]
    async fn test_address_timeout_marks_service_degraded() {
        let provider = SimulatedProvider::new().with_address_after_polls(u32::MAX);
        let mut topology = topology(Scenario::Fixed);
        topology.rollout.address_poll_secs = 1;
        topology.rollout.address_timeout_secs = 1;
        let mut state = DeploymentState::new("load-testing", "fixed");

        let err = apply(&provider, &topology, &mut state).await.unwrap_err();

        assert!(matches!(
            err,
            DeployError::Platform(PlatformError::AddressNotAssigned { ref service }) if service == "app-service"
        ));
        let service = state.get_resource("service/app-service").unwrap();
        assert_eq!(service.status, ResourceStatus::Degraded);
        assert!(state.outputs.url().is_none());
    }

    #[tokio::test]
    async fn test_switching_scenario_deletes_autoscaler() {
        let provider = SimulatedProvider::new();
        let mut state = DeploymentState::new("load-testing", "autoscaled");
        apply(&provider, &topology(Scenario::Autoscaled), &mut state)
            .await
            .unwrap();

        let result = apply(&provider, &topology(Scenario::Fixed), &mut state)
            .await
            .unwrap();

        assert_eq!(result.deleted, vec![String::from("hpa/load-testing-hpa")]);
        assert!(state.get_resource("hpa/load-testing-hpa").is_none());
        assert!(
            provider
                .object(ManifestKind::HorizontalPodAutoscaler, Some("load-testing-ns"), "load-testing-hpa")
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_destroy_removes_everything() {
        let provider = SimulatedProvider::new();
        let mut state = DeploymentState::new("load-testing", "autoscaled");
        apply(&provider, &topology(Scenario::Autoscaled), &mut state)
            .await
            .unwrap();

        let result = PlanExecutor::new(&provider).destroy(&mut state).await.unwrap();

        assert_eq!(result.deleted.len(), 6);
        assert_eq!(result.deleted.first().map(String::as_str), Some("service/app-service"));
        assert_eq!(result.deleted.last().map(String::as_str), Some("cluster/load-testing"));
        assert!(state.is_empty());
        assert!(state.outputs.is_empty());
        assert!(!provider.has_cluster("load-testing").await);
        assert_eq!(provider.object_count().await, 0);
    }

    #[test]
    fn test_credential_document_requires_cluster_fields() {
        let cluster = ResourceState::new(ResourceKind::Cluster, "c1", "id", "h")
            .with_output(keys::ENDPOINT, "10.0.0.1");

        let err = credential_document_for(&cluster).unwrap_err();
        assert!(matches!(err, DeployError::State(StateError::Corrupted { .. })));

        let complete = cluster.with_output(keys::CA_CERTIFICATE, "Y2E=");
        let document = credential_document_for(&complete).unwrap();
        assert_eq!(document, build_credential_document("10.0.0.1", "c1", "Y2E="));
    }
}
