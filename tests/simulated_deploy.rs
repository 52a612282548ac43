//! End-to-end runs of both scenarios against the simulated platform with a
//! local state store.

use loadtest_deploy::config::{ConfigParser, Scenario};
use loadtest_deploy::planner::{
    DeploymentPlan, DiffEngine, PlanExecutor, ResourceKind, credential_document_for,
};
use loadtest_deploy::platform::{ManifestKind, SimulatedProvider};
use loadtest_deploy::error::{DeployError, StateError};
use loadtest_deploy::state::{
    DeploymentOperation, DeploymentState, LocalStateStore, StateStore, with_lock,
};
use tempfile::TempDir;

#[test]
fn test_plans_request_resources_in_dependency_order() {
    let fixed = DeploymentPlan::build(&Scenario::Fixed.topology()).unwrap();
    let kinds: Vec<ResourceKind> = fixed.resource_requests().iter().map(|n| n.kind()).collect();
    assert_eq!(
        kinds,
        [
            ResourceKind::Cluster,
            ResourceKind::NodePool,
            ResourceKind::Namespace,
            ResourceKind::Deployment,
            ResourceKind::Service,
        ]
    );

    let autoscaled = DeploymentPlan::build(&Scenario::Autoscaled.topology()).unwrap();
    assert_eq!(autoscaled.resource_requests().len(), 6);
    assert!(fixed.labels_consistent());
    assert!(autoscaled.labels_consistent());
}

#[test]
fn test_generated_configuration_plans_like_the_scenario() {
    let yaml = ConfigParser::to_yaml(&Scenario::Autoscaled.topology()).unwrap();
    let parsed = ConfigParser::new().parse_yaml(&yaml, None).unwrap();

    let from_file = DeploymentPlan::build(&parsed).unwrap();
    let built_in = DeploymentPlan::build(&Scenario::Autoscaled.topology()).unwrap();
    assert_eq!(from_file.config_hash, built_in.config_hash);
}

#[tokio::test]
async fn test_autoscaled_lifecycle_with_local_state() {
    let dir = TempDir::new().unwrap();
    let store = LocalStateStore::with_base_dir(dir.path().join(".loadtest"));
    let provider = SimulatedProvider::new();
    let executor = PlanExecutor::new(&provider).with_store(&store);

    let plan = DeploymentPlan::build(&Scenario::Autoscaled.topology()).unwrap();
    let diff = DiffEngine::new().compute_diff(&plan, None);
    let mut state = DeploymentState::new(&plan.project, &plan.scenario);
    let result = executor.apply(&plan, &diff, &mut state).await.unwrap();

    assert_eq!(result.applied.len(), 6);
    assert_eq!(result.outputs.url(), Some("203.0.113.10"));

    // Everything survives a reload
    let stored = store.load().await.unwrap().unwrap();
    assert_eq!(stored.resources.len(), 6);
    assert_eq!(stored.outputs.url(), Some("203.0.113.10"));
    assert_eq!(stored.config_hash, plan.config_hash);

    let hpa = provider
        .object(
            ManifestKind::HorizontalPodAutoscaler,
            Some("load-testing-ns"),
            "load-testing-hpa",
        )
        .await
        .unwrap();
    assert_eq!(hpa["spec"]["scaleTargetRef"]["name"], "load-testing-app");

    let (_, cluster) = stored.resources_of_kind(ResourceKind::Cluster).next().unwrap();
    let document = credential_document_for(cluster).unwrap();
    assert_eq!(document.context, "demo_load-testing");
    assert!(document.connection().unwrap().server.starts_with("https://"));

    // A second run against the stored state has nothing to do
    let replan = DiffEngine::new().compute_diff(&plan, Some(&stored));
    assert!(!replan.has_changes());

    let mut state = stored;
    let destroyed = executor.destroy(&mut state).await.unwrap();
    assert_eq!(destroyed.deleted.len(), 6);
    assert_eq!(destroyed.deleted.first().map(String::as_str), Some("service/app-service"));

    let stored = store.load().await.unwrap().unwrap();
    assert!(stored.is_empty());
    assert!(stored.outputs.is_empty());
    assert_eq!(
        stored.history.iter().map(|e| e.operation).collect::<Vec<_>>(),
        [DeploymentOperation::Apply, DeploymentOperation::Destroy]
    );
    assert_eq!(provider.object_count().await, 0);
    assert!(!provider.has_cluster("load-testing").await);
}

#[tokio::test]
async fn test_failed_apply_resumes_from_recorded_state() {
    let dir = TempDir::new().unwrap();
    let store = LocalStateStore::with_base_dir(dir.path());
    let plan = DeploymentPlan::build(&Scenario::Fixed.topology()).unwrap();

    let failing = SimulatedProvider::new().with_failure("apply Service");
    let mut state = DeploymentState::new(&plan.project, &plan.scenario);
    let diff = DiffEngine::new().compute_diff(&plan, None);
    PlanExecutor::new(&failing)
        .with_store(&store)
        .apply(&plan, &diff, &mut state)
        .await
        .unwrap_err();

    let recorded = store.load().await.unwrap().unwrap();
    assert_eq!(recorded.resources.len(), 4);
    assert!(recorded.outputs.url().is_none());

    let diff = DiffEngine::new().compute_diff(&plan, Some(&recorded));
    assert_eq!(diff.creates, 1);
    assert_eq!(diff.unchanged, 4);
}

#[tokio::test]
async fn test_locked_runs_diff_against_state_read_under_lock() {
    let dir = TempDir::new().unwrap();
    let local = LocalStateStore::with_base_dir(dir.path().join(".loadtest"));
    let store = &local;
    let provider = SimulatedProvider::new();
    let provider = &provider;
    let plan = DeploymentPlan::build(&Scenario::Fixed.topology()).unwrap();
    let plan = &plan;

    let first = with_lock(store, "apply", || async move {
        let mut state = store
            .load()
            .await?
            .unwrap_or_else(|| DeploymentState::new(&plan.project, &plan.scenario));
        let diff = DiffEngine::new().compute_diff(plan, Some(&state));
        PlanExecutor::new(provider)
            .with_store(store)
            .apply(plan, &diff, &mut state)
            .await
    })
    .await
    .unwrap();
    assert_eq!(first.applied.len(), 5);

    let has_changes = with_lock(store, "apply", || async move {
        let competing = with_lock(store, "destroy", || async move { Ok(()) }).await;
        assert!(matches!(
            competing,
            Err(DeployError::State(StateError::LockedByOther { .. }))
        ));

        let state = store.load().await?.unwrap();
        let diff = DiffEngine::new().compute_diff(plan, Some(&state));
        Ok(diff.has_changes())
    })
    .await
    .unwrap();

    assert!(!has_changes);
    assert!(!store.is_locked().await.unwrap());
}
