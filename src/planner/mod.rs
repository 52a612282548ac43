//! Planning and execution.
//!
//! A [`DeploymentPlan`] is a dependency graph of resource requests built from
//! a topology. The [`DiffEngine`] compares it with recorded state and the
//! [`PlanExecutor`] applies what changed, in dependency order.

mod diff;
mod executor;
mod graph;
mod plan;

pub use diff::{DiffEngine, DiffResult, DiffType, ResourceDiff};
pub use executor::{ExecutionResult, PlanExecutor, credential_document_for};
pub use graph::{NodeId, ResourceGraph};
pub use plan::{DeploymentPlan, PlanBuilder, ResourceKind, ResourceNode, ResourceRequest};
