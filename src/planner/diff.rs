//! Diff engine for comparing a plan against recorded state.
//!
//! Every plan node is compared by spec hash with the resource recorded in
//! state. A node whose dependency is created or updated is updated too, since
//! the values it was built from (cluster endpoint, credential document,
//! namespace) may have changed.

use std::collections::HashSet;
use tracing::debug;

use crate::state::{DeploymentState, ResourceStatus};

use super::graph::NodeId;
use super::plan::{DeploymentPlan, ResourceKind};

/// Engine for computing diffs between a plan and recorded state.
#[derive(Debug, Default)]
pub struct DiffEngine;

/// Difference for a single resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDiff {
    /// Plan node, absent for resources only found in state.
    pub node: Option<NodeId>,
    /// State key of the resource.
    pub key: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Resource name.
    pub name: String,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Why the resource is in this diff.
    pub reason: String,
    /// Recorded hash (if any).
    pub old_hash: Option<String>,
    /// Planned hash (if any).
    pub new_hash: Option<String>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// Resource needs to be created.
    Create,
    /// Resource needs to be re-applied.
    Update,
    /// Resource is recorded but no longer planned.
    Delete,
    /// Resource is unchanged.
    Unchanged,
}

/// Complete diff result.
#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    /// Resource diffs: planned resources in dependency order, then deletions.
    pub diffs: Vec<ResourceDiff>,
    /// Number of resources to create.
    pub creates: usize,
    /// Number of resources to update.
    pub updates: usize,
    /// Number of resources to delete.
    pub deletes: usize,
    /// Number of unchanged resources.
    pub unchanged: usize,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the diff between a plan and the recorded state.
    #[must_use]
    pub fn compute_diff(&self, plan: &DeploymentPlan, state: Option<&DeploymentState>) -> DiffResult {
        let mut diffs = Vec::new();
        let mut changed: HashSet<NodeId> = HashSet::new();
        let mut planned_keys: HashSet<String> = HashSet::new();

        for (id, node) in plan.ordered_nodes() {
            let key = node.key();
            let changed_deps: Vec<String> = plan
                .graph
                .dependencies(id)
                .into_iter()
                .filter(|dep| changed.contains(dep))
                .filter_map(|dep| plan.node(dep).map(|n| n.key()))
                .collect();

            // The client node is not recorded; it only relays upstream changes
            if !node.kind().is_resource() {
                if !changed_deps.is_empty() {
                    changed.insert(id);
                }
                continue;
            }

            let recorded = state.and_then(|s| s.get_resource(&key));
            let (diff_type, reason) = match recorded {
                None => (DiffType::Create, String::from("not yet applied")),
                Some(r) if r.spec_hash != node.spec_hash => {
                    (DiffType::Update, String::from("configuration changed"))
                }
                Some(r) if r.status != ResourceStatus::Ready => {
                    (DiffType::Update, format!("previous apply left it {}", r.status))
                }
                Some(_) if !changed_deps.is_empty() => (
                    DiffType::Update,
                    format!("depends on changed {}", changed_deps.join(", ")),
                ),
                Some(_) => (DiffType::Unchanged, String::from("up to date")),
            };

            if diff_type != DiffType::Unchanged {
                changed.insert(id);
            }

            debug!("{key}: {diff_type} ({reason})");
            planned_keys.insert(key.clone());
            diffs.push(ResourceDiff {
                node: Some(id),
                key,
                kind: node.kind(),
                name: node.name.clone(),
                diff_type,
                reason,
                old_hash: recorded.map(|r| r.spec_hash.clone()),
                new_hash: Some(node.spec_hash.clone()),
            });
        }

        if let Some(state) = state {
            for (key, resource) in &state.resources {
                if !planned_keys.contains(key) {
                    debug!("{key}: recorded but no longer planned");
                    diffs.push(ResourceDiff {
                        node: None,
                        key: key.clone(),
                        kind: resource.kind,
                        name: resource.name.clone(),
                        diff_type: DiffType::Delete,
                        reason: String::from("removed from configuration"),
                        old_hash: Some(resource.spec_hash.clone()),
                        new_hash: None,
                    });
                }
            }
        }

        let count = |t: DiffType| diffs.iter().filter(|d| d.diff_type == t).count();

        DiffResult {
            creates: count(DiffType::Create),
            updates: count(DiffType::Update),
            deletes: count(DiffType::Delete),
            unchanged: count(DiffType::Unchanged),
            diffs,
        }
    }
}

impl DiffResult {
    /// Returns true if anything needs to be applied or deleted.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.creates > 0 || self.updates > 0 || self.deletes > 0
    }

    /// Diff of a plan node.
    #[must_use]
    pub fn for_node(&self, id: NodeId) -> Option<&ResourceDiff> {
        self.diffs.iter().find(|d| d.node == Some(id))
    }

    /// Returns true if the node has to be applied.
    ///
    /// Nodes without a diff entry (the client node) always run.
    #[must_use]
    pub fn needs_apply(&self, id: NodeId) -> bool {
        self.for_node(id)
            .is_none_or(|d| matches!(d.diff_type, DiffType::Create | DiffType::Update))
    }

    /// Resources recorded in state that are no longer planned.
    pub fn deletions(&self) -> impl Iterator<Item = &ResourceDiff> {
        self.diffs.iter().filter(|d| d.diff_type == DiffType::Delete)
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Unchanged => "unchanged",
        };
        write!(f, "{s}")
    }
}
