//! Output formatting for CLI commands.
//!
//! Every formatter has a text form (tables and colours for a terminal) and a
//! JSON form for scripting.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{ConfigHasher, TopologyConfig, ValidationResult};
use crate::outputs::StackOutputs;
use crate::planner::{DeploymentPlan, DiffResult, DiffType, ExecutionResult, NodeId};
use crate::state::{DeploymentState, ResourceStatus};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    format: OutputFormat,
}

/// Plan row for table display.
#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Resource row for state display.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Resource")]
    key: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Hash")]
    hash: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns true if output is JSON.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Formats a plan together with its diff against recorded state.
    #[must_use]
    pub fn format_plan(&self, plan: &DeploymentPlan, diff: &DiffResult, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(&PlanJson::new(plan, diff)),
            OutputFormat::Text => Self::format_plan_text(plan, diff, detailed),
        }
    }

    fn format_plan_text(plan: &DeploymentPlan, diff: &DiffResult, detailed: bool) -> String {
        let mut output = String::new();
        let hasher = ConfigHasher::new();

        let _ = write!(
            output,
            "\nDeployment plan: {} ({})\n   Config hash: {}\n\n",
            plan.project,
            plan.scenario,
            hasher.short_hash(&plan.config_hash)
        );

        if detailed {
            let _ = writeln!(output, "{plan}");
        }

        if !diff.has_changes() {
            let _ = writeln!(
                output,
                "{} No changes required, all {} resources are up to date.",
                "✓".green(),
                diff.unchanged
            );
            return output;
        }

        let rows: Vec<PlanRow> = diff
            .diffs
            .iter()
            .enumerate()
            .map(|(i, d)| PlanRow {
                index: i + 1,
                action: Self::format_diff_type(d.diff_type),
                resource: d.key.clone(),
                reason: truncate(&d.reason, 48),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = writeln!(
            output,
            "\nPlan: {} to create, {} to update, {} to delete, {} unchanged",
            diff.creates.to_string().green(),
            diff.updates.to_string().yellow(),
            diff.deletes.to_string().red(),
            diff.unchanged
        );

        output
    }

    /// Formats the result of an apply or destroy.
    #[must_use]
    pub fn format_result(&self, result: &ExecutionResult) -> String {
        match self.format {
            OutputFormat::Json => to_json(&ResultJson::from(result)),
            OutputFormat::Text => {
                let mut output = String::new();
                let sections = [
                    ("+", "Applied", &result.applied),
                    ("-", "Deleted", &result.deleted),
                ];

                for (marker, title, keys) in sections {
                    if keys.is_empty() {
                        continue;
                    }
                    let _ = writeln!(output, "\n{title}:");
                    for key in keys {
                        let _ = writeln!(output, "   {marker} {key}");
                    }
                }

                let _ = writeln!(
                    output,
                    "\n{} {} applied, {} unchanged, {} deleted",
                    "✓".green(),
                    result.applied.len(),
                    result.unchanged.len(),
                    result.deleted.len()
                );

                if !result.outputs.is_empty() {
                    output.push_str("\nOutputs:\n");
                    output.push_str(&Self::format_outputs_text(&result.outputs));
                }

                output
            }
        }
    }

    /// Formats exported outputs.
    #[must_use]
    pub fn format_outputs(&self, outputs: &StackOutputs) -> String {
        match self.format {
            OutputFormat::Json => to_json(outputs),
            OutputFormat::Text => Self::format_outputs_text(outputs),
        }
    }

    fn format_outputs_text(outputs: &StackOutputs) -> String {
        outputs
            .values
            .iter()
            .fold(String::new(), |mut output, (name, value)| {
                let _ = writeln!(output, "   {name} = {}", value.bold());
                output
            })
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(
        &self,
        config: &TopologyConfig,
        result: &ValidationResult,
        show_warnings: bool,
    ) -> String {
        if self.is_json() {
            return to_json(&ValidationJson {
                valid: result.is_valid(),
                errors: result.errors.iter().map(ToString::to_string).collect(),
                warnings: result.warnings.clone(),
            });
        }

        let mut output = String::new();
        if result.is_valid() {
            let _ = writeln!(output, "{} Configuration is valid", "✓".green());
        } else {
            let _ = writeln!(output, "{} {} errors:", "✗".red(), result.error_count());
            for error in &result.errors {
                let _ = writeln!(output, "   - {error}");
            }
        }

        if show_warnings && result.warning_count() > 0 {
            let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
            for warning in &result.warnings {
                let _ = writeln!(output, "   - {warning}");
            }
        }

        let _ = write!(
            output,
            "\nConfiguration summary:\n   Project: {}\n   Scenario: {}\n   Cluster: {} ({})\n   Autoscaled: {}\n",
            config.project.name,
            config.project.scenario,
            config.cluster.name,
            config.cluster.location,
            config.is_autoscaled()
        );
        output
    }

    /// Formats deployment state.
    #[must_use]
    pub fn format_state(&self, state: &DeploymentState) -> String {
        match self.format {
            OutputFormat::Json => to_json(state),
            OutputFormat::Text => {
                let hasher = ConfigHasher::new();
                let mut output = String::new();

                let _ = write!(output, "\nState: {} ({})\n\n", state.project, state.scenario);
                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(output, "   Config hash: {}", hasher.short_hash(&state.config_hash));
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);

                if !state.resources.is_empty() {
                    let rows: Vec<ResourceRow> = state
                        .resources
                        .iter()
                        .map(|(key, r)| ResourceRow {
                            key: key.clone(),
                            status: Self::format_status(r.status),
                            id: truncate(&r.id, 40),
                            hash: hasher.short_hash(&r.spec_hash),
                        })
                        .collect();
                    output.push('\n');
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                if !state.outputs.is_empty() {
                    output.push_str("\n   Outputs:\n");
                    output.push_str(&Self::format_outputs_text(&state.outputs));
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let status = if entry.success { "✓".green() } else { "✗".red() };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} ({} resources)",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry.resources.len()
                        );
                    }
                }

                output
            }
        }
    }

    fn format_diff_type(diff_type: DiffType) -> String {
        match diff_type {
            DiffType::Create => "+create".green().to_string(),
            DiffType::Update => "~update".yellow().to_string(),
            DiffType::Delete => "-delete".red().to_string(),
            DiffType::Unchanged => "unchanged".dimmed().to_string(),
        }
    }

    fn format_status(status: ResourceStatus) -> String {
        match status {
            ResourceStatus::Ready => "ready".green().to_string(),
            ResourceStatus::Degraded => "degraded".yellow().to_string(),
            ResourceStatus::Deleting => "deleting".red().to_string(),
        }
    }
}

/// Truncates a string to a maximum number of characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

// JSON serialization helpers

#[derive(Serialize)]
struct PlanJson {
    project: String,
    scenario: String,
    config_hash: String,
    creates: usize,
    updates: usize,
    deletes: usize,
    unchanged: usize,
    resources: Vec<PlanResourceJson>,
}

#[derive(Serialize)]
struct PlanResourceJson {
    key: String,
    action: String,
    reason: String,
    depends_on: Vec<String>,
}

impl PlanJson {
    fn new(plan: &DeploymentPlan, diff: &DiffResult) -> Self {
        let depends_on = |id: NodeId| -> Vec<String> {
            plan.graph
                .dependencies(id)
                .into_iter()
                .filter_map(|dep| plan.node(dep).map(|n| n.key()))
                .collect()
        };

        Self {
            project: plan.project.clone(),
            scenario: plan.scenario.clone(),
            config_hash: plan.config_hash.clone(),
            creates: diff.creates,
            updates: diff.updates,
            deletes: diff.deletes,
            unchanged: diff.unchanged,
            resources: diff
                .diffs
                .iter()
                .map(|d| PlanResourceJson {
                    key: d.key.clone(),
                    action: d.diff_type.to_string(),
                    reason: d.reason.clone(),
                    depends_on: d.node.map(depends_on).unwrap_or_default(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct ResultJson<'a> {
    applied: &'a [String],
    unchanged: &'a [String],
    deleted: &'a [String],
    outputs: &'a StackOutputs,
}

impl<'a> From<&'a ExecutionResult> for ResultJson<'a> {
    fn from(result: &'a ExecutionResult) -> Self {
        Self {
            applied: &result.applied,
            unchanged: &result.unchanged,
            deleted: &result.deleted,
            outputs: &result.outputs,
        }
    }
}

#[derive(Serialize)]
struct ValidationJson {
    valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scenario;
    use crate::planner::DiffEngine;

    fn fixed_plan() -> (DeploymentPlan, DiffResult) {
        let plan = DeploymentPlan::build(&Scenario::Fixed.topology()).unwrap();
        let diff = DiffEngine::new().compute_diff(&plan, None);
        (plan, diff)
    }

    #[test]
    fn test_plan_json_lists_dependencies() {
        let (plan, diff) = fixed_plan();
        let json = OutputFormatter::new(OutputFormat::Json).format_plan(&plan, &diff, false);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["creates"], 5);
        let pool = &value["resources"][1];
        assert_eq!(pool["key"], "node_pool/primary-node-pool");
        assert_eq!(pool["depends_on"][0], "cluster/load-testing");
    }

    #[test]
    fn test_plan_text_summarizes_counts() {
        let (plan, diff) = fixed_plan();
        let text = OutputFormatter::new(OutputFormat::Text).format_plan(&plan, &diff, true);

        assert!(text.contains("deployment/load-testing-app"));
        assert!(text.contains("to create"));
        assert!(text.contains("kube_provider/k8s-provider"));
    }

    #[test]
    fn test_outputs_json() {
        let mut outputs = StackOutputs::new();
        outputs.export("url", "203.0.113.10");

        let json = OutputFormatter::new(OutputFormat::Json).format_outputs(&outputs);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["url"], "203.0.113.10");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-identifier", 10), "a-very-...");
    }
}
