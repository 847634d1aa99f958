//! Workflow intermediate representation.
//!
//! The IR is produced by the analyzer and consumed by renderers (Markdown,
//! Mermaid, JSON) and metric passes. It describes the control-flow shape of a
//! workflow without any execution semantics.

mod flow;
mod ids;
mod value;

pub use flow::{
    compose, ConditionalHelper, ConditionalNode, FlowNode, LoopNode, LoopType, NodeBase,
    ParallelMode, ParallelNode, RaceNode, RetryConfig, SagaStepNode, SequenceNode, StepNode,
    StreamNode, StreamType, SwitchCase, SwitchNode, TimeoutConfig, UnknownNode, WorkflowRefNode,
};
pub use ids::IdGenerator;
pub use value::{NumericValue, DYNAMIC};

use std::collections::BTreeMap;
use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diagnostic::SourceLocation;

/// How a workflow was defined in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    CreateWorkflow,
    Run,
    CreateSagaWorkflow,
    RunSaga,
}

impl SourceKind {
    /// The identifier this kind is invoked with in source.
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::CreateWorkflow => "createWorkflow",
            SourceKind::Run => "run",
            SourceKind::CreateSagaWorkflow => "createSagaWorkflow",
            SourceKind::RunSaga => "runSaga",
        }
    }

    pub fn is_saga(self) -> bool {
        matches!(self, SourceKind::CreateSagaWorkflow | SourceKind::RunSaga)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The root node of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "workflow", rename_all = "camelCase")]
pub struct WorkflowNode {
    pub id: String,
    pub name: String,
    pub source: SourceKind,
    pub dependencies: Vec<String>,
    pub error_types: Vec<String>,
    pub children: Vec<FlowNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

/// Per-workflow counters collected during reduction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStats {
    pub total_steps: usize,
    pub conditional_count: usize,
    pub switch_count: usize,
    pub loop_count: usize,
    pub parallel_count: usize,
    pub race_count: usize,
    pub stream_count: usize,
    pub workflow_ref_count: usize,
    pub unknown_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    /// An entry point had no function-literal callback; it produced no IR.
    CallbackNotFound,
    /// A call looked like a workflow invocation but no such workflow is
    /// defined in the file.
    UnresolvedWorkflowRef,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisWarning {
    pub code: WarningCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetadata {
    pub analyzed_at: DateTime<Utc>,
    pub file_path: String,
    pub warnings: Vec<AnalysisWarning>,
    pub stats: WorkflowStats,
}

/// The analysis result for one workflow entry point.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowIR {
    pub root: WorkflowNode,
    pub metadata: WorkflowMetadata,
    /// Referenced same-file workflows, keyed by name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub references: BTreeMap<String, WorkflowIR>,
}

impl WorkflowIR {
    pub fn name(&self) -> &str {
        &self.root.name
    }

    /// Visits every flow node, parents first.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a FlowNode)) {
        for child in &self.root.children {
            child.walk(visit);
        }
    }

    /// Number of `step` and `saga-step` leaves in the tree.
    pub fn step_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |node| {
            if node.is_step() {
                count += 1;
            }
        });
        count
    }

    /// Names of workflows referenced through resolved `workflow-ref` nodes,
    /// in first-seen order.
    pub fn referenced_workflows(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        self.walk(&mut |node| {
            if let FlowNode::WorkflowRef(r) = node {
                if r.resolved && !names.contains(&r.workflow_name) {
                    names.push(r.workflow_name.clone());
                }
            }
        });
        names
    }
}

/// Everything found in one source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub file_path: String,
    pub workflows: Vec<WorkflowIR>,
    /// Warnings for entry points that produced no IR.
    pub warnings: Vec<AnalysisWarning>,
}
