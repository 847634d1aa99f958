//! Flow nodes: the control-flow shape of a workflow body.

use std::collections::BTreeMap;
use serde::Serialize;

use crate::diagnostic::SourceLocation;
use super::NumericValue;

/// Fields shared by every flow node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeBase {
    /// Unique within one analysis, increasing in traversal order.
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Cache key, or [`super::DYNAMIC`] when not a string literal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl NodeBase {
    pub fn new(id: String) -> Self {
        Self {
            id,
            name: None,
            key: None,
            location: None,
        }
    }
}

/// A node in the workflow IR, discriminated by `type` when serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FlowNode {
    Step(StepNode),
    SagaStep(SagaStepNode),
    Sequence(SequenceNode),
    Parallel(ParallelNode),
    Race(RaceNode),
    Stream(StreamNode),
    Conditional(ConditionalNode),
    Switch(SwitchNode),
    Loop(LoopNode),
    WorkflowRef(WorkflowRefNode),
    Unknown(UnknownNode),
}

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepNode {
    #[serde(flatten)]
    pub base: NodeBase,

    /// Reconstructed text of the operation the step invokes.
    pub callee: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<NumericValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_delay: Option<NumericValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay: Option<NumericValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ms: Option<NumericValue>,
}

/// A compensable unit of work in a saga.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaStepNode {
    #[serde(flatten)]
    pub base: NodeBase,
    pub callee: String,
    pub has_compensation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compensation_callee: Option<String>,
    pub is_try_step: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceNode {
    #[serde(flatten)]
    pub base: NodeBase,
    pub children: Vec<FlowNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ParallelMode {
    /// Fails fast on the first error.
    All,
    /// Waits for every branch and collects results.
    AllSettled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelNode {
    #[serde(flatten)]
    pub base: NodeBase,
    pub children: Vec<FlowNode>,
    pub mode: ParallelMode,
    /// The combinator the node came from, e.g. `allAsync` or `step.parallel`.
    pub callee: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceNode {
    #[serde(flatten)]
    pub base: NodeBase,
    pub children: Vec<FlowNode>,
    pub callee: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamType {
    Write,
    Read,
    ForEach,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamNode {
    #[serde(flatten)]
    pub base: NodeBase,
    pub stream_type: StreamType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, NumericValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionalHelper {
    When,
    Unless,
    WhenOr,
    UnlessOr,
}

impl ConditionalHelper {
    /// Whether the consequent runs when the condition is falsy.
    pub fn is_negated(self) -> bool {
        matches!(self, ConditionalHelper::Unless | ConditionalHelper::UnlessOr)
    }

    /// Whether the helper carries a default value for the skipped branch.
    pub fn has_default(self) -> bool {
        matches!(self, ConditionalHelper::WhenOr | ConditionalHelper::UnlessOr)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalNode {
    #[serde(flatten)]
    pub base: NodeBase,
    pub condition: String,
    /// Absent for a plain `if` statement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helper: Option<ConditionalHelper>,
    pub consequent: Vec<FlowNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate: Option<Vec<FlowNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchCase {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub is_default: bool,
    pub body: Vec<FlowNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchNode {
    #[serde(flatten)]
    pub base: NodeBase,
    pub expression: String,
    pub cases: Vec<SwitchCase>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopType {
    #[serde(rename = "for")]
    For,
    #[serde(rename = "while")]
    While,
    #[serde(rename = "for-of")]
    ForOf,
    #[serde(rename = "for-in")]
    ForIn,
    #[serde(rename = "forEach")]
    ForEach,
    #[serde(rename = "map")]
    Map,
}

/// Repetition marker; the body is not unrolled.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopNode {
    #[serde(flatten)]
    pub base: NodeBase,
    pub loop_type: LoopType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iter_source: Option<String>,
    pub body: Vec<FlowNode>,
    pub bound_known: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRefNode {
    #[serde(flatten)]
    pub base: NodeBase,
    pub workflow_name: String,
    /// True when the workflow is defined in the same file.
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnknownNode {
    #[serde(flatten)]
    pub base: NodeBase,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
}

impl FlowNode {
    pub fn base(&self) -> &NodeBase {
        match self {
            FlowNode::Step(n) => &n.base,
            FlowNode::SagaStep(n) => &n.base,
            FlowNode::Sequence(n) => &n.base,
            FlowNode::Parallel(n) => &n.base,
            FlowNode::Race(n) => &n.base,
            FlowNode::Stream(n) => &n.base,
            FlowNode::Conditional(n) => &n.base,
            FlowNode::Switch(n) => &n.base,
            FlowNode::Loop(n) => &n.base,
            FlowNode::WorkflowRef(n) => &n.base,
            FlowNode::Unknown(n) => &n.base,
        }
    }

    pub fn id(&self) -> &str {
        &self.base().id
    }

    /// The `type` tag this node serializes with.
    pub fn type_name(&self) -> &'static str {
        match self {
            FlowNode::Step(_) => "step",
            FlowNode::SagaStep(_) => "saga-step",
            FlowNode::Sequence(_) => "sequence",
            FlowNode::Parallel(_) => "parallel",
            FlowNode::Race(_) => "race",
            FlowNode::Stream(_) => "stream",
            FlowNode::Conditional(_) => "conditional",
            FlowNode::Switch(_) => "switch",
            FlowNode::Loop(_) => "loop",
            FlowNode::WorkflowRef(_) => "workflow-ref",
            FlowNode::Unknown(_) => "unknown",
        }
    }

    /// Direct children in source order, across every branch and case.
    pub fn children(&self) -> Vec<&FlowNode> {
        match self {
            FlowNode::Sequence(n) => n.children.iter().collect(),
            FlowNode::Parallel(n) => n.children.iter().collect(),
            FlowNode::Race(n) => n.children.iter().collect(),
            FlowNode::Conditional(n) => n
                .consequent
                .iter()
                .chain(n.alternate.iter().flatten())
                .collect(),
            FlowNode::Switch(n) => n.cases.iter().flat_map(|c| c.body.iter()).collect(),
            FlowNode::Loop(n) => n.body.iter().collect(),
            FlowNode::Step(_)
            | FlowNode::SagaStep(_)
            | FlowNode::Stream(_)
            | FlowNode::WorkflowRef(_)
            | FlowNode::Unknown(_) => Vec::new(),
        }
    }

    /// Visits this node and all descendants, parents first.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a FlowNode)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Whether this node is a unit of work (`step` or `saga-step`).
    pub fn is_step(&self) -> bool {
        matches!(self, FlowNode::Step(_) | FlowNode::SagaStep(_))
    }

    /// Whether this node stands for work: a step, a combinator, a stream or
    /// a workflow reference. Control-flow wrappers do not count on their own.
    pub fn is_call_shape(&self) -> bool {
        matches!(
            self,
            FlowNode::Step(_)
                | FlowNode::SagaStep(_)
                | FlowNode::Parallel(_)
                | FlowNode::Race(_)
                | FlowNode::Stream(_)
                | FlowNode::WorkflowRef(_)
        )
    }

    /// Whether this node or any descendant is a call shape.
    pub fn contains_call_shape(&self) -> bool {
        let mut found = false;
        self.walk(&mut |node| found |= node.is_call_shape());
        found
    }
}

/// Wraps a body's nodes so it occupies a single child slot.
///
/// Lists with more than one node become one `sequence`; single nodes and
/// empty lists are returned as they are.
pub fn compose(nodes: Vec<FlowNode>, sequence_id: impl FnOnce() -> String) -> Vec<FlowNode> {
    if nodes.len() > 1 {
        vec![FlowNode::Sequence(SequenceNode {
            base: NodeBase::new(sequence_id()),
            children: nodes,
        })]
    } else {
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, callee: &str) -> FlowNode {
        FlowNode::Step(StepNode {
            base: NodeBase::new(id.to_string()),
            callee: callee.to_string(),
            retry: None,
            timeout: None,
            description: None,
            markdown: None,
        })
    }

    #[test]
    fn test_step_serializes_with_type_tag() {
        let json = serde_json::to_value(step("step_1", "fetchUser")).unwrap();
        assert_eq!(json["type"], "step");
        assert_eq!(json["id"], "step_1");
        assert_eq!(json["callee"], "fetchUser");
        assert!(json.get("retry").is_none());
    }

    #[test]
    fn test_variant_tags_are_kebab_case() {
        let saga = FlowNode::SagaStep(SagaStepNode {
            base: NodeBase::new("saga_step_1".to_string()),
            callee: "reserve".to_string(),
            has_compensation: true,
            compensation_callee: Some("release".to_string()),
            is_try_step: false,
        });
        let json = serde_json::to_value(&saga).unwrap();
        assert_eq!(json["type"], "saga-step");
        assert_eq!(json["hasCompensation"], true);
        assert_eq!(saga.type_name(), "saga-step");

        let unknown = FlowNode::Unknown(UnknownNode {
            base: NodeBase::new("unknown_2".to_string()),
            reason: "unsupported statement".to_string(),
            source_text: Some("label: x".to_string()),
        });
        let json = serde_json::to_value(&unknown).unwrap();
        assert_eq!(json["type"], "unknown");
        assert_eq!(json["sourceText"], "label: x");
    }

    #[test]
    fn test_loop_type_names() {
        assert_eq!(serde_json::to_string(&LoopType::ForOf).unwrap(), "\"for-of\"");
        assert_eq!(serde_json::to_string(&LoopType::ForEach).unwrap(), "\"forEach\"");
        assert_eq!(serde_json::to_string(&ParallelMode::AllSettled).unwrap(), "\"allSettled\"");
    }

    #[test]
    fn test_compose_wraps_only_multiple_nodes() {
        let single = compose(vec![step("step_1", "a")], || "sequence_9".to_string());
        assert_eq!(single.len(), 1);
        assert!(matches!(single[0], FlowNode::Step(_)));

        let multi = compose(
            vec![step("step_1", "a"), step("step_2", "b")],
            || "sequence_3".to_string(),
        );
        assert_eq!(multi.len(), 1);
        match &multi[0] {
            FlowNode::Sequence(seq) => {
                assert_eq!(seq.base.id, "sequence_3");
                assert_eq!(seq.children.len(), 2);
            }
            other => panic!("expected sequence, got {:?}", other),
        }

        assert!(compose(Vec::new(), String::new).is_empty());
    }

    #[test]
    fn test_walk_visits_branches() {
        let node = FlowNode::Conditional(ConditionalNode {
            base: NodeBase::new("conditional_3".to_string()),
            condition: "user.vip".to_string(),
            helper: None,
            consequent: vec![step("step_1", "a")],
            alternate: Some(vec![step("step_2", "b")]),
            default_value: None,
        });
        let mut seen = Vec::new();
        node.walk(&mut |n| seen.push(n.id().to_string()));
        assert_eq!(seen, vec!["conditional_3", "step_1", "step_2"]);
    }

    #[test]
    fn test_call_shape_search_sees_through_branches() {
        let empty_if = FlowNode::Conditional(ConditionalNode {
            base: NodeBase::new("conditional_1".to_string()),
            condition: "debug".to_string(),
            helper: None,
            consequent: Vec::new(),
            alternate: Some(Vec::new()),
            default_value: None,
        });
        assert!(!empty_if.is_call_shape());
        assert!(!empty_if.contains_call_shape());

        let guarded = FlowNode::Conditional(ConditionalNode {
            base: NodeBase::new("conditional_3".to_string()),
            condition: "vip".to_string(),
            helper: None,
            consequent: vec![empty_if],
            alternate: Some(vec![step("step_2", "notify")]),
            default_value: None,
        });
        assert!(!guarded.is_call_shape());
        assert!(guarded.contains_call_shape());
    }

    #[test]
    fn test_helper_polarity() {
        assert!(!ConditionalHelper::When.is_negated());
        assert!(ConditionalHelper::Unless.is_negated());
        assert!(ConditionalHelper::UnlessOr.is_negated());
        assert!(ConditionalHelper::WhenOr.has_default());
        assert!(!ConditionalHelper::Unless.has_default());
    }
}
