//! Call-shape classification.
//!
//! Calls are matched on their reconstructed callee text against a small
//! dispatch table. Matching `<binding>.<method>` rather than the method name
//! alone is what keeps `data.parallel([...])` or `tracker.step()` out of the
//! IR.

use std::collections::BTreeSet;
use tree_sitter::Node;

use super::scope::SagaBinding;
use crate::frontend::typescript::syntax::{self, SourceText};
use crate::ir::{ConditionalHelper, LoopType, ParallelMode, StreamType};

/// Bindings in effect while reducing one workflow callback.
///
/// Passed by reference down the recursion; nested scopes derive a new value
/// instead of mutating this one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReduceContext {
    /// Local name of the step function. `None` inside saga callbacks.
    pub step: Option<String>,
    pub saga: Option<SagaBinding>,
    /// Name of the workflow being reduced, to avoid self-references.
    pub workflow_name: Option<String>,
}

impl ReduceContext {
    pub fn workflow(step: impl Into<String>, workflow_name: Option<String>) -> Self {
        Self {
            step: Some(step.into()),
            saga: None,
            workflow_name,
        }
    }

    pub fn saga(saga: Option<SagaBinding>, workflow_name: Option<String>) -> Self {
        Self {
            step: None,
            saga,
            workflow_name,
        }
    }
}

/// Methods recognized on the step binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMethod {
    Retry,
    WithTimeout,
    Parallel,
    Race,
    Stream(StreamType),
}

const STEP_METHODS: &[(&str, StepMethod)] = &[
    ("retry", StepMethod::Retry),
    ("withTimeout", StepMethod::WithTimeout),
    ("parallel", StepMethod::Parallel),
    ("race", StepMethod::Race),
    ("getWritable", StepMethod::Stream(StreamType::Write)),
    ("getReadable", StepMethod::Stream(StreamType::Read)),
    ("streamForEach", StepMethod::Stream(StreamType::ForEach)),
];

/// Free-function helpers, matched by exact identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Helper {
    Conditional(ConditionalHelper),
    Parallel(ParallelMode),
    Race,
}

const HELPERS: &[(&str, Helper)] = &[
    ("when", Helper::Conditional(ConditionalHelper::When)),
    ("unless", Helper::Conditional(ConditionalHelper::Unless)),
    ("whenOr", Helper::Conditional(ConditionalHelper::WhenOr)),
    ("unlessOr", Helper::Conditional(ConditionalHelper::UnlessOr)),
    ("allAsync", Helper::Parallel(ParallelMode::All)),
    ("allSettledAsync", Helper::Parallel(ParallelMode::AllSettled)),
    ("anyAsync", Helper::Race),
];

const ITERATION_METHODS: &[(&str, LoopType)] =
    &[("forEach", LoopType::ForEach), ("map", LoopType::Map)];

/// What a recognized call expression means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallShape {
    Step,
    StepMethod(StepMethod),
    Helper(Helper),
    SagaStep { try_step: bool },
    Iteration(LoopType),
    WorkflowRef { name: String, resolved: bool },
}

/// Names resolved once per source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileBindings {
    /// Workflows defined in the file.
    pub workflows: BTreeSet<String>,
    /// Local names of the `run` / `runSaga` entry points. A call to one of
    /// these inside a workflow starts its own workflow and is never a
    /// reference.
    pub runners: BTreeSet<String>,
}

/// Classifies call expressions within one source file.
#[derive(Debug, Clone, Copy)]
pub struct Classifier<'a, 's> {
    src: SourceText<'s>,
    bindings: &'a FileBindings,
}

impl<'a, 's> Classifier<'a, 's> {
    pub fn new(src: SourceText<'s>, bindings: &'a FileBindings) -> Self {
        Self { src, bindings }
    }

    /// Classifies `call`; the first matching rule wins.
    pub fn classify(&self, call: Node<'_>, ctx: &ReduceContext) -> Option<CallShape> {
        let function = syntax::unwrap_transparent(call.child_by_field_name("function")?);
        let callee = self.src.callee_text(function);

        if let Some(step) = ctx.step.as_deref() {
            if callee == step {
                return Some(CallShape::Step);
            }
            let method = callee.strip_prefix(step).and_then(|rest| rest.strip_prefix('.'));
            if let Some(method) = method {
                if let Some((_, shape)) = STEP_METHODS.iter().find(|(name, _)| *name == method) {
                    return Some(CallShape::StepMethod(*shape));
                }
            }
        }

        if let Some((_, helper)) = HELPERS.iter().find(|(name, _)| *name == callee) {
            return Some(CallShape::Helper(*helper));
        }

        if let Some(saga) = &ctx.saga {
            if let Some(try_step) = saga.match_callee(&callee) {
                return Some(CallShape::SagaStep { try_step });
            }
        }

        let args = syntax::call_arguments(call);
        let callback = args.first().copied().filter(|a| syntax::is_function_literal(*a));

        if function.kind() == "member_expression" && callback.is_some() {
            let method = function
                .child_by_field_name("property")
                .map(|p| self.src.text(p))
                .unwrap_or_default();
            let iteration = ITERATION_METHODS.iter().find(|(name, _)| *name == method);
            if let Some((_, loop_type)) = iteration {
                return Some(CallShape::Iteration(*loop_type));
            }
        }

        if function.kind() == "identifier"
            && ctx.workflow_name.as_deref() != Some(callee.as_str())
            && !self.bindings.runners.contains(&callee)
        {
            let callback = callback?;
            if self.bindings.workflows.contains(&callee) {
                return Some(CallShape::WorkflowRef { name: callee, resolved: true });
            }
            let params = syntax::parameter_list(callback).map(|p| self.src.text(p)).unwrap_or("");
            if params.contains("step") || params.contains("deps") {
                return Some(CallShape::WorkflowRef { name: callee, resolved: false });
            }
        }

        None
    }
}
