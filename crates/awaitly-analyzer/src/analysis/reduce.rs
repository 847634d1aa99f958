//! Statement and expression reduction.
//!
//! The reducer walks a workflow callback and turns every recognized call
//! shape into flow nodes. Unrecognized calls contribute nothing, but their
//! arguments are still searched so that `results.push(await step(...))`
//! surfaces its step. Nested function literals are only entered where a
//! helper, combinator or iteration callback says so.

use std::collections::BTreeMap;
use tracing::trace;
use tree_sitter::Node;

use super::classify::{CallShape, Classifier, Helper, ReduceContext, StepMethod};
use super::options::{operation_callee, read_retry, read_timeout, StepArgs, StepOptions};
use crate::config::AnalyzeOptions;
use crate::diagnostic::SourceLocation;
use crate::frontend::typescript::syntax::{self, named_children, SourceText};
use crate::ir::{
    compose, AnalysisWarning, ConditionalHelper, ConditionalNode, FlowNode, IdGenerator, LoopNode,
    LoopType, NodeBase, ParallelMode, ParallelNode, RaceNode, SagaStepNode, StepNode, StreamNode,
    StreamType, SwitchCase, SwitchNode, UnknownNode, WarningCode, WorkflowRefNode, WorkflowStats,
    DYNAMIC,
};

/// Whether a reduced body holds any work. Loops and switches around bodies
/// without work are dropped, even when the body kept a step-free `if`.
fn has_work(nodes: &[FlowNode]) -> bool {
    nodes.iter().any(FlowNode::contains_call_shape)
}

/// Statement kinds that never carry workflow structure.
const INERT_STATEMENTS: &[&str] = &[
    "empty_statement",
    "break_statement",
    "continue_statement",
    "function_declaration",
    "generator_function_declaration",
    "class_declaration",
    "abstract_class_declaration",
    "type_alias_declaration",
    "interface_declaration",
    "enum_declaration",
    "import_statement",
    "export_statement",
    "ambient_declaration",
];

/// Reduces one workflow callback into flow nodes.
///
/// Holds the per-workflow statistics and warnings; a new reducer is created
/// for every entry point.
pub struct Reducer<'a, 's> {
    src: SourceText<'s>,
    file_path: &'a str,
    options: &'a AnalyzeOptions,
    classifier: Classifier<'a, 's>,
    ids: &'a mut IdGenerator,
    stats: WorkflowStats,
    warnings: Vec<AnalysisWarning>,
}

impl<'a, 's> Reducer<'a, 's> {
    pub fn new(
        src: SourceText<'s>,
        file_path: &'a str,
        options: &'a AnalyzeOptions,
        classifier: Classifier<'a, 's>,
        ids: &'a mut IdGenerator,
    ) -> Self {
        Self {
            src,
            file_path,
            options,
            classifier,
            ids,
            stats: WorkflowStats::default(),
            warnings: Vec::new(),
        }
    }

    /// Statistics and warnings collected so far.
    pub fn finish(self) -> (WorkflowStats, Vec<AnalysisWarning>) {
        (self.stats, self.warnings)
    }

    pub fn stats(&self) -> &WorkflowStats {
        &self.stats
    }

    pub fn next_id(&mut self, prefix: &str) -> String {
        self.ids.next_id(prefix)
    }

    /// Wraps a multi-node body in one `sequence`.
    pub fn compose(&mut self, nodes: Vec<FlowNode>) -> Vec<FlowNode> {
        let ids = &mut *self.ids;
        compose(nodes, || ids.next_id("sequence"))
    }

    fn base(&mut self, prefix: &str, node: Node<'_>) -> NodeBase {
        let mut base = NodeBase::new(self.ids.next_id(prefix));
        if self.options.include_locations {
            base.location = Some(SourceLocation::of_node(self.file_path, node));
        }
        base
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub fn reduce_statements(
        &mut self,
        statements: &[Node<'_>],
        ctx: &ReduceContext,
    ) -> Vec<FlowNode> {
        let mut nodes = Vec::new();
        for statement in statements {
            nodes.extend(self.reduce_statement(*statement, ctx));
        }
        nodes
    }

    pub fn reduce_statement(&mut self, statement: Node<'_>, ctx: &ReduceContext) -> Vec<FlowNode> {
        match statement.kind() {
            "expression_statement" | "return_statement" | "throw_statement" => {
                match syntax::first_named_child(statement) {
                    Some(expr) => self.reduce_expression(expr, ctx),
                    None => Vec::new(),
                }
            }
            "lexical_declaration" | "variable_declaration" => {
                let mut nodes = Vec::new();
                for declarator in named_children(statement) {
                    if let Some(value) = declarator.child_by_field_name("value") {
                        nodes.extend(self.reduce_expression(value, ctx));
                    }
                }
                nodes
            }
            "statement_block" => self.reduce_statements(&named_children(statement), ctx),
            "if_statement" => self.reduce_if(statement, ctx),
            "for_statement" => self.reduce_for(statement, ctx),
            "for_in_statement" => self.reduce_for_in(statement, ctx),
            "while_statement" | "do_statement" => self.reduce_while(statement, ctx),
            "switch_statement" => self.reduce_switch(statement, ctx),
            "try_statement" => self.reduce_try(statement, ctx),
            "labeled_statement" => match statement.child_by_field_name("body") {
                Some(body) => self.reduce_statement(body, ctx),
                None => Vec::new(),
            },
            kind if INERT_STATEMENTS.contains(&kind) => Vec::new(),
            kind => self.unknown_statement(statement, kind),
        }
    }

    fn unknown_statement(&mut self, statement: Node<'_>, kind: &str) -> Vec<FlowNode> {
        if !self.options.report_unknown_statements {
            return Vec::new();
        }
        trace!(kind, "unsupported statement");
        self.stats.unknown_count += 1;
        let base = self.base("unknown", statement);
        vec![FlowNode::Unknown(UnknownNode {
            base,
            reason: format!("unsupported statement: {}", kind),
            source_text: Some(self.src.text(statement).to_string()),
        })]
    }

    /// A loop body or branch that may be a block or a single statement.
    fn reduce_branch_body(&mut self, body: Node<'_>, ctx: &ReduceContext) -> Vec<FlowNode> {
        let nodes = self.reduce_statement(body, ctx);
        self.compose(nodes)
    }

    fn reduce_if(&mut self, statement: Node<'_>, ctx: &ReduceContext) -> Vec<FlowNode> {
        self.stats.conditional_count += 1;

        let condition = statement
            .child_by_field_name("condition")
            .map(|c| self.src.unparenthesized_text(c))
            .unwrap_or_default();
        let consequent = match statement.child_by_field_name("consequence") {
            Some(body) => self.reduce_branch_body(body, ctx),
            None => Vec::new(),
        };
        let alternate = statement
            .child_by_field_name("alternative")
            .map(|clause| {
                // `else_clause` wraps either a block or a nested `if`.
                let nodes: Vec<FlowNode> = named_children(clause)
                    .into_iter()
                    .flat_map(|inner| self.reduce_statement(inner, ctx))
                    .collect();
                self.compose(nodes)
            });

        let base = self.base("conditional", statement);
        vec![FlowNode::Conditional(ConditionalNode {
            base,
            condition,
            helper: None,
            consequent,
            alternate,
            default_value: None,
        })]
    }

    fn reduce_for(&mut self, statement: Node<'_>, ctx: &ReduceContext) -> Vec<FlowNode> {
        let Some(body) = statement.child_by_field_name("body") else {
            return Vec::new();
        };
        let body = self.reduce_branch_body(body, ctx);
        if !has_work(&body) {
            return Vec::new();
        }
        let bound_count = self.counted_for_bound(statement);
        self.loop_node(statement, LoopType::For, None, body, bound_count)
    }

    fn reduce_for_in(&mut self, statement: Node<'_>, ctx: &ReduceContext) -> Vec<FlowNode> {
        let Some(body_node) = statement.child_by_field_name("body") else {
            return Vec::new();
        };
        let body = self.reduce_branch_body(body_node, ctx);
        if !has_work(&body) {
            return Vec::new();
        }

        let header = self.src.text_between(statement, body_node);
        let loop_type = if header.contains(" of ") {
            LoopType::ForOf
        } else {
            LoopType::ForIn
        };
        let right = statement.child_by_field_name("right");
        let iter_source = right.map(|r| self.src.text(r).to_string());
        let bound_count = match (loop_type, right.map(syntax::unwrap_transparent)) {
            (LoopType::ForOf, Some(array)) if array.kind() == "array" => {
                Some(named_children(array).len() as u64)
            }
            _ => None,
        };
        self.loop_node(statement, loop_type, iter_source, body, bound_count)
    }

    fn reduce_while(&mut self, statement: Node<'_>, ctx: &ReduceContext) -> Vec<FlowNode> {
        let Some(body) = statement.child_by_field_name("body") else {
            return Vec::new();
        };
        let body = self.reduce_branch_body(body, ctx);
        if !has_work(&body) {
            return Vec::new();
        }
        self.loop_node(statement, LoopType::While, None, body, None)
    }

    fn loop_node(
        &mut self,
        node: Node<'_>,
        loop_type: LoopType,
        iter_source: Option<String>,
        body: Vec<FlowNode>,
        bound_count: Option<u64>,
    ) -> Vec<FlowNode> {
        self.stats.loop_count += 1;
        let base = self.base("loop", node);
        vec![FlowNode::Loop(LoopNode {
            base,
            loop_type,
            iter_source,
            body,
            bound_known: bound_count.is_some(),
            bound_count,
        })]
    }

    /// Iteration count of `for (let i = A; i < B; i++)` with literal bounds.
    ///
    /// Also accepts `<=`, `++i` and `i += 1`.
    fn counted_for_bound(&self, statement: Node<'_>) -> Option<u64> {
        let initializer = statement.child_by_field_name("initializer")?;
        let declarators: Vec<_> = named_children(initializer)
            .into_iter()
            .filter(|d| d.kind() == "variable_declarator")
            .collect();
        let [declarator] = declarators.as_slice() else {
            return None;
        };
        let counter = self.src.text(declarator.child_by_field_name("name")?);
        let start = self
            .src
            .numeric_value(declarator.child_by_field_name("value")?)
            .as_literal()?;

        let mut condition = statement.child_by_field_name("condition")?;
        if condition.kind() == "expression_statement" {
            condition = syntax::first_named_child(condition)?;
        }
        if condition.kind() != "binary_expression"
            || self.src.text(condition.child_by_field_name("left")?) != counter
        {
            return None;
        }
        let end = self
            .src
            .numeric_value(condition.child_by_field_name("right")?)
            .as_literal()?;
        let inclusive = match self.src.text(condition.child_by_field_name("operator")?) {
            "<" => false,
            "<=" => true,
            _ => return None,
        };

        let increment = statement.child_by_field_name("increment")?;
        let steps_by_one = match increment.kind() {
            "update_expression" => {
                increment
                    .child_by_field_name("argument")
                    .is_some_and(|a| self.src.text(a) == counter)
                    && increment
                        .child_by_field_name("operator")
                        .is_some_and(|o| self.src.text(o) == "++")
            }
            "augmented_assignment_expression" => {
                increment
                    .child_by_field_name("left")
                    .is_some_and(|l| self.src.text(l) == counter)
                    && increment
                        .child_by_field_name("operator")
                        .is_some_and(|o| self.src.text(o) == "+=")
                    && increment
                        .child_by_field_name("right")
                        .and_then(|r| self.src.numeric_value(r).as_literal())
                        == Some(1.0)
            }
            _ => false,
        };
        if !steps_by_one || start.fract() != 0.0 || end.fract() != 0.0 {
            return None;
        }

        let count = if inclusive { end - start + 1.0 } else { end - start };
        Some(count.max(0.0) as u64)
    }

    fn reduce_switch(&mut self, statement: Node<'_>, ctx: &ReduceContext) -> Vec<FlowNode> {
        let expression = statement
            .child_by_field_name("value")
            .map(|v| self.src.unparenthesized_text(v))
            .unwrap_or_default();
        let Some(body) = statement.child_by_field_name("body") else {
            return Vec::new();
        };

        let mut cases = Vec::new();
        let mut has_content = false;
        for case in named_children(body) {
            let is_default = case.kind() == "switch_default";
            if !is_default && case.kind() != "switch_case" {
                continue;
            }
            let value = case.child_by_field_name("value");
            let statements: Vec<_> = named_children(case)
                .into_iter()
                .filter(|child| value.map_or(true, |v| v.id() != child.id()))
                .collect();
            let nodes = self.reduce_statements(&statements, ctx);
            let body = self.compose(nodes);
            has_content |= has_work(&body);
            cases.push(SwitchCase {
                value: value.map(|v| self.src.text(v).to_string()),
                is_default,
                body,
            });
        }

        if !has_content {
            return Vec::new();
        }
        self.stats.switch_count += 1;
        let base = self.base("switch", statement);
        vec![FlowNode::Switch(SwitchNode { base, expression, cases })]
    }

    fn reduce_try(&mut self, statement: Node<'_>, ctx: &ReduceContext) -> Vec<FlowNode> {
        let mut nodes = Vec::new();
        if let Some(body) = statement.child_by_field_name("body") {
            nodes.extend(self.reduce_statement(body, ctx));
        }
        for clause in ["handler", "finalizer"] {
            if let Some(body) = statement
                .child_by_field_name(clause)
                .and_then(|c| c.child_by_field_name("body"))
            {
                nodes.extend(self.reduce_statement(body, ctx));
            }
        }
        nodes
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    pub fn reduce_expression(&mut self, expr: Node<'_>, ctx: &ReduceContext) -> Vec<FlowNode> {
        let expr = syntax::unwrap_transparent(expr);
        if syntax::is_function_scope(expr) || expr.kind() == "class" {
            return Vec::new();
        }
        match expr.kind() {
            "call_expression" => self.reduce_call(expr, ctx),
            "ternary_expression" => self.reduce_ternary(expr, ctx),
            _ => self.reduce_subexpressions(expr, ctx),
        }
    }

    /// `c ? a : b` becomes a `conditional` when either branch holds work;
    /// otherwise only the condition's own nodes are kept.
    fn reduce_ternary(&mut self, expr: Node<'_>, ctx: &ReduceContext) -> Vec<FlowNode> {
        let condition = expr.child_by_field_name("condition");
        let mut nodes = match condition {
            Some(c) => self.reduce_expression(c, ctx),
            None => Vec::new(),
        };
        let consequent = match expr.child_by_field_name("consequence") {
            Some(branch) => self.reduce_expression(branch, ctx),
            None => Vec::new(),
        };
        let alternate = match expr.child_by_field_name("alternative") {
            Some(branch) => self.reduce_expression(branch, ctx),
            None => Vec::new(),
        };
        if !has_work(&consequent) && !has_work(&alternate) {
            return nodes;
        }

        self.stats.conditional_count += 1;
        let consequent = self.compose(consequent);
        let alternate = self.compose(alternate);
        let base = self.base("conditional", expr);
        nodes.push(FlowNode::Conditional(ConditionalNode {
            base,
            condition: condition
                .map(|c| self.src.unparenthesized_text(c))
                .unwrap_or_default(),
            helper: None,
            consequent,
            alternate: Some(alternate),
            default_value: None,
        }));
        nodes
    }

    /// Reduces every child expression that is not a function literal.
    fn reduce_subexpressions(&mut self, expr: Node<'_>, ctx: &ReduceContext) -> Vec<FlowNode> {
        let mut nodes = Vec::new();
        for child in named_children(expr) {
            nodes.extend(self.reduce_expression(child, ctx));
        }
        nodes
    }

    /// Reduces a callback's body: a block's statements or a single expression.
    pub fn reduce_callback(&mut self, callback: Node<'_>, ctx: &ReduceContext) -> Vec<FlowNode> {
        let Some(body) = callback.child_by_field_name("body") else {
            return Vec::new();
        };
        if body.kind() == "statement_block" {
            self.reduce_statements(&named_children(body), ctx)
        } else {
            self.reduce_expression(body, ctx)
        }
    }

    /// A helper argument: a callback's body, or any other expression.
    fn reduce_argument(&mut self, arg: Node<'_>, ctx: &ReduceContext) -> Vec<FlowNode> {
        let arg = syntax::unwrap_transparent(arg);
        if syntax::is_function_literal(arg) {
            self.reduce_callback(arg, ctx)
        } else {
            self.reduce_expression(arg, ctx)
        }
    }

    pub fn reduce_call(&mut self, call: Node<'_>, ctx: &ReduceContext) -> Vec<FlowNode> {
        let Some(shape) = self.classifier.classify(call, ctx) else {
            return self.reduce_subexpressions(call, ctx);
        };
        trace!(?shape, line = call.start_position().row + 1, "classified call");

        let args = syntax::call_arguments(call);
        match shape {
            CallShape::Step => self.step(call, &args, None),
            CallShape::StepMethod(StepMethod::Retry) => {
                self.step(call, &args, Some(StepMethod::Retry))
            }
            CallShape::StepMethod(StepMethod::WithTimeout) => {
                self.step(call, &args, Some(StepMethod::WithTimeout))
            }
            CallShape::StepMethod(StepMethod::Parallel) => self.step_parallel(call, &args, ctx),
            CallShape::StepMethod(StepMethod::Race) => self.step_race(call, &args, ctx),
            CallShape::StepMethod(StepMethod::Stream(stream_type)) => {
                self.stream(call, &args, stream_type)
            }
            CallShape::Helper(Helper::Conditional(helper)) => {
                self.conditional_helper(call, &args, helper, ctx)
            }
            CallShape::Helper(Helper::Parallel(mode)) => {
                let callee = self.callee_of(call);
                let children = self.combinator_children(&args, ctx);
                self.stats.parallel_count += 1;
                let base = self.base("parallel", call);
                vec![FlowNode::Parallel(ParallelNode { base, children, mode, callee })]
            }
            CallShape::Helper(Helper::Race) => {
                let callee = self.callee_of(call);
                let children = self.combinator_children(&args, ctx);
                self.stats.race_count += 1;
                let base = self.base("race", call);
                vec![FlowNode::Race(RaceNode { base, children, callee })]
            }
            CallShape::SagaStep { try_step } => self.saga_step(call, &args, try_step),
            CallShape::Iteration(loop_type) => self.iteration(call, &args, loop_type, ctx),
            CallShape::WorkflowRef { name, resolved } => self.workflow_ref(call, name, resolved),
        }
    }

    fn callee_of(&self, call: Node<'_>) -> String {
        call.child_by_field_name("function")
            .map(|f| self.src.callee_text(syntax::unwrap_transparent(f)))
            .unwrap_or_default()
    }

    // =========================================================================
    // Steps
    // =========================================================================

    /// `step(...)`, `step.retry(...)` and `step.withTimeout(...)`.
    fn step(
        &mut self,
        call: Node<'_>,
        args: &[Node<'_>],
        method: Option<StepMethod>,
    ) -> Vec<FlowNode> {
        let parsed = StepArgs::from_arguments(args);
        let callee = parsed
            .operation
            .map(|op| operation_callee(op, self.src))
            .unwrap_or_else(|| DYNAMIC.to_string());
        let mut options = parsed
            .options
            .map(|o| StepOptions::read(o, self.src))
            .unwrap_or_default();

        // Combined forms carry their config at the top level of the options.
        match (method, parsed.options) {
            (Some(StepMethod::Retry), Some(object)) => {
                options.retry = read_retry(object, self.src)
                    .or(options.retry)
                    .or_else(|| Some(Default::default()));
            }
            (Some(StepMethod::Retry), None) => options.retry = Some(Default::default()),
            (Some(StepMethod::WithTimeout), Some(object)) => {
                options.timeout = read_timeout(object, self.src)
                    .or(options.timeout)
                    .or_else(|| Some(Default::default()));
            }
            (Some(StepMethod::WithTimeout), None) => options.timeout = Some(Default::default()),
            _ => {}
        }

        self.stats.total_steps += 1;
        let mut base = self.base("step", call);
        base.key = options.key;
        base.name = options.name.or_else(|| parsed.id.map(|id| self.src.static_string(id)));
        vec![FlowNode::Step(StepNode {
            base,
            callee,
            retry: options.retry,
            timeout: options.timeout,
            description: options.description,
            markdown: options.markdown,
        })]
    }

    /// A step leaf synthesized from a key or an unrecognized call.
    fn implicit_step(&mut self, node: Node<'_>, name: String, callee: String) -> FlowNode {
        self.stats.total_steps += 1;
        let mut base = self.base("step", node);
        base.name = Some(name);
        FlowNode::Step(StepNode {
            base,
            callee,
            retry: None,
            timeout: None,
            description: None,
            markdown: None,
        })
    }

    fn saga_step(&mut self, call: Node<'_>, args: &[Node<'_>], try_step: bool) -> Vec<FlowNode> {
        let parsed = StepArgs::from_arguments(args);
        let callee = parsed
            .operation
            .map(|op| operation_callee(op, self.src))
            .unwrap_or_else(|| DYNAMIC.to_string());
        let options = parsed
            .options
            .map(|o| StepOptions::read(o, self.src))
            .unwrap_or_default();
        let compensation = parsed
            .options
            .and_then(|o| self.src.object_property(o, "compensate"));

        self.stats.total_steps += 1;
        let mut base = self.base("saga_step", call);
        base.key = options.key;
        base.name = options.name.or_else(|| parsed.id.map(|id| self.src.static_string(id)));
        vec![FlowNode::SagaStep(SagaStepNode {
            base,
            callee,
            has_compensation: compensation.is_some(),
            compensation_callee: compensation.map(|c| operation_callee(c, self.src)),
            is_try_step: try_step,
        })]
    }

    // =========================================================================
    // Concurrency
    // =========================================================================

    /// Name argument and callback of `step.parallel(name, () => ...)`.
    fn named_callback<'t>(&self, args: &[Node<'t>]) -> (Option<String>, Option<Node<'t>>) {
        let name = args
            .first()
            .filter(|a| !syntax::is_function_literal(**a))
            .map(|a| self.src.string_literal(*a).unwrap_or_else(|| self.src.text(*a).to_string()));
        let callback = args.iter().copied().find(|a| syntax::is_function_literal(*a));
        (name, callback)
    }

    fn step_parallel(
        &mut self,
        call: Node<'_>,
        args: &[Node<'_>],
        ctx: &ReduceContext,
    ) -> Vec<FlowNode> {
        let first = args.first().map(|a| syntax::unwrap_transparent(*a));
        if let Some(object) = first.filter(|a| a.kind() == "object") {
            return self.parallel_object_form(call, object, args.get(1).copied());
        }

        let (name, callback) = self.named_callback(args);
        let nodes = match callback {
            Some(callback) => self.reduce_callback(callback, ctx),
            None => args
                .iter()
                .skip(1)
                .flat_map(|a| self.reduce_expression(*a, ctx))
                .collect(),
        };
        match <[FlowNode; 1]>::try_from(nodes) {
            Ok([FlowNode::Parallel(mut parallel)]) => {
                if name.is_some() {
                    parallel.base.name = name;
                }
                vec![FlowNode::Parallel(parallel)]
            }
            Ok([other]) => self.wrap_parallel(call, vec![other], name),
            Err(nodes) => self.wrap_parallel(call, nodes, name),
        }
    }

    fn wrap_parallel(
        &mut self,
        call: Node<'_>,
        children: Vec<FlowNode>,
        name: Option<String>,
    ) -> Vec<FlowNode> {
        self.stats.parallel_count += 1;
        let mut base = self.base("parallel", call);
        base.name = name;
        vec![FlowNode::Parallel(ParallelNode {
            base,
            children,
            mode: ParallelMode::All,
            callee: self.callee_of(call),
        })]
    }

    /// `step.parallel({ a: () => x(), b: () => y() }, { name })`: one step per key.
    fn parallel_object_form(
        &mut self,
        call: Node<'_>,
        object: Node<'_>,
        options: Option<Node<'_>>,
    ) -> Vec<FlowNode> {
        let mut children = Vec::new();
        for (key, value) in self.src.object_entries(object) {
            let callee = operation_callee(value, self.src);
            children.push(self.implicit_step(value, key, callee));
        }
        let name = options
            .map(syntax::unwrap_transparent)
            .filter(|o| o.kind() == "object")
            .and_then(|o| StepOptions::read(o, self.src).name);
        self.wrap_parallel(call, children, name)
    }

    fn step_race(
        &mut self,
        call: Node<'_>,
        args: &[Node<'_>],
        ctx: &ReduceContext,
    ) -> Vec<FlowNode> {
        let (name, callback) = self.named_callback(args);
        let nodes = match callback {
            Some(callback) => self.reduce_callback(callback, ctx),
            None => args
                .iter()
                .skip(1)
                .flat_map(|a| self.reduce_expression(*a, ctx))
                .collect(),
        };
        match <[FlowNode; 1]>::try_from(nodes) {
            Ok([FlowNode::Race(mut race)]) => {
                if name.is_some() {
                    race.base.name = name;
                }
                vec![FlowNode::Race(race)]
            }
            Ok([other]) => self.wrap_race(call, vec![other], name),
            Err(nodes) => self.wrap_race(call, nodes, name),
        }
    }

    fn wrap_race(
        &mut self,
        call: Node<'_>,
        children: Vec<FlowNode>,
        name: Option<String>,
    ) -> Vec<FlowNode> {
        self.stats.race_count += 1;
        let mut base = self.base("race", call);
        base.name = name;
        vec![FlowNode::Race(RaceNode {
            base,
            children,
            callee: self.callee_of(call),
        })]
    }

    /// Branches of `allAsync([...])`, `anyAsync([...])` and friends.
    fn combinator_children(&mut self, args: &[Node<'_>], ctx: &ReduceContext) -> Vec<FlowNode> {
        let Some(first) = args.first().map(|a| syntax::unwrap_transparent(*a)) else {
            return Vec::new();
        };
        if first.kind() != "array" {
            let nodes = self.reduce_argument(first, ctx);
            return self.compose(nodes);
        }

        let mut children = Vec::new();
        for element in named_children(first) {
            children.extend(self.combinator_element(element, ctx));
        }
        children
    }

    /// One combinator branch, always occupying at most one child slot.
    fn combinator_element(&mut self, element: Node<'_>, ctx: &ReduceContext) -> Vec<FlowNode> {
        let element = syntax::unwrap_transparent(element);
        if element.kind() == "call_expression" {
            if self.classifier.classify(element, ctx).is_some() {
                let nodes = self.reduce_call(element, ctx);
                return self.compose(nodes);
            }
            let callee = self.callee_of(element);
            let name = callee.rsplit('.').next().unwrap_or(&callee).to_string();
            return vec![self.implicit_step(element, name, callee)];
        }
        let nodes = self.reduce_argument(element, ctx);
        self.compose(nodes)
    }

    // =========================================================================
    // Helpers, streams, loops and references
    // =========================================================================

    fn conditional_helper(
        &mut self,
        call: Node<'_>,
        args: &[Node<'_>],
        helper: ConditionalHelper,
        ctx: &ReduceContext,
    ) -> Vec<FlowNode> {
        self.stats.conditional_count += 1;
        let condition = args
            .first()
            .map(|c| self.src.text(*c).to_string())
            .unwrap_or_default();
        let consequent = match args.get(1) {
            Some(branch) => {
                let nodes = self.reduce_argument(*branch, ctx);
                self.compose(nodes)
            }
            None => Vec::new(),
        };
        let default_value = if helper.has_default() {
            args.get(2).map(|d| self.src.text(*d).to_string())
        } else {
            None
        };

        let base = self.base("conditional", call);
        vec![FlowNode::Conditional(ConditionalNode {
            base,
            condition,
            helper: Some(helper),
            consequent,
            alternate: None,
            default_value,
        })]
    }

    fn stream(
        &mut self,
        call: Node<'_>,
        args: &[Node<'_>],
        stream_type: StreamType,
    ) -> Vec<FlowNode> {
        let mut namespace = None;
        let mut options = BTreeMap::new();
        let objects = args
            .iter()
            .map(|a| syntax::unwrap_transparent(*a))
            .filter(|a| a.kind() == "object");
        for object in objects {
            for (key, value) in self.src.object_entries(object) {
                let value = syntax::unwrap_transparent(value);
                if key == "namespace" {
                    namespace = Some(self.src.static_string(value));
                } else if !syntax::is_function_literal(value) {
                    options.insert(key, self.src.numeric_value(value));
                }
            }
        }

        self.stats.stream_count += 1;
        let base = self.base("stream", call);
        vec![FlowNode::Stream(StreamNode {
            base,
            stream_type,
            namespace,
            options,
        })]
    }

    /// `items.forEach(fn)` / `items.map(fn)`, dropped when `fn` holds no steps.
    fn iteration(
        &mut self,
        call: Node<'_>,
        args: &[Node<'_>],
        loop_type: LoopType,
        ctx: &ReduceContext,
    ) -> Vec<FlowNode> {
        let Some(callback) = args.first() else {
            return Vec::new();
        };
        let nodes = self.reduce_callback(*callback, ctx);
        let body = self.compose(nodes);
        if !has_work(&body) {
            return Vec::new();
        }

        let source = call
            .child_by_field_name("function")
            .map(syntax::unwrap_transparent)
            .and_then(|f| f.child_by_field_name("object"));
        let iter_source = source.map(|s| self.src.text(s).to_string());
        let bound_count = source
            .map(syntax::unwrap_transparent)
            .filter(|s| s.kind() == "array")
            .map(|s| named_children(s).len() as u64);
        self.loop_node(call, loop_type, iter_source, body, bound_count)
    }

    fn workflow_ref(
        &mut self,
        call: Node<'_>,
        workflow_name: String,
        resolved: bool,
    ) -> Vec<FlowNode> {
        self.stats.workflow_ref_count += 1;
        let base = self.base("workflow_ref", call);
        if !resolved {
            self.warnings.push(AnalysisWarning {
                code: WarningCode::UnresolvedWorkflowRef,
                message: format!(
                    "`{}` looks like a workflow but is not defined in this file",
                    workflow_name
                ),
                location: base.location.clone(),
            });
        }
        vec![FlowNode::WorkflowRef(WorkflowRefNode {
            base,
            workflow_name,
            resolved,
        })]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use crate::analysis::classify::FileBindings;
    use crate::frontend::typescript::TypeScriptParser;
    use crate::ir::NumericValue;

    struct Reduced {
        nodes: Vec<FlowNode>,
        stats: WorkflowStats,
        warnings: Vec<AnalysisWarning>,
    }

    /// Reduces the statements of `source` as if they were a callback body
    /// with `step` bound.
    fn reduce(source: &str) -> Reduced {
        reduce_with(source, ReduceContext::workflow("step", Some("self".to_string())), &[])
    }

    fn reduce_with(source: &str, ctx: ReduceContext, known: &[&str]) -> Reduced {
        let mut parser = TypeScriptParser::new().unwrap();
        let parsed = parser.parse(source, Path::new("flow.ts")).unwrap();
        let src = SourceText::new(source);
        let bindings = FileBindings {
            workflows: known.iter().map(|s| s.to_string()).collect(),
            ..FileBindings::default()
        };
        let options = AnalyzeOptions {
            include_locations: false,
            ..AnalyzeOptions::default()
        };
        let mut ids = IdGenerator::new();
        let classifier = Classifier::new(src, &bindings);
        let mut reducer = Reducer::new(src, "flow.ts", &options, classifier, &mut ids);
        let nodes = reducer.reduce_statements(&named_children(parsed.root()), &ctx);
        let (stats, warnings) = reducer.finish();
        Reduced { nodes, stats, warnings }
    }

    fn as_step(node: &FlowNode) -> &StepNode {
        match node {
            FlowNode::Step(step) => step,
            other => panic!("expected step, got {:?}", other),
        }
    }

    #[test]
    fn test_declarations_and_returns_surface_steps() {
        let out = reduce(
            "const user = await step(() => deps.fetchUser(id), { key: 'user' });\n\
             console.log(user);\n\
             return step('charge', () => charge(user));",
        );
        assert_eq!(out.nodes.len(), 2);
        let first = as_step(&out.nodes[0]);
        assert_eq!(first.callee, "deps.fetchUser");
        assert_eq!(first.base.key.as_deref(), Some("user"));
        let second = as_step(&out.nodes[1]);
        assert_eq!(second.base.name.as_deref(), Some("charge"));
        assert_eq!(out.stats.total_steps, 2);
    }

    #[test]
    fn test_steps_inside_unrecognized_call_arguments() {
        let out = reduce(
            "results.push(await step(() => load()));\nlog(() => step(() => hidden()));",
        );
        assert_eq!(out.nodes.len(), 1);
        assert_eq!(as_step(&out.nodes[0]).callee, "load");
    }

    #[test]
    fn test_retry_combined_form() {
        let out = reduce(
            "await step.retry(() => api.send(msg), { key: 'k', attempts: 5, backoff: 'linear' });",
        );
        let step = as_step(&out.nodes[0]);
        assert_eq!(step.base.key.as_deref(), Some("k"));
        assert_eq!(step.callee, "api.send");
        let retry = step.retry.as_ref().unwrap();
        assert_eq!(retry.attempts, Some(NumericValue::Literal(5.0)));
        assert_eq!(retry.backoff.as_deref(), Some("linear"));
    }

    #[test]
    fn test_with_timeout_combined_form() {
        let out = reduce("await step.withTimeout(() => slow(), { ms: 2000, name: 'Slow' });");
        let step = as_step(&out.nodes[0]);
        assert_eq!(step.base.name.as_deref(), Some("Slow"));
        assert_eq!(step.timeout.as_ref().unwrap().ms, Some(NumericValue::Literal(2000.0)));
        assert!(step.retry.is_none());
    }

    #[test]
    fn test_if_else_chain_and_empty_if() {
        let out = reduce(
            "if (a) { await step(() => x()); } else if (b) { await step(() => y()); } else { await step(() => z()); }\n\
             if (debug) { console.log('x'); }",
        );
        assert_eq!(out.nodes.len(), 2);
        assert_eq!(out.stats.conditional_count, 3);
        match &out.nodes[0] {
            FlowNode::Conditional(outer) => {
                assert_eq!(outer.condition, "a");
                assert_eq!(outer.consequent.len(), 1);
                let alternate = outer.alternate.as_ref().unwrap();
                assert!(matches!(
                    &alternate[0],
                    FlowNode::Conditional(inner) if inner.condition == "b"
                ));
            }
            other => panic!("expected conditional, got {:?}", other),
        }
        match &out.nodes[1] {
            FlowNode::Conditional(empty) => {
                assert!(empty.consequent.is_empty());
                assert!(empty.alternate.is_none());
            }
            other => panic!("expected conditional, got {:?}", other),
        }
    }

    #[test]
    fn test_loop_emptiness_rule() {
        let out = reduce("for (let i = 0; i < 3; i++) { console.log(i); }");
        assert!(out.nodes.is_empty());
        assert_eq!(out.stats.loop_count, 0);

        let out = reduce("for (let i = 0; i < 3; i++) { await step(() => work(i)); }");
        assert_eq!(out.stats.loop_count, 1);
        match &out.nodes[..] {
            [FlowNode::Loop(l)] => {
                assert_eq!(l.loop_type, LoopType::For);
                assert_eq!(l.body.len(), 1);
                assert!(matches!(l.body[0], FlowNode::Step(_)));
                assert!(l.bound_known);
                assert_eq!(l.bound_count, Some(3));
            }
            other => panic!("expected one loop, got {:?}", other),
        }
    }

    #[test]
    fn test_loops_around_step_free_conditionals_are_dropped() {
        let out = reduce(
            "for (const x of xs) { if (x.debug) { console.log(x); } }\n\
             while (more) { if (a) { log(); } else { warn(); } }\n\
             items.forEach((item) => { if (item.ok) { log(item); } });",
        );
        assert!(out.nodes.is_empty(), "{:?}", out.nodes);
        assert_eq!(out.stats.loop_count, 0);
        assert_eq!(out.stats.total_steps, 0);

        let out = reduce("for (const x of xs) { if (x.ok) { await step(() => save(x)); } }");
        assert_eq!(out.stats.loop_count, 1);
        match &out.nodes[..] {
            [FlowNode::Loop(l)] => assert!(matches!(&l.body[..], [FlowNode::Conditional(_)])),
            other => panic!("expected one loop, got {:?}", other),
        }
    }

    #[test]
    fn test_loop_kinds() {
        let out = reduce(
            "for (const x of items) await step(() => a(x));\n\
             for (const k in record) { await step(() => b(k)); }\n\
             while (more) { await step(() => c()); }\n\
             do { await step(() => d()); } while (again);\n\
             for (const x of [1, 2]) { await step(() => e(x)); }\n\
             for (let i = 1; i <= n; i += 1) { await step(() => f(i)); }",
        );
        let loops: Vec<&LoopNode> = out
            .nodes
            .iter()
            .map(|n| match n {
                FlowNode::Loop(l) => l,
                other => panic!("expected loop, got {:?}", other),
            })
            .collect();
        let kinds: Vec<LoopType> = loops.iter().map(|l| l.loop_type).collect();
        assert_eq!(
            kinds,
            vec![
                LoopType::ForOf,
                LoopType::ForIn,
                LoopType::While,
                LoopType::While,
                LoopType::ForOf,
                LoopType::For,
            ]
        );
        assert_eq!(loops[0].iter_source.as_deref(), Some("items"));
        assert_eq!(loops[1].iter_source.as_deref(), Some("record"));
        assert_eq!(loops[4].bound_count, Some(2));
        assert!(!loops[5].bound_known);
    }

    #[test]
    fn test_switch_requires_content() {
        let out = reduce("switch (kind) { case 'a': log(); break; default: noop(); }");
        assert!(out.nodes.is_empty());
        assert_eq!(out.stats.switch_count, 0);

        let out = reduce(
            "switch (kind) { case 'a': await step(() => a()); break; case 'b': break; default: await step(() => c()); await step(() => d()); }",
        );
        assert_eq!(out.stats.switch_count, 1);
        match &out.nodes[..] {
            [FlowNode::Switch(s)] => {
                assert_eq!(s.expression, "kind");
                assert_eq!(s.cases.len(), 3);
                assert_eq!(s.cases[0].value.as_deref(), Some("'a'"));
                assert_eq!(s.cases[0].body.len(), 1);
                assert!(s.cases[1].body.is_empty());
                assert!(s.cases[2].is_default);
                assert!(matches!(
                    &s.cases[2].body[..],
                    [FlowNode::Sequence(seq)] if seq.children.len() == 2
                ));
            }
            other => panic!("expected one switch, got {:?}", other),
        }
    }

    #[test]
    fn test_switch_around_step_free_conditional_is_dropped() {
        let out = reduce("switch (k) { case 1: if (v) { log(v); } break; default: noop(); }");
        assert!(out.nodes.is_empty(), "{:?}", out.nodes);
        assert_eq!(out.stats.switch_count, 0);
    }

    #[test]
    fn test_ternary_branches_become_a_conditional() {
        let out = reduce(
            "const r = fast ? await step(() => cached()) : await step(() => fetchFresh());",
        );
        assert_eq!(out.stats.conditional_count, 1);
        match &out.nodes[..] {
            [FlowNode::Conditional(c)] => {
                assert_eq!(c.condition, "fast");
                assert!(c.helper.is_none());
                assert_eq!(as_step(&c.consequent[0]).callee, "cached");
                assert_eq!(as_step(&c.alternate.as_ref().unwrap()[0]).callee, "fetchFresh");
            }
            other => panic!("expected one conditional, got {:?}", other),
        }

        let out = reduce("const label = vip ? 'gold' : 'basic';");
        assert!(out.nodes.is_empty());
        assert_eq!(out.stats.conditional_count, 0);

        let out = reduce("const r = (await step(() => check())) ? 1 : 2;");
        assert_eq!(out.nodes.len(), 1);
        assert_eq!(as_step(&out.nodes[0]).callee, "check");
        assert_eq!(out.stats.conditional_count, 0);
    }

    #[test]
    fn test_try_blocks_are_concatenated() {
        let out = reduce(
            "try { await step(() => a()); } catch (e) { await step(() => b()); } finally { await step(() => c()); }",
        );
        let callees: Vec<_> = out.nodes.iter().map(|n| as_step(n).callee.clone()).collect();
        assert_eq!(callees, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parallel_object_form() {
        let out = reduce("await step.parallel({ a: () => x(), b: () => y() }, { name: 'Fetch' });");
        match &out.nodes[..] {
            [FlowNode::Parallel(p)] => {
                assert_eq!(p.mode, ParallelMode::All);
                assert_eq!(p.callee, "step.parallel");
                assert_eq!(p.base.name.as_deref(), Some("Fetch"));
                assert_eq!(p.children.len(), 2);
                assert_eq!(as_step(&p.children[0]).base.name.as_deref(), Some("a"));
                assert_eq!(as_step(&p.children[1]).callee, "y");
            }
            other => panic!("expected one parallel, got {:?}", other),
        }
        assert_eq!(out.stats.parallel_count, 1);
        assert_eq!(out.stats.total_steps, 2);
    }

    #[test]
    fn test_parallel_array_form_names_inner_node() {
        let out = reduce(
            "await step.parallel('Load all', () => allAsync([fetchUser(id), step(() => posts()), async () => { await step(() => a()); await step(() => b()); }]));",
        );
        match &out.nodes[..] {
            [FlowNode::Parallel(p)] => {
                assert_eq!(p.base.name.as_deref(), Some("Load all"));
                assert_eq!(p.callee, "allAsync");
                assert_eq!(p.children.len(), 3);
                let implicit = as_step(&p.children[0]);
                assert_eq!(implicit.base.name.as_deref(), Some("fetchUser"));
                assert_eq!(as_step(&p.children[1]).callee, "posts");
                assert!(matches!(
                    &p.children[2],
                    FlowNode::Sequence(seq) if seq.children.len() == 2
                ));
            }
            other => panic!("expected one parallel, got {:?}", other),
        }
        assert_eq!(out.stats.parallel_count, 1);
    }

    #[test]
    fn test_race_and_settled_combinators() {
        let out = reduce(
            "await anyAsync([api.primary(), api.fallback()]);\nawait allSettledAsync([step(() => a())]);",
        );
        match &out.nodes[..] {
            [FlowNode::Race(r), FlowNode::Parallel(p)] => {
                assert_eq!(r.callee, "anyAsync");
                assert_eq!(as_step(&r.children[1]).base.name.as_deref(), Some("fallback"));
                assert_eq!(p.mode, ParallelMode::AllSettled);
            }
            other => panic!("unexpected nodes {:?}", other),
        }
        assert_eq!(out.stats.race_count, 1);
    }

    #[test]
    fn test_conditional_helper_polarity() {
        let out = reduce(
            "await unless(user.banned, () => step(() => notify(user)));\nconst v = await whenOr(flag, async () => { await step(() => a()); await step(() => b()); }, null);",
        );
        match &out.nodes[..] {
            [FlowNode::Conditional(u), FlowNode::Conditional(w)] => {
                assert_eq!(u.helper, Some(ConditionalHelper::Unless));
                assert_eq!(u.condition, "user.banned");
                assert!(u.default_value.is_none());
                assert_eq!(w.helper, Some(ConditionalHelper::WhenOr));
                assert_eq!(w.default_value.as_deref(), Some("null"));
                assert!(matches!(&w.consequent[..], [FlowNode::Sequence(_)]));
            }
            other => panic!("unexpected nodes {:?}", other),
        }
        assert_eq!(out.stats.conditional_count, 2);
    }

    #[test]
    fn test_streams() {
        let out = reduce(
            "const w = step.getWritable({ namespace: 'events', highWaterMark: 16 });\n\
             const r = step.getReadable({ namespace: ns, pollInterval: interval });",
        );
        match &out.nodes[..] {
            [FlowNode::Stream(w), FlowNode::Stream(r)] => {
                assert_eq!(w.stream_type, StreamType::Write);
                assert_eq!(w.namespace.as_deref(), Some("events"));
                assert_eq!(w.options.get("highWaterMark"), Some(&NumericValue::Literal(16.0)));
                assert_eq!(r.namespace.as_deref(), Some(DYNAMIC));
                assert_eq!(r.options.get("pollInterval"), Some(&NumericValue::Dynamic));
            }
            other => panic!("unexpected nodes {:?}", other),
        }
        assert_eq!(out.stats.stream_count, 2);
    }

    #[test]
    fn test_iteration_loops() {
        let out = reduce(
            "items.forEach((item) => console.log(item));\nawait Promise.all(ids.map(async (id) => step(() => load(id))));",
        );
        match &out.nodes[..] {
            [FlowNode::Loop(l)] => {
                assert_eq!(l.loop_type, LoopType::Map);
                assert_eq!(l.iter_source.as_deref(), Some("ids"));
            }
            other => panic!("unexpected nodes {:?}", other),
        }
        assert_eq!(out.stats.loop_count, 1);
    }

    #[test]
    fn test_saga_steps() {
        let ctx = ReduceContext::saga(
            Some(crate::analysis::scope::SagaBinding::Destructured {
                step: Some("s".into()),
                try_step: Some("tryStep".into()),
            }),
            None,
        );
        let out = reduce_with(
            "await s(() => reserve(order), { compensate: () => release(order) });\nawait tryStep(() => charge(order), { name: 'Charge' });",
            ctx,
            &[],
        );
        match &out.nodes[..] {
            [FlowNode::SagaStep(a), FlowNode::SagaStep(b)] => {
                assert_eq!(a.callee, "reserve");
                assert!(a.has_compensation);
                assert_eq!(a.compensation_callee.as_deref(), Some("release"));
                assert!(!a.is_try_step);
                assert!(b.is_try_step);
                assert!(!b.has_compensation);
                assert_eq!(b.base.name.as_deref(), Some("Charge"));
            }
            other => panic!("unexpected nodes {:?}", other),
        }
    }

    #[test]
    fn test_workflow_refs_and_warning() {
        let out = reduce_with(
            "await payment(async (step) => 1);\nawait shipping(async (step, deps) => 2);",
            ReduceContext::workflow("step", Some("checkout".to_string())),
            &["payment"],
        );
        assert_eq!(out.stats.workflow_ref_count, 2);
        assert!(matches!(
            &out.nodes[0],
            FlowNode::WorkflowRef(r) if r.resolved && r.workflow_name == "payment"
        ));
        assert!(matches!(&out.nodes[1], FlowNode::WorkflowRef(r) if !r.resolved));
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].code, WarningCode::UnresolvedWorkflowRef);
    }

    #[test]
    fn test_ids_are_assigned_in_completion_order() {
        let out = reduce("if (a) { await step(() => x()); await step(() => y()); }");
        match &out.nodes[0] {
            FlowNode::Conditional(c) => {
                match &c.consequent[..] {
                    [FlowNode::Sequence(seq)] => {
                        assert_eq!(seq.children[0].id(), "step_1");
                        assert_eq!(seq.children[1].id(), "step_2");
                        assert_eq!(seq.base.id, "sequence_3");
                    }
                    other => panic!("expected sequence, got {:?}", other),
                }
                assert_eq!(c.base.id, "conditional_4");
            }
            other => panic!("expected conditional, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_statements_are_opt_in() {
        let source = "debugger;\nawait step(() => a());";
        assert_eq!(reduce(source).nodes.len(), 1);

        let mut parser = TypeScriptParser::new().unwrap();
        let parsed = parser.parse(source, Path::new("flow.ts")).unwrap();
        let src = SourceText::new(source);
        let bindings = FileBindings::default();
        let options = AnalyzeOptions {
            report_unknown_statements: true,
            ..AnalyzeOptions::default()
        };
        let mut ids = IdGenerator::new();
        let classifier = Classifier::new(src, &bindings);
        let mut reducer = Reducer::new(src, "flow.ts", &options, classifier, &mut ids);
        let ctx = ReduceContext::workflow("step", None);
        let nodes = reducer.reduce_statements(&named_children(parsed.root()), &ctx);
        assert_eq!(reducer.stats().unknown_count, 1);
        match &nodes[0] {
            FlowNode::Unknown(u) => {
                assert_eq!(u.source_text.as_deref(), Some("debugger;"));
                assert_eq!(u.base.location.as_ref().unwrap().line, 1);
            }
            other => panic!("expected unknown, got {:?}", other),
        }
    }
}
