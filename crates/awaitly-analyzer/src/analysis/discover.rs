//! Discovery of workflow entry points.
//!
//! Each kind of entry point is found by its own full-tree walk. Files are
//! small, so four linear walks are cheaper to reason about than one combined
//! visitor.

use std::collections::BTreeSet;
use tracing::debug;
use tree_sitter::Node;

use super::classify::FileBindings;
use super::scope::{resolve_import_bindings, LexicalScopes, ScopeQuery};
use crate::config::AnalyzeOptions;
use crate::frontend::typescript::syntax::{self, named_children, SourceText};
use crate::ir::SourceKind;

/// Kinds in output order.
const DISCOVERY_ORDER: [SourceKind; 4] = [
    SourceKind::CreateWorkflow,
    SourceKind::Run,
    SourceKind::CreateSagaWorkflow,
    SourceKind::RunSaga,
];

/// A call that defines or runs a workflow.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoint<'t> {
    pub kind: SourceKind,
    /// The `createWorkflow(...)` / `run(...)` call itself.
    pub call: Node<'t>,
    /// Callback holding the workflow body, if one was found. Not yet checked
    /// to be a function literal.
    pub callback: Option<Node<'t>>,
}

/// Every call expression under `root`, parents before children.
fn calls_in_order(root: Node<'_>) -> Vec<Node<'_>> {
    let mut calls = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.kind() == "call_expression" {
            calls.push(node);
        }
        let mut children = named_children(node);
        children.reverse();
        stack.extend(children);
    }
    calls
}

/// Identifier text of a call's callee, if the callee is a bare identifier.
fn identifier_callee<'s>(call: Node<'_>, src: SourceText<'s>) -> Option<&'s str> {
    let function = call.child_by_field_name("function")?;
    (function.kind() == "identifier").then(|| src.text(function))
}

/// The first function-literal argument of a call.
fn callback_argument(call: Node<'_>) -> Option<Node<'_>> {
    syntax::call_arguments(call)
        .into_iter()
        .map(syntax::unwrap_transparent)
        .find(|arg| syntax::is_function_literal(*arg))
}

/// Name of the variable a definition call is assigned to.
pub fn declared_name(call: Node<'_>, src: SourceText<'_>) -> Option<String> {
    let mut current = call;
    let mut parent = current.parent()?;
    while matches!(
        parent.kind(),
        "await_expression"
            | "parenthesized_expression"
            | "as_expression"
            | "satisfies_expression"
            | "non_null_expression"
    ) {
        current = parent;
        parent = current.parent()?;
    }
    if parent.kind() != "variable_declarator" {
        return None;
    }
    let value = parent.child_by_field_name("value")?;
    let name = parent.child_by_field_name("name")?;
    (value.id() == current.id() && name.kind() == "identifier").then(|| src.text(name).to_string())
}

/// Local names a definition function is called by.
fn definition_callees(root: Node<'_>, src: SourceText<'_>, kind: SourceKind) -> BTreeSet<String> {
    let mut names = resolve_import_bindings(root, src, kind.as_str());
    names.insert(kind.as_str().to_string());
    names
}

fn find_definitions<'t>(
    root: Node<'t>,
    src: SourceText<'_>,
    kind: SourceKind,
) -> Vec<EntryPoint<'t>> {
    let callees = definition_callees(root, src, kind);
    calls_in_order(root)
        .into_iter()
        .filter(|call| identifier_callee(*call, src).is_some_and(|c| callees.contains(c)))
        .map(|call| {
            let callback = callback_argument(call).or_else(|| {
                declared_name(call, src).and_then(|name| find_invocation_callback(root, src, &name))
            });
            EntryPoint { kind, call, callback }
        })
        .collect()
}

/// Callback of the first `name(fn)` invocation in the file.
fn find_invocation_callback<'t>(
    root: Node<'t>,
    src: SourceText<'_>,
    name: &str,
) -> Option<Node<'t>> {
    calls_in_order(root)
        .into_iter()
        .filter(|call| identifier_callee(*call, src) == Some(name))
        .find_map(callback_argument)
}

/// Local names a `run` / `runSaga` call may be spelled with.
fn run_callees(
    root: Node<'_>,
    src: SourceText<'_>,
    kind: SourceKind,
    assume_imported: bool,
) -> BTreeSet<String> {
    let mut callees = resolve_import_bindings(root, src, kind.as_str());
    if assume_imported {
        callees.insert(kind.as_str().to_string());
    }
    callees
}

fn find_runs<'t>(
    root: Node<'t>,
    src: SourceText<'_>,
    kind: SourceKind,
    assume_imported: bool,
) -> Vec<EntryPoint<'t>> {
    let callees = run_callees(root, src, kind, assume_imported);
    if callees.is_empty() {
        return Vec::new();
    }

    let scopes = LexicalScopes::new(src);
    calls_in_order(root)
        .into_iter()
        .filter(|call| match identifier_callee(*call, src) {
            Some(callee) => {
                callees.contains(callee) && !scopes.is_bound_in_enclosing_scope(*call, callee)
            }
            None => false,
        })
        .map(|call| EntryPoint {
            kind,
            call,
            callback: syntax::call_arguments(call)
                .first()
                .copied()
                .map(syntax::unwrap_transparent),
        })
        .collect()
}

/// Finds the entry points selected by `options.detect`, in output order.
pub fn discover<'t>(
    root: Node<'t>,
    src: SourceText<'_>,
    options: &AnalyzeOptions,
) -> Vec<EntryPoint<'t>> {
    let mut entries = Vec::new();
    for kind in DISCOVERY_ORDER {
        if !options.detect.includes(kind) {
            continue;
        }
        let found = match kind {
            SourceKind::CreateWorkflow | SourceKind::CreateSagaWorkflow => {
                find_definitions(root, src, kind)
            }
            SourceKind::Run | SourceKind::RunSaga => {
                find_runs(root, src, kind, options.assume_imported)
            }
        };
        debug!(kind = %kind, count = found.len(), "discovered entry points");
        entries.extend(found);
    }
    entries
}

/// Names of every workflow defined in the file, regardless of `detect`.
pub fn definition_names(root: Node<'_>, src: SourceText<'_>) -> BTreeSet<String> {
    [SourceKind::CreateWorkflow, SourceKind::CreateSagaWorkflow]
        .into_iter()
        .flat_map(|kind| find_definitions(root, src, kind))
        .filter_map(|entry| declared_name(entry.call, src))
        .collect()
}

/// Defined workflows and `run` / `runSaga` spellings, regardless of `detect`.
pub fn file_bindings(
    root: Node<'_>,
    src: SourceText<'_>,
    options: &AnalyzeOptions,
) -> FileBindings {
    FileBindings {
        workflows: definition_names(root, src),
        runners: [SourceKind::Run, SourceKind::RunSaga]
            .into_iter()
            .flat_map(|kind| run_callees(root, src, kind, options.assume_imported))
            .collect(),
    }
}
