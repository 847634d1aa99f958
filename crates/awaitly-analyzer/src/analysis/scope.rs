//! Binding resolution: imports, lexical shadowing and callback parameters.
//!
//! This is a syntactic approximation of a binder. It answers the handful of
//! questions the classifier needs without building a symbol table.

use std::collections::BTreeSet;
use tree_sitter::Node;

use crate::frontend::typescript::syntax::{self, named_children, SourceText};

/// Whether `module` is one of the library's own modules.
fn is_library_module(module: &str) -> bool {
    module == "awaitly" || module.starts_with("awaitly/") || module.starts_with("@awaitly/")
}

/// Whether `node` has an anonymous `type` keyword child (`import type` or
/// `import { type x }`).
fn has_type_modifier(node: Node<'_>) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|child| !child.is_named() && child.kind() == "type");
    found
}

/// Local names bound to `export_name` by value imports from the library.
///
/// `import { run as go } from 'awaitly'` yields `go`. Type-only imports are
/// ignored, both `import type { run }` and `import { type run }`.
pub fn resolve_import_bindings(
    root: Node<'_>,
    src: SourceText<'_>,
    export_name: &str,
) -> BTreeSet<String> {
    let mut names = BTreeSet::new();

    for statement in named_children(root) {
        if statement.kind() != "import_statement" || has_type_modifier(statement) {
            continue;
        }
        let module = match statement
            .child_by_field_name("source")
            .and_then(|s| src.string_literal(s))
        {
            Some(module) => module,
            None => continue,
        };
        if !is_library_module(&module) {
            continue;
        }

        for clause in named_children(statement) {
            if clause.kind() != "import_clause" {
                continue;
            }
            for part in named_children(clause) {
                if part.kind() != "named_imports" {
                    continue;
                }
                for specifier in named_children(part) {
                    if specifier.kind() != "import_specifier" || has_type_modifier(specifier) {
                        continue;
                    }
                    let Some(imported) = specifier.child_by_field_name("name") else {
                        continue;
                    };
                    if src.property_key(imported) != export_name {
                        continue;
                    }
                    let local = specifier.child_by_field_name("alias").unwrap_or(imported);
                    names.insert(src.text(local).to_string());
                }
            }
        }
    }

    names
}

/// Scope questions asked by discovery and classification.
pub trait ScopeQuery {
    /// Whether `name` is declared in some scope enclosing `node`, below the
    /// module's import bindings.
    fn is_bound_in_enclosing_scope(&self, node: Node<'_>, name: &str) -> bool;
}

/// [`ScopeQuery`] answered by walking parent links.
#[derive(Debug, Clone, Copy)]
pub struct LexicalScopes<'s> {
    src: SourceText<'s>,
}

impl<'s> LexicalScopes<'s> {
    pub fn new(src: SourceText<'s>) -> Self {
        Self { src }
    }

    /// Whether a binding pattern introduces `name` anywhere inside it.
    fn pattern_binds(&self, pattern: Node<'_>, name: &str) -> bool {
        match pattern.kind() {
            "identifier" | "shorthand_property_identifier_pattern" => {
                self.src.text(pattern) == name
            }
            "pair_pattern" => pattern
                .child_by_field_name("value")
                .is_some_and(|value| self.pattern_binds(value, name)),
            "object_assignment_pattern" | "assignment_pattern" => pattern
                .child_by_field_name("left")
                .is_some_and(|left| self.pattern_binds(left, name)),
            "required_parameter" | "optional_parameter" => pattern
                .child_by_field_name("pattern")
                .is_some_and(|p| self.pattern_binds(p, name)),
            "variable_declarator" => pattern
                .child_by_field_name("name")
                .is_some_and(|n| self.pattern_binds(n, name)),
            "object_pattern" | "array_pattern" | "rest_pattern" | "formal_parameters" => {
                named_children(pattern)
                    .into_iter()
                    .any(|child| self.pattern_binds(child, name))
            }
            _ => false,
        }
    }

    fn declaration_binds(&self, declaration: Node<'_>, name: &str) -> bool {
        named_children(declaration)
            .into_iter()
            .filter(|child| child.kind() == "variable_declarator")
            .any(|declarator| self.pattern_binds(declarator, name))
    }

    /// Whether a statement directly inside a block declares `name`.
    fn statement_declares(&self, statement: Node<'_>, name: &str) -> bool {
        match statement.kind() {
            "lexical_declaration" | "variable_declaration" => {
                self.declaration_binds(statement, name)
            }
            "function_declaration"
            | "generator_function_declaration"
            | "class_declaration"
            | "abstract_class_declaration" => statement
                .child_by_field_name("name")
                .is_some_and(|n| self.src.text(n) == name),
            "export_statement" => statement
                .child_by_field_name("declaration")
                .is_some_and(|d| self.statement_declares(d, name)),
            _ => false,
        }
    }

    /// Whether a `var` anywhere in `body` declares `name`, without entering
    /// nested functions.
    fn hoisted_var_binds(&self, body: Node<'_>, name: &str) -> bool {
        let mut stack = vec![body];
        while let Some(node) = stack.pop() {
            if node.kind() == "variable_declaration" && self.declaration_binds(node, name) {
                return true;
            }
            for child in named_children(node) {
                if !syntax::is_function_scope(child) && child.kind() != "class" {
                    stack.push(child);
                }
            }
        }
        false
    }

    fn function_binds(&self, function: Node<'_>, name: &str) -> bool {
        if let Some(param) = function.child_by_field_name("parameter") {
            if self.pattern_binds(param, name) {
                return true;
            }
        }
        if let Some(params) = function.child_by_field_name("parameters") {
            if self.pattern_binds(params, name) {
                return true;
            }
        }
        // A named function expression binds its own name inside its body.
        if function.kind() == "function_expression" || function.kind() == "function" {
            if let Some(own) = function.child_by_field_name("name") {
                if self.src.text(own) == name {
                    return true;
                }
            }
        }
        function
            .child_by_field_name("body")
            .is_some_and(|body| self.hoisted_var_binds(body, name))
    }

    fn scope_binds(&self, scope: Node<'_>, name: &str) -> bool {
        match scope.kind() {
            "program" => {
                named_children(scope)
                    .into_iter()
                    .any(|s| self.statement_declares(s, name))
                    || self.hoisted_var_binds(scope, name)
            }
            "statement_block" | "switch_case" | "switch_default" | "class_body" => {
                named_children(scope)
                    .into_iter()
                    .any(|s| self.statement_declares(s, name))
            }
            "for_statement" => scope
                .child_by_field_name("initializer")
                .is_some_and(|init| self.statement_declares(init, name)),
            "for_in_statement" => {
                scope.child_by_field_name("kind").is_some()
                    && scope
                        .child_by_field_name("left")
                        .is_some_and(|left| self.pattern_binds(left, name))
            }
            "catch_clause" => scope
                .child_by_field_name("parameter")
                .is_some_and(|param| self.pattern_binds(param, name)),
            _ if syntax::is_function_scope(scope) => self.function_binds(scope, name),
            _ => false,
        }
    }
}

impl ScopeQuery for LexicalScopes<'_> {
    fn is_bound_in_enclosing_scope(&self, node: Node<'_>, name: &str) -> bool {
        let mut current = node.parent();
        while let Some(scope) = current {
            if self.scope_binds(scope, name) {
                return true;
            }
            if scope.kind() == "program" {
                break;
            }
            current = scope.parent();
        }
        false
    }
}

/// How a callback's first parameter binds a capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterBinding {
    /// `(step) => ...`: the whole parameter.
    Plain(String),
    /// `({ step: s }) => ...`: the local bound to one destructured key.
    Alias(String),
}

impl ParameterBinding {
    pub fn name(&self) -> &str {
        match self {
            ParameterBinding::Plain(name) | ParameterBinding::Alias(name) => name,
        }
    }
}

/// Reads the binding for `key` from a callback's first parameter.
///
/// A plain identifier parameter is returned as is. For an object pattern the
/// local bound to `key` is returned, covering `{ key }`, `{ key: alias }`,
/// `{ key: alias = d }` and `{ key = d }`. Returns `None` when the callback
/// has no parameter or the pattern does not mention `key`.
pub fn extract_parameter_binding(
    callback: Node<'_>,
    src: SourceText<'_>,
    key: &str,
) -> Option<ParameterBinding> {
    let pattern = syntax::first_parameter(callback)?;
    match pattern.kind() {
        "identifier" => Some(ParameterBinding::Plain(src.text(pattern).to_string())),
        "object_pattern" => destructured_alias(pattern, src, key).map(ParameterBinding::Alias),
        _ => None,
    }
}

fn destructured_alias(pattern: Node<'_>, src: SourceText<'_>, key: &str) -> Option<String> {
    for property in named_children(pattern) {
        match property.kind() {
            "shorthand_property_identifier_pattern" if src.text(property) == key => {
                return Some(key.to_string());
            }
            "object_assignment_pattern" => {
                let left = property.child_by_field_name("left")?;
                if src.text(left) == key {
                    return Some(key.to_string());
                }
            }
            "pair_pattern" => {
                let Some(name) = property.child_by_field_name("key") else {
                    continue;
                };
                if src.property_key(name) != key {
                    continue;
                }
                let mut value = property.child_by_field_name("value")?;
                if value.kind() == "assignment_pattern" {
                    value = value.child_by_field_name("left")?;
                }
                return (value.kind() == "identifier").then(|| src.text(value).to_string());
            }
            _ => {}
        }
    }
    None
}

/// How saga steps are reached from a saga callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaBinding {
    /// `(saga) => saga.step(...)`.
    Member { object: String },
    /// `({ step, tryStep: attempt }) => ...`.
    Destructured {
        step: Option<String>,
        try_step: Option<String>,
    },
}

impl SagaBinding {
    /// Reads the saga binding from a saga callback's first parameter.
    pub fn from_callback(callback: Node<'_>, src: SourceText<'_>) -> Option<Self> {
        let pattern = syntax::first_parameter(callback)?;
        match pattern.kind() {
            "identifier" => Some(SagaBinding::Member {
                object: src.text(pattern).to_string(),
            }),
            "object_pattern" => Some(SagaBinding::Destructured {
                step: destructured_alias(pattern, src, "step"),
                try_step: destructured_alias(pattern, src, "tryStep"),
            }),
            _ => None,
        }
    }

    /// Whether `callee` invokes a saga step; `Some(true)` for `tryStep`.
    pub fn match_callee(&self, callee: &str) -> Option<bool> {
        match self {
            SagaBinding::Member { object } => {
                let method = callee.strip_prefix(object.as_str())?.strip_prefix('.')?;
                match method {
                    "step" => Some(false),
                    "tryStep" => Some(true),
                    _ => None,
                }
            }
            SagaBinding::Destructured { step, try_step } => {
                if step.as_deref() == Some(callee) {
                    Some(false)
                } else if try_step.as_deref() == Some(callee) {
                    Some(true)
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use crate::frontend::typescript::TypeScriptParser;

    fn parse(source: &str) -> crate::frontend::typescript::ParsedSource {
        let mut parser = TypeScriptParser::new().unwrap();
        parser.parse(source, Path::new("scope.ts")).unwrap()
    }

    /// Every call whose callee text is `callee`, in document order.
    fn calls_to<'t>(root: Node<'t>, src: SourceText<'_>, callee: &str) -> Vec<Node<'t>> {
        let mut found = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.kind() == "call_expression" {
                if let Some(function) = node.child_by_field_name("function") {
                    if src.text(function) == callee {
                        found.push(node);
                    }
                }
            }
            let mut children = named_children(node);
            children.reverse();
            stack.extend(children);
        }
        found
    }

    fn first_arrow<'t>(root: Node<'t>) -> Node<'t> {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.kind() == "arrow_function" {
                return node;
            }
            let mut children = named_children(node);
            children.reverse();
            stack.extend(children);
        }
        panic!("no arrow function");
    }

    #[test]
    fn test_import_bindings_with_alias() {
        let source = "import { run as go, createWorkflow } from 'awaitly';\n\
                      import { run } from 'other-lib';\n\
                      import { run as r2 } from '@awaitly/core';";
        let parsed = parse(source);
        let src = SourceText::new(source);
        let runs = resolve_import_bindings(parsed.root(), src, "run");
        assert_eq!(runs.into_iter().collect::<Vec<_>>(), vec!["go", "r2"]);
        let defs = resolve_import_bindings(parsed.root(), src, "createWorkflow");
        assert!(defs.contains("createWorkflow"));
    }

    #[test]
    fn test_type_only_imports_are_excluded() {
        let source =
            "import type { run } from 'awaitly';\nimport { type runSaga } from 'awaitly/saga';";
        let parsed = parse(source);
        let src = SourceText::new(source);
        assert!(resolve_import_bindings(parsed.root(), src, "run").is_empty());
        assert!(resolve_import_bindings(parsed.root(), src, "runSaga").is_empty());
    }

    #[test]
    fn test_local_const_shadows_import() {
        let source = "import { run } from 'awaitly';\n\
                      function wrapper() {\n\
                        const run = (fn) => fn();\n\
                        return run(async (step) => 1);\n\
                      }\n\
                      run(async (step) => 2);";
        let parsed = parse(source);
        let src = SourceText::new(source);
        let scopes = LexicalScopes::new(src);
        let calls = calls_to(parsed.root(), src, "run");
        assert_eq!(calls.len(), 2);
        assert!(scopes.is_bound_in_enclosing_scope(calls[0], "run"));
        assert!(!scopes.is_bound_in_enclosing_scope(calls[1], "run"));
    }

    #[test]
    fn test_parameters_and_hoisting_shadow() {
        let source = "function a({ run }) { run(x); }\n\
                      function b(...run) { run(x); }\n\
                      function c(run = 1) { run(x); }\n\
                      function d() { run(x); if (y) { var run = 2; } }\n\
                      function e() { run(x); function run() {} }\n\
                      try {} catch (run) { run(x); }\n\
                      for (const run of xs) { run(x); }\n\
                      const f = function run() { run(x); };\n\
                      function g() { run(x); }";
        let parsed = parse(source);
        let src = SourceText::new(source);
        let scopes = LexicalScopes::new(src);
        let calls = calls_to(parsed.root(), src, "run");
        assert_eq!(calls.len(), 9);
        let shadowed: Vec<bool> = calls
            .iter()
            .map(|c| scopes.is_bound_in_enclosing_scope(*c, "run"))
            .collect();
        assert_eq!(shadowed, vec![true, true, true, true, true, true, true, true, false]);
    }

    #[test]
    fn test_extract_parameter_binding_forms() {
        let cases = [
            ("f((step) => 1);", Some(ParameterBinding::Plain("step".into()))),
            ("f(({ step }) => 1);", Some(ParameterBinding::Alias("step".into()))),
            ("f(({ step: s }) => 1);", Some(ParameterBinding::Alias("s".into()))),
            ("f(({ step: s = d }) => 1);", Some(ParameterBinding::Alias("s".into()))),
            ("f(({ step = d }) => 1);", Some(ParameterBinding::Alias("step".into()))),
            ("f(({ other }) => 1);", None),
            ("f(() => 1);", None),
        ];
        for (source, expected) in cases {
            let parsed = parse(source);
            let src = SourceText::new(source);
            let arrow = first_arrow(parsed.root());
            assert_eq!(extract_parameter_binding(arrow, src, "step"), expected, "{}", source);
        }
    }

    #[test]
    fn test_saga_binding_matching() {
        let source = "f(({ step: s, tryStep }) => 1);";
        let parsed = parse(source);
        let src = SourceText::new(source);
        let binding = SagaBinding::from_callback(first_arrow(parsed.root()), src).unwrap();
        assert_eq!(binding.match_callee("s"), Some(false));
        assert_eq!(binding.match_callee("tryStep"), Some(true));
        assert_eq!(binding.match_callee("step"), None);

        let member = SagaBinding::Member { object: "saga".to_string() };
        assert_eq!(member.match_callee("saga.step"), Some(false));
        assert_eq!(member.match_callee("saga.tryStep"), Some(true));
        assert_eq!(member.match_callee("sagaX.step"), None);
        assert_eq!(member.match_callee("tracker.step"), None);
    }
}
