//! Step call arguments and option objects.

use tree_sitter::Node;

use crate::frontend::typescript::syntax::{self, named_children, SourceText};
use crate::ir::{RetryConfig, TimeoutConfig, DYNAMIC};

/// The positional arguments of a step-like call.
///
/// Accepts `step(op, options?)` and `step('id', op, options?)`.
#[derive(Debug, Clone, Copy)]
pub struct StepArgs<'t> {
    pub id: Option<Node<'t>>,
    pub operation: Option<Node<'t>>,
    pub options: Option<Node<'t>>,
}

impl<'t> StepArgs<'t> {
    pub fn from_arguments(args: &[Node<'t>]) -> Self {
        let leading_id = args
            .first()
            .is_some_and(|a| matches!(a.kind(), "string" | "template_string"))
            && args.len() > 1;
        let (id, rest) = if leading_id {
            (args.first().copied(), &args[1..])
        } else {
            (None, args)
        };
        Self {
            id,
            operation: rest.first().copied(),
            options: rest
                .get(1)
                .map(|n| syntax::unwrap_transparent(*n))
                .filter(|n| n.kind() == "object"),
        }
    }
}

/// Options shared by every step-like call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOptions {
    pub key: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub markdown: Option<String>,
    pub retry: Option<RetryConfig>,
    pub timeout: Option<TimeoutConfig>,
}

impl StepOptions {
    /// Reads `key`, `name`, `description`, `markdown`, and nested `retry` /
    /// `timeout` settings from an options object literal.
    pub fn read(object: Node<'_>, src: SourceText<'_>) -> Self {
        let mut options = StepOptions::default();
        for (key, value) in src.object_entries(object) {
            let value = syntax::unwrap_transparent(value);
            match key.as_str() {
                "key" => options.key = Some(src.static_string(value)),
                "name" => options.name = Some(src.static_string(value)),
                "description" => options.description = src.string_literal(value),
                "markdown" => options.markdown = src.string_literal(value),
                "retry" if value.kind() == "object" => {
                    options.retry = Some(read_retry(value, src).unwrap_or_default());
                }
                "retry" if value.kind() == "number" => {
                    options.retry = Some(RetryConfig {
                        attempts: Some(src.numeric_value(value)),
                        ..RetryConfig::default()
                    });
                }
                "timeout" if value.kind() == "object" => {
                    options.timeout = Some(read_timeout(value, src).unwrap_or_default());
                }
                "timeout" => {
                    options.timeout = Some(TimeoutConfig {
                        ms: Some(src.numeric_value(value)),
                    });
                }
                _ => {}
            }
        }
        options
    }
}

/// Reads retry settings from the top level of an object literal.
///
/// Returns `None` when the object carries none of them.
pub fn read_retry(object: Node<'_>, src: SourceText<'_>) -> Option<RetryConfig> {
    let mut retry = RetryConfig::default();
    let mut found = false;
    for (key, value) in src.object_entries(object) {
        let value = syntax::unwrap_transparent(value);
        match key.as_str() {
            "attempts" => retry.attempts = Some(src.numeric_value(value)),
            "backoff" => retry.backoff = Some(src.static_string(value)),
            "baseDelay" | "initialDelay" => retry.base_delay = Some(src.numeric_value(value)),
            "maxDelay" => retry.max_delay = Some(src.numeric_value(value)),
            _ => continue,
        }
        found = true;
    }
    found.then_some(retry)
}

/// Reads `ms` from the top level of an object literal.
pub fn read_timeout(object: Node<'_>, src: SourceText<'_>) -> Option<TimeoutConfig> {
    let ms = src.object_property(object, "ms")?;
    Some(TimeoutConfig {
        ms: Some(src.numeric_value(syntax::unwrap_transparent(ms))),
    })
}

/// Text naming the operation a step runs.
///
/// For `() => deps.fetchUser(id)` this is `deps.fetchUser`. Block bodies use
/// the first `return`ed expression, falling back to the first call in the
/// body. References such as `fetchUser` are returned as written.
pub fn operation_callee(operation: Node<'_>, src: SourceText<'_>) -> String {
    let operation = syntax::unwrap_transparent(operation);
    match operation.kind() {
        "call_expression" | "new_expression" => {
            let callee = operation
                .child_by_field_name("function")
                .or_else(|| operation.child_by_field_name("constructor"));
            match callee {
                Some(callee) => src.callee_text(syntax::unwrap_transparent(callee)),
                None => src.text(operation).to_string(),
            }
        }
        _ if syntax::is_function_literal(operation) || operation.kind() == "method_definition" => {
            let Some(body) = operation.child_by_field_name("body") else {
                return DYNAMIC.to_string();
            };
            if body.kind() != "statement_block" {
                return operation_callee(body, src);
            }
            if let Some(returned) = first_return(body) {
                return operation_callee(returned, src);
            }
            match first_call(body) {
                Some(call) => operation_callee(call, src),
                None => DYNAMIC.to_string(),
            }
        }
        "identifier" | "member_expression" => src.callee_text(operation),
        _ => src.text(operation).to_string(),
    }
}

/// The expression of the first `return` in a function body.
fn first_return(body: Node<'_>) -> Option<Node<'_>> {
    find_first(body, |node| node.kind() == "return_statement")
        .and_then(syntax::first_named_child)
}

/// The first call expression in a function body.
fn first_call(body: Node<'_>) -> Option<Node<'_>> {
    find_first(body, |node| node.kind() == "call_expression")
}

/// Pre-order search that does not enter nested functions.
fn find_first<'t>(root: Node<'t>, pred: impl Fn(Node<'t>) -> bool) -> Option<Node<'t>> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if pred(node) {
            return Some(node);
        }
        let mut children: Vec<_> = named_children(node)
            .into_iter()
            .filter(|child| !syntax::is_function_scope(*child))
            .collect();
        children.reverse();
        stack.extend(children);
    }
    None
}
