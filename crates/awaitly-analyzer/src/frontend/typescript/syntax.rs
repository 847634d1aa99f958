//! Helpers for reading tree-sitter TypeScript nodes.

use tree_sitter::Node;

use crate::ir::{NumericValue, DYNAMIC};

/// Node kinds that are function literals (callbacks).
const FUNCTION_LITERAL_KINDS: &[&str] = &[
    "arrow_function",
    "function_expression",
    "function",
    "generator_function",
];

/// Node kinds that introduce a function scope.
pub const FUNCTION_SCOPE_KINDS: &[&str] = &[
    "arrow_function",
    "function_expression",
    "function",
    "generator_function",
    "function_declaration",
    "generator_function_declaration",
    "method_definition",
];

/// Source text access for nodes of one parsed file.
#[derive(Debug, Clone, Copy)]
pub struct SourceText<'s> {
    source: &'s str,
}

impl<'s> SourceText<'s> {
    pub fn new(source: &'s str) -> Self {
        Self { source }
    }

    pub fn text(&self, node: Node<'_>) -> &'s str {
        self.source
            .get(node.start_byte()..node.end_byte())
            .unwrap_or("")
    }

    /// Text from the start of `node` up to the start of `until`.
    pub fn text_between(&self, node: Node<'_>, until: Node<'_>) -> &'s str {
        self.source
            .get(node.start_byte()..until.start_byte())
            .unwrap_or("")
    }

    /// Contents of a string literal with the quotes trimmed.
    ///
    /// Template literals are never evaluated and yield [`DYNAMIC`]. Returns
    /// `None` for anything that is not a string-like literal.
    pub fn string_literal(&self, node: Node<'_>) -> Option<String> {
        match node.kind() {
            "string" => {
                let text = self.text(node);
                Some(trim_quotes(text).to_string())
            }
            "template_string" => Some(DYNAMIC.to_string()),
            _ => None,
        }
    }

    /// A string literal's contents, or [`DYNAMIC`] for any other expression.
    pub fn static_string(&self, node: Node<'_>) -> String {
        self.string_literal(node)
            .unwrap_or_else(|| DYNAMIC.to_string())
    }

    /// A numeric literal, or [`NumericValue::Dynamic`].
    pub fn numeric_value(&self, node: Node<'_>) -> NumericValue {
        match node.kind() {
            "number" => parse_number(self.text(node))
                .map(NumericValue::Literal)
                .unwrap_or(NumericValue::Dynamic),
            "unary_expression" => {
                let operator = node.child_by_field_name("operator").map(|o| self.text(o));
                match (operator, node.child_by_field_name("argument")) {
                    (Some("-"), Some(arg)) if arg.kind() == "number" => parse_number(self.text(arg))
                        .map(|n| NumericValue::Literal(-n))
                        .unwrap_or(NumericValue::Dynamic),
                    _ => NumericValue::Dynamic,
                }
            }
            "parenthesized_expression" => match first_named_child(node) {
                Some(inner) => self.numeric_value(inner),
                None => NumericValue::Dynamic,
            },
            _ => NumericValue::Dynamic,
        }
    }

    /// Reconstructs callee text from identifiers and member accesses.
    ///
    /// `step . retry` and `step?.retry` both become `step.retry`; any other
    /// expression shape is returned verbatim.
    pub fn callee_text(&self, node: Node<'_>) -> String {
        match node.kind() {
            "member_expression" => {
                let object = node.child_by_field_name("object");
                let property = node.child_by_field_name("property");
                match (object, property) {
                    (Some(object), Some(property)) => {
                        format!("{}.{}", self.callee_text(object), self.text(property))
                    }
                    _ => self.text(node).to_string(),
                }
            }
            "non_null_expression" => match first_named_child(node) {
                Some(inner) => self.callee_text(inner),
                None => self.text(node).to_string(),
            },
            _ => self.text(node).to_string(),
        }
    }

    /// Text of an expression with one layer of parentheses removed, as used
    /// for `if (cond)` and `switch (expr)` headers.
    pub fn unparenthesized_text(&self, node: Node<'_>) -> String {
        if node.kind() == "parenthesized_expression" {
            if let Some(inner) = first_named_child(node) {
                return self.text(inner).to_string();
            }
        }
        self.text(node).to_string()
    }

    /// Key text of an object `pair`, with quotes trimmed for string keys.
    pub fn property_key(&self, key: Node<'_>) -> String {
        match key.kind() {
            "string" => trim_quotes(self.text(key)).to_string(),
            _ => self.text(key).to_string(),
        }
    }

    /// Entries of an object literal as `(key, value)` pairs in source order.
    ///
    /// Shorthand properties map to the identifier itself and methods to the
    /// method node. Spread elements are skipped.
    pub fn object_entries<'t>(&self, object: Node<'t>) -> Vec<(String, Node<'t>)> {
        named_children(object)
            .into_iter()
            .filter_map(|entry| match entry.kind() {
                "pair" => {
                    let key = entry.child_by_field_name("key")?;
                    let value = entry.child_by_field_name("value")?;
                    Some((self.property_key(key), value))
                }
                "shorthand_property_identifier" => Some((self.text(entry).to_string(), entry)),
                "method_definition" => {
                    let name = entry.child_by_field_name("name")?;
                    Some((self.property_key(name), entry))
                }
                _ => None,
            })
            .collect()
    }

    /// Value of the property named `key` in an object literal.
    pub fn object_property<'t>(&self, object: Node<'t>, key: &str) -> Option<Node<'t>> {
        self.object_entries(object)
            .into_iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }
}

fn trim_quotes(text: &str) -> &str {
    let quoted = text.len() >= 2
        && ((text.starts_with('"') && text.ends_with('"'))
            || (text.starts_with('\'') && text.ends_with('\'')));
    if quoted {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    let lower = cleaned.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        return i64::from_str_radix(hex, 16).ok().map(|n| n as f64);
    }
    if let Some(bin) = lower.strip_prefix("0b") {
        return i64::from_str_radix(bin, 2).ok().map(|n| n as f64);
    }
    if let Some(oct) = lower.strip_prefix("0o") {
        return i64::from_str_radix(oct, 8).ok().map(|n| n as f64);
    }
    lower.trim_end_matches('n').parse::<f64>().ok()
}

/// Named children, skipping comments.
pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

pub fn first_named_child<'t>(node: Node<'t>) -> Option<Node<'t>> {
    named_children(node).into_iter().next()
}

pub fn is_function_literal(node: Node<'_>) -> bool {
    FUNCTION_LITERAL_KINDS.contains(&node.kind())
}

pub fn is_function_scope(node: Node<'_>) -> bool {
    FUNCTION_SCOPE_KINDS.contains(&node.kind())
}

/// Argument expressions of a call, in order.
pub fn call_arguments<'t>(call: Node<'t>) -> Vec<Node<'t>> {
    match call.child_by_field_name("arguments") {
        Some(args) if args.kind() == "arguments" => named_children(args),
        _ => Vec::new(),
    }
}

/// Strips `await`, parentheses and TypeScript-only wrappers
/// (`as`, `satisfies`, `!`).
pub fn unwrap_transparent<'t>(node: Node<'t>) -> Node<'t> {
    let mut current = node;
    loop {
        match current.kind() {
            "await_expression"
            | "parenthesized_expression"
            | "as_expression"
            | "satisfies_expression"
            | "non_null_expression" => match first_named_child(current) {
                Some(inner) => current = inner,
                None => return current,
            },
            _ => return current,
        }
    }
}

/// The binding pattern of a function's first parameter.
///
/// Returns the identifier for `step => ...`, or the `pattern` of the first
/// formal parameter (an identifier or a destructuring pattern).
pub fn first_parameter<'t>(function: Node<'t>) -> Option<Node<'t>> {
    if let Some(param) = function.child_by_field_name("parameter") {
        return Some(param);
    }
    let params = function.child_by_field_name("parameters")?;
    let first = named_children(params).into_iter().next()?;
    match first.kind() {
        "required_parameter" | "optional_parameter" => first
            .child_by_field_name("pattern")
            .or_else(|| first_named_child(first)),
        _ => Some(first),
    }
}

/// Text of a function's parameter list, for the workflow-reference heuristic.
pub fn parameter_list<'t>(function: Node<'t>) -> Option<Node<'t>> {
    function
        .child_by_field_name("parameters")
        .or_else(|| function.child_by_field_name("parameter"))
}
