//! TypeScript parser using tree-sitter.

use std::path::Path;
use tree_sitter::{Node, Parser, Tree};

use crate::diagnostic::AnalyzerError;

/// TypeScript parser holding one tree-sitter parser per grammar dialect.
pub struct TypeScriptParser {
    typescript: Parser,
    tsx: Parser,
}

/// A successfully parsed source file.
#[derive(Debug)]
pub struct ParsedSource {
    pub tree: Tree,
}

impl ParsedSource {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }
}

impl TypeScriptParser {
    /// Creates a new TypeScript parser.
    pub fn new() -> Result<Self, AnalyzerError> {
        let mut typescript = Parser::new();
        typescript
            .set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            .map_err(|_| AnalyzerError::ParserInitFailed)?;

        let mut tsx = Parser::new();
        tsx.set_language(&tree_sitter_typescript::LANGUAGE_TSX.into())
            .map_err(|_| AnalyzerError::ParserInitFailed)?;

        Ok(Self { typescript, tsx })
    }

    /// Parses a source file, rejecting sources that contain syntax errors.
    ///
    /// `.tsx` and `.jsx` paths use the TSX grammar; everything else uses the
    /// plain TypeScript grammar.
    pub fn parse(&mut self, source: &str, path: &Path) -> Result<ParsedSource, AnalyzerError> {
        let parser = if uses_tsx_grammar(path) {
            &mut self.tsx
        } else {
            &mut self.typescript
        };

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| AnalyzerError::ParseFailed { path: path.to_path_buf() })?;

        let root = tree.root_node();
        if root.has_error() {
            let (message, line, column) = match first_error(root) {
                Some(node) if node.is_missing() => (
                    format!("missing `{}`", node.kind()),
                    node.start_position().row + 1,
                    node.start_position().column,
                ),
                Some(node) => {
                    let text = node.utf8_text(source.as_bytes()).unwrap_or("");
                    let snippet: String = text.chars().take(40).collect();
                    (
                        format!("unexpected `{}`", snippet.trim()),
                        node.start_position().row + 1,
                        node.start_position().column,
                    )
                }
                None => ("invalid syntax".to_string(), 1, 0),
            };
            return Err(AnalyzerError::SyntaxError {
                message,
                file: path.to_path_buf(),
                line,
                column,
            });
        }

        Ok(ParsedSource { tree })
    }
}

fn uses_tsx_grammar(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("tsx") | Some("jsx")
    )
}

/// Finds the first ERROR or MISSING node in document order.
fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<_> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    None
}
