//! Source location tracking.

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

/// A location in the analyzed source.
///
/// Lines are 1-indexed and columns 0-indexed, matching what editors show for
/// lines and what tree-sitter reports for columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub file_path: String,
    pub line: usize,
    pub column: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_column: Option<usize>,
}

impl SourceLocation {
    /// Location covering a whole syntax node.
    pub fn of_node(file_path: &str, node: Node<'_>) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        Self {
            file_path: file_path.to_string(),
            line: start.row + 1,
            column: start.column,
            end_line: Some(end.row + 1),
            end_column: Some(end.column),
        }
    }
}
