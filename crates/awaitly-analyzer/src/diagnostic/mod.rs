//! Diagnostic types for error reporting.

mod error;
mod span;

pub use error::AnalyzerError;
pub use span::SourceLocation;
