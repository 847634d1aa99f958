//! Analyzer error types.
#![allow(unused_assignments)]

use std::path::PathBuf;
use miette::Diagnostic;
use thiserror::Error;

/// Errors that abort the analysis of a source file.
///
/// Problems with a single workflow entry point are not errors; they are
/// reported as [`crate::ir::AnalysisWarning`]s and the remaining entry points
/// are still analyzed.
#[allow(unused_assignments)]
#[derive(Error, Diagnostic, Debug)]
pub enum AnalyzerError {
    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("Failed to read '{}': {message}", path.display())]
    #[diagnostic(code(awaitly::io::read_error))]
    IoError {
        path: PathBuf,
        message: String,
    },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("Failed to initialize parser")]
    #[diagnostic(code(awaitly::parse::init_failed))]
    ParserInitFailed,

    #[error("Failed to parse file: {}", path.display())]
    #[diagnostic(code(awaitly::parse::parse_failed))]
    ParseFailed {
        path: PathBuf,
    },

    #[error("Syntax error in {}:{line}:{column}: {message}", file.display())]
    #[diagnostic(
        code(awaitly::parse::syntax_error),
        help("The analyzer only accepts sources that parse without errors.")
    )]
    SyntaxError {
        message: String,
        file: PathBuf,
        line: usize,
        column: usize,
    },
}

impl AnalyzerError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::IoError {
            path: path.into(),
            message: message.into(),
        }
    }
}
