//! # awaitly analyzer
//!
//! Static analysis of `awaitly` workflow code. Given TypeScript source, the
//! analyzer finds every workflow entry point (`createWorkflow`, `run`,
//! `createSagaWorkflow`, `runSaga`) and reduces its callback to a tree of
//! typed flow nodes without executing anything.
//!
//! ## Architecture
//!
//! ```text
//! Source Code (.ts / .tsx)
//!        │
//!        ▼
//! ┌──────────────┐
//! │   Frontend   │  tree-sitter parse, syntax errors rejected
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │   Discover   │  entry points by callee name and import binding
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │    Reduce    │  statements and call shapes → flow nodes
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │      IR      │  WorkflowIR, serializable with serde
//! └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use awaitly_analyzer::{analyze_source, AnalyzeOptions};
//!
//! let analysis = analyze_source(source, "flows/checkout.ts", &AnalyzeOptions::default())?;
//! for workflow in &analysis.workflows {
//!     println!("{}: {} steps", workflow.name(), workflow.step_count());
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod diagnostic;
pub mod frontend;
pub mod ir;

use std::fs;
use std::path::Path;
use tracing::debug;

pub use analysis::Analyzer;
pub use config::{AnalyzeOptions, DetectMode};
pub use diagnostic::{AnalyzerError, SourceLocation};
pub use ir::{Analysis, AnalysisWarning, FlowNode, SourceKind, WarningCode, WorkflowIR};

/// Analyzes a source string with a fresh ID generator.
pub fn analyze_source(
    source: &str,
    path: impl AsRef<Path>,
    options: &AnalyzeOptions,
) -> Result<Analysis, AnalyzerError> {
    let mut analyzer = Analyzer::new(options.clone())?;
    analyzer.analyze(source, path.as_ref())
}

/// Reads and analyzes one file.
pub fn analyze_file(
    path: impl AsRef<Path>,
    options: &AnalyzeOptions,
) -> Result<Analysis, AnalyzerError> {
    let path = path.as_ref();
    let source = read_source(path)?;
    analyze_source(&source, path, options)
}

/// Analyzes every TypeScript file under `dir`.
///
/// Files are visited in path order; `.d.ts` files and `node_modules` are
/// skipped. Node IDs restart for each file, so a file's output does not
/// depend on its neighbours. The first unreadable or unparsable file aborts
/// the walk.
pub fn analyze_directory(
    dir: impl AsRef<Path>,
    options: &AnalyzeOptions,
) -> Result<Vec<Analysis>, AnalyzerError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(AnalyzerError::io(dir, "not a directory"));
    }

    let mut analyzer = Analyzer::new(options.clone())?;
    let mut analyses = Vec::new();
    for path in frontend::typescript::source_files(dir) {
        let source = read_source(&path)?;
        analyzer.reset_ids();
        let analysis = analyzer.analyze(&source, &path)?;
        debug!(file = %path.display(), workflows = analysis.workflows.len(), "analyzed file");
        analyses.push(analysis);
    }
    Ok(analyses)
}

fn read_source(path: &Path) -> Result<String, AnalyzerError> {
    fs::read_to_string(path).map_err(|e| AnalyzerError::io(path, e.to_string()))
}
