//! TypeScript frontend for the analyzer.

pub mod parser;
pub mod syntax;

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub use parser::{ParsedSource, TypeScriptParser};
pub use syntax::SourceText;

/// File extensions analyzed when walking a directory.
/// Plain JavaScript parses with the TypeScript grammars too.
pub const EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

/// Collects analyzable source files under `dir` in a stable order.
///
/// Declaration files (`.d.ts`) and anything under `node_modules` are skipped.
pub fn source_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != "node_modules")
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|path| path.is_file() && is_analyzable(path))
        .collect();
    files.sort();
    files
}

fn is_analyzable(path: &Path) -> bool {
    let has_extension = path
        .extension()
        .map(|ext| EXTENSIONS.contains(&ext.to_string_lossy().as_ref()))
        .unwrap_or(false);
    has_extension && !path.to_string_lossy().ends_with(".d.ts")
}
