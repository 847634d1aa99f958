//! Workflow analysis: discovery, reduction and assembly.
//!
//! ```text
//! source ──▶ TypeScriptParser ──▶ discover ──▶ Assembler ──▶ WorkflowIR
//!                                                  │
//!                                                  ▼
//!                                   Reducer ◀──▶ Classifier ◀──▶ scope
//! ```

pub mod assemble;
pub mod classify;
pub mod discover;
pub mod options;
pub mod reduce;
pub mod scope;

use std::path::Path;
use chrono::Utc;
use tracing::debug;

use crate::config::AnalyzeOptions;
use crate::diagnostic::AnalyzerError;
use crate::frontend::typescript::{SourceText, TypeScriptParser};
use crate::ir::{Analysis, IdGenerator, WorkflowIR};
use assemble::Assembler;

/// Analyzes workflow sources.
///
/// Owns the parser and the node ID generator. IDs keep increasing across
/// calls to [`Analyzer::analyze`] until [`Analyzer::reset_ids`] is called.
pub struct Analyzer {
    parser: TypeScriptParser,
    ids: IdGenerator,
    options: AnalyzeOptions,
}

impl Analyzer {
    pub fn new(options: AnalyzeOptions) -> Result<Self, AnalyzerError> {
        Ok(Self {
            parser: TypeScriptParser::new()?,
            ids: IdGenerator::new(),
            options,
        })
    }

    /// Restarts node IDs at 1.
    pub fn reset_ids(&mut self) {
        self.ids.reset();
    }

    /// Analyzes one source file.
    ///
    /// Fails only when the source does not parse. Entry points without a
    /// usable callback are reported in [`Analysis::warnings`].
    pub fn analyze(&mut self, source: &str, path: &Path) -> Result<Analysis, AnalyzerError> {
        let parsed = self.parser.parse(source, path)?;
        let root = parsed.root();
        let src = SourceText::new(source);

        let file_path = path.to_string_lossy().into_owned();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_path.clone());

        let bindings = discover::file_bindings(root, src, &self.options);
        let entries = discover::discover(root, src, &self.options);
        let analyzed_at = self.options.analyzed_at.unwrap_or_else(Utc::now);
        let assembler = Assembler::new(
            src,
            &file_path,
            &file_name,
            &self.options,
            &bindings,
            analyzed_at,
        );

        let mut workflows = Vec::new();
        let mut warnings = Vec::new();
        for entry in &entries {
            if let Some(ir) = assembler.assemble(entry, &mut self.ids, &mut warnings) {
                workflows.push(ir);
            }
        }

        if self.options.resolve_references {
            resolve_references(&mut workflows);
        }

        debug!(
            file = %file_path,
            workflows = workflows.len(),
            warnings = warnings.len(),
            "analyzed source"
        );
        Ok(Analysis {
            file_path,
            workflows,
            warnings,
        })
    }
}

/// Copies every same-file workflow reached through a resolved reference
/// into the referencing workflow's `references`.
///
/// Copies do not carry their own references, so cycles stay finite.
fn resolve_references(workflows: &mut [WorkflowIR]) {
    let targets: Vec<WorkflowIR> = workflows
        .iter()
        .map(|ir| WorkflowIR {
            references: Default::default(),
            ..ir.clone()
        })
        .collect();

    for ir in workflows.iter_mut() {
        for name in ir.referenced_workflows() {
            if name == ir.root.name {
                continue;
            }
            if let Some(target) = targets.iter().find(|t| t.root.name == name) {
                ir.references.insert(name, target.clone());
            }
        }
    }
}
