//! Assembly of one `WorkflowIR` per entry point.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use tree_sitter::Node;

use super::classify::{Classifier, FileBindings, ReduceContext};
use super::discover::{declared_name, EntryPoint};
use super::reduce::Reducer;
use super::scope::{extract_parameter_binding, SagaBinding};
use crate::config::AnalyzeOptions;
use crate::diagnostic::SourceLocation;
use crate::frontend::typescript::syntax::{self, named_children, SourceText};
use crate::ir::{
    AnalysisWarning, IdGenerator, SourceKind, WarningCode, WorkflowIR, WorkflowMetadata,
    WorkflowNode,
};

/// Metadata read from the arguments of the entry-point call.
#[derive(Debug, Default)]
struct CallMetadata {
    dependencies: Vec<String>,
    error_types: Vec<String>,
    description: Option<String>,
    markdown: Option<String>,
}

/// Builds workflow IR for the entry points of one source file.
pub struct Assembler<'a, 's> {
    src: SourceText<'s>,
    file_path: &'a str,
    file_name: &'a str,
    options: &'a AnalyzeOptions,
    bindings: &'a FileBindings,
    analyzed_at: DateTime<Utc>,
}

impl<'a, 's> Assembler<'a, 's> {
    pub fn new(
        src: SourceText<'s>,
        file_path: &'a str,
        file_name: &'a str,
        options: &'a AnalyzeOptions,
        bindings: &'a FileBindings,
        analyzed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            src,
            file_path,
            file_name,
            options,
            bindings,
            analyzed_at,
        }
    }

    fn location(&self, node: Node<'_>) -> Option<SourceLocation> {
        self.options
            .include_locations
            .then(|| SourceLocation::of_node(self.file_path, node))
    }

    /// Display name: the assigned variable for definitions, otherwise
    /// `<kind>@<file>:<line>`.
    fn workflow_name(&self, entry: &EntryPoint<'_>) -> String {
        let declared = match entry.kind {
            SourceKind::CreateWorkflow | SourceKind::CreateSagaWorkflow => {
                declared_name(entry.call, self.src)
            }
            SourceKind::Run | SourceKind::RunSaga => None,
        };
        declared.unwrap_or_else(|| {
            format!(
                "{}@{}:{}",
                entry.kind,
                self.file_name,
                entry.call.start_position().row + 1
            )
        })
    }

    /// Reads dependencies and options from the object-literal arguments.
    ///
    /// Definitions take `(deps, options)`; `run` calls only take options.
    fn call_metadata(&self, entry: &EntryPoint<'_>) -> CallMetadata {
        let objects: Vec<Node<'_>> = syntax::call_arguments(entry.call)
            .into_iter()
            .map(syntax::unwrap_transparent)
            .filter(|arg| arg.kind() == "object")
            .collect();
        let (deps, options) = match entry.kind {
            SourceKind::CreateWorkflow | SourceKind::CreateSagaWorkflow => {
                (objects.first(), objects.get(1))
            }
            SourceKind::Run | SourceKind::RunSaga => (None, objects.first()),
        };

        let mut metadata = CallMetadata::default();
        if let Some(deps) = deps {
            metadata.dependencies = self
                .src
                .object_entries(*deps)
                .into_iter()
                .map(|(key, _)| key)
                .collect();
        }
        if let Some(options) = options {
            metadata.description = self
                .src
                .object_property(*options, "description")
                .and_then(|d| self.src.string_literal(d));
            metadata.markdown = self
                .src
                .object_property(*options, "markdown")
                .and_then(|m| self.src.string_literal(m));
            if let Some(errors) = self
                .src
                .object_property(*options, "errors")
                .map(syntax::unwrap_transparent)
                .filter(|e| e.kind() == "array")
            {
                metadata.error_types = named_children(errors)
                    .into_iter()
                    .map(|e| {
                        self.src
                            .string_literal(e)
                            .unwrap_or_else(|| self.src.text(e).to_string())
                    })
                    .collect();
            }
        }
        metadata
    }

    /// Builds the IR for one entry point.
    ///
    /// Returns `None` and records a `CALLBACK_NOT_FOUND` warning when the
    /// entry point has no function-literal callback.
    pub fn assemble(
        &self,
        entry: &EntryPoint<'_>,
        ids: &mut IdGenerator,
        warnings: &mut Vec<AnalysisWarning>,
    ) -> Option<WorkflowIR> {
        let name = self.workflow_name(entry);

        let Some(callback) = entry.callback.filter(|c| syntax::is_function_literal(*c)) else {
            warn!(
                workflow = %name,
                kind = %entry.kind,
                file = self.file_path,
                "no workflow callback found"
            );
            warnings.push(AnalysisWarning {
                code: WarningCode::CallbackNotFound,
                message: format!("`{}` ({}) has no function-literal callback", name, entry.kind),
                location: self.location(entry.call),
            });
            return None;
        };

        let ctx = if entry.kind.is_saga() {
            ReduceContext::saga(SagaBinding::from_callback(callback, self.src), Some(name.clone()))
        } else {
            let step = extract_parameter_binding(callback, self.src, "step")
                .map(|binding| binding.name().to_string())
                .unwrap_or_else(|| "step".to_string());
            ReduceContext::workflow(step, Some(name.clone()))
        };

        let classifier = Classifier::new(self.src, self.bindings);
        let mut reducer = Reducer::new(self.src, self.file_path, self.options, classifier, ids);
        let nodes = reducer.reduce_callback(callback, &ctx);
        let children = reducer.compose(nodes);
        let (stats, workflow_warnings) = reducer.finish();

        let metadata = self.call_metadata(entry);
        debug!(
            workflow = %name,
            kind = %entry.kind,
            file = self.file_path,
            steps = stats.total_steps,
            "assembled workflow"
        );

        Some(WorkflowIR {
            root: WorkflowNode {
                id: ids.next_id("workflow"),
                name,
                source: entry.kind,
                dependencies: metadata.dependencies,
                error_types: metadata.error_types,
                children,
                description: metadata.description,
                markdown: metadata.markdown,
                location: self.location(entry.call),
            },
            metadata: WorkflowMetadata {
                analyzed_at: self.analyzed_at,
                file_path: self.file_path.to_string(),
                warnings: workflow_warnings,
                stats,
            },
            references: Default::default(),
        })
    }
}
