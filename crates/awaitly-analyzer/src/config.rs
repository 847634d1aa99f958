//! Analyzer configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ir::SourceKind;

/// Which discovery passes run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DetectMode {
    #[default]
    All,
    CreateWorkflow,
    Run,
    CreateSagaWorkflow,
    RunSaga,
}

impl DetectMode {
    /// Whether entry points of the given kind are discovered in this mode.
    pub fn includes(self, kind: SourceKind) -> bool {
        match self {
            DetectMode::All => true,
            DetectMode::CreateWorkflow => kind == SourceKind::CreateWorkflow,
            DetectMode::Run => kind == SourceKind::Run,
            DetectMode::CreateSagaWorkflow => kind == SourceKind::CreateSagaWorkflow,
            DetectMode::RunSaga => kind == SourceKind::RunSaga,
        }
    }
}

/// Options for a single analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzeOptions {
    /// Attach source locations to every node.
    pub include_locations: bool,

    /// Restrict which entry points are discovered.
    pub detect: DetectMode,

    /// Treat `run` / `runSaga` as imported even without an import statement.
    /// Used for documentation snippets where imports are elided.
    pub assume_imported: bool,

    /// Emit `unknown` nodes for statement kinds the reducer does not handle.
    pub report_unknown_statements: bool,

    /// Fill `references` with the IR of same-file workflows that are referenced.
    pub resolve_references: bool,

    /// Timestamp recorded in workflow metadata. Defaults to the current time.
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            include_locations: true,
            detect: DetectMode::All,
            assume_imported: false,
            report_unknown_statements: false,
            resolve_references: false,
            analyzed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let options: AnalyzeOptions = serde_json::from_str("{}").unwrap();
        assert!(options.include_locations);
        assert_eq!(options.detect, DetectMode::All);
        assert!(!options.assume_imported);
        assert!(options.analyzed_at.is_none());
    }

    #[test]
    fn test_camel_case_fields() {
        let options: AnalyzeOptions = serde_json::from_str(
            r#"{ "detect": "runSaga", "assumeImported": true, "includeLocations": false }"#,
        )
        .unwrap();
        assert_eq!(options.detect, DetectMode::RunSaga);
        assert!(options.assume_imported);
        assert!(!options.include_locations);
    }

    #[test]
    fn test_detect_mode_filters_kinds() {
        assert!(DetectMode::All.includes(SourceKind::RunSaga));
        assert!(DetectMode::Run.includes(SourceKind::Run));
        assert!(!DetectMode::Run.includes(SourceKind::CreateWorkflow));
        assert!(!DetectMode::CreateWorkflow.includes(SourceKind::CreateSagaWorkflow));
    }
}
