//! Target-system preview output and the collaborators that produce it.

use crate::identity::CandidateImportRecord;
use crate::process::{ToolError, run_tool};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Pending change the preview reports for one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingChange {
    Same,
    Update,
    Replace,
    Create,
    Delete,
    Read,
    Other(String),
}

impl PendingChange {
    /// Classify a preview step operation.
    pub fn from_op(op: &str) -> Self {
        match op {
            "same" => Self::Same,
            "update" => Self::Update,
            "replace" | "create-replacement" | "delete-replaced" => Self::Replace,
            "create" => Self::Create,
            "delete" => Self::Delete,
            "read" => Self::Read,
            other => Self::Other(other.to_string()),
        }
    }

    fn strength(&self) -> u8 {
        match self {
            Self::Same => 0,
            Self::Read | Self::Create | Self::Delete | Self::Other(_) => 1,
            Self::Update => 2,
            Self::Replace => 3,
        }
    }

    /// Whether the change implies the resource already has target state.
    pub fn has_state(&self) -> bool {
        !matches!(self, Self::Create)
    }
}

/// identifier → pending change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviewMap {
    changes: BTreeMap<String, PendingChange>,
}

impl PreviewMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change; when an identifier is already present the stronger
    /// change (replace > update > other > same) is kept.
    pub fn insert(&mut self, identifier: impl Into<String>, change: PendingChange) {
        let identifier = identifier.into();
        match self.changes.get(&identifier) {
            Some(existing) if existing.strength() >= change.strength() => {}
            _ => {
                self.changes.insert(identifier, change);
            }
        }
    }

    pub fn get(&self, identifier: &str) -> Option<&PendingChange> {
        self.changes.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Identifiers whose resources already exist in target state.
    pub fn live_identifiers(&self) -> impl Iterator<Item = &str> {
        self.changes
            .iter()
            .filter(|(_, change)| change.has_state())
            .map(|(identifier, _)| identifier.as_str())
    }

    /// Parse the JSON preview rendering (`{"steps": [{"op", "urn"}]}`).
    pub fn from_preview_json(value: &Value) -> Result<Self, CollaboratorError> {
        let steps = match value.get("steps") {
            None | Some(Value::Null) => return Ok(Self::new()),
            Some(Value::Array(steps)) => steps,
            Some(_) => return Err(CollaboratorError::Parse("`steps` must be an array".to_string())),
        };

        let mut map = Self::new();
        for (idx, step) in steps.iter().enumerate() {
            let urn = step
                .get("urn")
                .and_then(Value::as_str)
                .filter(|urn| !urn.is_empty())
                .ok_or_else(|| CollaboratorError::Parse(format!("steps[{idx}]: missing `urn`")))?;
            let op = step
                .get("op")
                .and_then(Value::as_str)
                .ok_or_else(|| CollaboratorError::Parse(format!("steps[{idx}]: missing `op`")))?;
            map.insert(urn, PendingChange::from_op(op));
        }
        Ok(map)
    }
}

/// Failures from the preview/import collaborator.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("preview output parse error: {0}")]
    Parse(String),

    #[error("preview output unreadable: {0}")]
    Io(String),
}

/// Runs the target system's preview, optionally in import-stub mode.
pub trait PreviewRunner {
    fn preview(
        &self,
        group: &str,
        import_file: Option<&Path>,
    ) -> Result<PreviewMap, CollaboratorError>;

    fn import_candidates(
        &self,
        group: &str,
    ) -> Result<Vec<CandidateImportRecord>, CollaboratorError>;
}

#[derive(Debug, Deserialize)]
struct CandidateFile {
    #[serde(default)]
    resources: Vec<CandidateImportRecord>,
}

/// Parse an import-stub file (`{"resources": [{"type", "name", ...}]}`).
pub fn parse_candidates(text: &str) -> Result<Vec<CandidateImportRecord>, CollaboratorError> {
    let file: CandidateFile =
        serde_json::from_str(text).map_err(|e| CollaboratorError::Parse(e.to_string()))?;
    Ok(file.resources)
}

/// Reads previously captured preview and candidate files.
#[derive(Debug, Clone, Default)]
pub struct JsonFilePreview {
    preview_path: Option<PathBuf>,
    candidates_path: Option<PathBuf>,
}

impl JsonFilePreview {
    pub fn new(preview_path: Option<PathBuf>, candidates_path: Option<PathBuf>) -> Self {
        Self {
            preview_path,
            candidates_path,
        }
    }
}

fn read_text(path: &Path) -> Result<String, CollaboratorError> {
    fs::read_to_string(path).map_err(|e| CollaboratorError::Io(format!("{}: {e}", path.display())))
}

impl PreviewRunner for JsonFilePreview {
    fn preview(
        &self,
        _group: &str,
        _import_file: Option<&Path>,
    ) -> Result<PreviewMap, CollaboratorError> {
        let Some(path) = &self.preview_path else {
            return Ok(PreviewMap::new());
        };
        let text = read_text(path)?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| CollaboratorError::Parse(format!("{}: {e}", path.display())))?;
        PreviewMap::from_preview_json(&value)
    }

    fn import_candidates(
        &self,
        _group: &str,
    ) -> Result<Vec<CandidateImportRecord>, CollaboratorError> {
        match &self.candidates_path {
            Some(path) => parse_candidates(&read_text(path)?),
            None => Ok(Vec::new()),
        }
    }
}

/// Invokes the target system CLI (`<binary> preview --json --stack <group>`).
#[derive(Debug, Clone)]
pub struct CommandPreview {
    binary: String,
    program_dir: PathBuf,
    stub_path: PathBuf,
}

impl CommandPreview {
    pub fn new(
        binary: impl Into<String>,
        program_dir: impl Into<PathBuf>,
        stub_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            binary: binary.into(),
            program_dir: program_dir.into(),
            stub_path: stub_path.into(),
        }
    }
}

impl PreviewRunner for CommandPreview {
    fn preview(
        &self,
        group: &str,
        import_file: Option<&Path>,
    ) -> Result<PreviewMap, CollaboratorError> {
        let mut args = vec![
            OsString::from("preview"),
            OsString::from("--json"),
            OsString::from("--stack"),
            OsString::from(group),
        ];
        if let Some(import_file) = import_file {
            args.push(OsString::from("--import-file"));
            args.push(import_file.as_os_str().to_os_string());
        }
        let stdout = run_tool(&self.binary, &args, Some(&self.program_dir))?;
        let value: Value =
            serde_json::from_str(&stdout).map_err(|e| CollaboratorError::Parse(e.to_string()))?;
        PreviewMap::from_preview_json(&value)
    }

    fn import_candidates(
        &self,
        group: &str,
    ) -> Result<Vec<CandidateImportRecord>, CollaboratorError> {
        let args = vec![
            OsString::from("preview"),
            OsString::from("--stack"),
            OsString::from(group),
            OsString::from("--import-file"),
            self.stub_path.as_os_str().to_os_string(),
        ];
        run_tool(&self.binary, &args, Some(&self.program_dir))?;
        parse_candidates(&read_text(&self.stub_path)?)
    }
}
