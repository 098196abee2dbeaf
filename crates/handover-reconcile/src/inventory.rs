//! Source-system inventory: flatten a nested state rendering into resource
//! descriptors.
//!
//! The snapshot is the JSON rendering of a state file:
//!
//! ```text
//! values.root_module
//!     ├─ resources[]           (own resources, discovery order)
//!     └─ child_modules[]       (recursed depth-first, same shape)
//! ```
//!
//! Data sources (`mode = "data"`) are read-only and never part of the
//! migration, so they are dropped here.

use crate::process::{ToolError, run_tool};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

const MANAGED_MODE: &str = "managed";
const SUPPORTED_FORMAT_MAJOR: &str = "1";

/// One resource as seen by the source system.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescriptor {
    pub address: String,
    /// Source resource type, e.g. `aws_s3_bucket`.
    pub kind: String,
    /// Resource name from the declaration, without index.
    pub name: String,
    pub index: Option<String>,
    /// Short provider name, e.g. `aws`.
    pub provider_namespace: String,
    pub is_managed: bool,
    pub attributes: Map<String, Value>,
}

impl ResourceDescriptor {
    /// Name to use on the target side: the declared name, suffixed with the
    /// instance key for counted or keyed resources.
    pub fn logical_name(&self) -> String {
        match &self.index {
            Some(index) => format!("{}-{}", self.name, index),
            None => self.name.clone(),
        }
    }

    /// Provider-side id (`id` attribute), which the target needs to import.
    pub fn import_id(&self) -> Option<&str> {
        self.attributes
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }
}

/// Raw state rendering as produced by the source system.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot(Value);

impl Snapshot {
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn from_json_str(origin: &str, text: &str) -> Result<Self, InventoryError> {
        serde_json::from_str(text)
            .map(Self)
            .map_err(|e| InventoryError::Parse {
                pointer: String::new(),
                message: format!("{origin}: {e}"),
            })
    }

    pub fn value(&self) -> &Value {
        &self.0
    }
}

/// Errors from reading or flattening an inventory.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("inventory unreadable: {0}")]
    Io(String),

    #[error("inventory parse error at `{pointer}`: {message}")]
    Parse { pointer: String, message: String },

    #[error("unsupported inventory format version: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl InventoryError {
    fn parse(pointer: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            pointer: pointer.to_string(),
            message: message.into(),
        }
    }
}

/// Flatten a snapshot into managed resources, depth-first, discovery order.
///
/// An absent snapshot, or one without `values`, is an empty inventory.
pub fn list_managed_resources(
    snapshot: Option<&Snapshot>,
) -> Result<Vec<ResourceDescriptor>, InventoryError> {
    let Some(snapshot) = snapshot else {
        return Ok(Vec::new());
    };
    let root = snapshot
        .value()
        .as_object()
        .ok_or_else(|| InventoryError::parse("", "snapshot must be a JSON object"))?;

    if let Some(version) = root.get("format_version") {
        let version = version
            .as_str()
            .ok_or_else(|| InventoryError::parse("/format_version", "must be a string"))?;
        if version.split('.').next() != Some(SUPPORTED_FORMAT_MAJOR) {
            return Err(InventoryError::Unsupported(version.to_string()));
        }
    }

    let values = match root.get("values") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(values) => values
            .as_object()
            .ok_or_else(|| InventoryError::parse("/values", "must be an object"))?,
    };
    let root_module = match values.get("root_module") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(module) => module,
    };

    let mut out = Vec::new();
    let mut seen = BTreeSet::new();
    collect_module(root_module, "/values/root_module", &mut out, &mut seen)?;
    Ok(out)
}

fn collect_module(
    module: &Value,
    pointer: &str,
    out: &mut Vec<ResourceDescriptor>,
    seen: &mut BTreeSet<String>,
) -> Result<(), InventoryError> {
    let module = module
        .as_object()
        .ok_or_else(|| InventoryError::parse(pointer, "module must be an object"))?;

    if let Some(resources) = module.get("resources") {
        let resources = resources.as_array().ok_or_else(|| {
            InventoryError::parse(&format!("{pointer}/resources"), "must be an array")
        })?;
        for (idx, resource) in resources.iter().enumerate() {
            let resource_pointer = format!("{pointer}/resources/{idx}");
            let descriptor = parse_resource(resource, &resource_pointer)?;
            if !descriptor.is_managed {
                continue;
            }
            if !seen.insert(descriptor.address.clone()) {
                return Err(InventoryError::parse(
                    &resource_pointer,
                    format!("duplicate address `{}`", descriptor.address),
                ));
            }
            out.push(descriptor);
        }
    }

    if let Some(children) = module.get("child_modules") {
        let children = children.as_array().ok_or_else(|| {
            InventoryError::parse(&format!("{pointer}/child_modules"), "must be an array")
        })?;
        for (idx, child) in children.iter().enumerate() {
            collect_module(child, &format!("{pointer}/child_modules/{idx}"), out, seen)?;
        }
    }

    Ok(())
}

fn parse_resource(resource: &Value, pointer: &str) -> Result<ResourceDescriptor, InventoryError> {
    let resource = resource
        .as_object()
        .ok_or_else(|| InventoryError::parse(pointer, "resource must be an object"))?;

    let required = |field: &str| -> Result<String, InventoryError> {
        resource
            .get(field)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                InventoryError::parse(pointer, format!("missing string field `{field}`"))
            })
    };

    let address = required("address")?;
    let kind = required("type")?;
    let name = resource
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| last_address_segment(&address));
    let mode = resource
        .get("mode")
        .and_then(Value::as_str)
        .unwrap_or(MANAGED_MODE);
    let index = match resource.get("index") {
        None | Some(Value::Null) => None,
        Some(Value::String(key)) => Some(key.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(_) => {
            return Err(InventoryError::parse(
                pointer,
                "`index` must be a string or number",
            ));
        }
    };
    let provider_namespace = resource
        .get("provider_name")
        .and_then(Value::as_str)
        .and_then(|p| p.rsplit('/').next())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| kind.split('_').next().unwrap_or_default().to_string());
    let attributes = match resource.get("values") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(values)) => values.clone(),
        Some(_) => return Err(InventoryError::parse(pointer, "`values` must be an object")),
    };

    Ok(ResourceDescriptor {
        address,
        kind,
        name,
        index,
        provider_namespace,
        is_managed: mode == MANAGED_MODE,
        attributes,
    })
}

fn last_address_segment(address: &str) -> String {
    let base = address.split('[').next().unwrap_or(address);
    base.rsplit('.').next().unwrap_or(base).to_string()
}

/// Reads a live inventory snapshot from a state location.
pub trait InventoryReader {
    /// `Ok(None)` means the location holds no state yet.
    fn read(&self, location: &Path) -> Result<Option<Snapshot>, InventoryError>;
}

/// Read a snapshot and flatten it in one step.
pub fn read_inventory(
    reader: &dyn InventoryReader,
    location: &Path,
) -> Result<Vec<ResourceDescriptor>, InventoryError> {
    let snapshot = reader.read(location)?;
    let resources = list_managed_resources(snapshot.as_ref())?;
    tracing::debug!(
        location = %location.display(),
        resources = resources.len(),
        "read live inventory"
    );
    Ok(resources)
}

/// Reads a pre-rendered JSON snapshot from disk. A blank file is an empty
/// state.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFileInventory;

impl InventoryReader for JsonFileInventory {
    fn read(&self, location: &Path) -> Result<Option<Snapshot>, InventoryError> {
        let text = fs::read_to_string(location)
            .map_err(|e| InventoryError::Io(format!("{}: {e}", location.display())))?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Snapshot::from_json_str(&location.display().to_string(), &text).map(Some)
    }
}

/// Renders the snapshot by invoking the source system's CLI
/// (`<binary> show -json <state>`).
#[derive(Debug, Clone)]
pub struct CommandInventory {
    binary: String,
    working_dir: Option<PathBuf>,
}

impl CommandInventory {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl Default for CommandInventory {
    fn default() -> Self {
        Self::new("terraform")
    }
}

impl InventoryReader for CommandInventory {
    fn read(&self, location: &Path) -> Result<Option<Snapshot>, InventoryError> {
        let args = vec![
            OsString::from("show"),
            OsString::from("-json"),
            location.as_os_str().to_os_string(),
        ];
        let stdout = run_tool(&self.binary, &args, self.working_dir.as_deref())?;
        if stdout.trim().is_empty() {
            return Ok(None);
        }
        Snapshot::from_json_str(&location.display().to_string(), &stdout).map(Some)
    }
}
