//! Thin wrapper for shelling out to the source and target system CLIs.
//!
//! No retry or timeout policy: a failing tool is reported once, with its
//! captured stderr, and the caller decides what to do.

use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

/// Failure invoking an external tool.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{binary} executable is not available in PATH")]
    NotInstalled { binary: String },

    #[error("command failed: {command} ({diagnostics})")]
    CommandFailed {
        command: String,
        diagnostics: String,
    },
}

/// Run `binary args...` and return its stdout on success.
pub(crate) fn run_tool(
    binary: &str,
    args: &[OsString],
    cwd: Option<&Path>,
) -> Result<String, ToolError> {
    let rendered = render_command(binary, args);
    tracing::debug!(command = %rendered, "running external tool");

    let mut command = Command::new(binary);
    command.args(args);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    let output = command.output().map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            ToolError::NotInstalled {
                binary: binary.to_string(),
            }
        } else {
            ToolError::CommandFailed {
                command: rendered.clone(),
                diagnostics: err.to_string(),
            }
        }
    })?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let diagnostics = if stderr.is_empty() {
            format!("exit status {:?}", output.status.code())
        } else {
            stderr
        };
        Err(ToolError::CommandFailed {
            command: rendered,
            diagnostics,
        })
    }
}

fn render_command(binary: &str, args: &[OsString]) -> String {
    let mut parts = vec![binary.to_string()];
    parts.extend(args.iter().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_reports_not_installed() {
        let err = run_tool("handover-definitely-not-a-real-tool", &[], None)
            .expect_err("missing binary must fail");
        assert!(matches!(err, ToolError::NotInstalled { .. }));
    }

    #[test]
    fn render_command_joins_arguments() {
        let args = vec![OsString::from("show"), OsString::from("-json")];
        assert_eq!(render_command("terraform", &args), "terraform show -json");
    }
}
