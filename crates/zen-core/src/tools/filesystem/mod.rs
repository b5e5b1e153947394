//! Filesystem tools
//!
//! Both tools resolve their `path` argument against a fixed base directory
//! and refuse anything that lands outside it.

mod read;
mod write;

pub use read::ReadFile;
pub use write::WriteFile;

use serde_json::Value;
use std::path::{Path, PathBuf};
use zen_sandbox::resolve_within;

use crate::error::ToolError;

fn path_arg(args: &Value) -> Result<&str, ToolError> {
    args["path"]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(vec!["path is required".into()]))
}

/// Resolve the `path` argument inside `base`
pub(crate) fn resolve_path_arg(base: &Path, args: &Value) -> Result<PathBuf, ToolError> {
    let requested = path_arg(args)?;
    Ok(resolve_within(base, Path::new(requested))?)
}

/// Path relative to the base, with forward slashes, for tool output
pub(crate) fn display_relative(base: &Path, path: &Path) -> String {
    let base = dunce::canonicalize(base).unwrap_or_else(|_| base.to_path_buf());
    path.strip_prefix(&base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
