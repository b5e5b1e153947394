//! Sandbox policy management
//!
//! Two independent checks live here: a denylist of destructive shell
//! patterns, and containment of file paths inside a base directory.

use regex::Regex;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::SandboxError;

/// Built-in destructive command patterns, paired with a short label used in
/// rejection messages.
const DEFAULT_DENIED: &[(&str, &str)] = &[
    (
        "recursive delete",
        r"\brm\s+(?:[^\s;&|]+\s+)*?(?:-[a-zA-Z]*[rR][a-zA-Z]*|--recursive)(?:\s|$)",
    ),
    ("recursive delete", r"--no-preserve-root"),
    ("filesystem format", r"\bmkfs(?:\.[a-z0-9]+)?\b"),
    ("raw device write", r"\bdd\s+[^;&|]*\bof=/dev/"),
    ("raw device write", r"\bdd\s+[^;&|]*\bif=/dev/(?:zero|random|urandom)\b"),
    (
        "raw device write",
        r">\s*/dev/(?:sd[a-z]|hd[a-z]|nvme\d|xvd[a-z]|vd[a-z]|mmcblk\d|disk\d)",
    ),
    (
        "privilege escalation",
        r"(?:^|[;&|(`]|\$\()\s*(?:(?:env|nohup|exec|command|nice|time|xargs)\b[^;&|`]*?\s)?(?:sudo|doas|su)(?:\s|$|`)",
    ),
    (
        "write to protected directory",
        r"(?:>{1,2}|\btee\s+(?:-a\s+)?)\s*/(?:etc|root|boot|usr|bin|sbin|lib|lib64|sys|proc)(?:/|\s|$)",
    ),
    (
        "write to protected directory",
        r"\b(?:cp|mv|install|ln|rsync)\s+[^;&|]*\s/(?:etc|root|boot|usr|bin|sbin|lib|lib64)(?:/[^\s;&|]*)?\s*(?:$|[;&|])",
    ),
    (
        "write to protected directory",
        r"\b(?:cp|mv|install|ln)\s+[^;&|]*(?:-t\s*|--target-directory=)/(?:etc|root|boot|usr|bin|sbin|lib|lib64)(?:/|\s|$)",
    ),
    (
        "recursive delete",
        r"\bfind\s+/(?:(?:etc|root|boot|usr|bin|sbin|lib|lib64|home|var)[^\s;&|]*)?\s[^;&|]*(?:-delete\b|-exec\s+rm\b)",
    ),
    ("move into filesystem root", r"\bmv\s+[^;&|]*\s/\s*(?:$|[;&|])"),
    ("fork bomb", r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:"),
];

struct DeniedPattern {
    label: String,
    regex: Regex,
}

/// Denylist of shell command patterns
pub struct CommandPolicy {
    patterns: Vec<DeniedPattern>,
}

impl CommandPolicy {
    /// Policy with the built-in destructive patterns only
    pub fn new() -> Self {
        let patterns = DEFAULT_DENIED
            .iter()
            .filter_map(|(label, pattern)| match Regex::new(pattern) {
                Ok(regex) => Some(DeniedPattern {
                    label: (*label).to_string(),
                    regex,
                }),
                Err(e) => {
                    warn!("Skipping invalid built-in pattern {}: {}", pattern, e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    /// Add user-supplied patterns on top of the built-in set
    pub fn with_extra_patterns<I, S>(mut self, patterns: I) -> Result<Self, SandboxError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            let pattern = pattern.as_ref();
            self.patterns.push(DeniedPattern {
                label: format!("matches denied pattern '{}'", pattern),
                regex: Regex::new(pattern)?,
            });
        }
        Ok(self)
    }

    /// Reject a command that matches any denied pattern
    pub fn check(&self, command: &str) -> Result<(), SandboxError> {
        if let Some(hit) = self.patterns.iter().find(|p| p.regex.is_match(command)) {
            debug!("Command rejected ({}): {}", hit.label, command);
            return Err(SandboxError::PolicyViolation(format!(
                "{}: {}",
                hit.label, command
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapse `.` and `..` without touching the filesystem
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `requested` against `base` and require the result to stay inside it.
///
/// Relative paths are joined onto the base, then normalized lexically. The
/// longest existing ancestor is canonicalized so a symlink inside the base
/// cannot point the final path somewhere else. The target itself may not
/// exist yet (for writes).
pub fn resolve_within(base: &Path, requested: &Path) -> Result<PathBuf, SandboxError> {
    let base = dunce::canonicalize(base)?;
    let joined = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        base.join(requested)
    };
    let normalized = normalize_lexically(&joined);

    let escape = || SandboxError::PathEscape {
        path: requested.display().to_string(),
        base: base.display().to_string(),
    };

    if !normalized.starts_with(&base) {
        return Err(escape());
    }

    let existing = normalized
        .ancestors()
        .find(|p| p.symlink_metadata().is_ok())
        .unwrap_or(base.as_path());
    let canonical = match dunce::canonicalize(existing) {
        Ok(canonical) => canonical,
        // A dangling symlink has no target to check
        Err(_) if existing.is_symlink() => {
            debug!("Dangling symlink {:?} in requested path", existing);
            return Err(escape());
        }
        Err(e) => return Err(e.into()),
    };
    let resolved = match normalized.strip_prefix(existing) {
        Ok(rest) if !rest.as_os_str().is_empty() => canonical.join(rest),
        _ => canonical,
    };

    if !resolved.starts_with(&base) {
        return Err(escape());
    }
    Ok(resolved)
}
