//! Input validation for the privileged helper
//!
//! Every name that arrives from a caller passes through here before it is
//! used to build a path or a unit name. The only way to obtain a
//! [`ProfileName`] is [`validate_profile_name`], so downstream code that
//! takes `&ProfileName` cannot be handed an unchecked string.

use crate::error::{HelperError, HelperResult};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Maximum length for diagnostic text taken from child processes
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Extension of the configuration artifact
pub const CONF_EXTENSION: &str = "conf";

/// Extension of the credentials artifact
pub const AUTH_EXTENSION: &str = "auth";

/// A profile name that has passed the allowlist check
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProfileName(String);

impl ProfileName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProfileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Whether a character belongs to the profile name allowlist
pub fn is_allowed_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Validate a profile name
///
/// Names must be non-empty and consist only of ASCII letters, digits,
/// dashes and underscores. This keeps path separators, dots, whitespace
/// and shell metacharacters out of file names and unit names.
pub fn validate_profile_name(name: &str) -> HelperResult<ProfileName> {
    if name.is_empty() {
        return Err(HelperError::InvalidProfileName(
            "Profile name cannot be empty".to_string(),
        ));
    }

    if let Some(c) = name.chars().find(|c| !is_allowed_name_char(*c)) {
        return Err(HelperError::InvalidProfileName(format!(
            "Profile name contains invalid character {:?}",
            c
        )));
    }

    Ok(ProfileName(name.to_string()))
}

/// Validate a username or password destined for the credentials file
///
/// Each value occupies exactly one line, so line breaks and NUL bytes are
/// rejected rather than written.
pub fn validate_credential(field: &str, value: &str) -> HelperResult<()> {
    if value.chars().any(|c| c == '\n' || c == '\r' || c == '\0') {
        return Err(HelperError::InvalidCredentials(format!(
            "{} must be a single line without NUL bytes",
            field
        )));
    }
    Ok(())
}

/// Locations of a profile's two artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePaths {
    pub conf: PathBuf,
    pub auth: PathBuf,
}

/// Compute both artifact paths for `name` and verify they stay inside `base`
///
/// Symlinks are resolved on each artifact (or on its parent when the
/// artifact does not exist yet). The resolved parent must be the resolved
/// base directory itself; a symlinked artifact pointing anywhere else, or a
/// dangling symlink, is rejected.
pub fn resolve_profile_paths(base: &Path, name: &ProfileName) -> HelperResult<ProfilePaths> {
    let base_canonical = base.canonicalize()?;

    let conf = base.join(format!("{}.{}", name, CONF_EXTENSION));
    let auth = base.join(format!("{}.{}", name, AUTH_EXTENSION));

    for path in [&conf, &auth] {
        let parent = resolved_parent(path)?;
        if parent != base_canonical {
            return Err(HelperError::InvalidPath(format!(
                "{:?} resolves outside {:?}",
                path, base_canonical
            )));
        }
    }

    Ok(ProfilePaths { conf, auth })
}

fn resolved_parent(path: &Path) -> HelperResult<PathBuf> {
    let resolved = match path.canonicalize() {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if std::fs::symlink_metadata(path).is_ok() {
                return Err(HelperError::InvalidPath(format!(
                    "{:?} is a dangling symlink",
                    path
                )));
            }
            let parent = path
                .parent()
                .ok_or_else(|| HelperError::InvalidPath(format!("{:?} has no parent", path)))?;
            let file_name = path
                .file_name()
                .ok_or_else(|| HelperError::InvalidPath(format!("{:?} has no file name", path)))?;
            parent.canonicalize()?.join(file_name)
        }
        Err(e) => return Err(e.into()),
    };

    resolved
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| HelperError::InvalidPath(format!("{:?} has no parent", resolved)))
}

/// Trim child-process diagnostics before they are logged
pub fn sanitize_error_message(stderr: &str) -> String {
    let mut sanitized = stderr.trim().to_string();

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let mut cut = MAX_ERROR_MESSAGE_LEN;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str("... (truncated)");
    }

    sanitized
}
