//! Profile storage
//!
//! A profile is two files directly inside the base directory:
//! `<name>.conf` (0644) and `<name>.auth` (0600). Published files are never
//! updated; they are only removed to roll back an install that did not
//! complete.
//!
//! Each file is written to a hidden temporary in the same directory and
//! then published with `link(2)`, which fails if the final name already
//! exists. A half-written file therefore never carries a profile's name,
//! and two concurrent installs of the same name cannot both succeed.

use std::fs::Permissions;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{HelperError, HelperResult};
use crate::validation::{resolve_profile_paths, ProfileName, ProfilePaths, CONF_EXTENSION};

/// Credentials file mode
pub const AUTH_FILE_MODE: u32 = 0o600;

/// Configuration file mode
pub const CONF_FILE_MODE: u32 = 0o644;

/// Credential directive appended to every installed configuration
pub const CREDENTIAL_DIRECTIVE: &str = "auth-user-pass";

/// Profile files under one base directory
#[derive(Debug, Clone)]
pub struct ProfileStore {
    base_dir: PathBuf,
}

impl ProfileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Artifact paths for `name`, checked to stay inside the base directory
    pub fn paths(&self, name: &ProfileName) -> HelperResult<ProfilePaths> {
        resolve_profile_paths(&self.base_dir, name)
    }

    /// Whether either artifact of `name` is present
    pub async fn exists(&self, name: &ProfileName) -> HelperResult<bool> {
        let paths = self.paths(name)?;
        Ok(entry_exists(&paths.conf).await? || entry_exists(&paths.auth).await?)
    }

    /// Whether the configuration artifact of `name` is present
    pub async fn conf_exists(&self, name: &ProfileName) -> HelperResult<bool> {
        let paths = self.paths(name)?;
        entry_exists(&paths.conf).await
    }

    /// Write a new profile
    ///
    /// `sanitized` must already have passed the directive sanitizer. Fails
    /// with `PROFILE_EXISTS` if either artifact is already present.
    pub async fn install(
        &self,
        name: &ProfileName,
        sanitized: &str,
        username: &str,
        password: &str,
    ) -> HelperResult<ProfilePaths> {
        let paths = self.paths(name)?;

        if entry_exists(&paths.conf).await? || entry_exists(&paths.auth).await? {
            return Err(HelperError::ProfileExists(name.to_string()));
        }

        write_profile(&paths, name, sanitized, username, password).await?;

        info!("Installed profile {} in {:?}", name, self.base_dir);
        Ok(paths)
    }

    /// Remove the artifacts published by an install that could not be
    /// completed
    ///
    /// Only call this with paths returned by [`ProfileStore::install`] in the
    /// same request; those files were created exclusively by that call.
    pub async fn rollback(&self, paths: &ProfilePaths) {
        for path in [&paths.conf, &paths.auth] {
            match fs::remove_file(path).await {
                Ok(()) => debug!("Removed {:?}", path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {:?} during rollback: {}", path, e),
            }
        }
    }

    /// Names of all profiles with a configuration file, sorted
    pub async fn list(&self) -> HelperResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if path.extension().and_then(|e| e.to_str()) != Some(CONF_EXTENSION) {
                continue;
            }

            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) if !stem.is_empty() && !stem.starts_with('.') => {
                    names.push(stem.to_string());
                }
                _ => {}
            }
        }

        names.sort();
        debug!("Found {} profiles in {:?}", names.len(), self.base_dir);
        Ok(names)
    }
}

/// Configuration text as written to disk
pub fn render_conf(sanitized: &str, auth_path: &Path) -> String {
    format!(
        "{}\n{} {}\n",
        sanitized,
        CREDENTIAL_DIRECTIVE,
        auth_path.display()
    )
}

/// Publish the credentials file, then the configuration pointing at it
///
/// If the configuration cannot be published, the credentials file written
/// here is removed again.
async fn write_profile(
    paths: &ProfilePaths,
    name: &ProfileName,
    sanitized: &str,
    username: &str,
    password: &str,
) -> HelperResult<()> {
    let credentials = format!("{}\n{}\n", username, password);
    publish(&paths.auth, credentials.as_bytes(), AUTH_FILE_MODE, name).await?;

    let conf = render_conf(sanitized, &paths.auth);
    if let Err(e) = publish(&paths.conf, conf.as_bytes(), CONF_FILE_MODE, name).await {
        if let Err(cleanup) = fs::remove_file(&paths.auth).await {
            warn!("Failed to remove {:?} after aborted install: {}", paths.auth, cleanup);
        }
        return Err(e);
    }

    Ok(())
}

async fn entry_exists(path: &Path) -> HelperResult<bool> {
    match fs::symlink_metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Publish `contents` at `target` with `mode`, failing if `target` exists
async fn publish(
    target: &Path,
    contents: &[u8],
    mode: u32,
    name: &ProfileName,
) -> HelperResult<()> {
    let (dir, file_name) = match (target.parent(), target.file_name()) {
        (Some(dir), Some(file_name)) => (dir, file_name),
        _ => {
            return Err(HelperError::InvalidPath(format!(
                "{:?} is not a file path",
                target
            )))
        }
    };

    let tmp = dir.join(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        Uuid::new_v4().simple()
    ));

    let result = match write_new_file(&tmp, contents, mode).await {
        Ok(()) => fs::hard_link(&tmp, target).await,
        Err(e) => Err(e),
    };

    if let Err(e) = fs::remove_file(&tmp).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Failed to remove temporary file {:?}: {}", tmp, e);
        }
    }

    match result {
        Ok(()) => {
            debug!("Published {:?} with mode {:o}", target, mode);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(HelperError::ProfileExists(name.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

async fn write_new_file(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(path)
        .await?;

    file.write_all(contents).await?;
    // The creation mode is filtered by the umask
    file.set_permissions(Permissions::from_mode(mode)).await?;
    file.sync_all().await
}
