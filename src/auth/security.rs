//! Owner-only storage for persisted credentials
//!
//! The token store follows the same rules as `~/.ssh`: its directory is
//! 0700 and the file itself 0600. Writes go through a sibling temp file so a
//! crash never leaves a half-written token behind.

use crate::error::{Result, UpidError};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

pub const OWNER_ONLY_DIR: u32 = 0o700;
pub const OWNER_ONLY_FILE: u32 = 0o600;

/// Result of inspecting a credentials file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileAccess {
    OwnerOnly,
    /// Group or other users have some access
    Shared { mode: u32 },
    /// Absent, or the platform has no unix modes
    Unknown,
}

impl FileAccess {
    pub fn is_shared(&self) -> bool {
        matches!(self, FileAccess::Shared { .. })
    }
}

/// Inspect who may read `path`
pub fn file_access(path: &Path) -> Result<FileAccess> {
    if !path.exists() {
        return Ok(FileAccess::Unknown);
    }

    #[cfg(unix)]
    {
        let mode = fs::metadata(path)?.permissions().mode() & 0o777;
        if mode & 0o077 == 0 {
            return Ok(FileAccess::OwnerOnly);
        }
        warn!(
            path = %path.display(),
            mode = %format!("{mode:o}"),
            "Credentials file is accessible to other users, run chmod 600"
        );
        Ok(FileAccess::Shared { mode })
    }

    #[cfg(not(unix))]
    {
        Ok(FileAccess::Unknown)
    }
}

fn ensure_private_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| {
        UpidError::configuration(format!("Cannot create {}: {e}", dir.display()))
    })?;
    #[cfg(unix)]
    fs::set_permissions(dir, fs::Permissions::from_mode(OWNER_ONLY_DIR))?;
    Ok(())
}

/// Replace `path` with `content`, readable by the owner only
pub async fn write_private_file(path: &Path, content: &str) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_private_dir(parent)?,
        _ => {}
    }

    let staging = path.with_extension("tmp");
    tokio::fs::write(&staging, content).await?;
    #[cfg(unix)]
    tokio::fs::set_permissions(&staging, fs::Permissions::from_mode(OWNER_ONLY_FILE)).await?;
    tokio::fs::rename(&staging, path).await?;

    debug!(path = %path.display(), "Wrote owner-only file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_private_file_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".upid").join("auth.json");

        write_private_file(&path, "{}").await.unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        assert!(!path.with_extension("tmp").exists());

        #[cfg(unix)]
        {
            assert_eq!(file_access(&path).unwrap(), FileAccess::OwnerOnly);
            let dir_mode = fs::metadata(path.parent().unwrap())
                .unwrap()
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(dir_mode, OWNER_ONLY_DIR);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_world_readable_file_is_shared() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("auth.json");
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        assert_eq!(file_access(&path).unwrap(), FileAccess::Shared { mode: 0o644 });
    }

    #[test]
    fn test_missing_file_is_unknown() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            file_access(&dir.path().join("absent")).unwrap(),
            FileAccess::Unknown
        );
    }
}
