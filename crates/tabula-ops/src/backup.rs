//! Whole-directory backup and restore around risky repository mutations.

use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};
use walkdir::WalkDir;

use crate::error::{OpsError, OpsResult};

/// A copy of a repository directory taken before a mutation.
#[derive(Debug)]
pub struct Backup {
    original: PathBuf,
    copy: PathBuf,
}

impl Backup {
    /// Sibling path used for the backup of `dir` (`<dir>.backup`).
    pub fn path_for(dir: &Path) -> PathBuf {
        let mut name = dir
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".backup");
        dir.with_file_name(name)
    }

    /// Copy `dir` recursively to its backup path, replacing a stale backup.
    pub fn create(dir: &Path) -> OpsResult<Self> {
        let copy = Self::path_for(dir);
        if copy.exists() {
            warn!(path = %copy.display(), "Removing stale backup");
            std::fs::remove_dir_all(&copy)?;
        }

        copy_dir(dir, &copy)?;
        debug!(from = %dir.display(), to = %copy.display(), "Created backup");

        Ok(Self {
            original: dir.to_path_buf(),
            copy,
        })
    }

    pub fn path(&self) -> &Path {
        &self.copy
    }

    /// Replace the mutated directory with the backup.
    pub fn restore(self) -> OpsResult<()> {
        if self.original.exists() {
            std::fs::remove_dir_all(&self.original)?;
        }
        std::fs::rename(&self.copy, &self.original)?;
        debug!(path = %self.original.display(), "Restored backup");
        Ok(())
    }

    /// Drop the backup after a successful mutation.
    pub fn discard(self) -> OpsResult<()> {
        std::fs::remove_dir_all(&self.copy)?;
        Ok(())
    }
}

/// Run `mutation` against `dir` with all-or-nothing semantics.
///
/// On failure the directory is restored to its exact prior content and the
/// mutation's error is returned.
pub fn run_with_backup<T>(dir: &Path, mutation: impl FnOnce() -> OpsResult<T>) -> OpsResult<T> {
    let backup = Backup::create(dir)?;

    match mutation() {
        Ok(value) => {
            if let Err(e) = backup.discard() {
                warn!(error = %e, "Failed to remove backup");
            }
            Ok(value)
        }
        Err(err) => {
            warn!(error = %err, path = %dir.display(), "Mutation failed, restoring backup");
            if let Err(restore_err) = backup.restore() {
                error!(error = %restore_err, path = %dir.display(), "Failed to restore backup");
                return Err(OpsError::with_context(
                    format!("{} (restore failed: {})", err, restore_err),
                    format!("backup kept at {}", Backup::path_for(dir).display()),
                ));
            }
            Err(err)
        }
    }
}

/// Recursively copy `src` into `dst`.
pub fn copy_dir(src: &Path, dst: &Path) -> OpsResult<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| OpsError::with_context("Failed to walk directory", e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| OpsError::with_context("Failed to copy directory", e.to_string()))?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> OpsResult<()> {
    let link = std::fs::read_link(src)?;
    std::os::unix::fs::symlink(link, dst)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> OpsResult<()> {
    std::fs::copy(src, dst)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populate(dir: &Path) {
        std::fs::create_dir_all(dir.join("tables/nested")).unwrap();
        std::fs::write(dir.join("tables/people.csv"), "name\nada\n").unwrap();
        std::fs::write(dir.join("tables/nested/cities.csv"), "city\n").unwrap();
    }

    #[test]
    fn test_backup_path_is_sibling() {
        assert_eq!(
            Backup::path_for(Path::new("/data/repositories/repo")),
            PathBuf::from("/data/repositories/repo.backup")
        );
    }

    #[test]
    fn test_failed_mutation_restores() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("repo");
        populate(&dir);

        let result: OpsResult<()> = run_with_backup(&dir, || {
            std::fs::write(dir.join("tables/people.csv"), "mutated")?;
            std::fs::remove_dir_all(dir.join("tables/nested"))?;
            std::fs::write(dir.join("extra.csv"), "x")?;
            Err(OpsError::NothingToCommit)
        });

        assert!(matches!(result, Err(OpsError::NothingToCommit)));
        assert_eq!(
            std::fs::read_to_string(dir.join("tables/people.csv")).unwrap(),
            "name\nada\n"
        );
        assert!(dir.join("tables/nested/cities.csv").exists());
        assert!(!dir.join("extra.csv").exists());
        assert!(!Backup::path_for(&dir).exists());
    }

    #[test]
    fn test_successful_mutation_discards_backup() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("repo");
        populate(&dir);

        let value = run_with_backup(&dir, || {
            std::fs::write(dir.join("tables/people.csv"), "changed")?;
            Ok(42)
        })
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(
            std::fs::read_to_string(dir.join("tables/people.csv")).unwrap(),
            "changed"
        );
        assert!(!Backup::path_for(&dir).exists());
    }
}
