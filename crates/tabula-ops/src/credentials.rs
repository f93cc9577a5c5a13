//! Per-repository credential storage and the resolution contract shared by
//! every remote-touching operation.
//!
//! Explicit credentials win over stored ones; with neither available the
//! operation fails with [`OpsError::NoCredentialsProvided`]. Explicit
//! credentials are persisted only after the operation succeeds, and stored
//! credentials are never cleared automatically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tabula_core::Credentials;
use tabula_git::Auth;
use tracing::debug;

use crate::error::{OpsError, OpsResult};

/// Persists credentials keyed by repository id.
pub trait CredentialStore: Send + Sync {
    fn get(&self, repository_id: &str) -> OpsResult<Option<Credentials>>;

    fn set(&self, repository_id: &str, credentials: &Credentials) -> OpsResult<()>;

    fn delete(&self, repository_id: &str) -> OpsResult<()>;
}

// =============================================================================
// Memory Store
// =============================================================================

/// Process-local store, mostly useful for tests and one-shot commands.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> OpsResult<std::sync::MutexGuard<'_, HashMap<String, Credentials>>> {
        self.entries
            .lock()
            .map_err(|_| OpsError::CredentialStore("credential store lock poisoned".into()))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, repository_id: &str) -> OpsResult<Option<Credentials>> {
        Ok(self.lock()?.get(repository_id).cloned())
    }

    fn set(&self, repository_id: &str, credentials: &Credentials) -> OpsResult<()> {
        self.lock()?
            .insert(repository_id.to_string(), credentials.clone());
        Ok(())
    }

    fn delete(&self, repository_id: &str) -> OpsResult<()> {
        self.lock()?.remove(repository_id);
        Ok(())
    }
}

// =============================================================================
// File Store
// =============================================================================

/// JSON file mapping repository ids to credentials.
///
/// The file is created with owner-only permissions on unix. Contents are not
/// encrypted; platforms with a keychain should provide their own store.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> OpsResult<HashMap<String, Credentials>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&contents).map_err(|e| {
            OpsError::CredentialStore(format!("{}: {}", self.path.display(), e))
        })
    }

    fn write(&self, entries: &HashMap<String, Credentials>) -> OpsResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, contents)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn lock(&self) -> OpsResult<std::sync::MutexGuard<'_, ()>> {
        self.guard
            .lock()
            .map_err(|_| OpsError::CredentialStore("credential store lock poisoned".into()))
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, repository_id: &str) -> OpsResult<Option<Credentials>> {
        let _guard = self.lock()?;
        Ok(self.read()?.remove(repository_id))
    }

    fn set(&self, repository_id: &str, credentials: &Credentials) -> OpsResult<()> {
        let _guard = self.lock()?;
        let mut entries = self.read()?;
        entries.insert(repository_id.to_string(), credentials.clone());
        self.write(&entries)?;
        debug!(repository = repository_id, "Stored credentials");
        Ok(())
    }

    fn delete(&self, repository_id: &str) -> OpsResult<()> {
        let _guard = self.lock()?;
        let mut entries = self.read()?;
        if entries.remove(repository_id).is_some() {
            self.write(&entries)?;
        }
        Ok(())
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Credentials chosen for one operation, remembering where they came from.
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    pub credentials: Credentials,
    /// Supplied by the caller rather than read from the store.
    pub explicit: bool,
}

impl ResolvedCredentials {
    /// Explicit credentials, else stored ones, else `None`.
    pub fn resolve(
        store: &dyn CredentialStore,
        repository_id: &str,
        explicit: Option<Credentials>,
    ) -> OpsResult<Option<Self>> {
        if let Some(credentials) = explicit {
            return Ok(Some(Self {
                credentials,
                explicit: true,
            }));
        }
        Ok(store.get(repository_id)?.map(|credentials| Self {
            credentials,
            explicit: false,
        }))
    }

    /// Like [`resolve`](Self::resolve) but fails when nothing is available.
    pub fn require(
        store: &dyn CredentialStore,
        repository_id: &str,
        explicit: Option<Credentials>,
    ) -> OpsResult<Self> {
        Self::resolve(store, repository_id, explicit)?.ok_or(OpsError::NoCredentialsProvided)
    }

    /// Persist explicitly supplied credentials after a successful operation.
    pub fn remember(&self, store: &dyn CredentialStore, repository_id: &str) -> OpsResult<()> {
        if self.explicit {
            store.set(repository_id, &self.credentials)?;
        }
        Ok(())
    }

    /// Callback session offering these credentials.
    pub fn auth(&self) -> Auth {
        Auth::new(Some(self.credentials.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_credentials_win() {
        let store = MemoryCredentialStore::new();
        store
            .set("repo", &Credentials::new("stored", "old"))
            .unwrap();

        let resolved =
            ResolvedCredentials::require(&store, "repo", Some(Credentials::new("alice", "new")))
                .unwrap();
        assert!(resolved.explicit);
        assert_eq!(resolved.credentials.username, "alice");

        let resolved = ResolvedCredentials::require(&store, "repo", None).unwrap();
        assert!(!resolved.explicit);
        assert_eq!(resolved.credentials.username, "stored");
    }

    #[test]
    fn test_missing_credentials() {
        let store = MemoryCredentialStore::new();
        assert!(ResolvedCredentials::resolve(&store, "repo", None)
            .unwrap()
            .is_none());
        assert!(matches!(
            ResolvedCredentials::require(&store, "repo", None),
            Err(OpsError::NoCredentialsProvided)
        ));
    }

    #[test]
    fn test_remember_only_persists_explicit() {
        let store = MemoryCredentialStore::new();
        let stored = ResolvedCredentials {
            credentials: Credentials::new("bob", "pw"),
            explicit: false,
        };
        stored.remember(&store, "repo").unwrap();
        assert!(store.get("repo").unwrap().is_none());

        let explicit = ResolvedCredentials {
            explicit: true,
            ..stored
        };
        explicit.remember(&store, "repo").unwrap();
        assert_eq!(store.get("repo").unwrap().unwrap().username, "bob");
    }

    #[test]
    fn test_file_store_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = FileCredentialStore::new(temp.path().join("nested/credentials.json"));

        assert!(store.get("repo").unwrap().is_none());
        store.set("repo", &Credentials::new("alice", "token")).unwrap();
        store.set("other", &Credentials::new("bob", "pw")).unwrap();

        let reopened = FileCredentialStore::new(store.path());
        assert_eq!(reopened.get("repo").unwrap().unwrap().password, "token");

        reopened.delete("repo").unwrap();
        assert!(reopened.get("repo").unwrap().is_none());
        assert!(reopened.get("other").unwrap().is_some());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
