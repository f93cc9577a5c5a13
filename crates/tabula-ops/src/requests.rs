//! Request DTOs for operations.
//!
//! Each request type encapsulates all the parameters needed for an operation,
//! making it easy to call from the CLI, an application shell, or programmatically.

use serde::{Deserialize, Serialize};
use tabula_core::{Credentials, VersionSelector};

/// Request to clone a remote repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneRequest {
    /// Remote URL.
    pub url: String,

    /// Credentials to offer if the remote asks for them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

impl CloneRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }
}

/// Request addressing a cloned repository, for local-only operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryRequest {
    /// Repository id (see [`tabula_core::derive_repository_id`]).
    pub repository: String,
}

impl RepositoryRequest {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
        }
    }
}

/// Request for an operation that talks to the remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRequest {
    pub repository: String,

    /// Explicit credentials; stored ones are used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

impl RemoteRequest {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }
}

/// Request to switch to another version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchRequest {
    pub repository: String,
    pub target: VersionSelector,
}

impl SwitchRequest {
    pub fn new(repository: impl Into<String>, target: VersionSelector) -> Self {
        Self {
            repository: repository.into(),
            target,
        }
    }
}

/// Request to create a draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDraftRequest {
    pub repository: String,

    /// Name the draft will be published under.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,

    /// Check the new draft out after creating it.
    #[serde(default = "default_checkout")]
    pub checkout: bool,
}

fn default_checkout() -> bool {
    true
}

impl CreateDraftRequest {
    pub fn new(repository: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            name: name.into(),
            credentials: None,
            checkout: true,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Stay on the current version after creating the draft.
    pub fn without_checkout(mut self) -> Self {
        self.checkout = false;
        self
    }
}

/// Request to commit working tree changes on the draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    pub repository: String,
    pub message: String,
}

impl CommitRequest {
    pub fn new(repository: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            message: message.into(),
        }
    }
}

/// Request to compare two versions, or a version against the working tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareRequest {
    pub repository: String,

    /// Base side; the current version when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<VersionSelector>,

    /// Other side; the working tree when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<VersionSelector>,
}

impl CompareRequest {
    /// Compare the current version against the working tree.
    pub fn working_tree(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            from: None,
            to: None,
        }
    }

    pub fn between(
        repository: impl Into<String>,
        from: VersionSelector,
        to: VersionSelector,
    ) -> Self {
        Self {
            repository: repository.into(),
            from: Some(from),
            to: Some(to),
        }
    }
}

/// Request for the commit history of a version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub repository: String,

    /// Version to inspect; the current version when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionSelector>,
}

impl HistoryRequest {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            version: None,
        }
    }

    pub fn of(mut self, version: VersionSelector) -> Self {
        self.version = Some(version);
        self
    }
}
