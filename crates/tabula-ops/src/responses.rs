//! Response DTOs for operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tabula_core::{
    Commit, CurrentVersion, DraftVersion, PublishedVersion, RemoteRepositoryChanges,
    TableChange,
};

/// Published versions and the draft of a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionsResponse {
    /// Newest first.
    pub published: Vec<PublishedVersion>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<DraftVersion>,
}

impl VersionsResponse {
    /// The published version at the tip of `main`.
    pub fn newest(&self) -> Option<&PublishedVersion> {
        self.published.iter().find(|v| v.newest)
    }
}

/// Response from a pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    /// What was integrated.
    pub changes: RemoteRepositoryChanges,

    /// Version HEAD resolves to afterwards.
    pub current: CurrentVersion,
}

impl PullResponse {
    pub fn is_up_to_date(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Response from comparing versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareResponse {
    pub from: String,

    /// `None` for the working tree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,

    pub changes: Vec<TableChange>,
}

/// Response from a history query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub version: String,

    /// Newest first.
    pub commits: Vec<Commit>,
}

impl HistoryResponse {
    /// Commits the remote does not have yet.
    pub fn unpushed(&self) -> usize {
        self.commits.iter().filter(|c| !c.in_remote).count()
    }
}

/// Response from a status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub repository: String,

    /// Location of the clone.
    pub path: PathBuf,

    pub current: CurrentVersion,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<DraftVersion>,

    /// Uncommitted table changes against the current version.
    #[serde(default)]
    pub changes: Vec<TableChange>,
}

impl StatusResponse {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// A repository present in the repositories directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryEntry {
    pub id: String,
    pub path: PathBuf,

    /// URL of `origin`, when it could be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}
