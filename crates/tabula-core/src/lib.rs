//! Core domain types shared across the Tabula workspace.
//!
//! Tabula maps a simple version model onto a Git repository: an ordered list of
//! immutable *published versions* (annotated tags on `main`) and at most one
//! mutable *draft version* (a `draft/<name>_<id>` branch).

use std::fmt;

use serde::{Deserialize, Serialize};

mod draft;
mod repository;

pub use draft::{
    generate_id, is_draft_branch, validate_version_name, DraftBranch, DraftNameError,
    DRAFT_ID_LEN, DRAFT_PREFIX,
};
pub use repository::{
    derive_repository_id, derive_repository_name, is_valid_repository_id, RepositoryRecord,
};

/// Message prefix every managed repository's root commit must carry.
pub const INITIAL_COMMIT_MARKER: &str = "INITIAL_COMMIT";

// =============================================================================
// Commits
// =============================================================================

/// Identity and time attached to a commit or tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Minutes behind UTC (UTC+2 is `-120`).
    pub timezone_offset: i32,
}

impl Author {
    /// Timestamp adjusted by the timezone offset; the ordering key for versions.
    pub fn utc_timestamp(&self) -> i64 {
        self.timestamp - i64::from(self.timezone_offset) * 60
    }
}

/// Lightweight projection of a Git commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub oid: String,
    pub message: String,
    pub author: Author,
    /// Whether the commit is also reachable from the remote-tracking branch.
    pub in_remote: bool,
}

// =============================================================================
// Versions
// =============================================================================

/// An immutable named point on `main`, backed by an annotated tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedVersion {
    pub name: String,
    pub tag: String,
    /// Commit on `main` the tag points to.
    pub main_commit_oid: String,
    /// Oid of the tag object itself.
    pub annotated_tag_oid: String,
    pub tagger: Author,
    /// True for the version whose commit is the tip of `main`.
    pub newest: bool,
}

/// The point a draft forked from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BaseVersion {
    /// Forked from a published version.
    Published(Box<PublishedVersion>),
    /// Forked from the repository's initial commit.
    Initial,
}

impl BaseVersion {
    /// Tag name of the base, or `None` for the initial commit.
    pub fn tag(&self) -> Option<&str> {
        match self {
            BaseVersion::Published(version) => Some(&version.tag),
            BaseVersion::Initial => None,
        }
    }
}

impl fmt::Display for BaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseVersion::Published(version) => f.write_str(&version.name),
            BaseVersion::Initial => f.write_str("INITIAL"),
        }
    }
}

/// A mutable, branch-backed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftVersion {
    pub id: String,
    pub name: String,
    /// Short branch name, `draft/<name>_<id>`.
    pub branch: String,
    pub head_oid: String,
    /// Merge base of the draft branch and `main`.
    pub base_oid: String,
    pub base_published_version: BaseVersion,
}

impl DraftVersion {
    /// Whether the draft carries commits beyond its fork point.
    pub fn has_commits(&self) -> bool {
        self.head_oid != self.base_oid
    }
}

/// Whatever version HEAD currently resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CurrentVersion {
    Published(PublishedVersion),
    Draft(DraftVersion),
    /// Detached at the initial commit, before or between drafts when
    /// nothing is published yet.
    Initial { oid: String },
}

impl CurrentVersion {
    /// Display name of the version.
    pub fn name(&self) -> &str {
        match self {
            CurrentVersion::Published(version) => &version.name,
            CurrentVersion::Draft(draft) => &draft.name,
            CurrentVersion::Initial { .. } => "INITIAL",
        }
    }

    pub fn is_draft(&self) -> bool {
        matches!(self, CurrentVersion::Draft(_))
    }

    /// The draft, if HEAD is on one.
    pub fn as_draft(&self) -> Option<&DraftVersion> {
        match self {
            CurrentVersion::Draft(draft) => Some(draft),
            _ => None,
        }
    }
}

impl fmt::Display for CurrentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrentVersion::Published(version) => write!(f, "published {}", version.name),
            CurrentVersion::Draft(draft) => write!(f, "draft {}", draft.name),
            CurrentVersion::Initial { .. } => f.write_str("initial commit"),
        }
    }
}

/// How callers name a version to switch to or inspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VersionSelector {
    /// A published version by tag name.
    Published { name: String },
    /// A draft by short branch name.
    Draft { branch: String },
}

impl VersionSelector {
    pub fn published(name: impl Into<String>) -> Self {
        Self::Published { name: name.into() }
    }

    pub fn draft(branch: impl Into<String>) -> Self {
        Self::Draft {
            branch: branch.into(),
        }
    }

    /// Interpret free-form input: draft branch names select drafts, anything
    /// else a published version.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if is_draft_branch(input) {
            Self::draft(input)
        } else {
            Self::published(input)
        }
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::Published { name } => f.write_str(name),
            VersionSelector::Draft { branch } => f.write_str(branch),
        }
    }
}

// =============================================================================
// Table Changes
// =============================================================================

/// How a table differs between two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Deleted,
    Modified,
}

impl ChangeKind {
    /// Short symbol for listings.
    pub fn symbol(&self) -> &'static str {
        match self {
            ChangeKind::Added => "+",
            ChangeKind::Deleted => "-",
            ChangeKind::Modified => "M",
        }
    }
}

/// A changed table file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableChange {
    /// Path relative to the repository root, `/` separated.
    pub path: String,
    pub kind: ChangeKind,
}

// =============================================================================
// Remote Changes
// =============================================================================

/// A draft branch that exists on the remote but not locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDraft {
    pub branch: String,
    pub name: String,
    pub id: String,
    pub head_oid: String,
}

/// A draft whose local and remote heads differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftCommits {
    pub branch: String,
    pub local_oid: String,
    pub remote_oid: String,
}

/// A tag present on the remote but not locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTag {
    pub name: String,
    /// Oid the remote tag ref points to (the tag object for annotated tags).
    pub oid: String,
    /// Peeled commit oid, when the remote advertised one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_oid: Option<String>,
}

/// Delta between local and remote ref state, computed fresh on every sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepositoryChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_draft: Option<RemoteDraft>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_commits: Option<DraftCommits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_draft: Option<DraftVersion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_published_versions: Vec<RemoteTag>,
}

impl RemoteRepositoryChanges {
    /// True when local and remote agree.
    pub fn is_empty(&self) -> bool {
        self.new_draft.is_none()
            && self.new_commits.is_none()
            && self.deleted_draft.is_none()
            && self.new_published_versions.is_empty()
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Username/password (or token) pair used for remote operations.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author(timestamp: i64, timezone_offset: i32) -> Author {
        Author {
            name: "Ada".into(),
            email: "ada@example.org".into(),
            timestamp,
            timezone_offset,
        }
    }

    #[test]
    fn test_utc_timestamp_applies_offset() {
        assert_eq!(author(1_000, 0).utc_timestamp(), 1_000);
        assert_eq!(author(1_000, -120).utc_timestamp(), 1_000 + 7_200);
        assert_eq!(author(10_000, 60).utc_timestamp(), 10_000 - 3_600);
    }

    #[test]
    fn test_initial_base_serializes_as_sentinel() {
        let json = serde_json::to_string(&BaseVersion::Initial).unwrap();
        assert_eq!(json, "\"INITIAL\"");
        assert_eq!(BaseVersion::Initial.tag(), None);
    }

    #[test]
    fn test_selector_parse() {
        assert_eq!(
            VersionSelector::parse("draft/v2.0_bqp3gjaoxUTxjklVwf3O"),
            VersionSelector::draft("draft/v2.0_bqp3gjaoxUTxjklVwf3O")
        );
        assert_eq!(VersionSelector::parse("v1.0"), VersionSelector::published("v1.0"));
    }

    #[test]
    fn test_empty_remote_changes() {
        let mut changes = RemoteRepositoryChanges::default();
        assert!(changes.is_empty());
        changes.new_published_versions.push(RemoteTag {
            name: "v2.0".into(),
            oid: "abc".into(),
            commit_oid: None,
        });
        assert!(!changes.is_empty());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let debug = format!("{:?}", Credentials::new("alice", "hunter2"));
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }
}
