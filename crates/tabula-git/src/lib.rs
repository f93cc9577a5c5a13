//! Git primitives consumed by the Tabula version model.
//!
//! [`GitPrimitives`] is the narrow surface the version model and sync engine
//! are written against; [`GitBackend`] implements it on top of libgit2.
//! Oids cross this boundary as hex strings so the domain layer stays free of
//! `git2` types.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tabula_core::Author;
use thiserror::Error;

mod auth;
mod backend;

pub use auth::{next_offer, Auth, CredentialOffer};
pub use backend::GitBackend;

/// Result type for git primitives.
pub type GitResult<T> = Result<T, GitError>;

/// Errors raised by git primitives.
#[derive(Debug, Error)]
pub enum GitError {
    /// The remote asked for credentials and none were available.
    #[error("remote requires authentication but no credentials were provided")]
    CredentialsRequired,

    /// The remote rejected the credentials that were offered.
    #[error("remote rejected the provided credentials: {message}")]
    AuthRejected { message: String },

    /// The remote could not be reached.
    #[error("could not reach remote: {message}")]
    Connection { message: String },

    /// The push call returned but the remote refused a ref update.
    #[error("push of {refspec} was rejected: {message}")]
    PushRejected { refspec: String, message: String },

    /// A true merge produced conflicts.
    #[error("merging {theirs} into {ours} produced conflicts")]
    MergeConflict { ours: String, theirs: String },

    /// Local modifications would be overwritten by a checkout.
    #[error("checkout of {target} would overwrite local changes")]
    CheckoutConflict { target: String },

    /// Nothing changed since the last commit.
    #[error("nothing to commit")]
    NothingToCommit,

    /// A ref or object could not be found.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Name and email used for commits, tags and merge commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// A commit as read from the object database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub oid: String,
    pub message: String,
    pub author: Author,
    pub parents: Vec<String>,
}

/// An annotated tag object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    /// Oid of the tag object.
    pub oid: String,
    pub name: String,
    /// Oid of the object the tag points to.
    pub target_oid: String,
    pub tagger: Option<Author>,
    pub message: String,
}

/// A ref advertised by a remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRef {
    /// Full ref name, e.g. `refs/heads/main`.
    pub name: String,
    pub oid: String,
    /// Commit the ref peels to, for annotated tags when requested.
    pub peeled: Option<String>,
}

/// One path that differs between two trees (or a tree and the working tree).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub path: String,
    /// Blob on the `from` side; `None` when the path is missing there.
    pub old_oid: Option<String>,
    /// Blob on the `to` side; `None` when the path is missing there.
    pub new_oid: Option<String>,
}

/// What a merge did to the target branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    UpToDate,
    FastForward(String),
    Merged(String),
}

/// Knobs for [`GitPrimitives::fetch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchSettings {
    /// Download every tag, not only the ones pointing into fetched history.
    pub tags: bool,
    /// Drop remote-tracking refs whose remote branch is gone.
    pub prune: bool,
}

/// Raw Git operations the version model is built on.
///
/// Ref arguments accept anything Git can resolve by short name (`main`,
/// `v1.0`, `origin/main`, `HEAD`) as well as full ref names.
pub trait GitPrimitives {
    /// Root of the working tree.
    fn workdir(&self) -> &Path;

    /// Oid a ref points to, without peeling annotated tags.
    fn resolve_ref(&self, name: &str) -> GitResult<String>;

    /// Like [`resolve_ref`](Self::resolve_ref) but `None` when the ref is absent.
    fn try_resolve_ref(&self, name: &str) -> GitResult<Option<String>> {
        match self.resolve_ref(name) {
            Ok(oid) => Ok(Some(oid)),
            Err(GitError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Commit a ref, tag or oid ultimately points to.
    fn peel_to_commit(&self, spec: &str) -> GitResult<String>;

    fn write_ref(&self, refname: &str, oid: &str, force: bool) -> GitResult<()>;

    fn delete_ref(&self, refname: &str) -> GitResult<()>;

    /// Oid HEAD resolves to.
    fn head_oid(&self) -> GitResult<String>;

    /// Short name of the checked-out branch, `None` when HEAD is detached.
    fn current_branch(&self) -> GitResult<Option<String>>;

    /// Short names of local branches.
    fn list_branches(&self) -> GitResult<Vec<String>>;

    /// Short names of the remote-tracking branches of `remote`, without the
    /// remote prefix.
    fn list_remote_branches(&self, remote: &str) -> GitResult<Vec<String>>;

    fn list_tags(&self) -> GitResult<Vec<String>>;

    fn list_remotes(&self) -> GitResult<Vec<String>>;

    fn read_commit(&self, oid: &str) -> GitResult<CommitRecord>;

    /// Read an annotated tag object; `None` when `oid` is not a tag object.
    fn read_tag(&self, oid: &str) -> GitResult<Option<TagRecord>>;

    /// Commits reachable from `reference`, newest first.
    fn log(&self, reference: &str) -> GitResult<Vec<CommitRecord>>;

    fn find_merge_base(&self, a: &str, b: &str) -> GitResult<String>;

    fn create_branch(&self, name: &str, target_oid: &str) -> GitResult<()>;

    fn delete_branch(&self, name: &str) -> GitResult<()>;

    /// Check out a local branch and point HEAD at it.
    fn checkout_branch(&self, branch: &str, force: bool) -> GitResult<()>;

    /// Check out a commit with a detached HEAD.
    fn checkout_detached(&self, oid: &str, force: bool) -> GitResult<()>;

    /// Throw away working tree and index modifications, untracked files included.
    fn reset_working_tree(&self) -> GitResult<()>;

    /// Merge `theirs` into the local branch `ours`.
    fn merge(&self, ours: &str, theirs: &str, identity: &Identity) -> GitResult<MergeOutcome>;

    /// Stage every working tree change and commit it on HEAD.
    fn commit(&self, message: &str, identity: &Identity) -> GitResult<String>;

    /// Create an annotated tag; returns the tag object oid.
    fn annotated_tag(
        &self,
        name: &str,
        target_oid: &str,
        message: &str,
        identity: &Identity,
    ) -> GitResult<String>;

    /// Whether the working tree or index differ from HEAD.
    fn is_dirty(&self) -> GitResult<bool>;

    /// Paths that differ between `from` and `to`, or the working tree when
    /// `to` is `None`.
    fn diff(&self, from: &str, to: Option<&str>) -> GitResult<Vec<DiffEntry>>;

    fn get_config(&self, key: &str) -> GitResult<Option<String>>;

    fn set_config(&self, key: &str, value: &str) -> GitResult<()>;

    /// Remove a config entry; absent keys are not an error.
    fn delete_config(&self, key: &str) -> GitResult<()>;

    fn fetch(&self, remote: &str, settings: FetchSettings, auth: &Auth) -> GitResult<()>;

    /// Push `refname` to the same name on `remote`, or delete it there.
    fn push(&self, remote: &str, refname: &str, delete: bool, auth: &Auth) -> GitResult<()>;

    /// Refs advertised by `remote`.
    fn list_remote_refs(
        &self,
        remote: &str,
        peel_tags: bool,
        auth: &Auth,
    ) -> GitResult<Vec<RemoteRef>>;
}
