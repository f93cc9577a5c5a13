//! Repository records and the naming derived from a remote URL.

use serde::{Deserialize, Serialize};

/// A repository known to the application, keyed by an id derived from its remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// Deterministic, filesystem-safe id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Remote URL the repository was cloned from.
    pub remote_url: String,
}

impl RepositoryRecord {
    /// Derive a record from a remote URL.
    pub fn from_remote_url(url: &str) -> Self {
        Self {
            id: derive_repository_id(url),
            name: derive_repository_name(url),
            remote_url: url.trim().to_string(),
        }
    }
}

/// Derive a display name from a remote URL.
///
/// `https://github.com/user/repo.git/` → `repo`
pub fn derive_repository_name(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let trimmed = trimmed.trim_end_matches('/');

    trimmed
        .rsplit(['/', ':'])
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("repository")
        .to_string()
}

/// Derive a filesystem-safe id from a remote URL.
///
/// The scheme and any userinfo are dropped and every character outside
/// `[A-Za-z0-9._-]` becomes `_`, so `https://github.com/user/repo.git`
/// maps to `github.com_user_repo`.
pub fn derive_repository_id(url: &str) -> String {
    let mut rest = url.trim();
    if let Some((_, after)) = rest.split_once("://") {
        rest = after;
    }
    if let Some((userinfo, after)) = rest.split_once('@') {
        if !userinfo.contains('/') {
            rest = after;
        }
    }
    let rest = rest.trim_end_matches('/');
    let rest = rest.strip_suffix(".git").unwrap_or(rest);
    let rest = rest.trim_matches('/');

    rest.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Whether `id` names a single directory entry inside the repositories
/// directory: non-empty, only `[A-Za-z0-9._-]`, and neither `.` nor `..`.
pub fn is_valid_repository_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
