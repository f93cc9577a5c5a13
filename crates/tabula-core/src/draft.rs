//! Draft branch naming.
//!
//! A draft lives on a branch named `draft/<name>_<id>`. The name is chosen by
//! the user and may itself contain `/` or `_`; the id is a random 20 character
//! alphanumeric suffix, so splitting on the last `_` recovers both parts.

use std::fmt;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix shared by every draft branch.
pub const DRAFT_PREFIX: &str = "draft/";

/// Length of the random id appended to draft branch names.
pub const DRAFT_ID_LEN: usize = 20;

/// Reasons a branch name is not a draft branch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftNameError {
    #[error("branch '{0}' does not start with 'draft/'")]
    MissingPrefix(String),

    #[error("branch '{0}' has no '_<id>' suffix")]
    MissingId(String),

    #[error("branch '{0}' ends with '_' and carries an empty id")]
    EmptyId(String),

    #[error("branch '{0}' has an empty draft name")]
    EmptyName(String),

    #[error("'{0}' is not usable as a version name")]
    InvalidName(String),
}

/// Parsed `draft/<name>_<id>` branch name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftBranch {
    /// User chosen draft name.
    pub name: String,
    /// Random id suffix.
    pub id: String,
}

impl DraftBranch {
    /// Build a branch from an explicit name and id.
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }

    /// Create a branch for `name` with a freshly generated id.
    pub fn generate(name: &str) -> Result<Self, DraftNameError> {
        validate_version_name(name)?;
        Ok(Self::new(name, generate_id()))
    }

    /// Parse a short branch name (`draft/<name>_<id>`).
    pub fn parse(branch: &str) -> Result<Self, DraftNameError> {
        let rest = branch
            .strip_prefix(DRAFT_PREFIX)
            .ok_or_else(|| DraftNameError::MissingPrefix(branch.to_string()))?;

        let (name, id) = rest
            .rsplit_once('_')
            .ok_or_else(|| DraftNameError::MissingId(branch.to_string()))?;

        if id.is_empty() {
            return Err(DraftNameError::EmptyId(branch.to_string()));
        }
        if name.is_empty() {
            return Err(DraftNameError::EmptyName(branch.to_string()));
        }

        Ok(Self::new(name, id))
    }

    /// Short branch name, e.g. `draft/v2.0_bqp3gjaoxUTxjklVwf3O`.
    pub fn branch(&self) -> String {
        format!("{}{}_{}", DRAFT_PREFIX, self.name, self.id)
    }

    /// Fully qualified ref name.
    pub fn refname(&self) -> String {
        format!("refs/heads/{}", self.branch())
    }
}

impl fmt::Display for DraftBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.branch())
    }
}

/// Whether a short branch name follows the draft naming rule.
pub fn is_draft_branch(branch: &str) -> bool {
    DraftBranch::parse(branch).is_ok()
}

/// Generate a random draft id.
pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(DRAFT_ID_LEN)
        .map(char::from)
        .collect()
}

/// Check that a version name can be used both as a tag and inside a branch.
///
/// Follows the `git check-ref-format` rules that apply to a single name.
pub fn validate_version_name(name: &str) -> Result<(), DraftNameError> {
    let invalid = || DraftNameError::InvalidName(name.to_string());

    if name.is_empty() || name.ends_with('_') {
        return Err(invalid());
    }
    if name.starts_with('/') || name.ends_with('/') || name.ends_with('.') {
        return Err(invalid());
    }
    if name.contains("..") || name.contains("//") || name.contains("@{") || name == "@" {
        return Err(invalid());
    }
    if name
        .chars()
        .any(|c| c.is_control() || c.is_whitespace() || "~^:?*[\\".contains(c))
    {
        return Err(invalid());
    }
    if name
        .split('/')
        .any(|component| component.starts_with('.') || component.ends_with(".lock"))
    {
        return Err(invalid());
    }

    Ok(())
}
