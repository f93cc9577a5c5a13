//! Read side of the version model.
//!
//! Every query re-derives its answer from the current ref state; nothing is
//! cached between calls.

use std::collections::HashSet;

use tabula_core::{
    BaseVersion, ChangeKind, Commit, CurrentVersion, DraftBranch, DraftVersion, PublishedVersion,
    TableChange, VersionSelector, INITIAL_COMMIT_MARKER,
};
use tabula_git::GitPrimitives;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{OpsError, OpsResult};

/// The single linear branch published versions are tagged on.
pub const MAIN_BRANCH: &str = "main";

/// The only remote a repository is synchronized with.
pub const REMOTE: &str = "origin";

pub(crate) fn main_ref() -> String {
    format!("refs/heads/{}", MAIN_BRANCH)
}

pub(crate) fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{}", branch)
}

pub(crate) fn tag_ref(tag: &str) -> String {
    format!("refs/tags/{}", tag)
}

pub(crate) fn tracking_ref(branch: &str) -> String {
    format!("refs/remotes/{}/{}", REMOTE, branch)
}

/// Ref a selector points at.
pub fn selector_ref(selector: &VersionSelector) -> String {
    match selector {
        VersionSelector::Published { name } => tag_ref(name),
        VersionSelector::Draft { branch } => branch_ref(branch),
    }
}

/// Derives published versions, drafts and the current version from refs.
pub struct VersionModel<'a> {
    git: &'a dyn GitPrimitives,
    config: &'a Config,
}

impl<'a> VersionModel<'a> {
    pub fn new(git: &'a dyn GitPrimitives, config: &'a Config) -> Self {
        Self { git, config }
    }

    /// Published versions, newest first.
    pub fn list_published_versions(&self) -> OpsResult<Vec<PublishedVersion>> {
        let tags = self.git.list_tags()?;
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let main_tip = self.git.try_resolve_ref(&main_ref())?;

        let mut versions = Vec::with_capacity(tags.len());
        for tag in tags {
            let tag_oid = self.git.resolve_ref(&tag_ref(&tag))?;
            let Some(record) = self.git.read_tag(&tag_oid)? else {
                warn!(tag = %tag, "Skipping lightweight tag");
                continue;
            };

            let main_commit_oid = self.git.peel_to_commit(&tag_oid)?;
            let tagger = match record.tagger {
                Some(tagger) => tagger,
                None => self.git.read_commit(&main_commit_oid)?.author,
            };

            versions.push(PublishedVersion {
                name: tag.clone(),
                tag,
                main_commit_oid,
                annotated_tag_oid: tag_oid,
                tagger,
                newest: false,
            });
        }

        versions.sort_by(|a, b| b.tagger.utc_timestamp().cmp(&a.tagger.utc_timestamp()));

        if versions.is_empty() {
            return Ok(versions);
        }

        let matches = versions
            .iter()
            .filter(|v| Some(&v.main_commit_oid) == main_tip.as_ref())
            .count();
        if matches != 1 {
            return Err(OpsError::AmbiguousNewestVersion { matches });
        }

        for version in &mut versions {
            version.newest = Some(&version.main_commit_oid) == main_tip.as_ref();
        }

        Ok(versions)
    }

    /// The published version at the tip of `main`, if any.
    pub fn newest_published_version(&self) -> OpsResult<Option<PublishedVersion>> {
        Ok(self
            .list_published_versions()?
            .into_iter()
            .find(|v| v.newest))
    }

    pub fn find_published(&self, name: &str) -> OpsResult<Option<PublishedVersion>> {
        Ok(self
            .list_published_versions()?
            .into_iter()
            .find(|v| v.name == name))
    }

    /// Local draft branches with their fork points resolved.
    pub fn list_draft_versions(&self) -> OpsResult<Vec<DraftVersion>> {
        let branches: Vec<(String, DraftBranch)> = self
            .git
            .list_branches()?
            .into_iter()
            .filter_map(|branch| {
                DraftBranch::parse(&branch)
                    .ok()
                    .map(|parsed| (branch, parsed))
            })
            .collect();

        if branches.is_empty() {
            return Ok(Vec::new());
        }

        let published = self.list_published_versions()?;
        let initial = self.get_initial_commit_oid()?;

        let mut drafts = Vec::with_capacity(branches.len());
        for (branch, parsed) in branches {
            let head_oid = self.git.resolve_ref(&branch_ref(&branch))?;
            let base_oid = self
                .git
                .find_merge_base(&branch_ref(&branch), &main_ref())?;

            let base_published_version = match published
                .iter()
                .find(|v| v.main_commit_oid == base_oid)
            {
                Some(version) => BaseVersion::Published(Box::new(version.clone())),
                None if base_oid == initial => BaseVersion::Initial,
                None => {
                    return Err(OpsError::DraftWithoutBase { branch, base_oid });
                }
            };

            drafts.push(DraftVersion {
                id: parsed.id,
                name: parsed.name,
                branch,
                head_oid,
                base_oid,
                base_published_version,
            });
        }

        Ok(drafts)
    }

    /// The draft, if one exists.
    pub fn draft_version(&self) -> OpsResult<Option<DraftVersion>> {
        let mut drafts = self.list_draft_versions()?;
        if drafts.len() > 1 {
            warn!(count = drafts.len(), "More than one local draft branch");
        }
        Ok(if drafts.is_empty() {
            None
        } else {
            Some(drafts.remove(0))
        })
    }

    pub fn find_draft(&self, branch: &str) -> OpsResult<Option<DraftVersion>> {
        Ok(self
            .list_draft_versions()?
            .into_iter()
            .find(|d| d.branch == branch))
    }

    /// The version HEAD resolves to.
    pub fn get_current_version(&self) -> OpsResult<CurrentVersion> {
        let head = self.git.head_oid()?;

        if let Some(branch) = self.git.current_branch()? {
            return self
                .list_draft_versions()?
                .into_iter()
                .find(|d| d.branch == branch && d.head_oid == head)
                .map(CurrentVersion::Draft)
                .ok_or(OpsError::CouldNotFindCurrentVersion { head: branch });
        }

        if let Some(version) = self
            .list_published_versions()?
            .into_iter()
            .find(|v| v.annotated_tag_oid == head || v.main_commit_oid == head)
        {
            return Ok(CurrentVersion::Published(version));
        }

        if self.get_initial_commit_oid()? == head {
            return Ok(CurrentVersion::Initial { oid: head });
        }

        Err(OpsError::CouldNotFindCurrentVersion { head })
    }

    /// Root commit of `main`, which must carry the `INITIAL_COMMIT` marker.
    pub fn get_initial_commit_oid(&self) -> OpsResult<String> {
        let log = self.git.log(&main_ref()).map_err(|e| {
            OpsError::RepositoryNotInitialized {
                message: format!("could not read {}: {}", MAIN_BRANCH, e),
            }
        })?;

        let root = log
            .last()
            .ok_or_else(|| OpsError::RepositoryNotInitialized {
                message: format!("{} has no commits", MAIN_BRANCH),
            })?;

        if !root.message.starts_with(INITIAL_COMMIT_MARKER) {
            return Err(OpsError::RepositoryNotInitialized {
                message: format!(
                    "root commit {} does not start with {}",
                    root.oid, INITIAL_COMMIT_MARKER
                ),
            });
        }

        Ok(root.oid.clone())
    }

    /// Table files that differ between `from` and `to` (the working tree
    /// when `to` is `None`).
    pub fn compare_versions(&self, from: &str, to: Option<&str>) -> OpsResult<Vec<TableChange>> {
        let entries = self.git.diff(from, to)?;

        let mut changes: Vec<TableChange> = entries
            .into_iter()
            .filter(|entry| self.config.is_table_file(&entry.path))
            .filter_map(|entry| {
                let kind = match (&entry.old_oid, &entry.new_oid) {
                    (None, Some(_)) => ChangeKind::Added,
                    (Some(_), None) => ChangeKind::Deleted,
                    (Some(old), Some(new)) if old == new => return None,
                    (Some(_), Some(_)) => ChangeKind::Modified,
                    (None, None) => return None,
                };
                Some(TableChange {
                    path: entry.path,
                    kind,
                })
            })
            .collect();

        changes.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(from, to = ?to, changes = changes.len(), "Compared versions");
        Ok(changes)
    }

    /// The initial commit on its own, as the history of the initial state.
    pub fn initial_history(&self) -> OpsResult<Vec<Commit>> {
        let record = self.git.read_commit(&self.get_initial_commit_oid()?)?;
        Ok(vec![Commit {
            oid: record.oid,
            message: record.message,
            author: record.author,
            in_remote: true,
        }])
    }

    /// Commit log of a version, newest first, with remote presence marked.
    pub fn history(&self, selector: &VersionSelector) -> OpsResult<Vec<Commit>> {
        let (local, remote) = match selector {
            VersionSelector::Published { name } => {
                if self.find_published(name)?.is_none() {
                    return Err(OpsError::VersionNotFound { name: name.clone() });
                }
                (tag_ref(name), tracking_ref(MAIN_BRANCH))
            }
            VersionSelector::Draft { branch } => {
                if self.git.try_resolve_ref(&branch_ref(branch))?.is_none() {
                    return Err(OpsError::VersionNotFound {
                        name: branch.clone(),
                    });
                }
                (branch_ref(branch), tracking_ref(branch))
            }
        };

        let in_remote: HashSet<String> = match self.git.try_resolve_ref(&remote)? {
            Some(_) => self
                .git
                .log(&remote)?
                .into_iter()
                .map(|c| c.oid)
                .collect(),
            None => HashSet::new(),
        };

        Ok(self
            .git
            .log(&local)?
            .into_iter()
            .map(|record| Commit {
                in_remote: in_remote.contains(&record.oid),
                oid: record.oid,
                message: record.message,
                author: record.author,
            })
            .collect())
    }
}
