//! libgit2-backed implementation of [`GitPrimitives`].

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    AutotagOption, BranchType, Delta, DiffOptions, Direction, ErrorCode, FetchOptions,
    FetchPrune, IndexAddOption, Oid, PushOptions, Repository, ResetType, Signature, Sort,
    StatusOptions,
};
use tabula_core::Author;
use tracing::{debug, info};

use crate::{
    Auth, CommitRecord, DiffEntry, FetchSettings, GitError, GitPrimitives, GitResult, Identity,
    MergeOutcome, RemoteRef, TagRecord,
};

/// Filesystem-backed repository driven through libgit2.
pub struct GitBackend {
    repo: Repository,
    workdir: PathBuf,
}

impl std::fmt::Debug for GitBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitBackend")
            .field("workdir", &self.workdir)
            .finish()
    }
}

impl GitBackend {
    /// Open the repository whose working tree is at `path`.
    pub fn open(path: impl AsRef<Path>) -> GitResult<Self> {
        let repo = Repository::open(path.as_ref())?;
        Ok(Self::from_repository(repo, path.as_ref()))
    }

    /// Clone `url` into `path`, downloading every tag.
    pub fn clone_from(url: &str, path: &Path, auth: &Auth) -> GitResult<Self> {
        let mut fetch_options = FetchOptions::new();
        fetch_options
            .remote_callbacks(auth.callbacks())
            .download_tags(AutotagOption::All);

        info!(url, path = %path.display(), "Cloning repository");
        let repo = RepoBuilder::new()
            .fetch_options(fetch_options)
            .clone(url, path)
            .map_err(|e| auth.classify(e))?;

        Ok(Self::from_repository(repo, path))
    }

    fn from_repository(repo: Repository, fallback: &Path) -> Self {
        let workdir = repo
            .workdir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| fallback.to_path_buf());
        Self { repo, workdir }
    }

    /// Underlying libgit2 handle.
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    fn object_id(&self, oid: &str) -> GitResult<Oid> {
        Oid::from_str(oid).map_err(|_| GitError::NotFound(oid.to_string()))
    }

    fn commit_of(&self, spec: &str) -> GitResult<git2::Commit<'_>> {
        let object = self
            .repo
            .revparse_single(spec)
            .map_err(|e| not_found(spec, e))?;
        Ok(object.peel_to_commit()?)
    }

    fn checkout_commit(&self, commit: &git2::Commit<'_>, target: &str, force: bool) -> GitResult<()> {
        let mut builder = CheckoutBuilder::new();
        if force {
            builder.force();
        } else {
            builder.safe();
        }

        self.repo
            .checkout_tree(commit.as_object(), Some(&mut builder))
            .map_err(|e| {
                if e.code() == ErrorCode::Conflict {
                    GitError::CheckoutConflict {
                        target: target.to_string(),
                    }
                } else {
                    GitError::Git(e)
                }
            })
    }
}

impl GitPrimitives for GitBackend {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn resolve_ref(&self, name: &str) -> GitResult<String> {
        let reference = self
            .repo
            .resolve_reference_from_short_name(name)
            .map_err(|e| not_found(name, e))?;
        let resolved = reference.resolve().map_err(|e| not_found(name, e))?;
        resolved
            .target()
            .map(|oid| oid.to_string())
            .ok_or_else(|| GitError::NotFound(name.to_string()))
    }

    fn peel_to_commit(&self, spec: &str) -> GitResult<String> {
        Ok(self.commit_of(spec)?.id().to_string())
    }

    fn write_ref(&self, refname: &str, oid: &str, force: bool) -> GitResult<()> {
        let oid = self.object_id(oid)?;
        self.repo
            .reference(refname, oid, force, "tabula: update ref")?;
        Ok(())
    }

    fn delete_ref(&self, refname: &str) -> GitResult<()> {
        let mut reference = self
            .repo
            .find_reference(refname)
            .map_err(|e| not_found(refname, e))?;
        reference.delete()?;
        Ok(())
    }

    fn head_oid(&self) -> GitResult<String> {
        let oid = self
            .repo
            .refname_to_id("HEAD")
            .map_err(|e| not_found("HEAD", e))?;
        Ok(oid.to_string())
    }

    fn current_branch(&self) -> GitResult<Option<String>> {
        let head = self.repo.find_reference("HEAD")?;
        Ok(head
            .symbolic_target()
            .and_then(|target| target.strip_prefix("refs/heads/"))
            .map(str::to_string))
    }

    fn list_branches(&self) -> GitResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = entry?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn list_remote_branches(&self, remote: &str) -> GitResult<Vec<String>> {
        let prefix = format!("{}/", remote);
        let mut names = Vec::new();
        for entry in self.repo.branches(Some(BranchType::Remote))? {
            let (branch, _) = entry?;
            if let Some(name) = branch.name()? {
                if let Some(short) = name.strip_prefix(&prefix) {
                    if short != "HEAD" {
                        names.push(short.to_string());
                    }
                }
            }
        }
        Ok(names)
    }

    fn list_tags(&self) -> GitResult<Vec<String>> {
        let tags = self.repo.tag_names(None)?;
        Ok(tags.iter().flatten().map(str::to_string).collect())
    }

    fn list_remotes(&self) -> GitResult<Vec<String>> {
        let remotes = self.repo.remotes()?;
        Ok(remotes.iter().flatten().map(str::to_string).collect())
    }

    fn read_commit(&self, oid: &str) -> GitResult<CommitRecord> {
        let commit = self
            .repo
            .find_commit(self.object_id(oid)?)
            .map_err(|e| not_found(oid, e))?;
        Ok(commit_record(&commit))
    }

    fn read_tag(&self, oid: &str) -> GitResult<Option<TagRecord>> {
        let object = self
            .repo
            .find_object(self.object_id(oid)?, None)
            .map_err(|e| not_found(oid, e))?;

        let Ok(tag) = object.into_tag() else {
            return Ok(None);
        };

        Ok(Some(TagRecord {
            oid: tag.id().to_string(),
            name: tag.name().unwrap_or_default().to_string(),
            target_oid: tag.target_id().to_string(),
            tagger: tag.tagger().map(|sig| author(&sig)),
            message: tag.message().unwrap_or_default().to_string(),
        }))
    }

    fn log(&self, reference: &str) -> GitResult<Vec<CommitRecord>> {
        let start = self.commit_of(reference)?;

        let mut walk = self.repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        walk.push(start.id())?;

        let mut commits = Vec::new();
        for oid in walk {
            let commit = self.repo.find_commit(oid?)?;
            commits.push(commit_record(&commit));
        }
        Ok(commits)
    }

    fn find_merge_base(&self, a: &str, b: &str) -> GitResult<String> {
        let a = self.commit_of(a)?.id();
        let b = self.commit_of(b)?.id();
        let base = self
            .repo
            .merge_base(a, b)
            .map_err(|e| not_found(&format!("merge base of {} and {}", a, b), e))?;
        Ok(base.to_string())
    }

    fn create_branch(&self, name: &str, target_oid: &str) -> GitResult<()> {
        let commit = self.commit_of(target_oid)?;
        self.repo.branch(name, &commit, false)?;
        debug!(branch = name, target = %commit.id(), "Created branch");
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> GitResult<()> {
        let mut branch = self
            .repo
            .find_branch(name, BranchType::Local)
            .map_err(|e| not_found(name, e))?;
        branch.delete()?;
        debug!(branch = name, "Deleted branch");
        Ok(())
    }

    fn checkout_branch(&self, branch: &str, force: bool) -> GitResult<()> {
        let refname = format!("refs/heads/{}", branch);
        let commit = self
            .repo
            .find_reference(&refname)
            .map_err(|e| not_found(branch, e))?
            .peel_to_commit()?;

        self.checkout_commit(&commit, branch, force)?;
        self.repo.set_head(&refname)?;
        debug!(branch, "Checked out branch");
        Ok(())
    }

    fn checkout_detached(&self, oid: &str, force: bool) -> GitResult<()> {
        let commit = self.commit_of(oid)?;
        self.checkout_commit(&commit, oid, force)?;
        self.repo.set_head_detached(commit.id())?;
        debug!(oid = %commit.id(), "Checked out detached HEAD");
        Ok(())
    }

    fn reset_working_tree(&self) -> GitResult<()> {
        let head = self.commit_of("HEAD")?;
        let mut builder = CheckoutBuilder::new();
        builder.force().remove_untracked(true);
        self.repo
            .reset(head.as_object(), ResetType::Hard, Some(&mut builder))?;
        Ok(())
    }

    fn merge(&self, ours: &str, theirs: &str, identity: &Identity) -> GitResult<MergeOutcome> {
        let our_refname = format!("refs/heads/{}", ours);
        let our_commit = self
            .repo
            .find_reference(&our_refname)
            .map_err(|e| not_found(ours, e))?
            .peel_to_commit()?;
        let their_commit = self.commit_of(theirs)?;

        let base = self
            .repo
            .merge_base(our_commit.id(), their_commit.id())
            .map_err(|e| not_found(&format!("merge base of {} and {}", ours, theirs), e))?;

        if base == their_commit.id() {
            return Ok(MergeOutcome::UpToDate);
        }

        let (target, outcome) = if base == our_commit.id() {
            let oid = their_commit.id();
            (oid, MergeOutcome::FastForward(oid.to_string()))
        } else {
            let mut index = self.repo.merge_commits(&our_commit, &their_commit, None)?;
            if index.has_conflicts() {
                return Err(GitError::MergeConflict {
                    ours: ours.to_string(),
                    theirs: theirs.to_string(),
                });
            }
            let tree_oid = index.write_tree_to(&self.repo)?;
            let tree = self.repo.find_tree(tree_oid)?;
            let signature = signature(identity)?;
            let message = format!("Merge {} into {}", theirs, ours);
            let oid = self.repo.commit(
                None,
                &signature,
                &signature,
                &message,
                &tree,
                &[&our_commit, &their_commit],
            )?;
            (oid, MergeOutcome::Merged(oid.to_string()))
        };

        // The working tree has to follow before the branch moves, while HEAD
        // still describes what is on disk.
        if self.current_branch()?.as_deref() == Some(ours) {
            let commit = self.repo.find_commit(target)?;
            self.checkout_commit(&commit, ours, false)?;
        }

        self.repo
            .reference(&our_refname, target, true, &format!("merge {}", theirs))?;
        debug!(ours, theirs, outcome = ?outcome, "Merged");
        Ok(outcome)
    }

    fn commit(&self, message: &str, identity: &Identity) -> GitResult<String> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        let tree_oid = index.write_tree()?;

        let parent = self.commit_of("HEAD")?;
        if parent.tree_id() == tree_oid {
            return Err(GitError::NothingToCommit);
        }

        let tree = self.repo.find_tree(tree_oid)?;
        let signature = signature(identity)?;
        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &[&parent])?;
        debug!(oid = %oid, "Created commit");
        Ok(oid.to_string())
    }

    fn annotated_tag(
        &self,
        name: &str,
        target_oid: &str,
        message: &str,
        identity: &Identity,
    ) -> GitResult<String> {
        let target = self.repo.find_object(self.object_id(target_oid)?, None)?;
        let signature = signature(identity)?;
        let oid = self.repo.tag(name, &target, &signature, message, false)?;
        debug!(tag = name, oid = %oid, "Created annotated tag");
        Ok(oid.to_string())
    }

    fn is_dirty(&self) -> GitResult<bool> {
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut options))?;
        Ok(!statuses.is_empty())
    }

    fn diff(&self, from: &str, to: Option<&str>) -> GitResult<Vec<DiffEntry>> {
        let from_tree = self.commit_of(from)?.tree()?;

        let mut options = DiffOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true);

        let diff = match to {
            Some(to) => {
                let to_tree = self.commit_of(to)?.tree()?;
                self.repo
                    .diff_tree_to_tree(Some(&from_tree), Some(&to_tree), Some(&mut options))?
            }
            None => self
                .repo
                .diff_tree_to_workdir_with_index(Some(&from_tree), Some(&mut options))?,
        };

        let mut entries = Vec::new();
        for delta in diff.deltas() {
            let (old_present, new_present) = match delta.status() {
                Delta::Unmodified | Delta::Ignored => continue,
                Delta::Added | Delta::Untracked => (false, true),
                Delta::Deleted => (true, false),
                _ => (true, true),
            };

            let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) else {
                continue;
            };

            entries.push(DiffEntry {
                path: path.to_string_lossy().replace('\\', "/"),
                old_oid: old_present.then(|| delta.old_file().id().to_string()),
                new_oid: new_present.then(|| delta.new_file().id().to_string()),
            });
        }
        Ok(entries)
    }

    fn get_config(&self, key: &str) -> GitResult<Option<String>> {
        match self.repo.config()?.get_string(key) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_config(&self, key: &str, value: &str) -> GitResult<()> {
        self.repo.config()?.set_str(key, value)?;
        Ok(())
    }

    fn delete_config(&self, key: &str) -> GitResult<()> {
        match self.repo.config()?.remove(key) {
            Ok(()) => Ok(()),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn fetch(&self, remote: &str, settings: FetchSettings, auth: &Auth) -> GitResult<()> {
        let mut remote_handle = self
            .repo
            .find_remote(remote)
            .map_err(|e| not_found(remote, e))?;

        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(auth.callbacks());
        if settings.prune {
            fetch_options.prune(FetchPrune::On);
        }
        if settings.tags {
            fetch_options.download_tags(AutotagOption::All);
        }

        remote_handle
            .fetch(&[] as &[&str], Some(&mut fetch_options), Some("tabula: fetch"))
            .map_err(|e| auth.classify(e))?;
        info!(remote, tags = settings.tags, prune = settings.prune, "Fetched");
        Ok(())
    }

    fn push(&self, remote: &str, refname: &str, delete: bool, auth: &Auth) -> GitResult<()> {
        let mut remote_handle = self
            .repo
            .find_remote(remote)
            .map_err(|e| not_found(remote, e))?;

        let refspec = if delete {
            format!(":{}", refname)
        } else {
            format!("{}:{}", refname, refname)
        };

        let rejection: RefCell<Option<String>> = RefCell::new(None);
        {
            let mut callbacks = auth.callbacks();
            callbacks.push_update_reference(|_refname, status| {
                if let Some(message) = status {
                    *rejection.borrow_mut() = Some(message.to_string());
                }
                Ok(())
            });

            let mut push_options = PushOptions::new();
            push_options.remote_callbacks(callbacks);

            remote_handle
                .push(&[refspec.as_str()], Some(&mut push_options))
                .map_err(|e| auth.classify(e))?;
        }

        if let Some(message) = rejection.into_inner() {
            return Err(GitError::PushRejected { refspec, message });
        }

        info!(remote, refspec = %refspec, "Pushed");
        Ok(())
    }

    fn list_remote_refs(
        &self,
        remote: &str,
        peel_tags: bool,
        auth: &Auth,
    ) -> GitResult<Vec<RemoteRef>> {
        let mut remote_handle = self
            .repo
            .find_remote(remote)
            .map_err(|e| not_found(remote, e))?;

        let connection = remote_handle
            .connect_auth(Direction::Fetch, Some(auth.callbacks()), None)
            .map_err(|e| auth.classify(e))?;

        let mut refs: Vec<RemoteRef> = Vec::new();
        let mut peeled: Vec<(String, String)> = Vec::new();
        for head in connection.list().map_err(|e| auth.classify(e))? {
            let name = head.name();
            if let Some(base) = name.strip_suffix("^{}") {
                peeled.push((base.to_string(), head.oid().to_string()));
            } else {
                refs.push(RemoteRef {
                    name: name.to_string(),
                    oid: head.oid().to_string(),
                    peeled: None,
                });
            }
        }

        if peel_tags {
            for (base, oid) in peeled {
                if let Some(entry) = refs.iter_mut().find(|r| r.name == base) {
                    entry.peeled = Some(oid);
                }
            }
        }

        debug!(remote, refs = refs.len(), "Listed remote refs");
        Ok(refs)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn not_found(name: &str, err: git2::Error) -> GitError {
    if err.code() == ErrorCode::NotFound {
        GitError::NotFound(name.to_string())
    } else {
        GitError::Git(err)
    }
}

fn signature(identity: &Identity) -> GitResult<Signature<'static>> {
    Ok(Signature::now(&identity.name, &identity.email)?)
}

fn author(signature: &Signature<'_>) -> Author {
    let when = signature.when();
    Author {
        name: signature.name().unwrap_or_default().to_string(),
        email: signature.email().unwrap_or_default().to_string(),
        timestamp: when.seconds(),
        timezone_offset: -when.offset_minutes(),
    }
}

fn commit_record(commit: &git2::Commit<'_>) -> CommitRecord {
    CommitRecord {
        oid: commit.id().to_string(),
        message: commit.message().unwrap_or_default().to_string(),
        author: author(&commit.author()),
        parents: commit.parent_ids().map(|oid| oid.to_string()).collect(),
    }
}
