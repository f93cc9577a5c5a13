//! Shared fixtures: bare `file://` remotes seeded with git2 and contexts
//! rooted in a temp directory.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::{Oid, Repository, RepositoryInitOptions, Signature};
use tabula_core::Credentials;
use tabula_ops::{Config, MemoryCredentialStore, OpsContext};
use walkdir::WalkDir;

/// A bare repository acting as `origin`.
pub struct Remote {
    pub path: PathBuf,
    pub url: String,
}

impl Remote {
    /// Empty bare repository whose HEAD names `main`.
    pub fn init(root: &Path, name: &str) -> Self {
        let path = root.join(format!("{}.git", name));
        let mut options = RepositoryInitOptions::new();
        options.bare(true).initial_head("main");
        Repository::init_opts(&path, &options).unwrap();

        let url = url::Url::from_file_path(&path).unwrap().to_string();
        Self { path, url }
    }

    /// Remote with an `INITIAL_COMMIT` holding `people.csv`, tagged `v1.0`.
    pub fn seeded(root: &Path) -> Self {
        let remote = Self::init(root, "tables");
        let oid = remote.commit("INITIAL_COMMIT", &[("people.csv", "name,age\nada,36\n")]);
        remote.tag("v1.0", oid);
        remote
    }

    /// Remote with only the initial commit and no published versions.
    pub fn unpublished(root: &Path) -> Self {
        let remote = Self::init(root, "fresh");
        remote.commit("INITIAL_COMMIT", &[("people.csv", "name,age\n")]);
        remote
    }

    /// Commit `files` on top of `main` (creating it when absent).
    pub fn commit(&self, message: &str, files: &[(&str, &str)]) -> Oid {
        let repo = Repository::open_bare(&self.path).unwrap();
        let parent = repo
            .refname_to_id("refs/heads/main")
            .ok()
            .map(|oid| repo.find_commit(oid).unwrap());

        let base_tree = parent.as_ref().map(|c| c.tree().unwrap());
        let mut builder = repo.treebuilder(base_tree.as_ref()).unwrap();
        for (name, contents) in files {
            let blob = repo.blob(contents.as_bytes()).unwrap();
            builder.insert(name, blob, 0o100644).unwrap();
        }
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();

        let sig = signature();
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        repo.commit(Some("refs/heads/main"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }

    /// Annotated tag on `oid`.
    pub fn tag(&self, name: &str, oid: Oid) -> Oid {
        let repo = Repository::open_bare(&self.path).unwrap();
        let target = repo.find_object(oid, None).unwrap();
        repo.tag(name, &target, &signature(), name, false).unwrap()
    }

    /// Lightweight tag on `oid`.
    pub fn lightweight_tag(&self, name: &str, oid: Oid) {
        let repo = Repository::open_bare(&self.path).unwrap();
        let target = repo.find_object(oid, None).unwrap();
        repo.tag_lightweight(name, &target, false).unwrap();
    }

    /// Short names of the branches on the remote.
    pub fn branches(&self) -> Vec<String> {
        let repo = Repository::open_bare(&self.path).unwrap();
        repo.branches(Some(git2::BranchType::Local))
            .unwrap()
            .map(|b| b.unwrap().0.name().unwrap().unwrap().to_string())
            .collect()
    }

    pub fn tags(&self) -> Vec<String> {
        let repo = Repository::open_bare(&self.path).unwrap();
        let names = repo.tag_names(None).unwrap();
        names.iter().flatten().map(str::to_string).collect()
    }

    pub fn resolve(&self, refname: &str) -> Option<String> {
        let repo = Repository::open_bare(&self.path).unwrap();
        repo.refname_to_id(refname).ok().map(|oid| oid.to_string())
    }
}

fn signature() -> Signature<'static> {
    Signature::now("Seeder", "seeder@example.org").unwrap()
}

/// Context with its own data directory and an in-memory credential store.
pub fn context(root: &Path, name: &str) -> OpsContext {
    let config = Config {
        user_name: Some("Test User".into()),
        user_email: Some("test@example.org".into()),
        ..Config::in_dir(root.join(name))
    };
    OpsContext::with_credential_store(config, Arc::new(MemoryCredentialStore::new()))
}

pub fn creds() -> Option<Credentials> {
    Some(Credentials::new("tester", "secret"))
}

/// Every file and directory under `dir` with file contents.
pub fn snapshot(dir: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
    WalkDir::new(dir)
        .into_iter()
        .map(|entry| entry.unwrap())
        .map(|entry| {
            let relative = entry
                .path()
                .strip_prefix(dir)
                .unwrap()
                .to_string_lossy()
                .to_string();
            let contents = if entry.file_type().is_file() {
                Some(std::fs::read(entry.path()).unwrap())
            } else {
                None
            };
            (relative, contents)
        })
        .collect()
}
