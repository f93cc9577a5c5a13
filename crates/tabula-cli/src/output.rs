//! Human and JSON rendering of operation results.

use anyhow::Result;
use serde::Serialize;
use tabula_core::{CurrentVersion, DraftVersion, PublishedVersion, TableChange};
use tabula_ops::{OpsResult, Outcome};

/// Where command results go.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Render `result`, either as a tagged JSON outcome or through `human`.
    ///
    /// Failures still make the process exit non-zero in JSON mode, after the
    /// outcome has been printed.
    pub fn emit<T: Serialize>(&self, result: OpsResult<T>, human: impl FnOnce(&T)) -> Result<()> {
        if !self.json {
            human(&result?);
            return Ok(());
        }

        let outcome = Outcome::from(result);
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        match outcome {
            Outcome::Success { .. } => Ok(()),
            Outcome::Error { kind, message } => anyhow::bail!("{}: {}", kind, message),
        }
    }
}

pub fn describe_current(current: &CurrentVersion) -> String {
    match current {
        CurrentVersion::Published(version) if version.newest => {
            format!("{} (published, newest)", version.name)
        }
        CurrentVersion::Published(version) => format!("{} (published)", version.name),
        CurrentVersion::Draft(draft) => format!("{} (draft on {})", draft.name, draft.branch),
        CurrentVersion::Initial { oid } => format!("initial commit {}", short(oid)),
    }
}

pub fn print_published(version: &PublishedVersion) {
    let marker = if version.newest { " ⭐ newest" } else { "" };
    println!(
        "   • {:<20} {}  {}{}",
        version.name,
        short(&version.main_commit_oid),
        version.tagger.name,
        marker
    );
}

pub fn print_draft(draft: &DraftVersion) {
    println!("   • {:<20} {}", draft.name, draft.branch);
    println!(
        "     based on {}, {}",
        draft.base_published_version,
        if draft.has_commits() {
            "has commits"
        } else {
            "no commits yet"
        }
    );
}

pub fn print_changes(changes: &[TableChange]) {
    if changes.is_empty() {
        println!("   (no table changes)");
        return;
    }
    for change in changes {
        println!("   {} {}", change.kind.symbol(), change.path);
    }
}

/// First eight characters of an oid.
pub fn short(oid: &str) -> &str {
    &oid[..8.min(oid.len())]
}
