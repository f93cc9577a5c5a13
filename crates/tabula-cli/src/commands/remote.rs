//! Remote commands: pushing, fetching and integrating remote changes.

use anyhow::Result;
use tabula_core::{Credentials, RemoteRepositoryChanges};
use tabula_ops::{OpsContext, RemoteRequest};

use crate::output::{describe_current, short, Output};

pub async fn push(
    ctx: &OpsContext,
    repo: String,
    credentials: Option<Credentials>,
    out: &Output,
) -> Result<()> {
    let request = RemoteRequest::new(repo).with_credentials(credentials);
    let result = ctx.push_commits(request).await;
    out.emit(result, |pushed| {
        if pushed.pushed {
            println!("⬆️  Pushed {} at {}", pushed.branch, short(&pushed.head_oid));
        } else {
            println!("Remote already has every commit of {}", pushed.branch);
        }
    })
}

/// Show what a pull would integrate.
pub async fn changes(
    ctx: &OpsContext,
    repo: String,
    credentials: Option<Credentials>,
    out: &Output,
) -> Result<()> {
    let request = RemoteRequest::new(repo).with_credentials(credentials);
    let result = ctx.remote_changes(request).await;
    out.emit(result, print_remote_changes)
}

pub async fn fetch(
    ctx: &OpsContext,
    repo: String,
    credentials: Option<Credentials>,
    out: &Output,
) -> Result<()> {
    let request = RemoteRequest::new(repo).with_credentials(credentials);
    let result = ctx.fetch(request).await;
    out.emit(result, |_| println!("⬇️  Fetched"))
}

pub async fn pull(
    ctx: &OpsContext,
    repo: String,
    credentials: Option<Credentials>,
    out: &Output,
) -> Result<()> {
    let request = RemoteRequest::new(repo).with_credentials(credentials);
    let result = ctx.pull(request).await;
    out.emit(result, |pulled| {
        if pulled.is_up_to_date() {
            println!("✅ Already up to date");
        } else {
            print_remote_changes(&pulled.changes);
            println!();
            println!("✅ Pulled");
        }
        println!("📌 Version:    {}", describe_current(&pulled.current));
    })
}

fn print_remote_changes(changes: &RemoteRepositoryChanges) {
    if changes.is_empty() {
        println!("No remote changes");
        return;
    }

    println!("🌐 Remote changes:");
    if let Some(draft) = &changes.new_draft {
        println!("   + new draft {} ({})", draft.name, draft.branch);
    }
    if let Some(commits) = &changes.new_commits {
        println!(
            "   ~ draft {} moved {} → {}",
            commits.branch,
            short(&commits.local_oid),
            short(&commits.remote_oid)
        );
    }
    if let Some(draft) = &changes.deleted_draft {
        println!("   - draft {} was deleted", draft.name);
    }
    for tag in &changes.new_published_versions {
        println!("   🏷️  published {}", tag.name);
    }
}
