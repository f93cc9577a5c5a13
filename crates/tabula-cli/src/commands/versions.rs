//! Version commands: listing, switching and the draft lifecycle.

use anyhow::Result;
use tabula_core::{Credentials, VersionSelector};
use tabula_ops::{
    CommitRequest, CompareRequest, CreateDraftRequest, HistoryRequest, OpsContext, RemoteRequest,
    RepositoryRequest, SwitchRequest,
};

use crate::output::{describe_current, print_changes, print_draft, print_published, short, Output};

pub async fn list(ctx: &OpsContext, repo: String, out: &Output) -> Result<()> {
    let result = ctx.versions(RepositoryRequest::new(repo)).await;

    out.emit(result, |versions| {
        println!("🏷️  Published versions:");
        if versions.published.is_empty() {
            println!("   (none)");
        }
        for version in &versions.published {
            print_published(version);
        }

        println!();
        println!("✏️  Draft:");
        match &versions.draft {
            Some(draft) => print_draft(draft),
            None => println!("   (none)"),
        }
    })
}

pub async fn current(ctx: &OpsContext, repo: String, out: &Output) -> Result<()> {
    let result = ctx.current_version(RepositoryRequest::new(repo)).await;
    out.emit(result, |current| println!("{}", describe_current(current)))
}

pub async fn status(ctx: &OpsContext, repo: String, out: &Output) -> Result<()> {
    let result = ctx.status(RepositoryRequest::new(repo)).await;

    out.emit(result, |status| {
        println!("📊 Tabula Status");
        println!("{:─<50}", "");
        println!();
        println!("📁 Repository: {}", status.repository);
        println!("📍 Path:       {}", status.path.display());
        println!("📌 Version:    {}", describe_current(&status.current));
        if let Some(draft) = &status.draft {
            if !status.current.is_draft() {
                println!("✏️  Draft:      {} ({})", draft.name, draft.branch);
            }
        }
        println!();
        println!("📝 Uncommitted changes:");
        print_changes(&status.changes);
    })
}

pub async fn switch(ctx: &OpsContext, repo: String, version: &str, out: &Output) -> Result<()> {
    let target = VersionSelector::parse(version);
    let result = ctx.switch_version(SwitchRequest::new(repo, target)).await;
    out.emit(result, |current| {
        println!("🔀 Switched to {}", describe_current(current));
    })
}

pub async fn create_draft(
    ctx: &OpsContext,
    repo: String,
    name: String,
    checkout: bool,
    credentials: Option<Credentials>,
    out: &Output,
) -> Result<()> {
    let mut request = CreateDraftRequest::new(repo, name).with_credentials(credentials);
    if !checkout {
        request = request.without_checkout();
    }

    let result = ctx.create_draft(request).await;
    out.emit(result, |draft| {
        println!("✏️  Created draft {}", draft.name);
        println!("   Branch:   {}", draft.branch);
        println!("   Based on: {}", draft.base_published_version);
    })
}

pub async fn delete_draft(
    ctx: &OpsContext,
    repo: String,
    credentials: Option<Credentials>,
    out: &Output,
) -> Result<()> {
    let request = RemoteRequest::new(repo).with_credentials(credentials);
    let result = ctx.delete_draft(request).await;
    out.emit(result, |draft| {
        println!("🗑️  Deleted draft {} ({})", draft.name, draft.branch);
    })
}

pub async fn publish_draft(
    ctx: &OpsContext,
    repo: String,
    credentials: Option<Credentials>,
    out: &Output,
) -> Result<()> {
    let request = RemoteRequest::new(repo).with_credentials(credentials);
    let result = ctx.publish_draft(request).await;
    out.emit(result, |version| {
        println!(
            "🚀 Published {} at {}",
            version.name,
            short(&version.main_commit_oid)
        );
    })
}

pub async fn discard(ctx: &OpsContext, repo: String, out: &Output) -> Result<()> {
    let result = ctx.discard_changes(RepositoryRequest::new(repo)).await;
    out.emit(result, |current| {
        println!("🧹 Discarded changes on {}", describe_current(current));
    })
}

pub async fn commit(ctx: &OpsContext, repo: String, message: String, out: &Output) -> Result<()> {
    let result = ctx.commit(CommitRequest::new(repo, message)).await;
    out.emit(result, |commit| {
        println!("✅ Committed {} {}", short(&commit.oid), commit.message.trim());
    })
}

pub async fn diff(
    ctx: &OpsContext,
    repo: String,
    from: Option<String>,
    to: Option<String>,
    out: &Output,
) -> Result<()> {
    let request = CompareRequest {
        repository: repo,
        from: from.as_deref().map(VersionSelector::parse),
        to: to.as_deref().map(VersionSelector::parse),
    };

    let result = ctx.compare(request).await;
    out.emit(result, |compared| {
        println!(
            "🔍 {} → {}",
            compared.from,
            compared.to.as_deref().unwrap_or("working tree")
        );
        print_changes(&compared.changes);
    })
}

pub async fn history(
    ctx: &OpsContext,
    repo: String,
    version: Option<String>,
    out: &Output,
) -> Result<()> {
    let mut request = HistoryRequest::new(repo);
    if let Some(version) = version.as_deref() {
        request = request.of(VersionSelector::parse(version));
    }

    let result = ctx.history(request).await;
    out.emit(result, |history| {
        println!("📜 History of {}", history.version);
        for commit in &history.commits {
            let pending = if commit.in_remote { "" } else { "  (not pushed)" };
            println!(
                "   {} {:<50} {}{}",
                short(&commit.oid),
                commit.message.lines().next().unwrap_or_default(),
                commit.author.name,
                pending
            );
        }
    })
}
