//! Repository commands: cloning, listing and selecting clones.

use anyhow::Result;
use tabula_core::Credentials;
use tabula_ops::{CloneRequest, OpsContext, RepositoryRequest};
use tracing::debug;

use crate::output::{describe_current, Output};

/// Clone a remote repository.
pub async fn clone(
    ctx: &OpsContext,
    url: String,
    credentials: Option<Credentials>,
    out: &Output,
) -> Result<()> {
    let request = CloneRequest::new(url).with_credentials(credentials);
    let result = ctx.clone_repository(request).await;

    out.emit(result, |cloned| {
        if cloned.already_cloned {
            println!("📦 Already cloned: {}", cloned.repository.name);
        } else {
            println!("✅ Cloned {}", cloned.repository.name);
        }
        println!("🆔 Id:         {}", cloned.repository.id);
        println!("📍 Path:       {}", cloned.path.display());
        println!("📌 Version:    {}", describe_current(&cloned.current));
    })
}

/// List cloned repositories.
pub async fn list(ctx: &OpsContext, out: &Output) -> Result<()> {
    let result = ctx.list_repositories().await;

    out.emit(result, |entries| {
        if entries.is_empty() {
            println!("No repositories cloned yet. Use `tb clone <url>`.");
            return;
        }
        println!("📦 Repositories:");
        for entry in entries {
            println!(
                "   • {:<40} {}",
                entry.id,
                entry.remote_url.as_deref().unwrap_or("(no remote)")
            );
        }
    })
}

/// Forget the stored credentials of a repository.
pub async fn forget_credentials(ctx: &OpsContext, repo: String, out: &Output) -> Result<()> {
    let result = ctx.forget_credentials(RepositoryRequest::new(&repo)).await;
    out.emit(result, |_| println!("🔑 Forgot credentials for {}", repo))
}

/// Pick the repository a command operates on.
///
/// An explicit id wins, then the clone containing the current directory,
/// then the only clone there is.
pub async fn select(ctx: &OpsContext, explicit: Option<String>) -> Result<String> {
    if let Some(repo) = explicit {
        return Ok(repo);
    }

    if let Ok(cwd) = std::env::current_dir() {
        let root = &ctx.config.repositories_dir;
        let root = root.canonicalize().unwrap_or_else(|_| root.clone());
        if let Some(id) = cwd
            .strip_prefix(&root)
            .ok()
            .and_then(|rel| rel.components().next())
            .and_then(|c| c.as_os_str().to_str())
        {
            debug!(repository = id, "Selected repository from working directory");
            return Ok(id.to_string());
        }
    }

    let entries = ctx.list_repositories().await?;
    match entries.as_slice() {
        [only] => Ok(only.id.clone()),
        [] => anyhow::bail!("No repositories cloned yet. Use `tb clone <url>` first."),
        many => anyhow::bail!(
            "Several repositories are cloned; pass --repo with one of: {}",
            many.iter()
                .map(|e| e.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}
