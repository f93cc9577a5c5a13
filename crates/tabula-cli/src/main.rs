//! Tabula CLI - Versioned table repositories on top of Git.
//!
//! Every repository has a list of immutable published versions and at most
//! one draft. Commands operate on the repository selected with `--repo`, the
//! clone containing the current directory, or the only clone there is.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tabula_core::Credentials;
use tabula_ops::{Config, OpsContext};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

mod commands;
mod output;

use commands::{config as config_cmd, remote, repository, versions};
use output::Output;

/// Tabula CLI - Draft, publish and sync versions of table repositories.
#[derive(Parser, Debug)]
#[command(
    name = "tb",
    author,
    version,
    about = "Tabula: versioned tables backed by Git",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print results as tagged JSON outcomes
    #[arg(long, global = true)]
    json: bool,

    /// Repository id to operate on
    #[arg(short, long, global = true, env = "TABULA_REPOSITORY")]
    repo: Option<String>,

    /// Username for the remote
    #[arg(long, global = true, env = "TABULA_USERNAME")]
    username: Option<String>,

    /// Password or token for the remote
    #[arg(long, global = true, env = "TABULA_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Clone a remote repository and check out its newest version.
    Clone {
        /// Remote URL (http, https, ssh, git or file).
        url: String,
    },

    /// List cloned repositories.
    Repos,

    /// List published versions and the draft.
    Versions,

    /// Show the version HEAD is on.
    Current,

    /// Show the current version and uncommitted table changes.
    Status,

    /// Switch to a published version or the draft.
    Switch {
        /// Published version name or draft branch (`draft/...`).
        version: String,
    },

    /// Manage the draft.
    #[command(subcommand)]
    Draft(DraftCommands),

    /// Throw away uncommitted changes.
    Discard,

    /// Commit all changes on the draft.
    Commit {
        /// Commit message.
        #[arg(short, long)]
        message: String,
    },

    /// Push the draft's commits to the remote.
    Push,

    /// Show what changed on the remote without touching the repository.
    Changes,

    /// Fetch from the remote without integrating.
    Fetch,

    /// Integrate every remote change.
    Pull,

    /// List table changes between two versions or against the working tree.
    Diff {
        /// Base version (defaults to the current version).
        from: Option<String>,

        /// Other version (defaults to the working tree).
        to: Option<String>,
    },

    /// Show the commit history of a version.
    History {
        /// Version to inspect (defaults to the current version).
        version: Option<String>,
    },

    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Manage stored credentials.
    #[command(subcommand)]
    Credentials(CredentialCommands),
}

/// Draft subcommands.
#[derive(Subcommand, Debug)]
enum DraftCommands {
    /// Create a draft from the newest published version.
    Create {
        /// Name the draft will be published under.
        name: String,

        /// Stay on the current version.
        #[arg(long)]
        no_checkout: bool,
    },

    /// Delete the draft locally and on the remote.
    Delete,

    /// Publish the draft as a new version.
    Publish,
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration.
    Show,

    /// Set a configuration value.
    Set {
        /// Configuration key.
        key: String,
        /// Configuration value.
        value: String,
    },

    /// Get a configuration value.
    Get {
        /// Configuration key.
        key: String,
    },

    /// Reset configuration to defaults.
    Reset,

    /// Show path to config file.
    Path,
}

/// Credential subcommands.
#[derive(Subcommand, Debug)]
enum CredentialCommands {
    /// Forget the stored credentials of the repository.
    Forget,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .init();

    let config = Config::load()?;
    let out = Output::new(cli.json);
    let credentials = cli
        .username
        .map(|username| Credentials::new(username, cli.password.unwrap_or_default()));

    if let Commands::Config(config_cmd_inner) = cli.command {
        let mut config = config;
        return match config_cmd_inner {
            ConfigCommands::Show => config_cmd::show(&config, &out),
            ConfigCommands::Set { key, value } => config_cmd::set(&mut config, &key, &value, &out),
            ConfigCommands::Get { key } => config_cmd::get(&config, &key, &out),
            ConfigCommands::Reset => config_cmd::reset(&out),
            ConfigCommands::Path => config_cmd::path(&out),
        };
    }

    let ctx = OpsContext::new(config);

    match cli.command {
        Commands::Clone { url } => repository::clone(&ctx, url, credentials, &out).await?,
        Commands::Repos => repository::list(&ctx, &out).await?,
        command => {
            let repo = repository::select(&ctx, cli.repo).await?;
            run_in_repository(&ctx, repo, command, credentials, &out).await?;
        }
    }

    Ok(())
}

/// Dispatch a command that operates on one cloned repository.
async fn run_in_repository(
    ctx: &OpsContext,
    repo: String,
    command: Commands,
    credentials: Option<Credentials>,
    out: &Output,
) -> Result<()> {
    match command {
        Commands::Versions => versions::list(ctx, repo, out).await,
        Commands::Current => versions::current(ctx, repo, out).await,
        Commands::Status => versions::status(ctx, repo, out).await,
        Commands::Switch { version } => versions::switch(ctx, repo, &version, out).await,
        Commands::Draft(draft) => match draft {
            DraftCommands::Create { name, no_checkout } => {
                versions::create_draft(ctx, repo, name, !no_checkout, credentials, out).await
            }
            DraftCommands::Delete => versions::delete_draft(ctx, repo, credentials, out).await,
            DraftCommands::Publish => versions::publish_draft(ctx, repo, credentials, out).await,
        },
        Commands::Discard => versions::discard(ctx, repo, out).await,
        Commands::Commit { message } => versions::commit(ctx, repo, message, out).await,
        Commands::Diff { from, to } => versions::diff(ctx, repo, from, to, out).await,
        Commands::History { version } => versions::history(ctx, repo, version, out).await,
        Commands::Push => remote::push(ctx, repo, credentials, out).await,
        Commands::Changes => remote::changes(ctx, repo, credentials, out).await,
        Commands::Fetch => remote::fetch(ctx, repo, credentials, out).await,
        Commands::Pull => remote::pull(ctx, repo, credentials, out).await,
        Commands::Credentials(CredentialCommands::Forget) => {
            repository::forget_credentials(ctx, repo, out).await
        }
        Commands::Clone { .. } | Commands::Repos | Commands::Config(_) => {
            unreachable!("handled before repository selection")
        }
    }
}
