//! Configuration for the operations layer.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tabula_git::Identity;

use crate::error::{OpsError, OpsResult};

const DEFAULT_USER_NAME: &str = "Tabula";
const DEFAULT_USER_EMAIL: &str = "tabula@localhost";

/// Configuration for Tabula operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding one clone per repository, named by repository id.
    #[serde(default = "default_repositories_dir")]
    pub repositories_dir: PathBuf,

    /// Author name written to `user.name` of new clones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    /// Author email written to `user.email` of new clones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,

    /// File extensions treated as table files when comparing versions.
    #[serde(default = "default_table_extensions")]
    pub table_extensions: Vec<String>,

    /// JSON file backing the default credential store.
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "tabula", "tabula")
}

fn default_repositories_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("repositories"))
        .unwrap_or_else(|| PathBuf::from(".tabula/repositories"))
}

fn default_credentials_file() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("credentials.json"))
        .unwrap_or_else(|| PathBuf::from(".tabula/credentials.json"))
}

fn default_table_extensions() -> Vec<String> {
    vec!["csv".into(), "tsv".into(), "json".into()]
}

fn parse_extensions(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repositories_dir: default_repositories_dir(),
            user_name: None,
            user_email: None,
            table_extensions: default_table_extensions(),
            credentials_file: default_credentials_file(),
        }
    }
}

impl Config {
    /// Load configuration from disk with environment overrides.
    pub fn load() -> OpsResult<Self> {
        let config = match Self::config_file_path() {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)?;
                serde_json::from_str(&contents)?
            }
            _ => Self::default(),
        };

        Ok(config.with_env_overrides())
    }

    /// Configuration rooted at `dir`, ignoring the user's config file.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            repositories_dir: dir.join("repositories"),
            credentials_file: dir.join("credentials.json"),
            ..Self::default()
        }
    }

    /// Apply `TABULA_*` environment variables on top of this configuration.
    pub fn with_env_overrides(self) -> Self {
        Self {
            repositories_dir: std::env::var("TABULA_REPOSITORIES_DIR")
                .map(PathBuf::from)
                .unwrap_or(self.repositories_dir),
            user_name: std::env::var("TABULA_USER_NAME").ok().or(self.user_name),
            user_email: std::env::var("TABULA_USER_EMAIL").ok().or(self.user_email),
            table_extensions: std::env::var("TABULA_TABLE_EXTENSIONS")
                .map(|v| parse_extensions(&v))
                .unwrap_or(self.table_extensions),
            credentials_file: std::env::var("TABULA_CREDENTIALS_FILE")
                .map(PathBuf::from)
                .unwrap_or(self.credentials_file),
        }
    }

    /// Save configuration to disk.
    pub fn save(&self) -> OpsResult<()> {
        if let Some(path) = Self::config_file_path() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(self)?;
            std::fs::write(&path, contents)?;
        }
        Ok(())
    }

    /// Get the path to the configuration file (`TABULA_CONFIG_FILE` wins).
    pub fn config_file_path() -> Option<PathBuf> {
        std::env::var_os("TABULA_CONFIG_FILE")
            .map(PathBuf::from)
            .or_else(|| project_dirs().map(|dirs| dirs.config_dir().join("config.json")))
    }

    /// On-disk location of the clone for `repository_id`.
    pub fn repository_path(&self, repository_id: &str) -> PathBuf {
        self.repositories_dir.join(repository_id)
    }

    /// Identity written into new clones.
    pub fn identity(&self) -> Identity {
        Identity::new(
            self.user_name.as_deref().unwrap_or(DEFAULT_USER_NAME),
            self.user_email.as_deref().unwrap_or(DEFAULT_USER_EMAIL),
        )
    }

    /// Whether `path` names a table file.
    pub fn is_table_file(&self, path: &str) -> bool {
        if self.table_extensions.is_empty() {
            return true;
        }
        Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.table_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "repositories_dir" => Some(self.repositories_dir.display().to_string()),
            "user_name" => self.user_name.clone(),
            "user_email" => self.user_email.clone(),
            "table_extensions" => Some(self.table_extensions.join(",")),
            "credentials_file" => Some(self.credentials_file.display().to_string()),
            _ => None,
        }
    }

    /// Set a configuration value by key.
    pub fn set(&mut self, key: &str, value: &str) -> OpsResult<()> {
        match key {
            "repositories_dir" => {
                self.repositories_dir = PathBuf::from(value);
            }
            "user_name" => {
                self.user_name = Some(value.to_string());
            }
            "user_email" => {
                self.user_email = Some(value.to_string());
            }
            "table_extensions" => {
                self.table_extensions = parse_extensions(value);
            }
            "credentials_file" => {
                self.credentials_file = PathBuf::from(value);
            }
            _ => {
                return Err(OpsError::Config(format!("Unknown config key: {}", key)));
            }
        }
        Ok(())
    }

    /// Keys accepted by [`get`](Self::get) and [`set`](Self::set).
    pub fn keys() -> &'static [&'static str] {
        &[
            "repositories_dir",
            "user_name",
            "user_email",
            "table_extensions",
            "credentials_file",
        ]
    }
}
