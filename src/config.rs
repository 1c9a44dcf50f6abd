//! Configuration and CLI argument parsing for gitlab-shell

use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::error::{Result, ShellError};

/// Name of the configuration file in the root directory
pub const CONFIG_FILE_NAME: &str = "config.yml";

/// Default read timeout for internal API calls in seconds
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;

/// Executable the legacy fallback replaces this process with
pub const FALLBACK_PROGRAM: &str = "gitlab-shell-ruby";

/// Commands that have a native implementation
pub const NATIVE_FEATURES: &[&str] = &[
    "discover",
    "git-lfs-authenticate",
    "git-upload-pack",
    "git-receive-pack",
    "git-upload-archive",
];

/// gitlab-shell CLI arguments
///
/// sshd runs this as the forced command of an authorized key, so the SSH
/// client's command line and protocol version arrive through the
/// environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "gitlab-shell")]
#[command(version)]
#[command(about = "Authorizes Git over SSH and relays it to Gitaly")]
pub struct Args {
    /// Caller identity: `key-<id>` or `username-<name>`
    #[arg(default_value = "")]
    pub who: String,

    /// Path to config.yml (defaults to the root directory's)
    #[arg(long, env = "GITLAB_SHELL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Command line the SSH client asked for
    #[arg(long, env = "SSH_ORIGINAL_COMMAND", default_value = "", hide = true)]
    pub original_command: String,

    /// Git wire protocol version requested by the client
    #[arg(long, env = "GIT_PROTOCOL", hide = true)]
    pub git_protocol: Option<String>,
}

/// Directories derived from the running executable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeDirs {
    /// Directory holding the gitlab-shell executables
    pub bin_dir: PathBuf,

    /// Installation root, the parent of `bin_dir`
    pub root_dir: PathBuf,
}

impl RuntimeDirs {
    /// Build from an explicit binary directory
    pub fn new(bin_dir: impl Into<PathBuf>) -> Self {
        let bin_dir = bin_dir.into();
        let root_dir = bin_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| bin_dir.clone());
        Self { bin_dir, root_dir }
    }

    /// Locate the directories of the current executable
    pub fn from_executable() -> Result<Self> {
        let exe = std::env::current_exe()?.canonicalize()?;
        let bin_dir = exe
            .parent()
            .ok_or_else(|| ShellError::config(format!("no parent directory for {}", exe.display())))?;
        Ok(Self::new(bin_dir))
    }
}

/// HTTP client settings for the internal API
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpSettings {
    /// Read timeout in seconds
    pub read_timeout: u64,

    /// Basic auth user
    pub user: Option<String>,

    /// Basic auth password
    pub password: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT_SECS,
            user: None,
            password: None,
        }
    }
}

/// Which commands run natively instead of through the fallback
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Migration {
    pub enabled: bool,
    pub features: Vec<String>,
}

impl Default for Migration {
    fn default() -> Self {
        Self {
            enabled: true,
            features: NATIVE_FEATURES.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Parsed and validated configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the GitLab instance
    pub gitlab_url: String,

    /// File holding the shared secret, relative to the root directory
    pub secret_file: PathBuf,

    /// Inline shared secret, takes precedence over `secret_file`
    pub secret: Option<String>,

    /// Log file, relative to the root directory
    pub log_file: PathBuf,

    /// Default log level; `RUST_LOG` overrides it
    pub log_level: String,

    /// Log usernames instead of key ids
    pub audit_usernames: bool,

    pub http_settings: HttpSettings,

    pub migration: Migration,

    /// Where this process runs from
    #[serde(skip)]
    pub dirs: RuntimeDirs,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gitlab_url: String::new(),
            secret_file: PathBuf::from(".gitlab_shell_secret"),
            secret: None,
            log_file: PathBuf::from("gitlab-shell.log"),
            log_level: "info".to_string(),
            audit_usernames: false,
            http_settings: HttpSettings::default(),
            migration: Migration::default(),
            dirs: RuntimeDirs::default(),
        }
    }
}

impl Config {
    /// Load config.yml from `path`, or from the root directory if `None`
    pub fn load(path: Option<&Path>, dirs: RuntimeDirs) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dirs.root_dir.join(CONFIG_FILE_NAME));

        let text = std::fs::read_to_string(&path).map_err(|e| {
            ShellError::config(format!("failed to read {}: {}", path.display(), e))
        })?;

        Self::from_yaml(&text, dirs)
    }

    /// Parse and validate YAML configuration text
    pub fn from_yaml(text: &str, dirs: RuntimeDirs) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(text)
            .map_err(|e| ShellError::config(format!("invalid YAML: {}", e)))?;
        config.dirs = dirs;
        config.validate()?;
        Ok(config)
    }

    /// Check every setting, reporting all problems at once
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.gitlab_url.is_empty() {
            errors.push("Missing required gitlab_url".to_string());
        } else {
            match Url::parse(&self.gitlab_url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => errors.push(format!(
                    "gitlab_url must use http or https, got '{}'",
                    url.scheme()
                )),
                Err(e) => errors.push(format!("Invalid gitlab_url '{}': {}", self.gitlab_url, e)),
            }
        }

        if self.http_settings.read_timeout == 0 {
            errors.push("http_settings.read_timeout must be greater than 0".to_string());
        }

        if self.http_settings.user.is_some() != self.http_settings.password.is_some() {
            errors.push("http_settings.user and http_settings.password go together".to_string());
        }

        if self.log_level.parse::<LevelFilter>().is_err() {
            errors.push(format!("Unknown log_level '{}'", self.log_level));
        }

        if !errors.is_empty() {
            return Err(ShellError::Config(format!(
                "Configuration error:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }

    /// Resolve `path` against the root directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dirs.root_dir.join(path)
        }
    }

    /// Absolute path of the log file
    pub fn log_path(&self) -> PathBuf {
        self.resolve(&self.log_file)
    }

    /// The shared secret for the internal API, whitespace trimmed
    pub fn secret(&self) -> Result<String> {
        if let Some(secret) = self.secret.as_deref().filter(|s| !s.trim().is_empty()) {
            return Ok(secret.trim().to_string());
        }

        let path = self.resolve(&self.secret_file);
        let secret = std::fs::read_to_string(&path).map_err(|e| {
            ShellError::config(format!("failed to read secret file {}: {}", path.display(), e))
        })?;
        Ok(secret.trim().to_string())
    }

    /// Base URL of the internal API
    pub fn internal_api_url(&self) -> String {
        format!("{}/api/v4/internal", self.gitlab_url.trim_end_matches('/'))
    }

    /// The legacy executable commands fall back to
    pub fn fallback_program(&self) -> PathBuf {
        self.dirs.bin_dir.join(FALLBACK_PROGRAM)
    }

    /// Whether `feature` should run natively
    pub fn feature_enabled(&self, feature: &str) -> bool {
        self.migration.enabled && self.migration.features.iter().any(|f| f == feature)
    }
}
