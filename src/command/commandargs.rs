//! Parsing of the caller identity and the SSH client's command line

use std::fmt;

use crate::error::{Result, ShellError};

/// Who is connecting, as named by the authorized key's forced command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Who {
    /// `key-<id>`
    KeyId(String),
    /// `username-<name>`
    Username(String),
}

impl Who {
    /// Parse `key-<digits>` or `username-<name>`
    pub fn parse(who: &str) -> Option<Self> {
        if let Some(id) = who.strip_prefix("key-") {
            if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
                return Some(Who::KeyId(id.to_string()));
            }
        }
        if let Some(name) = who.strip_prefix("username-") {
            if !name.is_empty() {
                return Some(Who::Username(name.to_string()));
            }
        }
        None
    }

    pub fn key_id(&self) -> Option<&str> {
        match self {
            Who::KeyId(id) => Some(id),
            Who::Username(_) => None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Who::Username(name) => Some(name),
            Who::KeyId(_) => None,
        }
    }
}

impl fmt::Display for Who {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Who::KeyId(id) => write!(f, "user with key {}", id),
            Who::Username(name) => write!(f, "user {}", name),
        }
    }
}

/// Commands the shell knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    Discover,
    LfsAuthenticate,
    UploadPack,
    ReceivePack,
    UploadArchive,
}

impl CommandType {
    /// Name used on the command line, in `migration.features` and as the
    /// access check action
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Discover => "discover",
            CommandType::LfsAuthenticate => "git-lfs-authenticate",
            CommandType::UploadPack => "git-upload-pack",
            CommandType::ReceivePack => "git-receive-pack",
            CommandType::UploadArchive => "git-upload-archive",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "git-lfs-authenticate" => Some(CommandType::LfsAuthenticate),
            "git-upload-pack" => Some(CommandType::UploadPack),
            "git-receive-pack" => Some(CommandType::ReceivePack),
            "git-upload-archive" => Some(CommandType::UploadArchive),
            _ => None,
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Git LFS operation requested by `git-lfs-authenticate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LfsOperation {
    Download,
    Upload,
}

impl LfsOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            LfsOperation::Download => "download",
            LfsOperation::Upload => "upload",
        }
    }

    /// Git command whose access rules govern this operation
    pub fn access_action(&self) -> CommandType {
        match self {
            LfsOperation::Download => CommandType::UploadPack,
            LfsOperation::Upload => CommandType::ReceivePack,
        }
    }
}

/// A validated request from the SSH client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandArgs {
    /// Caller identity, if the forced command named one
    pub who: Option<Who>,

    pub command_type: CommandType,

    /// Repository path with surrounding slashes removed
    pub repo: Option<String>,

    /// Only set for `git-lfs-authenticate`
    pub lfs_operation: Option<LfsOperation>,

    /// The command line as the client sent it
    pub original_command: String,
}

impl CommandArgs {
    /// Parse the forced command's `who` argument and `SSH_ORIGINAL_COMMAND`
    pub fn parse(who: &str, original_command: &str) -> Result<Self> {
        let who = Who::parse(who);
        let mut words = split_words(original_command)?;

        if words.is_empty() {
            return Ok(Self {
                who,
                command_type: CommandType::Discover,
                repo: None,
                lfs_operation: None,
                original_command: original_command.to_string(),
            });
        }

        // `git upload-pack` is an alias of `git-upload-pack`
        if words[0] == "git" && words.len() > 1 {
            let verb = words.remove(1);
            words[0] = format!("git-{}", verb);
        }

        let command_type =
            CommandType::from_name(&words[0]).ok_or(ShellError::DisallowedCommand)?;

        let (repo, lfs_operation) = match (command_type, &words[1..]) {
            (CommandType::LfsAuthenticate, [repo, operation]) => {
                let operation = match operation.as_str() {
                    "download" => LfsOperation::Download,
                    "upload" => LfsOperation::Upload,
                    _ => return Err(ShellError::DisallowedCommand),
                };
                (repo, Some(operation))
            }
            (CommandType::LfsAuthenticate, _) => return Err(ShellError::DisallowedCommand),
            (_, [repo]) => (repo, None),
            _ => return Err(ShellError::DisallowedCommand),
        };

        Ok(Self {
            who,
            command_type,
            repo: Some(sanitize_repo_path(repo)?),
            lfs_operation,
            original_command: original_command.to_string(),
        })
    }

    /// Repository path, empty for commands without one
    pub fn repo(&self) -> &str {
        self.repo.as_deref().unwrap_or("")
    }
}

/// Trim surrounding slashes and refuse paths that climb out of the storage
pub fn sanitize_repo_path(path: &str) -> Result<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() || trimmed.split('/').any(|segment| segment == "..") {
        return Err(ShellError::InvalidRepoPath(path.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Split a command line into words the way a POSIX shell would, without
/// expansions. Unterminated quotes are rejected.
pub fn split_words(line: &str) -> Result<Vec<String>> {
    shell_words::split(line).map_err(|_| ShellError::DisallowedCommand)
}
