//! gitlab-shell - Git over SSH for GitLab
//!
//! sshd runs `gitlab-shell <who>` as the forced command of every GitLab key.
//! The shell parses the client's `SSH_ORIGINAL_COMMAND`, asks the GitLab
//! internal API whether the caller may run it, and streams the Git session
//! through a Gitaly SSH RPC.
//!
//! # Commands
//!
//! - *(no command)* - greet the caller by username
//! - `git-upload-pack <repo>` - fetch and clone
//! - `git-receive-pack <repo>` - push
//! - `git-upload-archive <repo>` - `git archive --remote`
//! - `git-lfs-authenticate <repo> <download|upload>` - Git LFS credentials
//!
//! Commands not enabled under `migration` in config.yml are handed to the
//! legacy `gitlab-shell-ruby` next to the executable.
//!
//! # Gitaly handlers
//!
//! `gitaly-upload-pack`, `gitaly-receive-pack` and `gitaly-upload-archive`
//! take a Gitaly address and a JSON request and relay stdio through the
//! matching RPC:
//!
//! ```bash
//! GITALY_TOKEN=secret gitaly-upload-pack tcp://gitaly:8075 \
//!   '{"repository":{"storage_name":"default","relative_path":"group/repo.git"}}'
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod gitaly;
pub mod gitlabnet;
pub mod handler;
pub mod logging;
pub mod pktline;
pub mod readwriter;

// Re-exports for convenience
pub use command::Command;
pub use config::{Args, Config, RuntimeDirs};
pub use error::{Result, ShellError};
pub use handler::{GitalyCommand, Outcome};
pub use readwriter::ReadWriter;
