//! Hand the session to the legacy shell

use std::ffi::OsString;
use std::path::PathBuf;

use tracing::info;

use crate::config::Config;
use crate::error::ShellError;
use crate::handler::Outcome;

#[derive(Debug, Clone)]
pub struct FallbackCommand {
    /// Executable to run instead of this one
    pub program: PathBuf,

    /// Arguments as this process received them, program name first
    pub argv: Vec<OsString>,
}

impl FallbackCommand {
    /// Fall back to the legacy shell next to this executable with our own argv
    pub fn from_env(config: &Config) -> Self {
        Self {
            program: config.fallback_program(),
            argv: std::env::args_os().collect(),
        }
    }

    /// Replace this process with the legacy shell.
    ///
    /// Only returns if the exec failed.
    #[cfg(unix)]
    pub fn execute(&self) -> Outcome {
        use std::os::unix::process::CommandExt;

        info!("falling back to {}", self.program.display());

        let mut command = std::process::Command::new(&self.program);
        if let Some((arg0, rest)) = self.argv.split_first() {
            command.arg0(arg0).args(rest);
        }
        let err = command.exec();
        Outcome::failure(ShellError::Io(err))
    }

    /// Run the legacy shell and pass its exit status on
    #[cfg(not(unix))]
    pub fn execute(&self) -> Outcome {
        info!("falling back to {}", self.program.display());

        let status = std::process::Command::new(&self.program)
            .args(self.argv.iter().skip(1))
            .status();
        match status {
            Ok(status) => Outcome::new(status.code().unwrap_or(1), Ok(())),
            Err(e) => Outcome::failure(ShellError::Io(e)),
        }
    }
}
