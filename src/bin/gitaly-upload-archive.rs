//! gitaly-upload-archive <address> <request-json>
//!
//! Relays stdio through Gitaly's SSH service for `git-upload-archive`. The
//! credential, if any, is read from `GITALY_TOKEN`.

use std::process::ExitCode;

use tracing::Level;

use gitlab_shell::gitaly::UploadArchive;
use gitlab_shell::{handler, logging, ReadWriter};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_stderr(Level::WARN);

    let args: Vec<String> = std::env::args().collect();
    let outcome = handler::handle::<UploadArchive>(&args, ReadWriter::stdio()).await;

    if let Some(ref e) = outcome.error {
        eprintln!("gitaly-upload-archive: {}", e);
    }

    outcome.to_exit_code()
}
