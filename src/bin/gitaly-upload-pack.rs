//! gitaly-upload-pack <address> <request-json>
//!
//! Relays stdio through Gitaly's SSH service for `git-upload-pack`. The
//! credential, if any, is read from `GITALY_TOKEN`.

use std::process::ExitCode;

use tracing::Level;

use gitlab_shell::gitaly::UploadPack;
use gitlab_shell::{handler, logging, ReadWriter};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_stderr(Level::WARN);

    let args: Vec<String> = std::env::args().collect();
    let outcome = handler::handle::<UploadPack>(&args, ReadWriter::stdio()).await;

    if let Some(ref e) = outcome.error {
        eprintln!("gitaly-upload-pack: {}", e);
    }

    outcome.to_exit_code()
}
