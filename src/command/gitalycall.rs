//! The flow shared by the Git commands
//!
//! Check access with the internal API, show its console messages, then
//! stream the session through Gitaly.

use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::commandargs::{CommandArgs, CommandType};
use crate::config::Config;
use crate::error::{Result, ShellError};
use crate::gitaly::{relay, GitalyDialer, SshService};
use crate::gitlabnet::accessverifier::{AccessResponse, AccessVerifier};
use crate::gitlabnet::{blocking, GitlabClient};
use crate::handler::{GitalyCommand, Outcome};
use crate::readwriter::ReadWriter;

/// Configuration and parsed arguments a Git command runs with
#[derive(Debug, Clone)]
pub struct GitContext {
    pub config: Config,
    pub args: CommandArgs,
}

/// A Git command served by a Gitaly SSH RPC
pub trait GitalyOperation {
    type Service: SshService;

    fn context(&self) -> &GitContext;

    /// First request of the call, built from the access check
    fn build_request(&self, access: &AccessResponse) -> <Self::Service as SshService>::Request;
}

/// Verify access, then relay `rw` through Gitaly
pub async fn execute<O: GitalyOperation>(op: &O, mut rw: ReadWriter) -> Outcome {
    let ctx = op.context();

    let access = match verify_access(ctx, ctx.args.command_type).await {
        Ok(access) => access,
        Err(e) => return Outcome::failure(e),
    };

    if let Err(e) = display_console_messages(&mut rw, &access.gl_console_messages).await {
        return Outcome::failure(e);
    }

    let identity = match ctx.args.who {
        Some(ref who) if !ctx.config.audit_usernames => who.to_string(),
        _ => format!("user {}", access.gl_username),
    };
    info!(
        "executing git command <{} {}> for {}",
        O::Service::NAME,
        ctx.args.repo(),
        identity
    );

    perform_gitaly_call(op, &access, rw).await
}

/// Ask the internal API whether the caller may run `action`
pub async fn verify_access(ctx: &GitContext, action: CommandType) -> Result<AccessResponse> {
    let who = ctx.args.who.clone().ok_or(ShellError::InvalidWho)?;
    let repo = ctx.args.repo().to_string();
    let config = ctx.config.clone();

    blocking(move || {
        let verifier = AccessVerifier::new(GitlabClient::new(&config)?);
        verifier.verify(action, &repo, &who)
    })
    .await
}

/// Write each API console message to stderr as `remote: <line>`
pub async fn display_console_messages(rw: &mut ReadWriter, messages: &[String]) -> Result<()> {
    if messages.is_empty() {
        return Ok(());
    }
    for line in messages {
        rw.err_out
            .write_all(format!("remote: {}\n", line).as_bytes())
            .await?;
    }
    rw.err_out.flush().await?;
    Ok(())
}

/// Dial the Gitaly named in `access` and relay `rw` through it
pub async fn perform_gitaly_call<O: GitalyOperation>(
    op: &O,
    access: &AccessResponse,
    rw: ReadWriter,
) -> Outcome {
    let token = Some(access.gitaly.token.clone());
    let request = op.build_request(access);
    debug!("Calling gitaly at {}", access.gitaly.address);

    GitalyCommand::new(
        O::Service::NAME,
        access.gitaly.address.clone(),
        GitalyDialer::new(token),
    )
    .run(request, |cancel, conn, request| {
        relay::<O::Service>(cancel, conn, request, rw)
    })
    .await
}

/// Protocol version to ask Gitaly for: the client's, else the API's
pub fn git_protocol(client: Option<&str>, access: &AccessResponse) -> String {
    client
        .filter(|p| !p.is_empty())
        .unwrap_or(access.git_protocol.as_str())
        .to_string()
}
