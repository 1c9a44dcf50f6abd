//! `git-receive-pack`: push

use super::gitalycall::{self, git_protocol, GitContext, GitalyOperation};
use crate::gitaly::proto::SshReceivePackRequest;
use crate::gitaly::ReceivePack;
use crate::gitlabnet::accessverifier::AccessResponse;
use crate::handler::Outcome;
use crate::readwriter::ReadWriter;

#[derive(Debug, Clone)]
pub struct ReceivePackCommand {
    pub ctx: GitContext,
    pub git_protocol: Option<String>,
}

impl ReceivePackCommand {
    pub async fn execute(&self, rw: ReadWriter) -> Outcome {
        gitalycall::execute(self, rw).await
    }
}

impl GitalyOperation for ReceivePackCommand {
    type Service = ReceivePack;

    fn context(&self) -> &GitContext {
        &self.ctx
    }

    /// Gitaly needs the pusher's identity for hooks
    fn build_request(&self, access: &AccessResponse) -> SshReceivePackRequest {
        SshReceivePackRequest {
            repository: Some(access.gitaly.repo.clone()),
            stdin: Vec::new(),
            gl_id: access.gl_id.clone(),
            gl_repository: access.gl_repository.clone(),
            gl_username: access.gl_username.clone(),
            git_protocol: git_protocol(self.git_protocol.as_deref(), access),
            git_config_options: access.git_config_options.clone(),
        }
    }
}
