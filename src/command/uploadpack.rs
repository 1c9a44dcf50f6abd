//! `git-upload-pack`: fetch and clone

use super::gitalycall::{self, git_protocol, GitContext, GitalyOperation};
use crate::gitaly::proto::SshUploadPackRequest;
use crate::gitaly::UploadPack;
use crate::gitlabnet::accessverifier::AccessResponse;
use crate::handler::Outcome;
use crate::readwriter::ReadWriter;

#[derive(Debug, Clone)]
pub struct UploadPackCommand {
    pub ctx: GitContext,

    /// The client's GIT_PROTOCOL, if it sent one
    pub git_protocol: Option<String>,
}

impl UploadPackCommand {
    pub async fn execute(&self, rw: ReadWriter) -> Outcome {
        gitalycall::execute(self, rw).await
    }
}

impl GitalyOperation for UploadPackCommand {
    type Service = UploadPack;

    fn context(&self) -> &GitContext {
        &self.ctx
    }

    fn build_request(&self, access: &AccessResponse) -> SshUploadPackRequest {
        SshUploadPackRequest {
            repository: Some(access.gitaly.repo.clone()),
            stdin: Vec::new(),
            git_config_options: access.git_config_options.clone(),
            git_protocol: git_protocol(self.git_protocol.as_deref(), access),
        }
    }
}
