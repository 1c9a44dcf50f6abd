//! `git-upload-archive`: `git archive --remote`

use super::gitalycall::{self, GitContext, GitalyOperation};
use crate::gitaly::proto::SshUploadArchiveRequest;
use crate::gitaly::UploadArchive;
use crate::gitlabnet::accessverifier::AccessResponse;
use crate::handler::Outcome;
use crate::readwriter::ReadWriter;

#[derive(Debug, Clone)]
pub struct UploadArchiveCommand {
    pub ctx: GitContext,
}

impl UploadArchiveCommand {
    pub async fn execute(&self, rw: ReadWriter) -> Outcome {
        gitalycall::execute(self, rw).await
    }
}

impl GitalyOperation for UploadArchiveCommand {
    type Service = UploadArchive;

    fn context(&self) -> &GitContext {
        &self.ctx
    }

    fn build_request(&self, access: &AccessResponse) -> SshUploadArchiveRequest {
        SshUploadArchiveRequest {
            repository: Some(access.gitaly.repo.clone()),
            stdin: Vec::new(),
        }
    }
}
