//! `POST /lfs_authenticate`: short-lived credentials for the LFS HTTP API

use serde::{Deserialize, Serialize};

use super::GitlabClient;
use crate::command::commandargs::{LfsOperation, Who};
use crate::error::Result;

#[derive(Debug, Serialize)]
struct Request<'a> {
    operation: &'a str,
    project: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LfsResponse {
    pub username: String,
    pub lfs_token: String,
    pub repository_http_path: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone)]
pub struct LfsClient {
    client: GitlabClient,
}

impl LfsClient {
    pub fn new(client: GitlabClient) -> Self {
        Self { client }
    }

    pub fn authenticate(
        &self,
        operation: LfsOperation,
        repo: &str,
        who: &Who,
    ) -> Result<LfsResponse> {
        let request = Request {
            operation: operation.as_str(),
            project: repo,
            key_id: who.key_id(),
            username: who.username(),
        };
        self.client.post_json("/lfs_authenticate", &request)
    }
}
