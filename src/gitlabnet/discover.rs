//! `GET /discover`: who owns this key or username?

use serde::Deserialize;

use super::GitlabClient;
use crate::command::commandargs::Who;
use crate::error::Result;

/// A GitLab user
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DiscoverResponse {
    pub user_id: i64,
    pub username: String,
    pub name: String,
}

impl DiscoverResponse {
    pub fn is_anonymous(&self) -> bool {
        self.user_id < 1
    }
}

#[derive(Debug, Clone)]
pub struct DiscoverClient {
    client: GitlabClient,
}

impl DiscoverClient {
    pub fn new(client: GitlabClient) -> Self {
        Self { client }
    }

    /// Look up the user behind `who`; `None` when the API knows nobody
    pub fn get_user(&self, who: &Who) -> Result<Option<DiscoverResponse>> {
        let query = match who {
            Who::KeyId(id) => [("key_id", id.as_str())],
            Who::Username(name) => [("username", name.as_str())],
        };

        let user: Option<DiscoverResponse> = self.client.get_json("/discover", &query)?;
        Ok(user.filter(|u| !u.is_anonymous()))
    }
}
