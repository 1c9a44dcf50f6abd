//! `POST /allowed`: may this caller run this Git command on this repository?

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{parse_error, parse_json, GitlabClient};
use crate::command::commandargs::{CommandType, Who};
use crate::error::{Result, ShellError};
use crate::gitaly::proto::Repository;

#[derive(Debug, Serialize)]
struct Request<'a> {
    action: &'a str,
    project: &'a str,
    changes: &'a str,
    protocol: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
}

/// Where and how to reach Gitaly for the repository
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GitalyRoute {
    pub address: String,
    pub token: String,
    #[serde(rename = "repository")]
    pub repo: Repository,
}

/// Answer of the access check
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AccessResponse {
    pub status: bool,
    pub message: String,
    pub gl_repository: String,
    pub gl_project_path: String,
    pub gl_id: String,
    pub gl_username: String,
    pub git_config_options: Vec<String>,
    pub git_protocol: String,
    /// Lines to show the user before the Git command runs
    pub gl_console_messages: Vec<String>,
    pub gitaly: GitalyRoute,
}

/// Access checks against the internal API
#[derive(Debug, Clone)]
pub struct AccessVerifier {
    client: GitlabClient,
}

impl AccessVerifier {
    pub fn new(client: GitlabClient) -> Self {
        Self { client }
    }

    /// Ask whether `who` may run `action` on `repo`.
    ///
    /// A response with `status: false` becomes [`ShellError::AccessDenied`].
    pub fn verify(&self, action: CommandType, repo: &str, who: &Who) -> Result<AccessResponse> {
        let request = Request {
            action: action.as_str(),
            project: repo,
            changes: "_any",
            protocol: "ssh",
            key_id: who.key_id(),
            username: who.username(),
        };

        let response = self.client.post("/allowed", &request)?;
        let status = response.status().as_u16();

        // denials come back as 401/404 with a regular body
        let access: AccessResponse = match status {
            200 | 300 | 401 | 404 => parse_json(response)?,
            _ => return Err(parse_error(response)),
        };

        debug!(
            "Access check for {} on {}: status={} ({})",
            action, repo, access.status, status
        );

        if !access.status {
            let message = if access.message.is_empty() {
                "Access denied".to_string()
            } else {
                access.message
            };
            return Err(ShellError::AccessDenied(message));
        }

        Ok(access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gitlabnet::testserver::{test_config, TestServer};

    const ALLOWED: &str = r#"{
        "status": true,
        "gl_repository": "project-26",
        "gl_project_path": "group/private",
        "gl_id": "user-1",
        "gl_username": "root",
        "git_config_options": ["option"],
        "git_protocol": "protocol",
        "gl_console_messages": ["console", "message"],
        "gitaly": {
            "address": "unix:gitaly.socket",
            "token": "token",
            "repository": {
                "storage_name": "default",
                "relative_path": "@hashed/5f/9c/5f9c4ab08cac7457e9111a30e4664920607ea2c115a1433d7be98e97e64244ca.git",
                "git_object_directory": "path/to/git_object_directory",
                "git_alternate_object_directories": ["path/to/git_alternate_object_directory"],
                "gl_repository": "project-26",
                "gl_project_path": "group/private"
            }
        }
    }"#;

    fn server() -> TestServer {
        TestServer::start(|request| {
            let body = request.json();
            let project = body["project"].as_str().unwrap_or_default().to_string();
            match project.as_str() {
                "group/private" => (200, ALLOWED.to_string()),
                "group/denied" => (
                    401,
                    r#"{"status":false,"message":"You are not allowed to pull code."}"#.to_string(),
                ),
                "group/missing" => (
                    404,
                    r#"{"status":false,"message":"The project you were looking for could not be found."}"#
                        .to_string(),
                ),
                "group/broken" => (500, String::new()),
                _ => (200, "nonsense".to_string()),
            }
        })
    }

    fn verifier(server: &TestServer) -> AccessVerifier {
        AccessVerifier::new(GitlabClient::new(&test_config(&server.url)).unwrap())
    }

    #[test]
    fn test_allowed_by_key() {
        let server = server();
        let response = verifier(&server)
            .verify(
                CommandType::ReceivePack,
                "group/private",
                &Who::KeyId("1".to_string()),
            )
            .unwrap();

        assert!(response.status);
        assert_eq!(response.gl_id, "user-1");
        assert_eq!(response.gl_console_messages, vec!["console", "message"]);
        assert_eq!(response.gitaly.address, "unix:gitaly.socket");
        assert_eq!(response.gitaly.token, "token");
        assert_eq!(response.gitaly.repo.storage_name, "default");
        assert_eq!(response.gitaly.repo.gl_project_path, "group/private");

        let request = &server.requests()[0];
        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "/api/v4/internal/allowed");
        let body = request.json();
        assert_eq!(body["action"], "git-receive-pack");
        assert_eq!(body["changes"], "_any");
        assert_eq!(body["protocol"], "ssh");
        assert_eq!(body["key_id"], "1");
        assert!(body.get("username").is_none());
    }

    #[test]
    fn test_allowed_by_username() {
        let server = server();
        verifier(&server)
            .verify(
                CommandType::UploadPack,
                "group/private",
                &Who::Username("first".to_string()),
            )
            .unwrap();

        let body = server.requests()[0].json();
        assert_eq!(body["username"], "first");
        assert!(body.get("key_id").is_none());
    }

    #[test]
    fn test_denied() {
        let server = server();
        let who = Who::KeyId("1".to_string());

        let err = verifier(&server)
            .verify(CommandType::UploadPack, "group/denied", &who)
            .unwrap_err();
        assert!(matches!(err, ShellError::AccessDenied(_)));
        assert_eq!(err.to_string(), "You are not allowed to pull code.");

        let err = verifier(&server)
            .verify(CommandType::UploadPack, "group/missing", &who)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "The project you were looking for could not be found."
        );
    }

    #[test]
    fn test_failed_requests() {
        let server = server();
        let who = Who::KeyId("1".to_string());

        let err = verifier(&server)
            .verify(CommandType::UploadPack, "group/broken", &who)
            .unwrap_err();
        assert_eq!(err.to_string(), "Internal API error (500)");

        let err = verifier(&server)
            .verify(CommandType::UploadPack, "group/garbage", &who)
            .unwrap_err();
        assert_eq!(err.to_string(), "Parsing failed");
    }
}
