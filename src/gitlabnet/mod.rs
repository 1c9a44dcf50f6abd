//! Client for the GitLab internal API
//!
//! Every call authenticates with the shared secret. The client is blocking;
//! async callers go through [`blocking`].

pub mod accessverifier;
pub mod discover;
pub mod lfsauthenticate;

#[cfg(test)]
pub(crate) mod testserver;

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ureq::http::Response;
use ureq::{Agent, Body};

use crate::config::Config;
use crate::error::{Result, ShellError};

/// Header carrying the base64 encoded shared secret
pub const SECRET_HEADER: &str = "Gitlab-Shared-Secret";

/// Error body the API sends with failures
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Blocking HTTP client for `<gitlab_url>/api/v4/internal`
#[derive(Clone)]
pub struct GitlabClient {
    agent: Agent,
    base_url: String,
    secret: String,
    basic_auth: Option<String>,
}

impl GitlabClient {
    /// Build a client from configuration, reading the shared secret
    pub fn new(config: &Config) -> Result<Self> {
        let agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.http_settings.read_timeout)))
            .http_status_as_error(false)
            .build()
            .new_agent();

        let basic_auth = match (&config.http_settings.user, &config.http_settings.password) {
            (Some(user), Some(password)) => {
                Some(format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password))))
            }
            _ => None,
        };

        Ok(Self {
            agent,
            base_url: config.internal_api_url(),
            secret: STANDARD.encode(config.secret()?),
            basic_auth,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `GET` an internal API path, returning the raw response
    pub fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Response<Body>> {
        let url = self.url(path);
        debug!("GET {}", url);

        let mut request = self.agent.get(&url).header(SECRET_HEADER, &self.secret);
        if let Some(ref auth) = self.basic_auth {
            request = request.header("Authorization", auth);
        }
        for (key, value) in query {
            request = request.query(*key, *value);
        }

        request.call().map_err(|e| unreachable_api(&url, e))
    }

    /// `POST` a JSON body to an internal API path, returning the raw response
    pub fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Response<Body>> {
        let url = self.url(path);
        debug!("POST {}", url);

        let mut request = self.agent.post(&url).header(SECRET_HEADER, &self.secret);
        if let Some(ref auth) = self.basic_auth {
            request = request.header("Authorization", auth);
        }

        request.send_json(body).map_err(|e| unreachable_api(&url, e))
    }

    /// `GET` and decode a successful JSON response
    pub fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = ensure_success(self.get(path, query)?)?;
        parse_json(response)
    }

    /// `POST` and decode a successful JSON response
    pub fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = ensure_success(self.post(path, body)?)?;
        parse_json(response)
    }
}

impl std::fmt::Debug for GitlabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitlabClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

fn unreachable_api(url: &str, err: ureq::Error) -> ShellError {
    warn!("Internal API unreachable at {}: {}", url, err);
    ShellError::http(format!("Internal API unreachable: {}", err))
}

/// Pass 2xx and 3xx responses through, turn anything else into an API error
pub fn ensure_success(response: Response<Body>) -> Result<Response<Body>> {
    let status = response.status().as_u16();
    if (200..400).contains(&status) {
        Ok(response)
    } else {
        Err(parse_error(response))
    }
}

/// The API's `message`, or `Internal API error (<status>)` without one
pub fn parse_error(mut response: Response<Body>) -> ShellError {
    let status = response.status().as_u16();
    let message = response
        .body_mut()
        .read_json::<ErrorBody>()
        .ok()
        .and_then(|body| body.message)
        .filter(|m| !m.is_empty());

    match message {
        Some(message) => ShellError::api(message),
        None => ShellError::api(format!("Internal API error ({})", status)),
    }
}

/// Decode a JSON response body
pub fn parse_json<T: DeserializeOwned>(mut response: Response<Body>) -> Result<T> {
    response.body_mut().read_json::<T>().map_err(|e| {
        debug!("Failed to decode internal API response: {}", e);
        ShellError::Parsing
    })
}

/// Run a blocking API call off the async runtime
pub async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ShellError::Io(std::io::Error::other(e)))?
}
