//! Gitaly SSH service descriptions
//!
//! Each SSH RPC streams stdin chunks up and stdout/stderr chunks (plus a
//! final exit status) down. [`SshService`] captures what differs between
//! them so one relay can drive all three.

use serde::de::DeserializeOwned;

use super::proto::{
    methods, SshReceivePackRequest, SshReceivePackResponse, SshUploadArchiveRequest,
    SshUploadArchiveResponse, SshUploadPackRequest, SshUploadPackResponse,
};

/// One response message, split into its parts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseChunk {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_status: Option<i32>,
}

/// A bidirectional Gitaly SSH RPC
pub trait SshService: Send + Sync + 'static {
    /// Git command name, e.g. `git-upload-pack`
    const NAME: &'static str;

    /// gRPC method path
    const METHOD: &'static str;

    /// Whether the relay should follow the client's pkt-line negotiation
    const WATCH_NEGOTIATION: bool = false;

    type Request: prost::Message + Default + DeserializeOwned + Send + Sync + 'static;
    type Response: prost::Message + Default + Send + Sync + 'static;

    /// Wrap a chunk of client stdin
    fn stdin_request(stdin: Vec<u8>) -> Self::Request;

    /// Split a response into stdout, stderr and exit status
    fn into_chunk(response: Self::Response) -> ResponseChunk;
}

/// `git-upload-pack`: fetch and clone
#[derive(Debug, Clone, Copy)]
pub struct UploadPack;

impl SshService for UploadPack {
    const NAME: &'static str = "git-upload-pack";
    const METHOD: &'static str = methods::SSH_UPLOAD_PACK;
    const WATCH_NEGOTIATION: bool = true;

    type Request = SshUploadPackRequest;
    type Response = SshUploadPackResponse;

    fn stdin_request(stdin: Vec<u8>) -> Self::Request {
        SshUploadPackRequest {
            stdin,
            ..Default::default()
        }
    }

    fn into_chunk(response: Self::Response) -> ResponseChunk {
        ResponseChunk {
            stdout: response.stdout,
            stderr: response.stderr,
            exit_status: response.exit_status.map(|s| s.value),
        }
    }
}

/// `git-receive-pack`: push
#[derive(Debug, Clone, Copy)]
pub struct ReceivePack;

impl SshService for ReceivePack {
    const NAME: &'static str = "git-receive-pack";
    const METHOD: &'static str = methods::SSH_RECEIVE_PACK;

    type Request = SshReceivePackRequest;
    type Response = SshReceivePackResponse;

    fn stdin_request(stdin: Vec<u8>) -> Self::Request {
        SshReceivePackRequest {
            stdin,
            ..Default::default()
        }
    }

    fn into_chunk(response: Self::Response) -> ResponseChunk {
        ResponseChunk {
            stdout: response.stdout,
            stderr: response.stderr,
            exit_status: response.exit_status.map(|s| s.value),
        }
    }
}

/// `git-upload-archive`: `git archive --remote`
#[derive(Debug, Clone, Copy)]
pub struct UploadArchive;

impl SshService for UploadArchive {
    const NAME: &'static str = "git-upload-archive";
    const METHOD: &'static str = methods::SSH_UPLOAD_ARCHIVE;

    type Request = SshUploadArchiveRequest;
    type Response = SshUploadArchiveResponse;

    fn stdin_request(stdin: Vec<u8>) -> Self::Request {
        SshUploadArchiveRequest {
            stdin,
            ..Default::default()
        }
    }

    fn into_chunk(response: Self::Response) -> ResponseChunk {
        ResponseChunk {
            stdout: response.stdout,
            stderr: response.stderr,
            exit_status: response.exit_status.map(|s| s.value),
        }
    }
}
