//! Gitaly protobuf messages used by the SSH service.
//!
//! Generated from the subset of Gitaly's `shared.proto` and `ssh.proto` kept
//! under `proto/`. Request messages also derive serde so the Gitaly handler
//! binaries can take them as JSON. The generated `ssh_service_server` module
//! backs the in-process Gitaly the relay tests run against.

tonic::include_proto!("gitaly");

/// Fully qualified gRPC method paths
pub mod methods {
    pub const SSH_UPLOAD_PACK: &str = "/gitaly.SSHService/SSHUploadPack";
    pub const SSH_RECEIVE_PACK: &str = "/gitaly.SSHService/SSHReceivePack";
    pub const SSH_UPLOAD_ARCHIVE: &str = "/gitaly.SSHService/SSHUploadArchive";
}
