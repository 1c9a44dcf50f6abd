//! Gitaly backend access
//!
//! Addresses, connections, the protobuf messages of the SSH service and the
//! relay that streams a Git session through it.

pub mod address;
pub mod connection;
pub mod proto;
pub mod relay;
pub mod service;

pub use address::GitalyAddress;
pub use connection::{Dialer, GitalyConnection, GitalyDialer, GITALY_TOKEN_ENV};
pub use relay::relay;
pub use service::{ReceivePack, ResponseChunk, SshService, UploadArchive, UploadPack};
