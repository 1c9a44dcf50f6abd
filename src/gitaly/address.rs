//! Gitaly address parsing
//!
//! Gitaly listens on a TCP port, a TLS port or a Unix socket. Addresses
//! arrive from the internal API as `tcp://host:port`, `tls://host:port` or
//! `unix:/path/to/socket`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use url::Url;

use crate::error::{Result, ShellError};

/// A parsed Gitaly listen address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitalyAddress {
    /// Plain-text gRPC over TCP
    Tcp { host: String, port: u16 },
    /// gRPC over TLS
    Tls { host: String, port: u16 },
    /// gRPC over a Unix domain socket
    Unix { path: PathBuf },
}

impl GitalyAddress {
    /// The URI tonic should use for this address.
    ///
    /// Unix sockets ignore the authority, so a placeholder is returned.
    pub fn endpoint_uri(&self) -> String {
        match self {
            GitalyAddress::Tcp { host, port } => format!("http://{}:{}", host, port),
            GitalyAddress::Tls { host, port } => format!("https://{}:{}", host, port),
            GitalyAddress::Unix { .. } => "http://[::]:50051".to_string(),
        }
    }
}

impl fmt::Display for GitalyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitalyAddress::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            GitalyAddress::Tls { host, port } => write!(f, "tls://{}:{}", host, port),
            GitalyAddress::Unix { path } => write!(f, "unix:{}", path.display()),
        }
    }
}

impl FromStr for GitalyAddress {
    type Err = ShellError;

    fn from_str(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Err(ShellError::EmptyAddress);
        }

        let url = Url::parse(input)
            .map_err(|e| ShellError::invalid_address(input, e.to_string()))?;

        match url.scheme() {
            "unix" => {
                let path = url.path();
                if path.is_empty() {
                    return Err(ShellError::invalid_address(input, "missing socket path"));
                }
                Ok(GitalyAddress::Unix {
                    path: PathBuf::from(path),
                })
            }
            scheme @ ("tcp" | "tls") => {
                let host = url
                    .host_str()
                    .ok_or_else(|| ShellError::invalid_address(input, "missing host"))?
                    .to_string();
                let port = url
                    .port()
                    .ok_or_else(|| ShellError::invalid_address(input, "missing port"))?;
                if scheme == "tcp" {
                    Ok(GitalyAddress::Tcp { host, port })
                } else {
                    Ok(GitalyAddress::Tls { host, port })
                }
            }
            other => Err(ShellError::invalid_address(
                input,
                format!("unsupported scheme '{}'", other),
            )),
        }
    }
}
