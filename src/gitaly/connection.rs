//! Gitaly connections
//!
//! A [`Dialer`] turns an address string into a connection handle. The
//! production dialer builds a lazily connecting tonic [`Channel`], so dialing
//! only fails for addresses that can never work; network failures surface on
//! the first call.

use tokio::net::UnixStream;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint, Uri};
use tower::service_fn;
use tracing::debug;

use super::address::GitalyAddress;
use crate::error::{Result, ShellError};

/// Environment variable the Gitaly handler binaries read their token from
pub const GITALY_TOKEN_ENV: &str = "GITALY_TOKEN";

/// Opens connections to a backend address
pub trait Dialer {
    /// Handle given to the streaming callback
    type Connection: Send + 'static;

    /// Open a connection to `address`
    fn dial(&self, address: &str) -> Result<Self::Connection>;
}

/// Dials Gitaly over gRPC, attaching `token` to every call
#[derive(Debug, Clone, Default)]
pub struct GitalyDialer {
    token: Option<String>,
}

impl GitalyDialer {
    /// Create a dialer; an empty token means no authentication
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }

    /// Create a dialer using the token in `GITALY_TOKEN`, if any
    pub fn from_env() -> Self {
        Self::new(std::env::var(GITALY_TOKEN_ENV).ok())
    }
}

impl Dialer for GitalyDialer {
    type Connection = GitalyConnection;

    fn dial(&self, address: &str) -> Result<GitalyConnection> {
        let parsed: GitalyAddress = address.parse()?;
        let endpoint = Endpoint::from_shared(parsed.endpoint_uri())
            .map_err(|e| ShellError::invalid_address(address, e.to_string()))?;

        let channel = match &parsed {
            GitalyAddress::Tcp { .. } => endpoint.connect_lazy(),
            GitalyAddress::Tls { host, .. } => endpoint
                .tls_config(ClientTlsConfig::new().domain_name(host.clone()))?
                .connect_lazy(),
            GitalyAddress::Unix { path } => {
                let path = path.clone();
                endpoint.connect_with_connector_lazy(service_fn(move |_: Uri| {
                    UnixStream::connect(path.clone())
                }))
            }
        };

        debug!("Prepared gitaly channel to {}", parsed);

        Ok(GitalyConnection {
            channel,
            token: self.token.clone(),
            address: parsed,
        })
    }
}

/// An open (lazily connected) Gitaly channel plus its credential
#[derive(Debug, Clone)]
pub struct GitalyConnection {
    channel: Channel,
    token: Option<String>,
    address: GitalyAddress,
}

impl GitalyConnection {
    /// A handle to the underlying channel
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    /// The address this connection was dialed with
    pub fn address(&self) -> &GitalyAddress {
        &self.address
    }

    /// Attach the credential, if any, as `authorization` metadata
    pub fn authorize<T>(&self, request: &mut tonic::Request<T>) -> Result<()> {
        if let Some(ref token) = self.token {
            let value = MetadataValue::try_from(format!("Bearer {}", token)).map_err(|_| {
                ShellError::config("gitaly token contains characters not allowed in metadata")
            })?;
            request.metadata_mut().insert("authorization", value);
        }
        Ok(())
    }
}
