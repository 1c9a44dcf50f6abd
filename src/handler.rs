//! Dispatch engine for Gitaly calls
//!
//! A dispatch validates its invocation, dials the backend once, and hands a
//! cancellable context plus the connection to a streaming callback. The
//! callback's exit code and error are returned untouched; they are
//! independent signals.

use std::future::Future;
use std::path::Path;
use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, Instrument};

use crate::error::{Result, ShellError};
use crate::gitaly::{relay, Dialer, GitalyDialer, SshService};
use crate::readwriter::ReadWriter;

/// Exit code and error of a finished command
#[derive(Debug)]
pub struct Outcome {
    /// Exit code reported by the command or backend
    pub exit_code: i32,

    /// Error raised along the way, if any
    pub error: Option<ShellError>,
}

impl Outcome {
    /// Combine an exit code with a result
    pub fn new(exit_code: i32, result: Result<()>) -> Self {
        Self {
            exit_code,
            error: result.err(),
        }
    }

    /// Exit 0, no error
    pub fn success() -> Self {
        Self::new(0, Ok(()))
    }

    /// Exit 1 with `err`
    pub fn failure(err: ShellError) -> Self {
        Self::new(1, Err(err))
    }

    /// Status the process should exit with.
    ///
    /// An error never exits 0.
    pub fn process_exit_code(&self) -> i32 {
        if self.error.is_some() && self.exit_code == 0 {
            1
        } else {
            self.exit_code
        }
    }

    /// [`Outcome::process_exit_code`] truncated to an 8-bit status
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from((self.process_exit_code() & 0xff) as u8)
    }
}

impl From<Result<()>> for Outcome {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::success(),
            Err(e) => Self::failure(e),
        }
    }
}

/// One dispatch to a Gitaly address
#[derive(Debug, Clone)]
pub struct GitalyCommand<D: Dialer = GitalyDialer> {
    /// Name used in logs, usually the invoking program
    pub service_name: String,

    /// Backend address
    pub address: String,

    dialer: D,
}

impl<D: Dialer> GitalyCommand<D> {
    /// Create a dispatch for `address` using `dialer`
    pub fn new(service_name: impl Into<String>, address: impl Into<String>, dialer: D) -> Self {
        Self {
            service_name: service_name.into(),
            address: address.into(),
            dialer,
        }
    }

    /// Dial the backend and run `callback` against it.
    ///
    /// # Arguments
    ///
    /// * `payload` - Request handed to the callback unchanged
    /// * `callback` - Performs the I/O relay; receives a context that is
    ///   cancelled as soon as the callback returns or unwinds
    ///
    /// # Returns
    ///
    /// The callback's exit code and error, or exit 1 if the address is empty
    /// or cannot be dialed
    pub async fn run<P, F, Fut>(&self, payload: P, callback: F) -> Outcome
    where
        F: FnOnce(CancellationToken, D::Connection, P) -> Fut,
        Fut: Future<Output = (i32, Result<()>)>,
    {
        if self.address.is_empty() {
            return Outcome::failure(ShellError::EmptyAddress);
        }

        let conn = match self.dialer.dial(&self.address) {
            Ok(conn) => conn,
            Err(e) => {
                error!("{}: failed to dial {}: {}", self.service_name, self.address, e);
                return Outcome::failure(e);
            }
        };

        let token = CancellationToken::new();
        let _guard = token.clone().drop_guard();

        let span = info_span!("gitaly", service = %self.service_name, address = %self.address);
        let (exit_code, result) = callback(token.child_token(), conn, payload)
            .instrument(span)
            .await;

        debug!(
            "{} finished with exit code {}{}",
            self.service_name,
            exit_code,
            if result.is_err() { " and an error" } else { "" }
        );

        Outcome::new(exit_code, result)
    }
}

/// Run a dispatch from process arguments `[program, address, payload]`.
///
/// Any other argument count fails with exit 1 before dialing.
pub async fn run_from_args<D, F, Fut>(args: &[String], dialer: D, callback: F) -> Outcome
where
    D: Dialer,
    F: FnOnce(CancellationToken, D::Connection, String) -> Fut,
    Fut: Future<Output = (i32, Result<()>)>,
{
    let [program, address, payload] = args else {
        return Outcome::failure(ShellError::ArgumentCount(args.len().saturating_sub(1)));
    };

    let service_name = Path::new(program)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.clone());

    GitalyCommand::new(service_name, address.clone(), dialer)
        .run(payload.clone(), callback)
        .await
}

/// Entry point of the `gitaly-*` handler binaries.
///
/// Decodes the JSON payload into `S::Request` and relays `rw` through the
/// service. The credential comes from `GITALY_TOKEN`.
pub async fn handle<S: SshService>(args: &[String], rw: ReadWriter) -> Outcome {
    run_from_args(args, GitalyDialer::from_env(), |cancel, conn, payload| async move {
        let request: S::Request = match serde_json::from_str(&payload) {
            Ok(request) => request,
            Err(e) => return (1, Err(e.into())),
        };
        relay::<S>(cancel, conn, request, rw).await
    })
    .await
}
