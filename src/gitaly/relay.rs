//! Stream relay between the SSH session and a Gitaly SSH RPC
//!
//! The client's stdin is pumped into the request stream by its own task
//! while the calling task copies responses to stdout/stderr. Both directions
//! stop when the call finishes or the call token is cancelled, and the pump
//! task is joined before [`relay`] returns.

use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tracing::{debug, warn};

use super::connection::GitalyConnection;
use super::service::SshService;
use crate::error::{Result, ShellError};
use crate::pktline::FrameTap;
use crate::readwriter::{Input, Output, ReadWriter};

/// Largest stdin chunk sent in one request message
pub const STDIN_CHUNK_SIZE: usize = 32 * 1024;

/// Request messages buffered between the stdin pump and the call
const REQUEST_QUEUE_DEPTH: usize = 16;

/// Run one SSH RPC, relaying `rw` to and from it.
///
/// `request` is sent first and must carry the repository. Returns the exit
/// status reported by Gitaly (0 when none was reported) together with any
/// transport or local I/O error.
pub async fn relay<S: SshService>(
    cancel: CancellationToken,
    conn: GitalyConnection,
    request: S::Request,
    rw: ReadWriter,
) -> (i32, Result<()>) {
    let ReadWriter {
        input,
        mut out,
        mut err_out,
    } = rw;

    let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
    let outbound = tokio_stream::once(request).chain(ReceiverStream::new(rx));

    let pump_cancel = cancel.child_token();
    let pump = tokio::spawn(pump_stdin::<S>(input, tx, pump_cancel.clone()));

    let mut exit_code = 0;
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ShellError::Cancelled),
        result = receive::<S>(&conn, outbound, &mut out, &mut err_out, &mut exit_code) => result,
    };

    pump_cancel.cancel();
    let pump_result = match pump.await {
        Ok(result) => result,
        Err(e) => Err(ShellError::Io(io::Error::other(e))),
    };

    if let Err(ref e) = pump_result {
        warn!("stdin relay for {} failed: {}", S::NAME, e);
    }

    (exit_code, result.and(pump_result))
}

/// Copy the response stream to stdout/stderr, recording the exit status
async fn receive<S: SshService>(
    conn: &GitalyConnection,
    outbound: impl Stream<Item = S::Request> + Send + 'static,
    out: &mut Output,
    err_out: &mut Output,
    exit_code: &mut i32,
) -> Result<()> {
    let mut grpc = tonic::client::Grpc::new(conn.channel());
    grpc.ready().await?;

    let mut request = tonic::Request::new(outbound);
    conn.authorize(&mut request)?;

    let codec: ProstCodec<S::Request, S::Response> = ProstCodec::default();
    let path = PathAndQuery::from_static(S::METHOD);
    let mut inbound = grpc.streaming(request, path, codec).await?.into_inner();

    while let Some(response) = inbound.message().await? {
        let chunk = S::into_chunk(response);
        if let Some(code) = chunk.exit_status {
            *exit_code = code;
        }
        if !chunk.stderr.is_empty() {
            err_out.write_all(&chunk.stderr).await?;
            err_out.flush().await?;
        }
        if !chunk.stdout.is_empty() {
            out.write_all(&chunk.stdout).await?;
            out.flush().await?;
        }
    }

    debug!("{} finished with exit status {}", S::NAME, exit_code);
    Ok(())
}

/// Forward stdin to the request stream until EOF, cancellation, or the call
/// going away.
async fn pump_stdin<S: SshService>(
    mut input: Input,
    tx: mpsc::Sender<S::Request>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut tap = S::WATCH_NEGOTIATION.then(FrameTap::new);
    let mut buf = vec![0u8; STDIN_CHUNK_SIZE];

    loop {
        let n = tokio::select! {
            read = input.read(&mut buf) => read?,
            _ = cancel.cancelled() => return Ok(()),
        };
        if n == 0 {
            debug!("client closed stdin");
            return Ok(());
        }

        if let Some(tap) = tap.as_mut() {
            if tap.feed(&buf[..n]) {
                debug!(frames = tap.frames(), "client finished negotiation");
            }
        }

        let request = S::stdin_request(buf[..n].to_vec());
        let sent = tokio::select! {
            sent = tx.send(request) => sent.is_ok(),
            _ = cancel.cancelled() => return Ok(()),
        };
        if !sent {
            // call already finished
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio_stream::wrappers::TcpListenerStream;
    use tonic::{Request, Response, Status, Streaming};

    use super::*;
    use crate::gitaly::connection::{Dialer, GitalyDialer};
    use crate::gitaly::proto::ssh_service_server::{self, SshServiceServer};
    use crate::gitaly::proto::{
        ExitStatus, Repository, SshReceivePackRequest, SshReceivePackResponse,
        SshUploadArchiveRequest, SshUploadArchiveResponse, SshUploadPackRequest,
        SshUploadPackResponse,
    };
    use crate::gitaly::service::{UploadArchive, UploadPack};

    type Replies<T> = ReceiverStream<std::result::Result<T, Status>>;

    /// Answers `SSHUploadArchive` by reporting the repository and credential
    /// on stderr, echoing stdin to stdout, then exiting with status 3
    struct EchoGitaly;

    #[tonic::async_trait]
    impl ssh_service_server::SshService for EchoGitaly {
        type SSHUploadPackStream = Replies<SshUploadPackResponse>;
        type SSHReceivePackStream = Replies<SshReceivePackResponse>;
        type SSHUploadArchiveStream = Replies<SshUploadArchiveResponse>;

        async fn ssh_upload_pack(
            &self,
            _: Request<Streaming<SshUploadPackRequest>>,
        ) -> std::result::Result<Response<Self::SSHUploadPackStream>, Status> {
            Err(Status::unimplemented("SSHUploadPack"))
        }

        async fn ssh_receive_pack(
            &self,
            _: Request<Streaming<SshReceivePackRequest>>,
        ) -> std::result::Result<Response<Self::SSHReceivePackStream>, Status> {
            Err(Status::unimplemented("SSHReceivePack"))
        }

        async fn ssh_upload_archive(
            &self,
            request: Request<Streaming<SshUploadArchiveRequest>>,
        ) -> std::result::Result<Response<Self::SSHUploadArchiveStream>, Status> {
            let auth = request
                .metadata()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let mut inbound = request.into_inner();
            let (tx, rx) = mpsc::channel(16);

            tokio::spawn(async move {
                let first = match inbound.message().await {
                    Ok(Some(first)) => first,
                    _ => return,
                };
                let path = first.repository.map(|r| r.relative_path).unwrap_or_default();
                let header = SshUploadArchiveResponse {
                    stderr: format!("{}|{}", path, auth).into_bytes(),
                    ..Default::default()
                };
                let _ = tx.send(Ok(header)).await;

                while let Ok(Some(message)) = inbound.message().await {
                    let reply = SshUploadArchiveResponse {
                        stdout: message.stdin,
                        stderr: if message.repository.is_some() {
                            b"|repeated repository".to_vec()
                        } else {
                            Vec::new()
                        },
                        ..Default::default()
                    };
                    let _ = tx.send(Ok(reply)).await;
                }

                let last = SshUploadArchiveResponse {
                    exit_status: Some(ExitStatus { value: 3 }),
                    ..Default::default()
                };
                let _ = tx.send(Ok(last)).await;
            });

            Ok(Response::new(ReceiverStream::new(rx)))
        }
    }

    async fn start_gitaly() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(
            tonic::transport::Server::builder()
                .add_service(SshServiceServer::new(EchoGitaly))
                .serve_with_incoming(TcpListenerStream::new(listener)),
        );
        format!("tcp://{}", addr)
    }

    fn archive_request() -> SshUploadArchiveRequest {
        SshUploadArchiveRequest {
            repository: Some(Repository {
                storage_name: "default".to_string(),
                relative_path: "group/repo.git".to_string(),
                ..Default::default()
            }),
            stdin: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_relay_reports_unreachable_backend() {
        // port 1 is never a gitaly
        let conn = GitalyDialer::default().dial("tcp://127.0.0.1:1").unwrap();
        let rw = ReadWriter::new(tokio::io::empty(), tokio::io::sink(), tokio::io::sink());

        let (code, result) = tokio::time::timeout(
            Duration::from_secs(30),
            relay::<UploadArchive>(CancellationToken::new(), conn, archive_request(), rw),
        )
        .await
        .expect("relay should not hang");

        assert_eq!(code, 0);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_relay_round_trip() {
        let address = start_gitaly().await;
        let conn = GitalyDialer::new(Some("tok".to_string()))
            .dial(&address)
            .unwrap();

        let (out, mut out_reader) = tokio::io::duplex(64 * 1024);
        let (err_out, mut err_reader) = tokio::io::duplex(64 * 1024);
        let rw = ReadWriter::new(&b"0009done\n0000"[..], out, err_out);

        let (code, result) = tokio::time::timeout(
            Duration::from_secs(30),
            relay::<UploadArchive>(CancellationToken::new(), conn, archive_request(), rw),
        )
        .await
        .expect("relay should not hang");

        assert_eq!(code, 3);
        assert!(result.is_ok(), "{:?}", result);

        let mut stdout = Vec::new();
        out_reader.read_to_end(&mut stdout).await.unwrap();
        assert_eq!(stdout, b"0009done\n0000");

        let mut stderr = String::new();
        err_reader.read_to_string(&mut stderr).await.unwrap();
        assert_eq!(stderr, "group/repo.git|Bearer tok");
    }

    #[tokio::test]
    async fn test_relay_reports_backend_status() {
        let address = start_gitaly().await;
        let conn = GitalyDialer::default().dial(&address).unwrap();
        let rw = ReadWriter::new(tokio::io::empty(), tokio::io::sink(), tokio::io::sink());

        let request = SshUploadPackRequest {
            repository: archive_request().repository,
            ..Default::default()
        };
        let (code, result) = tokio::time::timeout(
            Duration::from_secs(30),
            relay::<UploadPack>(CancellationToken::new(), conn, request, rw),
        )
        .await
        .expect("relay should not hang");

        assert_eq!(code, 0);
        match result {
            Err(ShellError::Rpc(status)) => assert_eq!(status.code(), tonic::Code::Unimplemented),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_relay_stops_when_cancelled() {
        let conn = GitalyDialer::default().dial("tcp://127.0.0.1:1").unwrap();
        let rw = ReadWriter::new(tokio::io::empty(), tokio::io::sink(), tokio::io::sink());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (code, result) =
            relay::<UploadArchive>(cancel, conn, archive_request(), rw).await;

        assert_eq!(code, 0);
        assert!(matches!(result, Err(ShellError::Cancelled)));
    }

    #[tokio::test]
    async fn test_pump_forwards_stdin_in_chunks() {
        let (tx, mut rx) = mpsc::channel(4);
        let input: Input = Box::new(&b"0009done\n0000"[..]);

        pump_stdin::<UploadPack>(input, tx, CancellationToken::new())
            .await
            .unwrap();

        let mut received = Vec::new();
        while let Some(request) = rx.recv().await {
            assert!(request.repository.is_none());
            received.extend(request.stdin);
        }
        assert_eq!(received, b"0009done\n0000");
    }

    #[tokio::test]
    async fn test_pump_stops_when_call_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let input: Input = Box::new(&b"data"[..]);

        let result = pump_stdin::<UploadPack>(input, tx, CancellationToken::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_pump_stops_on_cancel() {
        // a duplex reader with no writer activity never yields data
        let (_writer, reader) = tokio::io::duplex(64);
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(pump_stdin::<UploadPack>(
            Box::new(reader),
            tx,
            cancel.clone(),
        ));
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("pump should stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
