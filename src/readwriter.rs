//! The three standard streams of an SSH session

use std::io::{self, Read};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;

/// Largest chunk the detached reader hands over at once
const READ_CHUNK_SIZE: usize = 32 * 1024;

/// Chunks buffered between the detached reader and its consumer
const READ_QUEUE_DEPTH: usize = 4;

/// Boxed input stream
pub type Input = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed output stream
pub type Output = Box<dyn AsyncWrite + Send + Unpin>;

/// stdin, stdout and stderr of the session a command serves
pub struct ReadWriter {
    /// Data from the SSH client
    pub input: Input,

    /// Data for the SSH client; the Git protocol owns this stream
    pub out: Output,

    /// Progress and error messages for the SSH client
    pub err_out: Output,
}

impl ReadWriter {
    /// Bundle arbitrary streams
    pub fn new(
        input: impl AsyncRead + Send + Unpin + 'static,
        out: impl AsyncWrite + Send + Unpin + 'static,
        err_out: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            input: Box::new(input),
            out: Box::new(out),
            err_out: Box::new(err_out),
        }
    }

    /// The process's own standard streams.
    ///
    /// stdin is read on a detached thread: a read blocked on a client that
    /// keeps the channel open must not hold the process up once the command
    /// is done.
    pub fn stdio() -> Self {
        Self {
            input: detached_reader(io::stdin()),
            out: Box::new(tokio::io::stdout()),
            err_out: Box::new(tokio::io::stderr()),
        }
    }
}

/// Read `reader` on its own thread, handing chunks to the returned stream.
///
/// The thread is never joined. It stops at EOF, on a read error, or at its
/// next read once the stream is dropped; a read still pending at process
/// exit is abandoned.
pub fn detached_reader<R: Read + Send + 'static>(reader: R) -> Input {
    let (tx, rx) = mpsc::channel(READ_QUEUE_DEPTH);
    std::thread::spawn(move || read_blocking(reader, tx));
    Box::new(StreamReader::new(ReceiverStream::new(rx)))
}

fn read_blocking<R: Read>(mut reader: R, tx: mpsc::Sender<io::Result<Bytes>>) {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let chunk = match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => Err(e),
        };
        let failed = chunk.is_err();
        if tx.blocking_send(chunk).is_err() || failed {
            return;
        }
    }
}

impl std::fmt::Debug for ReadWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadWriter").finish_non_exhaustive()
    }
}
