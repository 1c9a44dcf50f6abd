//! pkt-line framing
//!
//! Git's transport protocol frames data as "pkt-lines": a four digit hex
//! length prefix counting the whole frame (prefix included), followed by the
//! payload. `0000` is a flush packet. [`Scanner`] splits a byte source into
//! frames, and [`FrameTap`] follows frames inside a stream that arrives in
//! arbitrary chunks.

use std::io::{self, Read};

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

/// Length of the hex length prefix
pub const PREFIX_LEN: usize = 4;

/// Largest frame the protocol can describe, prefix included
pub const MAX_FRAME_LEN: usize = 0xffff;

/// Flush packet
pub const FLUSH_PKT: &[u8; 4] = b"0000";

/// The packet a client sends once it has finished negotiating
pub const DONE_PKT: &[u8] = b"0009done\n";

/// Errors raised while scanning pkt-lines
#[derive(Debug, Error)]
pub enum PktLineError {
    /// Source ended before a full length prefix was read
    #[error("incomplete length prefix on {0:?}")]
    IncompletePrefix(String),

    /// Length prefix is not four hex digits
    #[error("invalid length prefix {0:?}")]
    InvalidPrefix(String),

    /// Source ended before the declared frame length was read
    #[error("less than {expected} bytes in input, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// Underlying reader failed
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PktLineError {
    /// True when the error only means the source stopped early
    pub fn is_truncation(&self) -> bool {
        matches!(
            self,
            PktLineError::IncompletePrefix(_) | PktLineError::ShortRead { .. }
        )
    }
}

/// Returns true when `frame` is exactly the `done` packet.
pub fn is_done(frame: &[u8]) -> bool {
    frame == DONE_PKT
}

/// Splits a byte source into pkt-line frames.
///
/// Each item is a whole frame, prefix included. Iteration ends cleanly when
/// the source is empty at a frame boundary. The first error is yielded once
/// and ends the iteration for good.
#[derive(Debug)]
pub struct Scanner<R> {
    reader: R,
    finished: bool,
}

impl<R: Read> Scanner<R> {
    /// Create a scanner over `reader`
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            finished: false,
        }
    }

    /// True once the scanner hit end of input or an error
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn read_frame(&mut self) -> Result<Option<Bytes>, PktLineError> {
        let mut prefix = [0u8; PREFIX_LEN];
        let got = read_full(&mut self.reader, &mut prefix)?;
        if got == 0 {
            return Ok(None);
        }
        if got < PREFIX_LEN {
            return Err(PktLineError::IncompletePrefix(
                String::from_utf8_lossy(&prefix[..got]).into_owned(),
            ));
        }

        let declared = parse_prefix(&prefix)?;
        if declared < PREFIX_LEN {
            // 0000 is flush; 0001..0003 are special packets without payload
            return Ok(Some(Bytes::copy_from_slice(&prefix)));
        }

        let mut frame = BytesMut::zeroed(declared);
        frame[..PREFIX_LEN].copy_from_slice(&prefix);
        let got = read_full(&mut self.reader, &mut frame[PREFIX_LEN..])?;
        if got < declared - PREFIX_LEN {
            return Err(PktLineError::ShortRead {
                expected: declared,
                actual: PREFIX_LEN + got,
            });
        }

        Ok(Some(frame.freeze()))
    }
}

impl<R: Read> Iterator for Scanner<R> {
    type Item = Result<Bytes, PktLineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Decode a four digit hex length prefix
fn parse_prefix(prefix: &[u8; PREFIX_LEN]) -> Result<usize, PktLineError> {
    let invalid = || PktLineError::InvalidPrefix(String::from_utf8_lossy(prefix).into_owned());

    prefix.iter().try_fold(0usize, |acc, &b| {
        let digit = (b as char).to_digit(16).ok_or_else(invalid)?;
        Ok((acc << 4) | digit as usize)
    })
}

/// Fill `buf` from `reader`, returning how many bytes were read before EOF
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Follows pkt-lines in a stream that is delivered in arbitrary chunks.
///
/// Incomplete frames are held until the rest arrives, so at most one frame
/// plus one chunk is buffered. The tap stops inspecting once it has seen the
/// `done` packet or data that is not pkt-line framed.
#[derive(Debug, Default)]
pub struct FrameTap {
    pending: BytesMut,
    frames: usize,
    done: bool,
    gave_up: bool,
}

impl FrameTap {
    /// Create an empty tap
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of the stream.
    ///
    /// Returns true on the call during which the `done` packet completes.
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        if !self.is_watching() {
            return false;
        }
        self.pending.extend_from_slice(chunk);

        let mut consumed = 0;
        let mut saw_done = false;
        for frame in Scanner::new(&self.pending[..]) {
            match frame {
                Ok(frame) => {
                    consumed += frame.len();
                    self.frames += 1;
                    if is_done(&frame) {
                        saw_done = true;
                        break;
                    }
                }
                Err(e) => {
                    if !e.is_truncation() {
                        self.gave_up = true;
                    }
                    break;
                }
            }
        }

        if saw_done {
            self.done = true;
        }
        if self.done || self.gave_up {
            self.pending = BytesMut::new();
        } else {
            self.pending.advance(consumed);
        }

        saw_done
    }

    /// Whole frames seen so far
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// True once the `done` packet went past
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// True while the tap still inspects incoming chunks
    pub fn is_watching(&self) -> bool {
        !self.done && !self.gave_up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(input: &[u8]) -> (Vec<Vec<u8>>, Option<PktLineError>) {
        let mut frames = Vec::new();
        let mut error = None;
        for item in Scanner::new(input) {
            match item {
                Ok(frame) => frames.push(frame.to_vec()),
                Err(e) => error = Some(e),
            }
        }
        (frames, error)
    }

    fn largest_packet() -> Vec<u8> {
        let mut packet = b"ffff".to_vec();
        packet.extend(std::iter::repeat(b'z').take(MAX_FRAME_LEN - PREFIX_LEN));
        packet
    }

    #[test]
    fn test_scanner_happy_path() {
        let (frames, error) = scan(b"0010hello world!000000010010hello world!");
        assert!(error.is_none());
        assert_eq!(
            frames,
            vec![
                b"0010hello world!".to_vec(),
                b"0000".to_vec(),
                b"0001".to_vec(),
                b"0010hello world!".to_vec(),
            ]
        );
    }

    #[test]
    fn test_scanner_large_input() {
        let largest = largest_packet();
        let mut input = b"0010hello world!0000".to_vec();
        input.extend_from_slice(&largest);
        input.extend_from_slice(b"0000");

        let (frames, error) = scan(&input);
        assert!(error.is_none());
        assert_eq!(
            frames,
            vec![
                b"0010hello world!".to_vec(),
                b"0000".to_vec(),
                largest,
                b"0000".to_vec(),
            ]
        );
    }

    #[test]
    fn test_scanner_missing_byte_middle() {
        let (frames, error) = scan(b"0010hello world!00000010010hello world!");
        assert_eq!(
            frames,
            vec![
                b"0010hello world!".to_vec(),
                b"0000".to_vec(),
                b"0010010hello wor".to_vec(),
            ]
        );
        assert!(matches!(error, Some(PktLineError::IncompletePrefix(_))));
    }

    #[test]
    fn test_scanner_unfinished_prefix() {
        let (frames, error) = scan(b"0010hello world!000");
        assert_eq!(frames, vec![b"0010hello world!".to_vec()]);
        assert!(matches!(error, Some(PktLineError::IncompletePrefix(_))));
    }

    #[test]
    fn test_scanner_short_read_only_prefix() {
        let (frames, error) = scan(b"0010hello world!0005");
        assert_eq!(frames, vec![b"0010hello world!".to_vec()]);
        assert!(matches!(
            error,
            Some(PktLineError::ShortRead {
                expected: 5,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_scanner_invalid_prefix() {
        let (frames, error) = scan(b"0006a\nzzzzhello");
        assert_eq!(frames, vec![b"0006a\n".to_vec()]);
        assert!(matches!(error, Some(PktLineError::InvalidPrefix(_))));
    }

    #[test]
    fn test_scanner_rejects_signed_prefix() {
        let (frames, error) = scan(b"+00a");
        assert!(frames.is_empty());
        assert!(matches!(error, Some(PktLineError::InvalidPrefix(_))));
    }

    #[test]
    fn test_scanner_accepts_uppercase_prefix() {
        let (frames, error) = scan(b"000Ahello\n");
        assert!(error.is_none());
        assert_eq!(frames, vec![b"000Ahello\n".to_vec()]);
    }

    #[test]
    fn test_scanner_empty_input() {
        let (frames, error) = scan(b"");
        assert!(frames.is_empty());
        assert!(error.is_none());
    }

    #[test]
    fn test_scanner_stops_after_error() {
        let mut scanner = Scanner::new(&b"00"[..]);
        assert!(matches!(scanner.next(), Some(Err(_))));
        assert!(scanner.is_finished());
        assert!(scanner.next().is_none());
    }

    #[test]
    fn test_frame_bytes_survive_reencoding() {
        for payload_len in [0usize, 1, 5, 250, 4096, MAX_FRAME_LEN - PREFIX_LEN] {
            let payload = vec![b'x'; payload_len];
            let mut encoded = format!("{:04x}", payload_len + PREFIX_LEN).into_bytes();
            encoded.extend_from_slice(&payload);

            let (frames, error) = scan(&encoded);
            assert!(error.is_none(), "payload length {payload_len}");
            assert_eq!(frames.len(), 1);

            let frame = &frames[0];
            let mut reencoded = format!("{:04x}", frame.len()).into_bytes();
            reencoded.extend_from_slice(&frame[PREFIX_LEN..]);
            assert_eq!(&reencoded, frame);
            assert_eq!(frame, &encoded);
        }
    }

    #[test]
    fn test_is_done() {
        assert!(!is_done(b"0008abcd"));
        assert!(!is_done(b"invalid packet"));
        assert!(is_done(b"0009done\n"));
        assert!(!is_done(b"0001"));
        assert!(!is_done(b"0009done"));
        assert!(!is_done(b""));
    }

    #[test]
    fn test_frame_tap_detects_done_across_chunks() {
        let mut tap = FrameTap::new();
        assert!(!tap.feed(b"0032want 0123456789012345678901234567890123456789\n"));
        assert!(!tap.feed(b"00000009do"));
        assert!(tap.is_watching());
        assert!(tap.feed(b"ne\n"));
        assert!(tap.is_done());
        assert_eq!(tap.frames(), 3);

        // further data is ignored
        assert!(!tap.feed(b"0009done\n"));
        assert_eq!(tap.frames(), 3);
    }

    #[test]
    fn test_frame_tap_gives_up_on_unframed_data() {
        let mut tap = FrameTap::new();
        assert!(!tap.feed(b"PACK\x00\x00\x00\x02"));
        assert!(!tap.is_watching());
        assert!(!tap.is_done());
        assert!(!tap.feed(b"0009done\n"));
    }
}
