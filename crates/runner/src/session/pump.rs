//! Output pump.
//!
//! Reads the PTY master in fixed-size chunks on a blocking thread and
//! forwards each chunk as an `output` frame. The pump is the only reader
//! of the master.

use std::io::{ErrorKind, Read};

use protocol::ServerMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Size of one PTY read.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Why the pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The PTY reached end-of-stream; the shell is gone.
    EndOfStream,
    /// Reading the PTY failed.
    ReadError,
    /// The outbound channel is closed; the connection is gone.
    ConnectionClosed,
}

/// Incremental UTF-8 decoder for terminal output.
///
/// A multi-byte sequence split across two reads is held back until the
/// rest arrives. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decodes as much of `pending + chunk` as possible.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        out.push_str(text);
                    }
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        let carried = rest.to_vec();
        self.pending = carried;
        out
    }

    /// Flushes bytes still held back, lossily.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(text)
    }
}

/// Runs the pump until the PTY or the connection goes away.
///
/// Blocks the calling thread. Cancels `shutdown` on exit so the inbound
/// loop stops too.
pub fn run_output_pump<R: Read>(
    mut reader: R,
    outbound: mpsc::Sender<ServerMessage>,
    shutdown: CancellationToken,
) -> PumpExit {
    let mut buf = [0u8; READ_CHUNK_SIZE];
    let mut decoder = Utf8Decoder::default();

    let exit = loop {
        match reader.read(&mut buf) {
            Ok(0) => break PumpExit::EndOfStream,
            Ok(n) => {
                let text = decoder.decode(&buf[..n]);
                if text.is_empty() {
                    continue;
                }
                if outbound.blocking_send(ServerMessage::Output(text)).is_err() {
                    break PumpExit::ConnectionClosed;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                // Linux reports EIO on the master once the slave side is gone.
                tracing::debug!(error = %e, "PTY read ended");
                break PumpExit::ReadError;
            }
        }
    };

    if exit != PumpExit::ConnectionClosed {
        if let Some(text) = decoder.finish() {
            let _ = outbound.blocking_send(ServerMessage::Output(text));
        }
    }

    tracing::debug!(reason = ?exit, "Output pump stopped");
    shutdown.cancel();
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from_raw_os_error(5))
        }
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(ServerMessage::Output(text)) = rx.try_recv() {
            out.push(text);
        }
        out
    }

    #[test]
    fn test_decoder_passes_ascii() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"$ ls\r\n"), "$ ls\r\n");
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_decoder_joins_split_sequence() {
        let bytes = "héllo ✓".as_bytes();
        // Split inside the three-byte check mark.
        let split = bytes.len() - 1;

        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(&bytes[..split]), "héllo ");
        assert_eq!(decoder.decode(&bytes[split..]), "✓");
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_decoder_finish_flushes_truncated_tail() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"ok\xe2\x9c"), "ok");
        assert_eq!(decoder.finish().as_deref(), Some("\u{FFFD}"));
    }

    #[test]
    fn test_pump_forwards_chunks_until_eof() {
        let data = vec![b'x'; READ_CHUNK_SIZE * 2 + 10];
        let (tx, mut rx) = mpsc::channel(16);
        let token = CancellationToken::new();

        let exit = run_output_pump(Cursor::new(data), tx, token.clone());

        assert_eq!(exit, PumpExit::EndOfStream);
        assert!(token.is_cancelled());
        let chunks = drain(&mut rx);
        assert_eq!(
            chunks.iter().map(String::len).collect::<Vec<_>>(),
            vec![READ_CHUNK_SIZE, READ_CHUNK_SIZE, 10]
        );
    }

    #[test]
    fn test_pump_stops_on_read_error() {
        let (tx, mut rx) = mpsc::channel(16);
        let token = CancellationToken::new();

        let exit = run_output_pump(FailingReader, tx, token.clone());

        assert_eq!(exit, PumpExit::ReadError);
        assert!(token.is_cancelled());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_pump_stops_when_connection_closed() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let token = CancellationToken::new();

        let exit = run_output_pump(Cursor::new(b"output".to_vec()), tx, token.clone());

        assert_eq!(exit, PumpExit::ConnectionClosed);
        assert!(token.is_cancelled());
    }
}
