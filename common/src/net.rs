//! Async frame transport: per-connection read buffering and frame writes.
//!
//! Records are newline-terminated and the escape for a literal newline is
//! the two-character sequence `\n`, so a raw 0x0A byte on the wire is
//! always a frame terminator. The reader therefore accumulates bytes and
//! splits on raw newlines, which keeps frames intact across TCP
//! fragmentation and coalescence.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::MAX_FRAME_LEN;

const READ_CHUNK: usize = 4096;

/// Upper bound on unterminated buffered bytes before the peer is treated
/// as broken. Oversized frames that do arrive terminated are still handed
/// out and rejected by validation, which keeps the connection usable.
const MAX_BUFFERED: usize = MAX_FRAME_LEN * 4;

/// Buffered frame reader over any async byte stream.
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> FrameReader<R> {
        FrameReader {
            inner,
            buf: Vec::new(),
        }
    }

    /// Next complete frame, terminator stripped.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly. A final
    /// unterminated remainder before EOF is handed out as a frame. Errors
    /// are transport failures, invalid UTF-8, or a peer streaming more
    /// than [`MAX_BUFFERED`] bytes without a terminator.
    ///
    /// Cancel-safe: buffered bytes live in `self`, and the single inner
    /// read either completes or consumes nothing.
    pub async fn read_frame(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let rest = self.buf.split_off(pos + 1);
                let mut line = std::mem::replace(&mut self.buf, rest);
                line.pop();
                return frame_from_bytes(line).map(Some);
            }

            if self.buf.len() > MAX_BUFFERED {
                self.buf.clear();
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unterminated frame exceeds {MAX_BUFFERED} bytes"),
                ));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let line = std::mem::take(&mut self.buf);
                return frame_from_bytes(line).map(Some);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

fn frame_from_bytes(line: Vec<u8>) -> io::Result<String> {
    String::from_utf8(line).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Write one frame and flush, appending the terminator when absent.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &str) -> io::Result<()> {
    writer.write_all(frame.as_bytes()).await?;
    if !frame.ends_with('\n') {
        writer.write_all(b"\n").await?;
    }
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn fragmented_frame_is_reassembled() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(rx);

        tx.write_all(b"MSG|alice|bob|t").await.unwrap();
        tx.write_all(b"|hello\n").await.unwrap();
        drop(tx);

        let frame = reader.read_frame().await.unwrap();
        assert_eq!(frame.as_deref(), Some("MSG|alice|bob|t|hello"));
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn coalesced_frames_are_split() {
        let (mut tx, rx) = tokio::io::duplex(256);
        let mut reader = FrameReader::new(rx);

        tx.write_all(b"MSG|a|b|t|one\nMSG|a|b|t|two\n").await.unwrap();
        drop(tx);

        assert_eq!(
            reader.read_frame().await.unwrap().as_deref(),
            Some("MSG|a|b|t|one")
        );
        assert_eq!(
            reader.read_frame().await.unwrap().as_deref(),
            Some("MSG|a|b|t|two")
        );
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unterminated_tail_is_yielded_at_eof() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(rx);

        tx.write_all(b"MSG|a|b|t|cut off").await.unwrap();
        drop(tx);

        assert_eq!(
            reader.read_frame().await.unwrap().as_deref(),
            Some("MSG|a|b|t|cut off")
        );
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn runaway_unterminated_stream_errors() {
        let (mut tx, rx) = tokio::io::duplex(READ_CHUNK);
        let mut reader = FrameReader::new(rx);

        let writer = tokio::spawn(async move {
            let blob = vec![b'x'; MAX_BUFFERED + READ_CHUNK];
            let _ = tx.write_all(&blob).await;
        });

        let err = reader.read_frame().await.expect_err("should overflow");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        writer.abort();
    }

    #[tokio::test]
    async fn write_frame_appends_terminator() {
        let (tx, rx) = tokio::io::duplex(64);
        let mut tx = tx;
        write_frame(&mut tx, "STATUS|a|server|t|").await.unwrap();
        drop(tx);

        let mut reader = FrameReader::new(rx);
        assert_eq!(
            reader.read_frame().await.unwrap().as_deref(),
            Some("STATUS|a|server|t|")
        );
    }

    #[tokio::test]
    async fn escaped_newline_does_not_split_frames() {
        let (mut tx, rx) = tokio::io::duplex(128);
        let mut reader = FrameReader::new(rx);

        tx.write_all(b"MSG|a|b|t|line one\\nline two\n")
            .await
            .unwrap();
        drop(tx);

        assert_eq!(
            reader.read_frame().await.unwrap().as_deref(),
            Some("MSG|a|b|t|line one\\nline two")
        );
        assert!(reader.read_frame().await.unwrap().is_none());
    }
}
