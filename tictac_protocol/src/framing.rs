// Newline-delimited message framing over TCP.
//
// Wire format: one JSON-serialized message per line, UTF-8, terminated by
// `\n`. Both `write_message` and `read_message` operate on raw `&[u8]` /
// `Vec<u8>` — the caller handles JSON serialization separately, keeping
// this module format-agnostic.
//
// `FrameBuffer` is the non-blocking side of the same format: the server's
// event loop appends whatever bytes a socket read produced and pops
// complete frames, leaving a trailing partial line buffered for the next
// read. `read_message` is the blocking counterpart used by clients and
// tests.

use std::io::{self, BufRead, Write};

/// Frame delimiter. One message per line.
pub const DELIMITER: u8 = b'\n';

/// Write a newline-delimited message: payload bytes, then `\n`.
///
/// Returns `InvalidInput` if the payload itself contains the delimiter —
/// such a payload could never be read back as one frame.
pub fn write_message<W: Write>(writer: &mut W, msg: &[u8]) -> io::Result<()> {
    if msg.contains(&DELIMITER) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "message contains the frame delimiter",
        ));
    }
    writer.write_all(msg)?;
    writer.write_all(&[DELIMITER])?;
    writer.flush()?;
    Ok(())
}

/// Read one newline-delimited message from a blocking stream.
///
/// Returns `UnexpectedEof` if the stream closes before a delimiter
/// arrives. A trailing `\r` (from line-oriented tools) is stripped.
pub fn read_message<R: BufRead>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let n = reader.read_until(DELIMITER, &mut buf)?;
    if n == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed",
        ));
    }
    if buf.last() == Some(&DELIMITER) {
        buf.pop();
    } else {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed mid-message",
        ));
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(buf)
}

/// Per-connection accumulator for the non-blocking read path.
///
/// `push` appends raw bytes as they arrive; `next_frame` pops the oldest
/// complete line, or `None` while only a partial line is buffered. Blank
/// lines are skipped so line-mode clients can send `\r\n` noise without
/// tripping the malformed-message path.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes from a socket read.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            let pos = self.buf.iter().position(|&b| b == DELIMITER)?;
            let mut frame: Vec<u8> = self.buf.drain(..=pos).collect();
            frame.pop(); // the delimiter
            if frame.last() == Some(&b'\r') {
                frame.pop();
            }
            if !frame.is_empty() {
                return Some(frame);
            }
        }
    }
}
