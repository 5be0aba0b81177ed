use std::io;
use tokio_util::bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Newline framing for the ESP byte stream that never fails on content.
///
/// Bytes that are not valid UTF-8 are replaced with U+FFFD and a line longer
/// than `max_length` is skipped through its terminating newline. Either way
/// the stream carries on; only the socket itself can end a session.
#[derive(Debug, Clone)]
pub(crate) struct DeviceLines {
    max_length: usize,
    discarding: bool,
}

impl DeviceLines {
    pub(crate) fn new(max_length: usize) -> Self {
        Self {
            max_length,
            discarding: false,
        }
    }
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

impl Decoder for DeviceLines {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<String>> {
        loop {
            let newline = buf.iter().position(|b| *b == b'\n');
            match (self.discarding, newline) {
                (true, Some(end)) => {
                    buf.advance(end + 1);
                    self.discarding = false;
                }
                (true, None) => {
                    buf.clear();
                    return Ok(None);
                }
                (false, Some(end)) if end > self.max_length => {
                    tracing::warn!(
                        "Skipping {} byte line over the {} byte limit",
                        end,
                        self.max_length
                    );
                    buf.advance(end + 1);
                }
                (false, Some(end)) => {
                    let line = buf.split_to(end + 1);
                    return Ok(Some(to_line(&line[..end])));
                }
                (false, None) if buf.len() > self.max_length => {
                    tracing::warn!("Skipping line over the {} byte limit", self.max_length);
                    self.discarding = true;
                    buf.clear();
                    return Ok(None);
                }
                (false, None) => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<String>> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if self.discarding || buf.is_empty() || buf[..] == b"\r"[..] {
            buf.clear();
            self.discarding = false;
            return Ok(None);
        }
        let rest = buf.split_to(buf.len());
        Ok(Some(to_line(&rest)))
    }
}
