//! Streaming decoder for the framed wire protocol (§4.B, §6).
//!
//! Grounded on `zero_mysql::tokio::conn::read_payload`: a buffered async
//! reader, a reused header read, and an exact-length body read — here
//! generalized from MySQL's fixed 4-byte length header to RESP's
//! line-oriented `+`/`-`/`:`/`$`/`*` framing.

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::reply::Reply;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The underlying transport failed or ended unexpectedly mid-message.
    Io,
    /// The bytes on the wire did not form a valid message.
    Protocol,
}

#[derive(Debug)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub detail: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.detail)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug)]
pub enum ParseItem {
    Reply(Reply),
    Error(ParseError),
}

/// Decodes one message at a time from an async byte stream.
///
/// Never buffers more than one pending message: each call to `next`
/// reads exactly the bytes needed to complete the next item before
/// returning.
pub struct Parser<R> {
    reader: R,
    finished: bool,
}

impl<R: AsyncBufRead + Unpin> Parser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            finished: false,
        }
    }

    /// Returns the next parsed item, or `None` once the stream has
    /// cleanly ended (no further items are produced afterwards).
    pub async fn next(&mut self) -> Option<ParseItem> {
        if self.finished {
            return None;
        }
        match self.read_one().await {
            Ok(Some(reply)) => Some(ParseItem::Reply(reply)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                if e.kind == ParseErrorKind::Io {
                    self.finished = true;
                }
                Some(ParseItem::Error(e))
            }
        }
    }

    async fn read_one(&mut self) -> Result<Option<Reply>, ParseError> {
        let line = match self.read_line().await? {
            None => return Ok(None),
            Some(l) => l,
        };
        if line.is_empty() {
            return Err(protocol_err("empty framing line"));
        }
        let tag = line[0];
        let body = &line[1..];
        match tag {
            b'+' => Ok(Some(Reply::SimpleString(Bytes::copy_from_slice(body)))),
            b'-' => Ok(Some(Reply::Error(Bytes::copy_from_slice(body)))),
            b':' => Ok(Some(Reply::Integer(parse_i64(body)?))),
            b'$' => Ok(Some(self.read_bulk(body).await?)),
            b'*' => self.read_array(body).await,
            other => Err(protocol_err(format!(
                "invalid type byte '{}'",
                other as char
            ))),
        }
    }

    async fn read_array(&mut self, len_bytes: &[u8]) -> Result<Option<Reply>, ParseError> {
        let n = parse_i64(len_bytes)?;
        if n == -1 {
            return Ok(Some(Reply::Array(None)));
        }
        if n < 0 {
            return Err(protocol_err("negative array length"));
        }
        let mut items = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let line = match self.read_line().await? {
                None => return Err(io_err("unexpected eof inside array")),
                Some(l) => l,
            };
            if line.is_empty() || line[0] != b'$' {
                return Err(protocol_err("expected bulk string as array element"));
            }
            items.push(self.read_bulk(&line[1..]).await?);
        }
        Ok(Some(Reply::Array(Some(items))))
    }

    async fn read_bulk(&mut self, len_bytes: &[u8]) -> Result<Reply, ParseError> {
        let n = parse_i64(len_bytes)?;
        if n == -1 {
            return Ok(Reply::Bulk(None));
        }
        if n < 0 {
            return Err(protocol_err("negative bulk length"));
        }
        let data = self.read_exact_crlf(n as usize).await?;
        Ok(Reply::Bulk(Some(data)))
    }

    /// Reads one framing line up to and including LF. `Ok(None)` means a
    /// clean EOF was observed before any byte of a new message arrived.
    async fn read_line(&mut self) -> Result<Option<Bytes>, ParseError> {
        let mut raw = Vec::new();
        let n = self
            .reader
            .read_until(b'\n', &mut raw)
            .await
            .map_err(io_err_from)?;
        if n == 0 {
            return Ok(None);
        }
        if raw.len() < 2 || raw[raw.len() - 2] != b'\r' {
            return Err(protocol_err("line missing CRLF terminator"));
        }
        raw.truncate(raw.len() - 2);
        Ok(Some(Bytes::from(raw)))
    }

    async fn read_exact_crlf(&mut self, n: usize) -> Result<Bytes, ParseError> {
        let mut buf = vec![0u8; n + 2];
        self.reader
            .read_exact(&mut buf)
            .await
            .map_err(io_err_from)?;
        if buf[n] != b'\r' || buf[n + 1] != b'\n' {
            return Err(protocol_err("bulk string missing CRLF terminator"));
        }
        buf.truncate(n);
        Ok(Bytes::from(buf))
    }
}

fn parse_i64(bytes: &[u8]) -> Result<i64, ParseError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| protocol_err("expected integer length"))
}

fn protocol_err(detail: impl Into<String>) -> ParseError {
    ParseError {
        kind: ParseErrorKind::Protocol,
        detail: detail.into(),
    }
}

fn io_err(detail: impl Into<String>) -> ParseError {
    ParseError {
        kind: ParseErrorKind::Io,
        detail: detail.into(),
    }
}

fn io_err_from(e: std::io::Error) -> ParseError {
    ParseError {
        kind: ParseErrorKind::Io,
        detail: e.to_string(),
    }
}
