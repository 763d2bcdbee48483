//! Wire-level reply values and their canonical byte encoding (§4.A, §6).

use std::sync::LazyLock;

use bytes::{Bytes, BytesMut};

/// A reply value in one of the five wire variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    SimpleString(Bytes),
    Error(Bytes),
    Integer(i64),
    Bulk(Option<Bytes>),
    Array(Option<Vec<Reply>>),
}

pub static OK: LazyLock<Reply> = LazyLock::new(|| Reply::SimpleString(Bytes::from_static(b"OK")));
pub static PONG: LazyLock<Reply> =
    LazyLock::new(|| Reply::SimpleString(Bytes::from_static(b"PONG")));
pub static NULL_BULK: LazyLock<Reply> = LazyLock::new(|| Reply::Bulk(None));
pub static EMPTY_ARRAY: LazyLock<Reply> = LazyLock::new(|| Reply::Array(Some(Vec::new())));

impl Reply {
    pub fn ok() -> Reply {
        OK.clone()
    }

    pub fn pong() -> Reply {
        PONG.clone()
    }

    pub fn null_bulk() -> Reply {
        NULL_BULK.clone()
    }

    pub fn empty_array() -> Reply {
        EMPTY_ARRAY.clone()
    }

    pub fn bulk(data: impl Into<Bytes>) -> Reply {
        Reply::Bulk(Some(data.into()))
    }

    pub fn status(s: impl Into<Bytes>) -> Reply {
        Reply::SimpleString(s.into())
    }

    pub fn error(msg: impl Into<String>) -> Reply {
        Reply::Error(Bytes::from(msg.into()))
    }

    pub fn standard_error(msg: impl std::fmt::Display) -> Reply {
        Reply::error(format!("ERR {msg}"))
    }

    pub fn unknown_command(name: &str) -> Reply {
        Reply::error(format!("ERR unknown command '{name}'"))
    }

    pub fn wrong_arity(name: &str) -> Reply {
        Reply::error(format!(
            "ERR wrong number of arguments for '{name}' command"
        ))
    }

    pub fn array(items: Vec<Reply>) -> Reply {
        Reply::Array(Some(items))
    }

    pub fn array_of_bulks(items: Vec<Bytes>) -> Reply {
        Reply::array(items.into_iter().map(|b| Reply::Bulk(Some(b))).collect())
    }

    /// True iff the canonical encoding's first byte is `-`.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Canonical on-wire encoding (§6).
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.freeze()
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Reply::SimpleString(s) => {
                buf.extend_from_slice(b"+");
                buf.extend_from_slice(s);
                buf.extend_from_slice(b"\r\n");
            }
            Reply::Error(s) => {
                buf.extend_from_slice(b"-");
                buf.extend_from_slice(s);
                buf.extend_from_slice(b"\r\n");
            }
            Reply::Integer(i) => {
                buf.extend_from_slice(b":");
                buf.extend_from_slice(i.to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            Reply::Bulk(None) => buf.extend_from_slice(b"$-1\r\n"),
            Reply::Bulk(Some(data)) => {
                buf.extend_from_slice(b"$");
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
            }
            Reply::Array(None) => buf.extend_from_slice(b"*-1\r\n"),
            Reply::Array(Some(items)) => {
                buf.extend_from_slice(b"*");
                buf.extend_from_slice(items.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                for item in items {
                    item.encode_into(buf);
                }
            }
        }
    }
}
