//! Per-client connection state (§3, §4.G).
//!
//! Grounded on `resp/connection/connection.go`: the transport, the
//! selected DB index, and a wait-counter so `close()` can drain
//! in-flight writes before dropping the socket. Writes are serialized
//! with a mutex-guarded writer half; here that's `tokio::sync::Mutex`
//! over the split write half of the `TcpStream`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-connection state shared between the protocol handler and the
/// command executors that mutate connection-scoped fields (AUTH,
/// SELECT). A connection with no real socket (`writer: None`) is the
/// synthetic, pre-authenticated stand-in AOF replay dispatches
/// through (§4.F "Load on startup").
pub struct Connection {
    writer: Option<Mutex<WriteHalf<TcpStream>>>,
    waiting_reply: AtomicI64,
    db_index: usize,
    password: Option<String>,
    authenticated: bool,
    require_pass: Option<String>,
}

impl Connection {
    pub fn new(writer: WriteHalf<TcpStream>, require_pass: Option<String>) -> Connection {
        Connection {
            writer: Some(Mutex::new(writer)),
            waiting_reply: AtomicI64::new(0),
            db_index: 0,
            password: None,
            authenticated: require_pass.is_none(),
            require_pass,
        }
    }

    /// A synthetic, pre-authenticated connection with no real socket,
    /// used by AOF replay.
    pub fn synthetic(require_pass: Option<String>) -> Connection {
        Connection {
            writer: None,
            waiting_reply: AtomicI64::new(0),
            db_index: 0,
            password: require_pass.clone(),
            authenticated: true,
            require_pass,
        }
    }

    pub fn db_index(&self) -> usize {
        self.db_index
    }

    pub fn select_db(&mut self, index: usize) {
        self.db_index = index;
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn require_pass(&self) -> Option<&str> {
        self.require_pass.as_deref()
    }

    pub fn set_password(&mut self, password: String) {
        self.authenticated = self.require_pass.as_deref() == Some(password.as_str());
        self.password = Some(password);
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Writes a reply, tracking it in the wait-counter until the
    /// write completes so graceful close can drain outstanding
    /// replies. A no-op on the synthetic replay connection.
    pub async fn write(&self, bytes: &[u8]) -> std::io::Result<()> {
        let Some(writer) = &self.writer else {
            return Ok(());
        };
        if bytes.is_empty() {
            return Ok(());
        }
        self.waiting_reply.fetch_add(1, Ordering::SeqCst);
        let mut guard = writer.lock().await;
        let result = guard.write_all(bytes).await;
        drop(guard);
        self.waiting_reply.fetch_sub(1, Ordering::SeqCst);
        result
    }

    /// Drains outstanding writes (up to 10s) before the caller
    /// shuts down the socket.
    pub async fn drain_before_close(&self) {
        let deadline = tokio::time::Instant::now() + CLOSE_DRAIN_TIMEOUT;
        while self.waiting_reply.load(Ordering::SeqCst) > 0 {
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// A socketless connection with real (not pre-authenticated) AUTH
    /// semantics, for tests that exercise the NOAUTH gate without a
    /// live `TcpStream`.
    #[cfg(test)]
    pub fn new_for_test_with_password(require_pass: &str) -> Connection {
        Connection {
            writer: None,
            waiting_reply: AtomicI64::new(0),
            db_index: 0,
            password: None,
            authenticated: false,
            require_pass: Some(require_pass.to_string()),
        }
    }
}
