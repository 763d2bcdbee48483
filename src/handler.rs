//! Per-connection protocol glue: read commands, dispatch to the
//! engine, write replies (§4.G).
//!
//! Grounded on `resp/handler/handler.go`'s `RespHandler`: an active-
//! connections registry so a graceful shutdown can unblock every
//! in-flight read, EOF/IO-error detection that closes the connection
//! silently, and protocol errors reported inline without closing it.
//! The registry stores a per-connection [`tokio::sync::Notify`]
//! instead of the original's raw `net.Conn`, since this crate's
//! `select!`-based shutdown signals a task rather than forcing a
//! socket closed from another goroutine.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};

use crate::cluster::ClusterRouter;
use crate::command::Command;
use crate::connection::Connection;
use crate::engine::Engine;
use crate::protocol::{ParseErrorKind, ParseItem, Parser};
use crate::reply::Reply;

/// Where a parsed command actually gets executed: the local engine
/// directly, or through a [`ClusterRouter`] when clustering is
/// configured. Kept as an enum rather than a trait object since there
/// are exactly two shapes and `ClusterRouter::exec` is async while
/// `Engine::exec` is not.
enum Dispatcher {
    Local(Arc<Engine>),
    Cluster(ClusterRouter),
}

impl Dispatcher {
    async fn exec(&self, conn: &mut Connection, command: &Command) -> Reply {
        match self {
            Dispatcher::Local(engine) => engine.exec(conn, command),
            Dispatcher::Cluster(router) => router.exec(conn, command).await,
        }
    }
}

pub struct RespHandler {
    dispatcher: Dispatcher,
    require_pass: Option<String>,
    active: Mutex<HashMap<u64, Arc<Notify>>>,
    next_id: AtomicU64,
    closing: AtomicBool,
}

impl RespHandler {
    pub fn new(engine: Arc<Engine>, require_pass: Option<String>) -> RespHandler {
        RespHandler {
            dispatcher: Dispatcher::Local(engine),
            require_pass,
            active: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            closing: AtomicBool::new(false),
        }
    }

    /// Same as [`RespHandler::new`], but routes every command through a
    /// [`ClusterRouter`] instead of the local engine directly.
    pub fn with_cluster(require_pass: Option<String>, router: ClusterRouter) -> RespHandler {
        RespHandler {
            dispatcher: Dispatcher::Cluster(router),
            require_pass,
            active: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            closing: AtomicBool::new(false),
        }
    }

    /// Serves one accepted connection until it closes or the server
    /// shuts down. Mirrors `RespHandler.Handle`.
    pub async fn handle(&self, stream: TcpStream, peer: SocketAddr) {
        if self.closing.load(Ordering::SeqCst) {
            return;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let shutdown = Arc::new(Notify::new());
        self.active.lock().await.insert(id, Arc::clone(&shutdown));

        self.serve(stream, peer, &shutdown).await;

        self.active.lock().await.remove(&id);
    }

    async fn serve(&self, stream: TcpStream, peer: SocketAddr, shutdown: &Notify) {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut conn = Connection::new(write_half, self.require_pass.clone());
        let mut parser = Parser::new(BufReader::new(read_half));

        loop {
            let item = tokio::select! {
                () = shutdown.notified() => break,
                item = parser.next() => item,
            };
            match item {
                None => {
                    tracing::info!(%peer, "connection closed");
                    break;
                }
                Some(ParseItem::Error(err)) => {
                    if err.kind == ParseErrorKind::Io {
                        tracing::info!(%peer, "connection closed");
                        break;
                    }
                    let reply = Reply::standard_error(err);
                    if conn.write(&reply.to_bytes()).await.is_err() {
                        tracing::info!(%peer, "connection closed");
                        break;
                    }
                }
                Some(ParseItem::Reply(parsed)) => {
                    let reply = match Command::try_from(parsed) {
                        Ok(command) => self.dispatcher.exec(&mut conn, &command).await,
                        Err(detail) => Reply::standard_error(detail),
                    };
                    if conn.write(&reply.to_bytes()).await.is_err() {
                        tracing::info!(%peer, "connection closed");
                        break;
                    }
                }
            }
        }
        conn.drain_before_close().await;
    }

    /// Marks the handler closed (new connections are rejected) and
    /// wakes every in-flight connection task so it observes the
    /// shutdown and exits its read loop. Mirrors `RespHandler.Close`.
    pub async fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let active = self.active.lock().await;
        for shutdown in active.values() {
            shutdown.notify_waiters();
        }
    }
}
