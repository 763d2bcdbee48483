//! A relay connection to one cluster peer (§4.I).
//!
//! Grounded on `resp/client/client.go`: a background task owns the
//! socket and a channel carries outgoing requests to it, a 10s ticker
//! sends a heartbeat `PING`, and a write failure retries against a
//! fresh reconnect up to 3 times before giving up. Unlike the
//! original's dual read/write goroutines (which pipeline many
//! in-flight requests over one socket), this client processes one
//! request at a time per connection — reconnecting both halves of a
//! split `TcpStream` consistently across two independently-running
//! tasks would need extra coordination machinery for a gain the
//! cluster router doesn't need, since [`crate::cluster::router::ClusterRouter`]
//! already affords one connection per peer and issues requests to it
//! sequentially. Documented in DESIGN.md.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::protocol::{ParseItem, Parser};
use crate::reply::Reply;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_TIMES: u32 = 3;

struct Request {
    args: Vec<Bytes>,
    respond_to: oneshot::Sender<Reply>,
}

pub struct PeerClient {
    tx: mpsc::Sender<Request>,
    driver_task: JoinHandle<()>,
    heartbeat_task: JoinHandle<()>,
}

impl PeerClient {
    pub async fn connect(address: String) -> std::io::Result<PeerClient> {
        let stream = TcpStream::connect(&address).await?;
        let (tx, rx) = mpsc::channel(256);
        let driver_task = tokio::spawn(driver_loop(address, stream, rx));
        let heartbeat_task = tokio::spawn(heartbeat_loop(tx.clone()));
        Ok(PeerClient {
            tx,
            driver_task,
            heartbeat_task,
        })
    }

    /// Sends one command and waits up to 3s for its reply, matching
    /// `Client.Send`'s `maxWait` timeout.
    pub async fn send(&self, args: Vec<Bytes>) -> Reply {
        let (respond_to, response) = oneshot::channel();
        if self.tx.send(Request { args, respond_to }).await.is_err() {
            return Reply::standard_error("peer connection closed");
        }
        match tokio::time::timeout(REQUEST_TIMEOUT, response).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Reply::standard_error("peer request dropped"),
            Err(_) => Reply::standard_error("peer time out"),
        }
    }

    /// Stops the heartbeat, closes the request channel so the driver
    /// drains and exits, and waits for it. Mirrors `Client.Close`.
    pub async fn close(self) {
        self.heartbeat_task.abort();
        drop(self.tx);
        let _ = self.driver_task.await;
    }
}

async fn heartbeat_loop(tx: mpsc::Sender<Request>) {
    let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    interval.tick().await;
    loop {
        interval.tick().await;
        let (respond_to, _response) = oneshot::channel();
        let request = Request {
            args: vec![Bytes::from_static(b"PING")],
            respond_to,
        };
        if tx.send(request).await.is_err() {
            return;
        }
    }
}

async fn driver_loop(address: String, stream: TcpStream, mut rx: mpsc::Receiver<Request>) {
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    while let Some(req) = rx.recv().await {
        let encoded = Reply::array_of_bulks(req.args).to_bytes();
        let mut sent = false;
        for attempt in 0..=RETRY_TIMES {
            match write_half.write_all(&encoded).await {
                Ok(()) => {
                    sent = true;
                    break;
                }
                Err(err) => {
                    tracing::error!(%err, address, attempt, "peer write failed");
                    if attempt == RETRY_TIMES {
                        break;
                    }
                    match TcpStream::connect(&address).await {
                        Ok(new_stream) => {
                            let (new_read, new_write) = tokio::io::split(new_stream);
                            reader = BufReader::new(new_read);
                            write_half = new_write;
                        }
                        Err(err) => tracing::error!(%err, address, "peer reconnect failed"),
                    }
                }
            }
        }
        if !sent {
            let _ = req
                .respond_to
                .send(Reply::standard_error("peer connection unavailable"));
            continue;
        }

        let mut parser = Parser::new(&mut reader);
        let reply = match parser.next().await {
            Some(ParseItem::Reply(reply)) => reply,
            Some(ParseItem::Error(err)) => Reply::standard_error(err),
            None => Reply::standard_error("peer connection closed"),
        };
        let _ = req.respond_to.send(reply);
    }
}
