//! The background writer pipeline (§4.F).
//!
//! Grounded on `aof/aof.go`'s `AofHandler`: a bounded queue feeds a
//! single writer task that buffers writes and flushes on an
//! `always`/size/interval policy, plus an independent ticker task for
//! the `everysec` policy. A "pausing" lock is held across one payload's
//! processing and across the whole rewrite critical section, the same
//! shape as the original's `pausingMutex`.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_queue::ArrayQueue;
use tokio::io::BufReader;
use tokio::sync::{watch, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;

use crate::command::Command;
use crate::config::{Config, FsyncPolicy};
use crate::connection::Connection;
use crate::db::AofSink;
use crate::engine::Engine;
use crate::protocol::{ParseItem, Parser};
use crate::reply::Reply;

use super::rewrite::Rewriter;

const AOF_QUEUE_CAPACITY: usize = 1 << 20;
const BUFFER_FLUSH_THRESHOLD: usize = 1 << 16;
const FSYNC_INTERVAL: Duration = Duration::from_secs(1);
const RETRY_TIMES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(10);

struct Payload {
    db_index: usize,
    command: Vec<Bytes>,
}

struct Shared {
    filename: String,
    fsync: FsyncPolicy,
    engine: Arc<Engine>,
    queue: ArrayQueue<Payload>,
    queue_notify: Notify,
    shutdown: watch::Sender<bool>,
    buffer: AsyncMutex<Vec<u8>>,
    pausing: AsyncMutex<()>,
    current_db: AtomicUsize,
    file: AsyncMutex<std::fs::File>,
    rewriter: Rewriter,
}

impl Shared {
    fn push(&self, db_index: usize, command: Vec<Bytes>) {
        if self.queue.push(Payload { db_index, command }).is_err() {
            tracing::error!("AOF queue full, dropping payload");
            return;
        }
        self.queue_notify.notify_one();
    }
}

/// Owns the writer and ticker background tasks. Dropping without
/// calling [`AofHandle::close`] abandons them; always close explicitly
/// during shutdown so the final buffer is flushed and fsynced.
pub struct AofHandle {
    shared: Arc<Shared>,
    writer_task: Option<JoinHandle<()>>,
    ticker_task: Option<JoinHandle<()>>,
}

impl AofHandle {
    /// Replays any existing AOF file against `engine` (§4.F "Load on
    /// startup"), then opens the file for appending and starts the
    /// background tasks. The caller wires [`AofHandle::sink`] into each
    /// `Database` afterwards, completing the two-phase engine/AOF
    /// initialization.
    pub async fn open(config: &Config, engine: Arc<Engine>) -> crate::error::Result<AofHandle> {
        load_aof(&config.append_filename, &engine, config.requirepass.clone()).await;

        let file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .read(true)
            .open(&config.append_filename)?;
        let initial_size = file.metadata().map(|m| m.len() as i64).unwrap_or(0);

        let rewriter = Rewriter::new(
            config.append_filename.clone(),
            config.databases,
            config.auto_aof_rewrite_min_size,
            config.auto_aof_rewrite_percentage,
        );
        rewriter.set_last_rewrite_size(initial_size);

        let (shutdown, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            filename: config.append_filename.clone(),
            fsync: config.append_fsync,
            engine,
            queue: ArrayQueue::new(AOF_QUEUE_CAPACITY),
            queue_notify: Notify::new(),
            shutdown,
            buffer: AsyncMutex::new(Vec::new()),
            pausing: AsyncMutex::new(()),
            current_db: AtomicUsize::new(0),
            file: AsyncMutex::new(file),
            rewriter,
        });

        let writer_task = tokio::spawn(writer_loop(Arc::clone(&shared)));
        let ticker_task = (shared.fsync == FsyncPolicy::EverySec)
            .then(|| tokio::spawn(ticker_loop(Arc::clone(&shared))));

        Ok(AofHandle {
            shared,
            writer_task: Some(writer_task),
            ticker_task,
        })
    }

    /// Returns a sink suitable for [`crate::db::Database::set_aof_sink`].
    pub fn sink(&self) -> AofSink {
        let shared = Arc::clone(&self.shared);
        Arc::new(move |db_index, command| shared.push(db_index, command))
    }

    /// Signals both background tasks to drain and stop, then does a
    /// final flush and fsync. Mirrors `AofHandler.Close`.
    pub async fn close(mut self) {
        let _ = self.shared.shutdown.send(true);
        if let Some(task) = self.writer_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.ticker_task.take() {
            let _ = task.await;
        }
        flush_buffer(&self.shared).await;
        let file = self.shared.file.lock().await;
        safe_sync(&file).await;
    }
}

async fn writer_loop(shared: Arc<Shared>) {
    let mut shutdown_rx = shared.shutdown.subscribe();
    loop {
        if let Some(payload) = shared.queue.pop() {
            process_payload(&shared, payload).await;
            continue;
        }
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = shared.queue_notify.notified() => {}
        }
    }
    // Drain whatever arrived between the last pop and shutdown.
    while let Some(payload) = shared.queue.pop() {
        process_payload(&shared, payload).await;
    }
}

async fn ticker_loop(shared: Arc<Shared>) {
    let mut shutdown_rx = shared.shutdown.subscribe();
    let mut interval = tokio::time::interval(FSYNC_INTERVAL);
    interval.tick().await;
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return;
                }
            }
            _ = interval.tick() => flush_buffer(&shared).await,
        }
    }
}

async fn process_payload(shared: &Arc<Shared>, payload: Payload) {
    let _guard = shared.pausing.lock().await;
    if payload.db_index != shared.current_db.load(Ordering::SeqCst) {
        let select = encode_command(&[
            Bytes::from_static(b"SELECT"),
            Bytes::from(payload.db_index.to_string()),
        ]);
        buffered_write(shared, &select).await;
        shared.current_db.store(payload.db_index, Ordering::SeqCst);
    }
    let encoded = encode_command(&payload.command);
    buffered_write(shared, &encoded).await;

    let should_flush = {
        let buffer = shared.buffer.lock().await;
        shared.fsync == FsyncPolicy::Always || buffer.len() >= BUFFER_FLUSH_THRESHOLD
    };
    if should_flush {
        flush_buffer(shared).await;
    }
}

async fn buffered_write(shared: &Shared, data: &[u8]) {
    let mut buffer = shared.buffer.lock().await;
    buffer.extend_from_slice(data);
}

/// Writes the buffer to disk with retries, fsyncing per policy and
/// checking whether a rewrite is now due. Mirrors `flushBuffer`: a
/// write failure leaves the buffer intact for the next attempt instead
/// of discarding unwritten data.
async fn flush_buffer(shared: &Arc<Shared>) {
    let mut buffer = shared.buffer.lock().await;
    if buffer.is_empty() {
        return;
    }
    let mut file = shared.file.lock().await;
    let mut succeeded = false;
    for _ in 0..RETRY_TIMES {
        match file.write_all(&buffer) {
            Ok(()) => {
                succeeded = true;
                break;
            }
            Err(err) => {
                tracing::error!(%err, "AOF write failed, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
    if !succeeded {
        tracing::error!("AOF write failed after retries");
        return;
    }
    buffer.clear();
    drop(buffer);

    if shared.fsync != FsyncPolicy::No {
        safe_sync(&file).await;
    }
    let size = file.metadata().map(|m| m.len() as i64).unwrap_or(0);
    drop(file);
    check_rewrite(shared, size).await;
}

async fn safe_sync(file: &std::fs::File) {
    for attempt in 1..=RETRY_TIMES {
        match file.sync_all() {
            Ok(()) => return,
            Err(err) => {
                tracing::error!(%err, attempt, "AOF fsync failed, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
    tracing::error!("AOF fsync failed after multiple attempts; data consistency may be at risk");
}

async fn check_rewrite(shared: &Arc<Shared>, file_size: i64) {
    if shared.rewriter.should_rewrite(file_size) {
        schedule_rewrite(shared).await;
    }
}

/// Spawns the rewrite as its own task so the writer loop is not blocked
/// by it; the rewrite still holds the same pausing lock the writer
/// uses, so no payload processing interleaves with it. Mirrors
/// `ScheduleRewrite`.
async fn schedule_rewrite(shared: &Arc<Shared>) {
    if !shared.rewriter.try_lock() {
        return;
    }
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let _guard = shared.pausing.lock().await;
        {
            let file = shared.file.lock().await;
            safe_sync(&file).await;
        }
        match shared.rewriter.trigger_rewrite(&shared.engine).await {
            Ok(new_size) => reopen_after_rewrite(&shared, new_size).await,
            Err(err) => tracing::error!(%err, "AOF rewrite failed"),
        }
        shared.rewriter.unlock();
    });
}

async fn reopen_after_rewrite(shared: &Shared, new_size: i64) {
    let reopened = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .read(true)
        .open(&shared.filename);
    let mut new_file = match reopened {
        Ok(f) => f,
        Err(err) => {
            tracing::error!(%err, "failed to reopen AOF file after rewrite");
            return;
        }
    };
    let select = encode_command(&[
        Bytes::from_static(b"SELECT"),
        Bytes::from(shared.current_db.load(Ordering::SeqCst).to_string()),
    ]);
    if let Err(err) = new_file.write_all(&select) {
        tracing::error!(%err, "failed to reselect db after AOF rewrite");
    }
    *shared.file.lock().await = new_file;
    shared.rewriter.set_last_rewrite_size(new_size);
}

fn encode_command(args: &[Bytes]) -> Bytes {
    Reply::array_of_bulks(args.to_vec()).to_bytes()
}

/// Replays an existing AOF file against `engine` through a synthetic,
/// pre-authenticated connection. Mirrors `LoadAof`: parse errors and
/// failing commands are logged and skipped rather than aborting replay.
async fn load_aof(filename: &str, engine: &Engine, require_pass: Option<String>) {
    let file = match tokio::fs::File::open(filename).await {
        Ok(f) => f,
        Err(err) => {
            tracing::info!(%err, filename, "no existing AOF file to replay");
            return;
        }
    };
    let mut parser = Parser::new(BufReader::new(file));
    let mut conn = Connection::synthetic(require_pass);
    while let Some(item) = parser.next().await {
        match item {
            ParseItem::Error(err) => {
                tracing::error!(%err, "AOF replay parse error");
                continue;
            }
            ParseItem::Reply(parsed) => {
                let command = match Command::try_from(parsed) {
                    Ok(command) => command,
                    Err(detail) => {
                        tracing::error!(detail, "AOF replay: malformed command");
                        continue;
                    }
                };
                let reply = engine.exec(&mut conn, &command);
                if reply.is_error() {
                    tracing::error!(?reply, "AOF replay command failed");
                }
            }
        }
    }
}
