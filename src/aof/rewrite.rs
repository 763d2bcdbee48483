//! AOF compaction (§4.F "Rewrite").
//!
//! Grounded on `aof/aof_rewriter.go` and `aof/marshal.go`: dump every
//! database to a temp file as `SELECT`-prefixed `SET` commands, then
//! atomically rename it over the live AOF file. The Go original pools
//! its per-entity scratch buffer with `sync.Pool`; this crate reuses
//! one `Vec<u8>` across the whole dump instead, the same "clear and
//! keep the allocation" shape `buffer_pool.rs` applies to its pooled
//! buffers.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use bytes::Bytes;

use crate::engine::Engine;
use crate::reply::Reply;

pub struct Rewriter {
    filename: String,
    databases: usize,
    min_size: u64,
    percentage: u64,
    last_rewrite_size: AtomicI64,
    rewriting: AtomicBool,
}

impl Rewriter {
    pub fn new(filename: String, databases: usize, min_size: u64, percentage: u64) -> Rewriter {
        Rewriter {
            filename,
            databases,
            min_size,
            percentage,
            last_rewrite_size: AtomicI64::new(0),
            rewriting: AtomicBool::new(false),
        }
    }

    /// Mirrors `checkAofRewrite`: triggers once the file has grown past
    /// the configured minimum size by at least the configured percentage
    /// since the last rewrite.
    pub fn should_rewrite(&self, file_size: i64) -> bool {
        if file_size < self.min_size as i64 {
            return false;
        }
        let last = self.last_rewrite_size.load(Ordering::SeqCst);
        if last <= 0 {
            return true;
        }
        let growth = ((file_size - last) * 100) / last;
        growth >= self.percentage as i64
    }

    /// Non-blocking: `false` means a rewrite is already in progress.
    /// Held until [`Rewriter::unlock`] is called, matching
    /// `sync.Mutex.TryLock`'s lock-until-explicit-unlock semantics.
    pub fn try_lock(&self) -> bool {
        self.rewriting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Dumps every database to a fresh temp file next to `filename` and
    /// atomically renames it into place. Returns the new file's size on
    /// success. Caller holds the handler's pausing lock for the whole
    /// call, matching `TriggerRewrite`'s critical section.
    pub async fn trigger_rewrite(&self, engine: &Engine) -> std::io::Result<i64> {
        let temp_path = format!("{}.rewrite.{}", self.filename, std::process::id());
        let filename = self.filename.clone();
        let databases = self.databases;

        let temp_path_for_blocking = temp_path.clone();
        let dump = move || -> std::io::Result<i64> {
            let mut temp_file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&temp_path_for_blocking)?;
            dump_database(&mut temp_file, engine, databases)?;
            temp_file.sync_all()?;
            drop(temp_file);
            std::fs::rename(&temp_path_for_blocking, &filename)?;
            let size = std::fs::metadata(&filename)?.len() as i64;
            Ok(size)
        };

        let result = tokio::task::block_in_place(dump);
        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
        }
        result
    }

    pub fn set_last_rewrite_size(&self, size: i64) {
        self.last_rewrite_size.store(size, Ordering::SeqCst);
    }

    pub fn unlock(&self) {
        self.rewriting.store(false, Ordering::SeqCst);
    }
}

/// Dumps each non-empty database as `SELECT i` followed by one `SET`
/// per live entity. A database with no keys contributes nothing — the
/// `SELECT` is only written once at least one entity has been
/// buffered, so an instance using only DB 0 doesn't pay for 15
/// redundant `SELECT` records on every rewrite.
fn dump_database(
    file: &mut std::fs::File,
    engine: &Engine,
    databases: usize,
) -> std::io::Result<()> {
    let mut scratch = Vec::with_capacity(1024);
    for db_index in 0..databases {
        let mut db_buffer = Vec::new();
        engine.for_each(db_index, |key, entity, _expire_at| {
            scratch.clear();
            entity_to_command(&mut scratch, key, entity);
            db_buffer.extend_from_slice(&scratch);
            true
        });
        if db_buffer.is_empty() {
            continue;
        }
        let select = encode_command(&[Bytes::from_static(b"SELECT"), Bytes::from(db_index.to_string())]);
        file.write_all(&select)?;
        file.write_all(&db_buffer)?;
    }
    Ok(())
}

/// Mirrors `EntityToCommand`/`stringToCommand`: a string entity dumps
/// as `SET key value`.
fn entity_to_command(out: &mut Vec<u8>, key: &Bytes, entity: &crate::store::Entity) {
    let crate::store::Value::Bytes(value) = &entity.data;
    let command = Reply::array_of_bulks(vec![
        Bytes::from_static(b"SET"),
        key.clone(),
        value.clone(),
    ]);
    out.extend_from_slice(&command.to_bytes());
}

fn encode_command(args: &[Bytes]) -> Bytes {
    Reply::array_of_bulks(args.to_vec()).to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_triggers_once_past_min_size_and_growth_percentage() {
        let rewriter = Rewriter::new("x.aof".to_string(), 16, 1000, 100);
        assert!(!rewriter.should_rewrite(500));
        assert!(rewriter.should_rewrite(1500));
        rewriter.set_last_rewrite_size(1500);
        assert!(!rewriter.should_rewrite(2000));
        assert!(rewriter.should_rewrite(3001));
    }

    #[test]
    fn try_lock_is_exclusive() {
        let rewriter = Rewriter::new("x.aof".to_string(), 16, 1000, 100);
        assert!(rewriter.try_lock());
        assert!(!rewriter.try_lock());
    }

    #[test]
    fn dump_skips_select_for_empty_databases() {
        use crate::command::Command;
        use crate::connection::Connection;

        let engine = Engine::new(16);
        let mut conn = Connection::synthetic(None);
        engine.exec(
            &mut conn,
            &Command::new(vec![
                Bytes::from_static(b"SET"),
                Bytes::from_static(b"k"),
                Bytes::from_static(b"v"),
            ]),
        );

        let mut file = tempfile::tempfile().expect("tempfile");
        dump_database(&mut file, &engine, 16).expect("dump");

        use std::io::{Read, Seek, SeekFrom};
        file.seek(SeekFrom::Start(0)).expect("seek");
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).expect("read");
        let text = String::from_utf8_lossy(&contents);

        assert_eq!(text.matches("SELECT").count(), 1);
        assert!(text.contains("SET"));
    }
}
