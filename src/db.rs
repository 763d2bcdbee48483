//! A single logical database: dictionary plus command dispatch (§4.D).
//!
//! Grounded on `database/dict_entity.go`'s `Exec`: look up the command,
//! validate arity, and either call a connection-scoped executor or a
//! plain data executor. AOF appends happen inside the individual
//! executor functions (`execSet` etc. call `addAofFunc` directly),
//! which this crate mirrors via [`Database::append_aof`].

use std::sync::{Arc, OnceLock};

use bytes::Bytes;

use crate::command::{self, Command, Executor};
use crate::connection::Connection;
use crate::reply::Reply;
use crate::store::ShardedDict;

/// Called with `(db_index, command_args)` once a mutating command
/// succeeds. Wired to the AOF handler after startup replay completes
/// (the two-phase engine/AOF initialization, §9).
pub type AofSink = Arc<dyn Fn(usize, Vec<Bytes>) + Send + Sync>;

pub struct Database {
    index: usize,
    dict: ShardedDict,
    aof_sink: OnceLock<AofSink>,
}

impl Database {
    pub fn new(index: usize) -> Database {
        Database {
            index,
            dict: ShardedDict::new(),
            aof_sink: OnceLock::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn dict(&self) -> &ShardedDict {
        &self.dict
    }

    /// Wires the AOF sink. Only the first call takes effect, matching
    /// the "configured once at startup, read-only thereafter" design.
    pub fn set_aof_sink(&self, sink: AofSink) {
        let _ = self.aof_sink.set(sink);
    }

    /// Records a mutating command's canonical form to the AOF, if a
    /// sink has been wired.
    pub fn append_aof(&self, args: Vec<Bytes>) {
        if let Some(sink) = self.aof_sink.get() {
            sink(self.index, args);
        }
    }

    /// Dispatches one command against this database's command table.
    pub fn exec(&self, conn: &mut Connection, command: &Command) -> Reply {
        let name = command.name_lower();
        let Some(spec) = command::lookup(&name) else {
            return Reply::unknown_command(&name);
        };
        if !command::check_arity(spec, command) {
            return Reply::wrong_arity(&name);
        }
        match spec.executor {
            Executor::Db(f) => f(self, command.tail()),
            Executor::Conn(f) => f(conn, command.tail()),
        }
    }
}
