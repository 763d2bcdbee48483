//! Multiplexes N logical databases and owns connection-level command
//! interception (§4.E).
//!
//! Grounded on `database/standalone_database.go`'s `Exec`: the
//! authentication gate and `SELECT` interception happen here, one
//! layer above the per-database command table, because they only
//! touch connection state. Panics from an executor are caught at this
//! boundary and logged, matching the Go original's `recover()` defer.

use std::panic::AssertUnwindSafe;

use crate::command::Command;
use crate::connection::Connection;
use crate::db::Database;
use crate::reply::Reply;

pub struct Engine {
    databases: Vec<Database>,
}

impl Engine {
    pub fn new(num_databases: usize) -> Engine {
        let databases = (0..num_databases.max(1)).map(Database::new).collect();
        Engine { databases }
    }

    pub fn num_databases(&self) -> usize {
        self.databases.len()
    }

    pub fn database(&self, index: usize) -> Option<&Database> {
        self.databases.get(index)
    }

    /// Dispatches one command. `SELECT` is handled here; everything
    /// else is delegated to the connection's currently selected
    /// database.
    pub fn exec(&self, conn: &mut Connection, command: &Command) -> Reply {
        if command.is_empty() {
            return Reply::standard_error("empty command");
        }
        let name = command.name_lower();

        if name != "auth" && !conn.is_authenticated() {
            return Reply::error("NOAUTH Authentication required");
        }

        if name == "select" {
            return self.exec_select(conn, command);
        }

        let db_index = conn.db_index();
        let Some(db) = self.databases.get(db_index) else {
            tracing::error!(db_index, "selected db index out of range");
            return Reply::standard_error("DB index is out of range");
        };

        match std::panic::catch_unwind(AssertUnwindSafe(|| db.exec(conn, command))) {
            Ok(reply) => reply,
            Err(panic) => {
                tracing::error!(?panic, "command executor panicked");
                Reply::standard_error("unknown")
            }
        }
    }

    fn exec_select(&self, conn: &mut Connection, command: &Command) -> Reply {
        if command.len() != 2 {
            return Reply::wrong_arity("select");
        }
        let Ok(text) = std::str::from_utf8(&command.tail()[0]) else {
            return Reply::standard_error("invalid DB index");
        };
        let Ok(index) = text.parse::<usize>() else {
            return Reply::standard_error("invalid DB index");
        };
        if index >= self.databases.len() {
            return Reply::standard_error("DB index is out of range");
        }
        conn.select_db(index);
        Reply::ok()
    }

    /// Delegates to the given database's dictionary traversal. An
    /// out-of-range index is logged and ignored, matching
    /// `StandaloneDatabase.ForEach`.
    pub fn for_each(
        &self,
        db_index: usize,
        mut callback: impl FnMut(&bytes::Bytes, &crate::store::Entity, Option<i64>) -> bool,
    ) {
        let Some(db) = self.databases.get(db_index) else {
            tracing::error!(db_index, "invalid db index");
            return;
        };
        db.dict().for_each(|k, v, expire_at| callback(k, v, expire_at));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn cmd(parts: &[&str]) -> Command {
        Command::new(parts.iter().map(|s| Bytes::copy_from_slice(s.as_bytes())).collect())
    }

    #[test]
    fn select_switches_db_index() {
        let engine = Engine::new(4);
        let mut conn = Connection::synthetic(None);
        assert_eq!(engine.exec(&mut conn, &cmd(&["SELECT", "2"])), Reply::ok());
        assert_eq!(conn.db_index(), 2);
    }

    #[test]
    fn select_out_of_range_is_an_error() {
        let engine = Engine::new(4);
        let mut conn = Connection::synthetic(None);
        assert!(engine.exec(&mut conn, &cmd(&["SELECT", "99"])).is_error());
    }

    #[test]
    fn noauth_blocks_commands_until_authenticated() {
        let engine = Engine::new(1);
        let mut conn = Connection::new_for_test_with_password("sekret");
        let denied = engine.exec(&mut conn, &cmd(&["GET", "k"]));
        assert!(denied.is_error());
        assert_eq!(engine.exec(&mut conn, &cmd(&["AUTH", "sekret"])), Reply::ok());
        assert_eq!(engine.exec(&mut conn, &cmd(&["GET", "k"])), Reply::null_bulk());
    }

    #[test]
    fn commands_route_to_the_selected_database() {
        let engine = Engine::new(2);
        let mut conn = Connection::synthetic(None);
        engine.exec(&mut conn, &cmd(&["SET", "k", "v"]));
        engine.exec(&mut conn, &cmd(&["SELECT", "1"]));
        assert_eq!(engine.exec(&mut conn, &cmd(&["GET", "k"])), Reply::null_bulk());
        engine.exec(&mut conn, &cmd(&["SELECT", "0"]));
        assert_eq!(
            engine.exec(&mut conn, &cmd(&["GET", "k"])),
            Reply::bulk(Bytes::from_static(b"v"))
        );
    }
}
