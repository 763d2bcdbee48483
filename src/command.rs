//! Commands and the process-wide dispatch registry (§3, §4.D).
//!
//! Grounded on `database/command.go`: one table mapping a lower-cased
//! command name to an arity and an executor. The original builds this
//! table at package-init time via per-file `init()` registration
//! calls; Rust has no load-time init, so the whole table is built
//! eagerly behind a `LazyLock`, the same shape
//! `zero_mysql::buffer_pool::GLOBAL_BUFFER_POOL` already uses for its
//! process-wide pool.

use std::collections::HashMap;
use std::sync::LazyLock;

use bytes::Bytes;

use crate::connection::Connection;
use crate::db::Database;
use crate::reply::Reply;

/// An ordered sequence of byte-string arguments; `args[0]` is the
/// command name (compared case-insensitively).
#[derive(Debug, Clone)]
pub struct Command(Vec<Bytes>);

impl Command {
    pub fn new(args: Vec<Bytes>) -> Command {
        Command(args)
    }

    pub fn name(&self) -> &[u8] {
        self.0.first().map_or(&[], |b| b.as_ref())
    }

    pub fn name_lower(&self) -> String {
        String::from_utf8_lossy(self.name()).to_ascii_lowercase()
    }

    /// The arguments following the command name.
    pub fn tail(&self) -> &[Bytes] {
        &self.0[1..]
    }

    pub fn all(&self) -> &[Bytes] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Bytes>> for Command {
    fn from(args: Vec<Bytes>) -> Self {
        Command::new(args)
    }
}

impl TryFrom<crate::reply::Reply> for Command {
    type Error = &'static str;

    /// Converts a parsed `*`-array of bulk strings into a command.
    /// Any other reply shape (a non-array, or an array with a non-bulk
    /// element) is not a valid request line.
    fn try_from(reply: crate::reply::Reply) -> Result<Command, &'static str> {
        let crate::reply::Reply::Array(Some(items)) = reply else {
            return Err("expected a command array");
        };
        let args: Option<Vec<Bytes>> = items
            .into_iter()
            .map(|item| match item {
                crate::reply::Reply::Bulk(Some(b)) => Some(b),
                _ => None,
            })
            .collect();
        args.map(Command::new).ok_or("non-bulk argument in command array")
    }
}

/// A data-command executor: `(db, args) -> reply`.
pub type DbExecutor = fn(&Database, &[Bytes]) -> Reply;

/// A connection-command executor: `(connection, args) -> reply`, for
/// commands that mutate connection state (AUTH, SELECT).
pub type ConnExecutor = fn(&mut Connection, &[Bytes]) -> Reply;

#[derive(Clone, Copy)]
pub enum Executor {
    Db(DbExecutor),
    Conn(ConnExecutor),
}

pub struct CommandSpec {
    /// Positive N: exactly N args including the command name.
    /// Negative -N: at least N args including the command name.
    pub arity: i32,
    pub executor: Executor,
}

impl CommandSpec {
    fn matches_arity(&self, full_len: usize) -> bool {
        if self.arity < 0 {
            full_len >= self.arity.unsigned_abs() as usize
        } else {
            full_len == self.arity as usize
        }
    }
}

pub static COMMAND_TABLE: LazyLock<HashMap<&'static str, CommandSpec>> = LazyLock::new(|| {
    let mut table = HashMap::new();
    crate::commands::string::register(&mut table);
    crate::commands::keys::register(&mut table);
    crate::commands::system::register(&mut table);
    table
});

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMAND_TABLE.get(name)
}

pub fn check_arity(spec: &CommandSpec, command: &Command) -> bool {
    spec.matches_arity(command.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_arity_requires_exact_length() {
        let spec = CommandSpec {
            arity: 3,
            executor: Executor::Db(|_, _| Reply::ok()),
        };
        assert!(spec.matches_arity(3));
        assert!(!spec.matches_arity(2));
        assert!(!spec.matches_arity(4));
    }

    #[test]
    fn negative_arity_is_a_minimum() {
        let spec = CommandSpec {
            arity: -2,
            executor: Executor::Db(|_, _| Reply::ok()),
        };
        assert!(!spec.matches_arity(1));
        assert!(spec.matches_arity(2));
        assert!(spec.matches_arity(10));
    }

    #[test]
    fn command_name_is_lowered() {
        let cmd = Command::new(vec![Bytes::from_static(b"SeT"), Bytes::from_static(b"k")]);
        assert_eq!(cmd.name_lower(), "set");
        assert_eq!(cmd.tail().len(), 1);
    }
}
