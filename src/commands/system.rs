//! Connection-level system commands (§4.D), grounded on
//! `database/system_command.go` and `database/ping.go`.
//!
//! `SELECT` is deliberately absent here: it is intercepted one layer
//! up, by [`crate::engine::Engine`], since it only touches connection
//! state and never reaches a specific database (§4.E).

use std::collections::HashMap;

use bytes::Bytes;

use crate::command::{CommandSpec, Executor};
use crate::connection::Connection;
use crate::db::Database;
use crate::reply::Reply;

pub fn register(table: &mut HashMap<&'static str, CommandSpec>) {
    table.insert(
        "ping",
        CommandSpec {
            arity: 1,
            executor: Executor::Db(exec_ping),
        },
    );
    table.insert(
        "auth",
        CommandSpec {
            arity: -2,
            executor: Executor::Conn(exec_auth),
        },
    );
}

/// PING
fn exec_ping(_db: &Database, _args: &[Bytes]) -> Reply {
    Reply::pong()
}

/// AUTH password
fn exec_auth(conn: &mut Connection, args: &[Bytes]) -> Reply {
    if args.len() != 1 {
        return Reply::standard_error("wrong number of arguments for 'auth' command");
    }
    let Some(expected) = conn.require_pass() else {
        return Reply::standard_error("Client sent AUTH, but no password is set");
    };
    let expected = expected.to_string();
    let password = String::from_utf8_lossy(&args[0]).into_owned();
    let matches = expected == password;
    conn.set_password(password);
    if !matches {
        return Reply::standard_error("invalid password");
    }
    Reply::ok()
}
