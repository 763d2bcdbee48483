//! String-value commands (§4.D), grounded on `database/string.go`.

use std::collections::HashMap;

use bytes::Bytes;

use crate::command::{CommandSpec, Executor};
use crate::db::Database;
use crate::reply::Reply;
use crate::store::Entity;

pub fn register(table: &mut HashMap<&'static str, CommandSpec>) {
    table.insert(
        "get",
        CommandSpec {
            arity: 2,
            executor: Executor::Db(exec_get),
        },
    );
    table.insert(
        "set",
        CommandSpec {
            arity: 3,
            executor: Executor::Db(exec_set),
        },
    );
    table.insert(
        "setnx",
        CommandSpec {
            arity: 3,
            executor: Executor::Db(exec_setnx),
        },
    );
    table.insert(
        "getset",
        CommandSpec {
            arity: 3,
            executor: Executor::Db(exec_getset),
        },
    );
    table.insert(
        "getdel",
        CommandSpec {
            arity: 2,
            executor: Executor::Db(exec_getdel),
        },
    );
    table.insert(
        "strlen",
        CommandSpec {
            arity: 2,
            executor: Executor::Db(exec_strlen),
        },
    );
}

fn full_command(name: &str, args: &[Bytes]) -> Vec<Bytes> {
    let mut out = Vec::with_capacity(args.len() + 1);
    out.push(Bytes::from(name.to_ascii_uppercase()));
    out.extend_from_slice(args);
    out
}

/// GET key
fn exec_get(db: &Database, args: &[Bytes]) -> Reply {
    match db.dict().get(&args[0]) {
        None => Reply::null_bulk(),
        Some(entity) => bulk_of(&entity),
    }
}

/// SET key value
fn exec_set(db: &Database, args: &[Bytes]) -> Reply {
    db.dict().set(args[0].clone(), Entity::of_bytes(args[1].clone()));
    db.append_aof(full_command("SET", args));
    Reply::ok()
}

/// SETNX key value
fn exec_setnx(db: &Database, args: &[Bytes]) -> Reply {
    let inserted = db
        .dict()
        .set_if_absent(args[0].clone(), Entity::of_bytes(args[1].clone()));
    db.append_aof(full_command("SETNX", args));
    Reply::Integer(inserted as i64)
}

/// GETSET key value
fn exec_getset(db: &Database, args: &[Bytes]) -> Reply {
    let old = db.dict().get(&args[0]);
    db.dict().set(args[0].clone(), Entity::of_bytes(args[1].clone()));
    let Some(old) = old else {
        return Reply::null_bulk();
    };
    db.append_aof(full_command("GETSET", args));
    bulk_of(&old)
}

/// GETDEL key
fn exec_getdel(db: &Database, args: &[Bytes]) -> Reply {
    match db.dict().get_and_delete(&args[0]) {
        None => Reply::null_bulk(),
        Some(old) => {
            db.append_aof(full_command("GETDEL", args));
            bulk_of(&old)
        }
    }
}

/// STRLEN key
fn exec_strlen(db: &Database, args: &[Bytes]) -> Reply {
    match db.dict().get(&args[0]) {
        None => Reply::null_bulk(),
        Some(entity) => {
            let crate::store::Value::Bytes(bytes) = &entity.data;
            Reply::Integer(bytes.len() as i64)
        }
    }
}

fn bulk_of(entity: &Entity) -> Reply {
    let crate::store::Value::Bytes(bytes) = &entity.data;
    Reply::bulk(bytes.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;

    fn exec(db: &Database, name: &str, args: &[&str]) -> Reply {
        let mut conn = Connection::synthetic(None);
        let mut full = vec![Bytes::copy_from_slice(name.as_bytes())];
        full.extend(args.iter().map(|s| Bytes::copy_from_slice(s.as_bytes())));
        db.exec(&mut conn, &crate::command::Command::new(full))
    }

    #[test]
    fn get_missing_key_is_null() {
        let db = Database::new(0);
        assert_eq!(exec(&db, "GET", &["nope"]), Reply::null_bulk());
    }

    #[test]
    fn setnx_only_inserts_once() {
        let db = Database::new(0);
        assert_eq!(exec(&db, "SETNX", &["k", "v1"]), Reply::Integer(1));
        assert_eq!(exec(&db, "SETNX", &["k", "v2"]), Reply::Integer(0));
        assert_eq!(exec(&db, "GET", &["k"]), Reply::bulk(Bytes::from_static(b"v1")));
    }

    #[test]
    fn getset_returns_old_value_and_replaces() {
        let db = Database::new(0);
        assert_eq!(exec(&db, "SET", &["k", "old"]), Reply::ok());
        assert_eq!(
            exec(&db, "GETSET", &["k", "new"]),
            Reply::bulk(Bytes::from_static(b"old"))
        );
        assert_eq!(exec(&db, "GET", &["k"]), Reply::bulk(Bytes::from_static(b"new")));
    }

    #[test]
    fn getdel_removes_key() {
        let db = Database::new(0);
        exec(&db, "SET", &["k", "v"]);
        assert_eq!(exec(&db, "GETDEL", &["k"]), Reply::bulk(Bytes::from_static(b"v")));
        assert_eq!(exec(&db, "GET", &["k"]), Reply::null_bulk());
    }

    #[test]
    fn strlen_reports_byte_length() {
        let db = Database::new(0);
        exec(&db, "SET", &["k", "hello"]);
        assert_eq!(exec(&db, "STRLEN", &["k"]), Reply::Integer(5));
        assert_eq!(exec(&db, "STRLEN", &["nope"]), Reply::null_bulk());
    }
}
