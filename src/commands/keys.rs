//! Key-space commands (§4.D), grounded on `database/keys.go`.

use std::collections::HashMap;

use bytes::Bytes;

use crate::command::{CommandSpec, Executor};
use crate::db::Database;
use crate::pattern::Pattern;
use crate::reply::Reply;

pub fn register(table: &mut HashMap<&'static str, CommandSpec>) {
    table.insert(
        "del",
        CommandSpec {
            arity: -2,
            executor: Executor::Db(exec_del),
        },
    );
    table.insert(
        "exists",
        CommandSpec {
            arity: -2,
            executor: Executor::Db(exec_exists),
        },
    );
    table.insert(
        "flushdb",
        CommandSpec {
            arity: -1,
            executor: Executor::Db(exec_flushdb),
        },
    );
    table.insert(
        "type",
        CommandSpec {
            arity: 2,
            executor: Executor::Db(exec_type),
        },
    );
    table.insert(
        "rename",
        CommandSpec {
            arity: 3,
            executor: Executor::Db(exec_rename),
        },
    );
    table.insert(
        "renamenx",
        CommandSpec {
            arity: 3,
            executor: Executor::Db(exec_rename_nx),
        },
    );
    table.insert(
        "keys",
        CommandSpec {
            arity: 2,
            executor: Executor::Db(exec_keys),
        },
    );
}

fn full_command(name: &str, args: &[Bytes]) -> Vec<Bytes> {
    let mut out = Vec::with_capacity(args.len() + 1);
    out.push(Bytes::from(name.to_ascii_uppercase()));
    out.extend_from_slice(args);
    out
}

/// DEL key [key ...]
///
/// The AOF record carries the full original key list rather than only
/// the keys actually deleted — resolving the open question the same
/// way the Go original's `execDel` does (see DESIGN.md).
fn exec_del(db: &Database, args: &[Bytes]) -> Reply {
    let deleted: u64 = args.iter().map(|k| db.dict().delete(k)).sum();
    if deleted > 0 {
        db.append_aof(full_command("DEL", args));
    }
    Reply::Integer(deleted as i64)
}

/// EXISTS key [key ...]
fn exec_exists(db: &Database, args: &[Bytes]) -> Reply {
    let count = args.iter().filter(|k| db.dict().get(k).is_some()).count();
    Reply::Integer(count as i64)
}

/// FLUSHDB
fn exec_flushdb(db: &Database, args: &[Bytes]) -> Reply {
    db.dict().clear();
    db.append_aof(full_command("FLUSHDB", args));
    Reply::ok()
}

/// TYPE key
fn exec_type(db: &Database, args: &[Bytes]) -> Reply {
    match db.dict().get(&args[0]) {
        None => Reply::status("none"),
        Some(entity) => Reply::status(entity.data.type_name()),
    }
}

/// RENAME key new_key
fn exec_rename(db: &Database, args: &[Bytes]) -> Reply {
    let Some(entity) = db.dict().get(&args[0]) else {
        return Reply::error("no such key");
    };
    db.dict().set(args[1].clone(), entity);
    db.dict().delete(&args[0]);
    db.append_aof(full_command("RENAME", args));
    Reply::ok()
}

/// RENAMENX key new_key
fn exec_rename_nx(db: &Database, args: &[Bytes]) -> Reply {
    if db.dict().get(&args[1]).is_some() {
        return Reply::Integer(0);
    }
    let Some(entity) = db.dict().get(&args[0]) else {
        return Reply::error("no such key");
    };
    db.dict().set(args[1].clone(), entity);
    db.dict().delete(&args[0]);
    db.append_aof(full_command("RENAMENX", args));
    Reply::Integer(1)
}

/// KEYS pattern
fn exec_keys(db: &Database, args: &[Bytes]) -> Reply {
    let pattern_str = match std::str::from_utf8(&args[0]) {
        Ok(s) => s,
        Err(_) => return Reply::standard_error("pattern is not valid UTF-8"),
    };
    let pattern = Pattern::compile(pattern_str);
    let mut matched = Vec::new();
    db.dict().for_each(|key, _, _| {
        if pattern.matches(key) {
            matched.push(key.clone());
        }
        true
    });
    Reply::array_of_bulks(matched)
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
    fn del_counts_only_keys_that_existed() {
        let db = Database::new(0);
        exec(&db, "SET", &["a", "1"]);
        assert_eq!(exec(&db, "DEL", &["a", "b"]), Reply::Integer(1));
        assert_eq!(db.dict().length(), 0);
    }

    #[test]
    fn exists_counts_present_keys() {
        let db = Database::new(0);
        exec(&db, "SET", &["a", "1"]);
        assert_eq!(exec(&db, "EXISTS", &["a", "b", "a"]), Reply::Integer(2));
    }

    #[test]
    fn flushdb_clears_the_database() {
        let db = Database::new(0);
        exec(&db, "SET", &["a", "1"]);
        assert_eq!(exec(&db, "FLUSHDB", &[]), Reply::ok());
        assert_eq!(db.dict().length(), 0);
    }

    #[test]
    fn type_reports_string_or_none() {
        let db = Database::new(0);
        exec(&db, "SET", &["a", "1"]);
        assert_eq!(exec(&db, "TYPE", &["a"]), Reply::status("string"));
        assert_eq!(exec(&db, "TYPE", &["missing"]), Reply::status("none"));
    }

    #[test]
    fn rename_moves_the_value() {
        let db = Database::new(0);
        exec(&db, "SET", &["a", "1"]);
        assert_eq!(exec(&db, "RENAME", &["a", "b"]), Reply::ok());
        assert_eq!(exec(&db, "GET", &["b"]), Reply::bulk(Bytes::from_static(b"1")));
        assert_eq!(exec(&db, "GET", &["a"]), Reply::null_bulk());
    }

    #[test]
    fn rename_missing_source_is_an_error() {
        let db = Database::new(0);
        let reply = exec(&db, "RENAME", &["missing", "dst"]);
        assert_eq!(reply, Reply::error("no such key"));
        assert_eq!(reply.to_bytes(), Bytes::from_static(b"-no such key\r\n"));
    }

    #[test]
    fn renamenx_refuses_existing_destination() {
        let db = Database::new(0);
        exec(&db, "SET", &["a", "1"]);
        exec(&db, "SET", &["b", "2"]);
        assert_eq!(exec(&db, "RENAMENX", &["a", "b"]), Reply::Integer(0));
    }

    #[test]
    fn keys_matches_glob_pattern() {
        let db = Database::new(0);
        exec(&db, "SET", &["user:1", "a"]);
        exec(&db, "SET", &["user:2", "b"]);
        exec(&db, "SET", &["other", "c"]);
        let reply = exec(&db, "KEYS", &["user:*"]);
        match reply {
            Reply::Array(Some(items)) => assert_eq!(items.len(), 2),
            other => panic!("expected array, got {other:?}"),
        }
    }
}
