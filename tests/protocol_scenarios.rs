//! Integration tests for the six literal scenarios.

use std::sync::Arc;

use bytes::Bytes;
use ferrikv::aof::AofHandle;
use ferrikv::command::Command;
use ferrikv::config::Config;
use ferrikv::connection::Connection;
use ferrikv::engine::Engine;
use ferrikv::reply::Reply;

fn cmd(parts: &[&str]) -> Command {
    Command::new(parts.iter().map(|s| Bytes::copy_from_slice(s.as_bytes())).collect())
}

/// Scenario 1: basic set/get.
#[test]
fn basic_set_then_get() {
    let engine = Engine::new(1);
    let mut conn = Connection::synthetic(None);

    assert_eq!(engine.exec(&mut conn, &cmd(&["SET", "k", "v"])), Reply::ok());
    assert_eq!(
        engine.exec(&mut conn, &cmd(&["GET", "k"])),
        Reply::bulk(Bytes::from_static(b"v"))
    );
}

/// Scenario 2: missing key returns a null bulk string.
#[test]
fn missing_key_returns_null_bulk() {
    let engine = Engine::new(1);
    let mut conn = Connection::synthetic(None);

    assert_eq!(engine.exec(&mut conn, &cmd(&["GET", "nope"])), Reply::null_bulk());
}

/// Scenario 3: an arity violation reports the exact RESP error text.
#[test]
fn arity_violation_reports_standard_error() {
    let engine = Engine::new(1);
    let mut conn = Connection::synthetic(None);

    let reply = engine.exec(&mut conn, &cmd(&["SET"]));
    assert_eq!(
        reply,
        Reply::error("ERR wrong number of arguments for 'set' command")
    );
    assert_eq!(
        reply.to_bytes(),
        Bytes::from_static(b"-ERR wrong number of arguments for 'set' command\r\n")
    );
}

/// Scenario 4: commands are rejected until AUTH succeeds.
#[test]
fn auth_gates_every_command_until_authenticated() {
    let engine = Engine::new(1);
    let mut conn = Connection::new_for_test_with_password("sekret");

    assert_eq!(
        engine.exec(&mut conn, &cmd(&["GET", "k"])),
        Reply::error("NOAUTH Authentication required")
    );
    assert_eq!(engine.exec(&mut conn, &cmd(&["AUTH", "sekret"])), Reply::ok());
    assert_eq!(engine.exec(&mut conn, &cmd(&["GET", "k"])), Reply::null_bulk());
}

/// Scenario 6: replaying a fixed AOF byte stream reproduces its final
/// state exactly — `SET a 1` followed by `DEL a` leaves nothing behind.
#[tokio::test]
async fn aof_replay_is_deterministic() {
    let file = tempfile::NamedTempFile::new().expect("tempfile");
    std::fs::write(
        file.path(),
        b"*2\r\n$6\r\nSELECT\r\n$1\r\n0\r\n\
          *3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n\
          *2\r\n$3\r\nDEL\r\n$1\r\na\r\n",
    )
    .expect("write aof fixture");

    let engine = Arc::new(Engine::new(1));
    let mut config = Config::default();
    config.append_only = true;
    config.append_filename = file.path().to_string_lossy().into_owned();

    let aof = AofHandle::open(&config, Arc::clone(&engine)).await.expect("open aof");

    let mut conn = Connection::synthetic(None);
    assert_eq!(engine.exec(&mut conn, &cmd(&["GET", "a"])), Reply::null_bulk());
    assert_eq!(engine.exec(&mut conn, &cmd(&["KEYS", "*"])), Reply::empty_array());

    aof.close().await;
}
