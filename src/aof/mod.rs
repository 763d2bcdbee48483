//! Append-only log persistence pipeline (§4.F).
//!
//! Grounded line-for-line on `aof/aof.go` and `aof/aof_rewriter.go`:
//! a bounded queue feeding a single writer task, a periodic ticker for
//! the `everysec` fsync policy, and a background rewrite that
//! compacts the file under a cooperative pause.

mod handler;
mod rewrite;

pub use handler::AofHandle;
