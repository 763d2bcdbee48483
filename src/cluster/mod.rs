//! Optional multi-node clustering (§4.I).
//!
//! Grounded on `cluster_database/*.go`: a consistent-hash ring picks
//! the owning peer for a key, a pipelined peer client relays commands
//! to it, and a small per-command table decides which commands route
//! by key, which broadcast, and which always execute locally.

mod peer;
mod ring;
mod router;

pub use ring::HashRing;
pub use router::ClusterRouter;
