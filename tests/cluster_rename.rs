//! Scenario 5: renaming a key across cluster peers that hash to
//! different nodes performs `GETDEL src` + `SET dst oldval` under the
//! hood, and reports "no such key" when the source is absent.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ferrikv::cluster::{ClusterRouter, HashRing};
use ferrikv::config::Config;
use ferrikv::engine::Engine;
use ferrikv::handler::RespHandler;
use ferrikv::protocol::{ParseItem, Parser};
use ferrikv::reply::Reply;
use ferrikv::server::listen_and_serve;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const NODE_A: &str = "127.0.0.1:18391";
const NODE_B: &str = "127.0.0.1:18392";

fn cluster_config(bind_addr: &str) -> Config {
    let (bind, port) = bind_addr.rsplit_once(':').expect("host:port");
    let mut config = Config::default();
    config.bind = bind.to_string();
    config.port = port.parse().expect("port");
    config.this_node = Some(bind_addr.to_string());
    config.peers = vec![NODE_A.to_string(), NODE_B.to_string()];
    config
}

async fn spawn_node(bind_addr: &str) -> tokio::task::JoinHandle<()> {
    let config = cluster_config(bind_addr);
    let engine = Arc::new(Engine::new(1));
    let router = ClusterRouter::new(&config, engine).await.expect("cluster router");
    let handler = Arc::new(RespHandler::with_cluster(None, router));
    tokio::spawn(async move {
        let _ = listen_and_serve(&config, handler).await;
    })
}

/// Finds a (src, dst) key pair that the ring assigns to different
/// nodes, so the rename exercises the cross-peer path rather than the
/// same-peer relay.
fn cross_peer_key_pair() -> (String, String) {
    let mut ring = HashRing::new();
    ring.add_node(NODE_A);
    ring.add_node(NODE_B);
    for i in 0..1000 {
        let src = format!("src-{i}");
        let dst = format!("dst-{i}");
        if ring.get_node(src.as_bytes()) != ring.get_node(dst.as_bytes()) {
            return (src, dst);
        }
    }
    panic!("no cross-peer key pair found in range");
}

#[tokio::test]
async fn rename_across_cluster_peers_relays_getdel_then_set() {
    let (src, dst) = cross_peer_key_pair();

    let node_a = spawn_node(NODE_A).await;
    let node_b = spawn_node(NODE_B).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut client = TcpStream::connect(NODE_A).await.expect("connect to node a");
    let (read_half, mut write_half) = client.split();
    let mut parser = Parser::new(BufReader::new(read_half));

    assert_eq!(
        send_via(&mut write_half, &mut parser, &["SET", &src, "oldval"]).await,
        Reply::ok()
    );
    assert_eq!(
        send_via(&mut write_half, &mut parser, &["RENAME", &src, &dst]).await,
        Reply::ok()
    );
    assert_eq!(
        send_via(&mut write_half, &mut parser, &["GET", &dst]).await,
        Reply::bulk(Bytes::from_static(b"oldval"))
    );
    assert_eq!(
        send_via(&mut write_half, &mut parser, &["GET", &src]).await,
        Reply::null_bulk()
    );

    let (other_src, _) = cross_peer_key_pair();
    let missing_src = format!("missing-{other_src}");
    let reply = send_via(&mut write_half, &mut parser, &["RENAME", &missing_src, "some-dst"]).await;
    assert_eq!(reply, Reply::error("no such key"));
    assert_eq!(reply.to_bytes(), Bytes::from_static(b"-no such key\r\n"));

    node_a.abort();
    node_b.abort();
}

async fn send_via(
    write_half: &mut tokio::net::tcp::WriteHalf<'_>,
    parser: &mut Parser<BufReader<tokio::net::tcp::ReadHalf<'_>>>,
    args: &[&str],
) -> Reply {
    let encoded =
        Reply::array_of_bulks(args.iter().map(|s| Bytes::copy_from_slice(s.as_bytes())).collect()).to_bytes();
    write_half.write_all(&encoded).await.expect("write command");
    match parser.next().await {
        Some(ParseItem::Reply(reply)) => reply,
        Some(ParseItem::Error(err)) => panic!("protocol error: {err}"),
        None => panic!("connection closed unexpectedly"),
    }
}
