//! The server binary: load config, replay the AOF, wire the engine and
//! (optionally) the cluster router, and serve until a shutdown signal
//! arrives (§6.A).
//!
//! `clap`-free by design: the CLI surface is two flags, so a plain
//! `std::env::args()` scan is simpler than pulling in a dependency the
//! rest of this stack has no other use for.

use std::sync::Arc;

use ferrikv::aof::AofHandle;
use ferrikv::cluster::ClusterRouter;
use ferrikv::config::Config;
use ferrikv::engine::Engine;
use ferrikv::handler::RespHandler;
use ferrikv::server::listen_and_serve;

const DEFAULT_CONFIG_PATH: &str = "redis.conf";

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Some(config_path) = parse_args() else {
        return Ok(());
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(config_path))
}

/// Returns `Some(config_path)` to continue startup, or `None` if
/// `--help` was requested and already printed.
fn parse_args() -> Option<String> {
    let mut config_path = DEFAULT_CONFIG_PATH.to_string();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                print_help();
                return None;
            }
            "--config" => {
                config_path = args.next().unwrap_or_else(|| {
                    eprintln!("--config requires a path argument");
                    std::process::exit(2);
                });
            }
            other => {
                eprintln!("unrecognized argument: {other}");
                print_help();
                std::process::exit(2);
            }
        }
    }
    Some(config_path)
}

fn print_help() {
    println!(
        "ferrikv-server [--config <path>]\n\n\
         Options:\n  \
         --config <path>  Path to a redis.conf-style config file (default: {DEFAULT_CONFIG_PATH})\n  \
         --help, -h       Print this help text"
    );
}

async fn run(config_path: String) -> color_eyre::Result<()> {
    let config = if std::path::Path::new(&config_path).exists() {
        Config::from_file(&config_path)?
    } else {
        tracing::info!(config_path, "no config file found, using defaults");
        Config::default()
    };

    let engine = Arc::new(Engine::new(config.databases));

    let aof = if config.append_only {
        let handle = AofHandle::open(&config, Arc::clone(&engine)).await?;
        let sink = handle.sink();
        for index in 0..engine.num_databases() {
            if let Some(db) = engine.database(index) {
                db.set_aof_sink(Arc::clone(&sink));
            }
        }
        Some(handle)
    } else {
        None
    };

    let handler = if config.this_node.is_some() {
        let router = ClusterRouter::new(&config, Arc::clone(&engine)).await?;
        Arc::new(RespHandler::with_cluster(config.requirepass.clone(), router))
    } else {
        Arc::new(RespHandler::new(Arc::clone(&engine), config.requirepass.clone()))
    };

    listen_and_serve(&config, handler).await?;

    if let Some(aof) = aof {
        aof.close().await;
    }
    Ok(())
}
