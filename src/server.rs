//! TCP acceptor with signal-driven graceful shutdown (§4.G).
//!
//! Grounded on `tcp/server.go`'s `ListenAndServeWithSignal`: bind,
//! accept in a loop, hand each connection to the handler on its own
//! task, and on SIGHUP/SIGTERM/SIGQUIT/SIGINT stop accepting and drain
//! every in-flight connection before returning. `maxclients` is
//! enforced with a counting semaphore the way `std_semaphore::Semaphore`
//! is already used elsewhere in this crate's dependency stack.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::handler::RespHandler;

/// Binds and serves until a shutdown signal is received, then drains
/// in-flight connections before returning. Mirrors
/// `ListenAndServeWithSignal` + `ListenAndServe`.
pub async fn listen_and_serve(config: &Config, handler: Arc<RespHandler>) -> crate::error::Result<()> {
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr, "listening");

    let max_clients = config.maxclients;
    let semaphore = max_clients.map(|n| Arc::new(std_semaphore::Semaphore::new(n as isize)));

    let mut tasks = JoinSet::new();
    let mut shutdown = shutdown_signal();

    loop {
        tokio::select! {
            () = &mut shutdown => {
                tracing::info!("shutdown signal received, closing listener");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::error!(%err, "accept failed");
                        continue;
                    }
                };
                // Acquiring blocks (on a blocking-pool thread, not the
                // reactor) until a slot frees, so a saturated server
                // backpressures `accept` itself rather than piling up
                // unbounded connection tasks.
                if let Some(sem) = &semaphore {
                    let sem = Arc::clone(sem);
                    let _ = tokio::task::spawn_blocking(move || sem.acquire()).await;
                }
                tracing::info!(%peer, "accepted connection");
                let handler = Arc::clone(&handler);
                let release = semaphore.clone();
                tasks.spawn(async move {
                    handler.handle(stream, peer).await;
                    if let Some(sem) = release {
                        sem.release();
                    }
                });
            }
        }
    }

    handler.close().await;
    while tasks.join_next().await.is_some() {}
    Ok(())
}

/// Resolves once any of SIGHUP/SIGTERM/SIGQUIT/SIGINT (or Ctrl-C on
/// platforms without those signals) is received.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = signal(SignalKind::hangup()).expect("install SIGHUP handler");
        let mut terminate = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        let mut quit = signal(SignalKind::quit()).expect("install SIGQUIT handler");
        let mut interrupt = signal(SignalKind::interrupt()).expect("install SIGINT handler");

        tokio::select! {
            _ = hangup.recv() => {}
            _ = terminate.recv() => {}
            _ = quit.recv() => {}
            _ = interrupt.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
