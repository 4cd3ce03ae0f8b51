//! Transport layer
//!
//! Terminates mutual TLS, attaches the client's certificate chain to each
//! request and serves the webhook router over HTTP/1.1 or HTTP/2.

mod http;
mod peer;
mod tls;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tower_http::add_extension::AddExtension;

pub use http::router;
pub use peer::{PeerCertificates, PeerIdentity};
pub use tls::{build_server_config, crypto_provider, load_server_config};

use crate::config::ServerConfig;
use crate::registry::ProviderRegistry;
use crate::{Error, Result};

/// Serve the webhook on `config.listen_addr` until `shutdown` fires
pub async fn run_server(
    config: &ServerConfig,
    registry: Arc<ProviderRegistry>,
    shutdown: CancellationToken,
) -> Result<()> {
    let acceptor = TlsAcceptor::from(Arc::new(load_server_config(config)?));
    let app = router(registry, config.write_timeout);

    let addr = config.listen_addr;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Transport(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!("Webhook server listening on https://{addr}");

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                };

                let acceptor = acceptor.clone();
                let app = app.clone();
                let timeouts = Timeouts {
                    handshake: config.handshake_timeout,
                    read: config.read_timeout,
                };
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, remote, acceptor, app, timeouts).await {
                        tracing::debug!(remote = %remote, error = %e, "Connection closed with error");
                    }
                });
            }
        }
    }

    tracing::info!("Webhook server shutdown complete");
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct Timeouts {
    handshake: Duration,
    read: Duration,
}

async fn serve_connection(
    stream: TcpStream,
    remote: SocketAddr,
    acceptor: TlsAcceptor,
    app: Router,
    timeouts: Timeouts,
) -> Result<()> {
    let tls = tokio::time::timeout(timeouts.handshake, acceptor.accept(stream))
        .await
        .map_err(|_| Error::Transport(format!("TLS handshake with {remote} timed out")))?
        .map_err(|e| Error::Transport(format!("TLS handshake with {remote} failed: {e}")))?;

    let certs = PeerCertificates::from_handshake(tls.get_ref().1.peer_certificates());
    let service = TowerToHyperService::new(AddExtension::new(app, certs));

    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(Some(timeouts.read));
    builder.http2().timer(TokioTimer::new());

    builder
        .serve_connection(TokioIo::new(tls), service)
        .await
        .map_err(|e| Error::Transport(format!("Connection with {remote} failed: {e}")))
}
