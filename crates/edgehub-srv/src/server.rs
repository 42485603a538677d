//! Server runner: binds the listener and serves the enrollment router.

use edgehub_ca::RootOfTrust;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::handler::{self, AppState};
use crate::normalize::ForwardedCertPolicy;
use crate::tls::{self, ConnectionInfo, TlsListener};
use crate::SrvError;

/// Bind `config.listen` and serve until Ctrl-C or SIGTERM.
pub async fn run(config: &ServerConfig, root: Arc<RootOfTrust>) -> crate::Result<()> {
    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(|e| SrvError::Server(format!("bind {}: {e}", config.listen)))?;
    serve(listener, config, root, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    config: &ServerConfig,
    root: Arc<RootOfTrust>,
    shutdown: F,
) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;

    let state = AppState::new(config, Arc::clone(&root))?;
    let policy = ForwardedCertPolicy::try_from(&config.forwarded_cert)?;
    if policy.enabled {
        info!(
            header = %policy.header,
            trusted_sources = ?policy.trusted_sources,
            "forwarded client certificates enabled"
        );
    }
    let app = handler::router(state, policy)
        .into_make_service_with_connect_info::<ConnectionInfo>();

    let addr = listener.local_addr()?;
    info!(
        addr = %addr,
        ca = %root.subject(),
        signing_days = config.edge_cert_signing_days,
        "edgehub enrollment gateway starting"
    );

    if config.tls.enabled {
        let tls_config = tls::server_config(&config.tls, &root)?;
        let listener = TlsListener::new(
            listener,
            TlsAcceptor::from(Arc::new(tls_config)),
            config.handshake_timeout(),
        )?;
        info!(addr = %addr, "serving HTTPS");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| SrvError::Server(e.to_string()))?;
    } else {
        warn!(addr = %addr, "TLS disabled, serving plain HTTP");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| SrvError::Server(e.to_string()))?;
    }

    info!("edgehub enrollment gateway stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn test_invalid_config_rejected_before_serving() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig {
            edge_cert_signing_days: 0,
            ..ServerConfig::default()
        };
        let root = Arc::new(testing::root());

        let result = serve(listener, &config, root, async {}).await;
        assert!(matches!(result, Err(SrvError::Config(_))));
    }

    #[tokio::test]
    async fn test_immediate_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let root = Arc::new(testing::root());
        let result = serve(listener, &ServerConfig::default(), root, async {}).await;
        assert!(result.is_ok());
    }
}
