//! Accept loop and shutdown coordination.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::ServerError;
use crate::config::ServerConfig;
use crate::routes::route;

/// Lifecycle of a running server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Running,
    /// No longer accepting; waiting for in-flight requests.
    Draining,
    Stopped,
}

/// HTTP server receiving streamed uploads.
///
/// Once the shutdown future resolves the listener is closed and in-flight
/// requests get [`ServerConfig::shutdown_timeout`] to finish. Connections
/// still open after that are dropped.
pub struct UploadServer {
    config: Arc<ServerConfig>,
    state: watch::Sender<ServerState>,
}

impl UploadServer {
    pub fn new(config: ServerConfig) -> Self {
        let (state, _) = watch::channel(ServerState::Running);
        Self {
            config: Arc::new(config),
            state,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Watches the server's state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Binds the configured port on all interfaces.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let port = self.config.port;
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { port, source })
    }

    /// Binds and serves until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections from `listener` until `shutdown` resolves.
    ///
    /// Returns [`ServerError::ShutdownTimeout`] if connections had to be
    /// force-closed, and [`ServerError::Accept`] if the listener failed
    /// while running. The state ends as [`ServerState::Stopped`] either way.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let local_addr = listener.local_addr()?;
        tracing::info!("upload server listening on {local_addr}");
        self.state.send_replace(ServerState::Running);

        let header_timeout = Some(self.config.header_read_timeout).filter(|t| !t.is_zero());
        let mut http = http1::Builder::new();
        http.timer(TokioTimer::new())
            .header_read_timeout(header_timeout);

        let graceful = GracefulShutdown::new();
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::info!("shutdown signal received");
                    break;
                }

                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                            self.state.send_replace(ServerState::Draining);
                            connections.abort_all();
                            while connections.join_next().await.is_some() {}
                            self.state.send_replace(ServerState::Stopped);
                            return Err(ServerError::Accept(e));
                        }
                    };
                    tracing::debug!(%peer_addr, "connection accepted");

                    let config = Arc::clone(&self.config);
                    let service = service_fn(move |req| {
                        let config = Arc::clone(&config);
                        async move { Ok::<_, Infallible>(route(req, &config).await) }
                    });
                    let conn = graceful.watch(http.serve_connection(TokioIo::new(stream), service));
                    connections.spawn(async move {
                        if let Err(e) = conn.await {
                            tracing::debug!(%peer_addr, "connection error: {e}");
                        }
                    });
                }

                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);
        self.state.send_replace(ServerState::Draining);
        tracing::info!(open = connections.len(), "draining connections");

        let limit = self.config.shutdown_timeout;
        let result = match tokio::time::timeout(limit, graceful.shutdown()).await {
            Ok(()) => {
                tracing::info!("all connections closed");
                Ok(())
            }
            Err(_) => {
                tracing::warn!(
                    open = connections.len(),
                    "shutdown deadline elapsed, closing remaining connections"
                );
                connections.abort_all();
                Err(ServerError::ShutdownTimeout(limit))
            }
        };
        while connections.join_next().await.is_some() {}

        self.state.send_replace(ServerState::Stopped);
        tracing::info!("server stopped");
        result
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => tracing::info!("SIGINT received"),
        _ = terminate => tracing::info!("SIGTERM received"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    fn test_config() -> ServerConfig {
        ServerConfig {
            port: 0,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn bind_uses_os_port() {
        let server = UploadServer::new(test_config());
        let listener = server.bind().await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn idle_server_stops_cleanly() {
        let server = Arc::new(UploadServer::new(test_config()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut state = server.subscribe();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                server
                    .serve(listener, async {
                        let _ = stop_rx.await;
                    })
                    .await
            })
        };

        assert_eq!(*state.borrow_and_update(), ServerState::Running);
        stop_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(*state.borrow(), ServerState::Stopped);
    }

    async fn spawn_server(
        config: ServerConfig,
    ) -> (SocketAddr, oneshot::Sender<()>, JoinHandle<Result<(), ServerError>>) {
        let server = Arc::new(UploadServer::new(config));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = stop_rx.await;
                })
                .await
        });
        (addr, stop_tx, task)
    }

    async fn health_check(addr: SocketAddr) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn answers_health_check_over_tcp() {
        let (addr, stop_tx, task) = spawn_server(test_config()).await;

        let response = health_check(addr).await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with("OK"));

        stop_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn slow_headers_close_the_connection() {
        let (addr, stop_tx, task) = spawn_server(ServerConfig {
            header_read_timeout: Duration::from_millis(200),
            ..test_config()
        })
        .await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let start = tokio::time::Instant::now();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: te")
            .await
            .unwrap();

        let mut response = Vec::new();
        let closed =
            tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response)).await;
        assert!(closed.is_ok(), "connection stayed open past the header deadline");
        assert!(start.elapsed() >= Duration::from_millis(150));
        assert!(!String::from_utf8_lossy(&response).contains("200 OK"));

        // Requests that send their headers in time are still served.
        assert!(health_check(addr).await.starts_with("HTTP/1.1 200 OK"));

        stop_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn zero_header_timeout_waits_for_headers() {
        let (addr, stop_tx, task) = spawn_server(ServerConfig {
            header_read_timeout: Duration::ZERO,
            ..test_config()
        })
        .await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nHost: te").await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        stream
            .write_all(b"st\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));

        stop_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}
