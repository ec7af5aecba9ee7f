//! Connection lifecycle of the ingestion service.
//!
//! [`IngestService::serve`] walks a one-way state machine:
//!
//! ```text
//! Idle ──serve──▶ Serving ──shutdown──▶ Draining ──▶ Stopped
//!                    │                                  ▲
//!                    └──────────accept failure──────────┘
//! ```
//!
//! While serving, one task accepts connections and hands each to hyper.
//! On shutdown the accept task stops taking new connections, asks every
//! open connection to finish its in-flight requests, and waits for them.
//! `serve` consumes the service, so it runs at most once. A missing store or
//! listener is reported before the machine is entered and leaves the state
//! at `Idle`.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use evrys_notify::Bus;
use evrys_store::{AppendOnly, Query};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

use crate::{app, AppState, DEFAULT_NOTIFY_TIMEOUT};

/// Source of incoming connections.
///
/// Implemented for [`TcpListener`]; other implementations let tests drive
/// the accept path directly.
pub trait Listener: Send + 'static {
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;
    type Addr: std::fmt::Debug + Send;

    /// Waits for the next connection.
    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Io, Self::Addr)>> + Send;

    /// The address connections arrive on.
    fn local_addr(&self) -> io::Result<Self::Addr>;
}

impl Listener for TcpListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// Lifecycle of an [`IngestService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Serving,
    Draining,
    Stopped,
}

/// Why [`IngestService::serve`] returned.
#[derive(Debug, Error)]
pub enum ServeError {
    /// No append-only store was configured.
    #[error("ingestion service requires an append-only store")]
    MissingStore,

    /// No listener was supplied.
    #[error("ingestion service requires a listener")]
    MissingListener,

    /// The service was shut down. This is the normal outcome.
    #[error("ingestion service stopped")]
    Stopped,

    /// Accepting a connection failed. The listener's error is kept as is.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// The accept task panicked.
    #[error("serve task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Dependencies of an [`IngestService`].
#[derive(Clone)]
pub struct ServiceConfig {
    pub store: Option<Arc<dyn AppendOnly>>,
    pub query: Option<Arc<dyn Query>>,
    pub bus: Option<Arc<dyn Bus>>,
    /// Bound on publishing one notification.
    pub notify_timeout: Duration,
    /// Parent span for the service and its handlers.
    pub span: Span,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store: None,
            query: None,
            bus: None,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            span: Span::none(),
        }
    }
}

/// The ingestion service.
pub struct IngestService {
    config: ServiceConfig,
    state: watch::Sender<ServiceState>,
}

impl IngestService {
    pub fn new(config: ServiceConfig) -> Self {
        let (state, _) = watch::channel(ServiceState::Idle);
        Self { config, state }
    }

    /// Observes lifecycle transitions.
    pub fn state(&self) -> watch::Receiver<ServiceState> {
        self.state.subscribe()
    }

    /// Serves connections from `listener` until `shutdown` is cancelled or
    /// accepting fails.
    ///
    /// # Errors
    ///
    /// Always returns an error: [`ServeError::Stopped`] after a requested
    /// shutdown, the accept failure verbatim when the listener fails, or a
    /// precondition error when the store or listener is missing. Only the
    /// precondition errors leave the state at [`ServiceState::Idle`].
    pub async fn serve<L: Listener>(
        self,
        listener: Option<L>,
        shutdown: CancellationToken,
    ) -> Result<Infallible, ServeError> {
        let (append, listener) = match (self.config.store.clone(), listener) {
            (Some(append), Some(listener)) => (append, listener),
            (None, _) => return Err(self.refuse(ServeError::MissingStore)),
            (_, None) => return Err(self.refuse(ServeError::MissingListener)),
        };

        let span = self.config.span.clone();
        let err = self.run(append, listener, shutdown).instrument(span).await;
        self.state.send_replace(ServiceState::Stopped);

        match &err {
            ServeError::Stopped => tracing::info!(parent: &self.config.span, "ingestion service stopped"),
            e => tracing::error!(parent: &self.config.span, error = %e, "ingestion service failed"),
        }
        Err(err)
    }

    fn refuse(&self, err: ServeError) -> ServeError {
        tracing::error!(parent: &self.config.span, error = %err, "ingestion service not started");
        err
    }

    async fn run<L: Listener>(
        &self,
        append: Arc<dyn AppendOnly>,
        listener: L,
        shutdown: CancellationToken,
    ) -> ServeError {
        let router = app(AppState {
            append,
            query: self.config.query.clone(),
            bus: self.config.bus.clone(),
            notify_timeout: self.config.notify_timeout,
            span: self.config.span.clone(),
        });

        match listener.local_addr() {
            Ok(addr) => tracing::info!(?addr, "ingestion service listening"),
            Err(e) => tracing::debug!(error = %e, "listener has no local address"),
        }
        self.state.send_replace(ServiceState::Serving);

        let stop = shutdown.child_token();
        let mut task = tokio::spawn(
            accept_loop(listener, router, stop.clone()).instrument(Span::current()),
        );

        tokio::select! {
            () = shutdown.cancelled() => {
                self.state.send_replace(ServiceState::Draining);
                tracing::info!("shutdown requested, draining in-flight requests");
                stop.cancel();
                match task.await {
                    Ok(Ok(())) => ServeError::Stopped,
                    Ok(Err(e)) => e,
                    Err(e) => ServeError::Task(e),
                }
            }
            joined = &mut task => {
                stop.cancel();
                match joined {
                    Ok(Ok(())) => ServeError::Stopped,
                    Ok(Err(e)) => e,
                    Err(e) => ServeError::Task(e),
                }
            }
        }
    }
}

/// Accepts connections until `stop` fires or accepting fails, then waits
/// for open connections to finish their in-flight requests.
async fn accept_loop<L: Listener>(
    mut listener: L,
    router: Router,
    stop: CancellationToken,
) -> Result<(), ServeError> {
    let builder = auto::Builder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();

    let result = loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => break Ok(()),
            accepted = listener.accept() => match accepted {
                Ok((io, remote)) => {
                    tracing::debug!(?remote, "accepted connection");
                    let service = TowerToHyperService::new(router.clone());
                    let conn = builder
                        .serve_connection_with_upgrades(TokioIo::new(io), service)
                        .into_owned();
                    let conn = graceful.watch(conn);
                    tokio::spawn(
                        async move {
                            if let Err(e) = conn.await {
                                tracing::debug!(error = %e, "connection closed with error");
                            }
                        }
                        .in_current_span(),
                    );
                }
                Err(e) => break Err(ServeError::Accept(e)),
            },
        }
    };

    drop(listener);
    graceful.shutdown().await;
    tracing::debug!("all connections closed");
    result
}
