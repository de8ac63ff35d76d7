//! HTTP responder pools
//!
//! Every configured port gets its own axum server that accepts any method on
//! any path. Plain responders acknowledge on the next scheduler tick; delayed
//! responders hold the acknowledgment back to simulate a slow consumer.

use crate::error::ListenerError;
use crate::processor::{NotificationProcessor, NotificationSource};
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Body of a plain acknowledgment
pub const PLAIN_ACK: &str = "OK \n";

/// Body of a delayed acknowledgment
pub const DELAYED_ACK: &str = "OK delayed \n";

/// Responder flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderKind {
    Plain,
    /// Acknowledges only after the given delay
    Delayed(Duration),
}

impl ResponderKind {
    pub fn ack(&self) -> &'static str {
        match self {
            ResponderKind::Plain => PLAIN_ACK,
            ResponderKind::Delayed(_) => DELAYED_ACK,
        }
    }

    fn source(&self) -> NotificationSource {
        match self {
            ResponderKind::Plain => NotificationSource::Http,
            ResponderKind::Delayed(_) => NotificationSource::DelayedHttp,
        }
    }

    fn banner(&self) -> &'static str {
        match self {
            ResponderKind::Plain => "ACCUMULATOR SERVER",
            ResponderKind::Delayed(_) => "ACCUMULATOR Delayed SERVER",
        }
    }
}

struct EndpointState {
    kind: ResponderKind,
    source: NotificationSource,
    processor: NotificationProcessor,
}

/// Counts the request as soon as it arrives, before its body is read
async fn count_request(
    State(state): State<Arc<EndpointState>>,
    request: Request,
    next: Next,
) -> Response {
    state.processor.record();
    next.run(request).await
}

async fn acknowledge(State(state): State<Arc<EndpointState>>, body: Bytes) -> Response {
    debug!("{} bytes received on {:?} responder", body.len(), state.kind);
    state.processor.inspect(&body, &state.source);

    match state.kind {
        ResponderKind::Plain => tokio::task::yield_now().await,
        ResponderKind::Delayed(delay) => tokio::time::sleep(delay).await,
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        state.kind.ack(),
    )
        .into_response()
}

/// Builds the accept-everything router for one endpoint
pub fn router(kind: ResponderKind, processor: NotificationProcessor) -> Router {
    let state = Arc::new(EndpointState {
        kind,
        source: kind.source(),
        processor,
    });
    Router::new()
        .fallback(acknowledge)
        .layer(middleware::from_fn_with_state(state.clone(), count_request))
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

/// A bound but not yet serving endpoint
pub struct Endpoint {
    port: u16,
    local_addr: SocketAddr,
    listener: TcpListener,
    router: Router,
}

impl Endpoint {
    /// Binds `0.0.0.0:<port>`; port 0 picks any free port
    pub async fn bind(
        port: u16,
        kind: ResponderKind,
        processor: NotificationProcessor,
    ) -> Result<Self, ListenerError> {
        let bind_error = |source| ListenerError::Bind { port, source };
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
            .await
            .map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        Ok(Self {
            port,
            local_addr,
            listener,
            router: router(kind, processor),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves requests until the server fails or the task is dropped
    pub async fn serve(self) -> Result<(), ListenerError> {
        let port = self.port;
        axum::serve(self.listener, self.router)
            .await
            .map_err(|source| ListenerError::Serve { port, source })
    }
}

/// An endpoint serving in its own task
#[derive(Debug)]
pub struct RunningEndpoint {
    pub kind: ResponderKind,
    pub local_addr: SocketAddr,
    pub handle: JoinHandle<()>,
}

/// Starts one endpoint per port
///
/// A port that cannot be bound is logged and skipped; the remaining endpoints
/// start regardless. Returns the endpoints that are serving.
pub async fn start_pool(
    kind: ResponderKind,
    ports: &[u16],
    processor: &NotificationProcessor,
    silent: bool,
) -> Vec<RunningEndpoint> {
    let mut running = Vec::with_capacity(ports.len());
    for (index, &port) in ports.iter().enumerate() {
        let endpoint = match Endpoint::bind(port, kind, processor.clone()).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                error!("{} #{} not started: {}", kind.banner(), index + 1, e);
                continue;
            }
        };

        let local_addr = endpoint.local_addr();
        if !silent {
            info!(
                "### {} #{} STARTED at port {} ###",
                kind.banner(),
                index + 1,
                local_addr.port()
            );
        }

        let handle = tokio::spawn(async move {
            if let Err(e) = endpoint.serve().await {
                error!("{}", e);
            }
        });
        running.push(RunningEndpoint {
            kind,
            local_addr,
            handle,
        });
    }
    running
}
