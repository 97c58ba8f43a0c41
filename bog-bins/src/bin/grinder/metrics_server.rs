//! `/metrics` endpoint: renders the shared [`MetricsRegistry`] as
//! Prometheus text exposition format over a bare `hyper` server, the same
//! HTTP stack `bog-core::http::measured` uses for outbound calls.

use bog_core::observability::metrics::MetricsRegistry;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use prometheus::{Encoder, TextEncoder};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

async fn serve(
    req: Request<Incoming>,
    registry: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.uri().path() != "/metrics" {
        return Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from_static(b"not found")))
            .expect("static response is well-formed"));
    }

    registry.refresh_uptime();

    let encoder = TextEncoder::new();
    let families = registry.registry().gather();
    let mut buf = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buf) {
        error!(%err, "failed to encode metrics");
        return Ok(Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Full::new(Bytes::from_static(b"encode error")))
            .expect("static response is well-formed"));
    }

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("content-type", encoder.format_type())
        .body(Full::new(Bytes::from(buf)))
        .expect("response with a valid content-type header is well-formed"))
}

/// Binds `127.0.0.1:port` and serves `/metrics` forever. Spawned as a
/// background tokio task; a bind failure is logged and the task exits
/// without bringing down the trading loop, since metrics scraping is not
/// load-bearing for correctness.
pub fn spawn(registry: Arc<MetricsRegistry>, port: u16) {
    tokio::spawn(async move {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(err) => {
                error!(%err, %addr, "failed to bind metrics listener");
                return;
            }
        };
        info!(%addr, "metrics server listening");

        loop {
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(%err, "metrics listener accept failed");
                    continue;
                }
            };
            let io = TokioIo::new(stream);
            let registry = registry.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| serve(req, registry.clone()));
                if let Err(err) = ConnBuilder::new(hyper_util::rt::TokioExecutor::new())
                    .serve_connection(io, service)
                    .await
                {
                    warn!(%err, "metrics connection error");
                }
            });
        }
    });
}
