//! Admin/health endpoint, grounded in `policy-controller/src/admin.rs` but
//! updated to hyper 1.x and a plain `tower::Service` rather than
//! `make_service_fn` (which hyper 1.x dropped). Exposes `/ready` and
//! `/live`, the two probes the original agent's gossip membership implied
//! but never exposed over HTTP.

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use tokio::sync::watch;
use tracing::instrument;

pub type Body = Full<bytes::Bytes>;

#[derive(Clone)]
pub struct Admin {
    ready: watch::Receiver<bool>,
}

impl Admin {
    pub fn new(ready: watch::Receiver<bool>) -> Self {
        Self { ready }
    }
}

impl tower::Service<Request<Incoming>> for Admin {
    type Response = Response<Body>;
    type Error = std::convert::Infallible;
    type Future = std::future::Ready<Result<Response<Body>, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Incoming>) -> Self::Future {
        let resp = match (req.method(), req.uri().path()) {
            (&Method::GET | &Method::HEAD, "/ready") => {
                if *self.ready.borrow() {
                    plain(StatusCode::OK, "ready\n")
                } else {
                    plain(StatusCode::SERVICE_UNAVAILABLE, "not ready\n")
                }
            }
            (&Method::GET | &Method::HEAD, "/live") => plain(StatusCode::OK, "live\n"),
            _ => Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Body::default())
                .expect("valid response"),
        };
        std::future::ready(Ok(resp))
    }
}

fn plain(status: StatusCode, text: &'static str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "text/plain")
        .body(Body::from(text))
        .expect("valid response")
}

#[instrument(skip_all, fields(%addr))]
pub async fn serve(addr: SocketAddr, ready: watch::Receiver<bool>, drain: drain::Watch) -> anyhow::Result<()> {
    crate::server::serve(addr, Admin::new(ready), drain).await
}
