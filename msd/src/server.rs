//! A minimal hyper 1.x accept loop for serving a `tower::Service`, since
//! this binary has no Kubernetes runtime (`kubert`) to hide it behind —
//! `policy-controller` gets this for free from `kubert::Runtime::spawn_server`;
//! here it's built directly on `hyper_util`'s connection builder, draining
//! via the same `drain::Watch` signal used throughout this process (spec
//! §5's shutdown sequencing).

use std::net::SocketAddr;

use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;
use tower::Service;
use tracing::{debug, info, instrument, warn};

/// Binds `addr` and serves `svc` until `drain` is signaled, at which point
/// in-flight connections are allowed to finish (`drain::Watch::signaled`
/// + `Handle::release_after`) before returning.
#[instrument(skip(svc, drain), fields(%addr))]
pub async fn serve<S, B>(addr: SocketAddr, svc: S, drain: drain::Watch) -> anyhow::Result<()>
where
    S: Service<Request<Incoming>, Response = Response<B>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: std::fmt::Display + Send + Sync + 'static,
    B: hyper::body::Body + Send + 'static,
    B::Data: Send,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "HTTP server listening");

    loop {
        let accept = tokio::select! {
            res = listener.accept() => res,
            handle = drain.clone().signaled() => {
                debug!("shutting down HTTP server");
                return handle.release_after(std::future::ready(Ok(()))).await;
            }
        };

        let (stream, peer) = match accept {
            Ok(pair) => pair,
            Err(error) => {
                warn!(%error, "failed to accept connection");
                continue;
            }
        };

        let mut svc = svc.clone();
        let drain = drain.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let conn = auto::Builder::new(hyper_util::rt::TokioExecutor::new()).serve_connection(
                io,
                hyper::service::service_fn(move |req: Request<Incoming>| svc.call(req)),
            );
            tokio::pin!(conn);
            tokio::select! {
                res = &mut conn => {
                    if let Err(error) = res {
                        debug!(%peer, %error, "connection error");
                    }
                }
                handle = drain.signaled() => {
                    conn.as_mut().graceful_shutdown();
                    let _ = handle.release_after(conn).await;
                }
            }
        });
    }
}
