//! The local registration API (spec §4.5), grounded in
//! `discoverd/rest_server.go` and `discoverd/msd/msd_rs.go`: a hand-written
//! `tower::Service` in the style of `policy-controller/runtime/src/admission.rs`,
//! rather than a web framework. Addrs that appear in the URL path are
//! base64-encoded by the caller, exactly as the original's gin routes
//! expect, since a micro-app's HTTP address (`http://host:port/rs`) is not
//! itself URL-safe.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Response, StatusCode};
use msd_core::cluster::ClusterPort;
use msd_core::model::{ErrorBody, MicroApp};
use msd_core::Repository;
use thiserror::Error;
use tracing::{info, instrument, trace, warn};

pub type Body = Full<Bytes>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Body(String),
}

/// `{node, rpc_addr}` answered by `GET /msd/node-info`, consumed by
/// `GossipCluster::query_rpc_addr` and the `info` CLI subcommand.
#[derive(Clone, serde::Serialize)]
struct NodeInfo {
    node: String,
    rpc_addr: String,
}

#[derive(Clone)]
pub struct RegistrationApi {
    repo: Arc<Repository>,
    cluster: Arc<dyn ClusterPort>,
    http: reqwest::Client,
    node: String,
    rpc_addr: String,
}

impl RegistrationApi {
    pub fn new(repo: Arc<Repository>, cluster: Arc<dyn ClusterPort>, node: String, rpc_addr: String) -> Self {
        Self {
            repo,
            cluster,
            http: reqwest::Client::new(),
            node,
            rpc_addr,
        }
    }
}

impl<B> tower::Service<Request<B>> for RegistrationApi
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: std::fmt::Display,
{
    type Response = Response<Body>;
    type Error = Error;
    type Future = futures::future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    #[instrument(skip_all, fields(method = %req.method(), path = %req.uri().path()))]
    fn call(&mut self, req: Request<B>) -> Self::Future {
        trace!("handling request");
        let this = self.clone();
        Box::pin(async move { this.route(req).await })
    }
}

impl RegistrationApi {
    async fn route<B>(&self, req: Request<B>) -> Result<Response<Body>, Error>
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: std::fmt::Display,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        match (&method, segments.as_slice()) {
            (&Method::PUT, ["msd", "register"]) => self.register(req).await,
            (&Method::GET, ["msd", "fresh", addr]) => Ok(self.refresh(addr)),
            (&Method::GET, ["msd", "fetch", addr]) => Ok(self.fetch(addr)),
            (&Method::GET, ["msd", "node-info"]) => Ok(self.node_info()),
            (&Method::GET, ["msd", "routers"]) => Ok(self.routers()),
            (&Method::GET, ["msd", "apps"]) => Ok(self.apps()),
            (&Method::POST, ["msd", "sync"]) => self.trigger_sync(req).await,
            _ => Ok(not_found()),
        }
    }

    async fn register<B>(&self, req: Request<B>) -> Result<Response<Body>, Error>
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: std::fmt::Display,
    {
        let bytes = req
            .into_body()
            .collect()
            .await
            .map_err(|e| Error::Body(e.to_string()))?
            .to_bytes();
        let ma: MicroApp = match serde_json::from_slice(&bytes) {
            Ok(ma) => ma,
            Err(error) => {
                warn!(%error, "failed to decode registration body");
                return Ok(json_error(StatusCode::BAD_REQUEST, "problem decoding body"));
            }
        };
        self.repo.register(ma).await;
        Ok(Response::builder()
            .status(StatusCode::CREATED)
            .body(Body::default())
            .expect("valid response"))
    }

    fn refresh(&self, addr_b64: &str) -> Response<Body> {
        let Some(addr) = decode_addr(addr_b64) else {
            return json_error(StatusCode::BAD_REQUEST, "error decoding addr");
        };
        let status = self.repo.refresh(&addr);
        json_ok(StatusCode::ACCEPTED, &status)
    }

    fn fetch(&self, addr_b64: &str) -> Response<Body> {
        let Some(addr) = decode_addr(addr_b64) else {
            return json_error(StatusCode::BAD_REQUEST, "error decoding addr");
        };
        match self.repo.get_router_table(&addr) {
            Some(table) => json_ok(StatusCode::OK, &table),
            None => json_ok(StatusCode::OK, &serde_json::Value::Null),
        }
    }

    fn node_info(&self) -> Response<Body> {
        json_ok(
            StatusCode::OK,
            &NodeInfo {
                node: self.node.clone(),
                rpc_addr: self.rpc_addr.clone(),
            },
        )
    }

    fn routers(&self) -> Response<Body> {
        json_ok(StatusCode::OK, &self.repo.list_routers())
    }

    fn apps(&self) -> Response<Body> {
        json_ok(StatusCode::OK, &self.repo.list_micro_apps())
    }

    async fn trigger_sync<B>(&self, req: Request<B>) -> Result<Response<Body>, Error>
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: std::fmt::Display,
    {
        let bytes = req
            .into_body()
            .collect()
            .await
            .map_err(|e| Error::Body(e.to_string()))?
            .to_bytes();
        let nodes: Vec<String> = match serde_json::from_slice(&bytes) {
            Ok(nodes) => nodes,
            Err(error) => {
                warn!(%error, "failed to decode sync request body");
                return Ok(json_error(StatusCode::BAD_REQUEST, "problem decoding body"));
            }
        };

        let repo = self.repo.clone();
        let cluster = self.cluster.clone();
        let http = self.http.clone();
        tokio::spawn(async move {
            if let Some(node) = crate::sync::sync_from(&repo, &cluster, &http, &nodes).await {
                info!(%node, "sync triggered via RPC completed");
            }
        });

        Ok(Response::builder()
            .status(StatusCode::ACCEPTED)
            .body(Body::default())
            .expect("valid response"))
    }
}

fn decode_addr(addr_b64: &str) -> Option<String> {
    let bytes = BASE64.decode(addr_b64).ok()?;
    String::from_utf8(bytes).ok()
}

fn json_ok<T: serde::Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let bytes = serde_json::to_vec(body).expect("serializable response");
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("valid response")
}

fn json_error(status: StatusCode, msg: &str) -> Response<Body> {
    json_ok(status, &ErrorBody::new(msg))
}

fn not_found() -> Response<Body> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Body::default())
        .expect("valid response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use msd_cluster::MockCluster;
    use msd_core::model::AppStatus;
    use std::time::Duration;
    use tower::Service;

    fn build_api() -> RegistrationApi {
        let cluster = Arc::new(MockCluster::new("n1"));
        let repo = Repository::new(Duration::from_secs(60), Duration::ZERO, cluster.clone());
        RegistrationApi::new(repo, cluster, "n1".to_string(), "127.0.0.1:7373".to_string())
    }

    fn req(method: Method, path: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder().method(method).uri(path).body(Body::from(body)).unwrap()
    }

    async fn body_of(resp: Response<Body>) -> Vec<u8> {
        resp.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn register_then_fetch_returns_created_and_table() {
        let mut api = build_api();

        let ma = MicroApp {
            addr: "http://a:1/rs".to_string(),
            providers: vec!["p.x".to_string()],
            consumers: vec!["p.x".to_string()],
        };
        let resp = api
            .call(req(Method::PUT, "/msd/register", serde_json::to_vec(&ma).unwrap()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let addr_b64 = BASE64.encode(ma.addr.as_bytes());
        let resp = api.call(req(Method::GET, &format!("/msd/fetch/{addr_b64}"), Vec::new())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn refresh_unknown_addr_reports_not_live() {
        let mut api = build_api();
        let addr_b64 = BASE64.encode(b"http://nope");
        let resp = api.call(req(Method::GET, &format!("/msd/fresh/{addr_b64}"), Vec::new())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let status: AppStatus = serde_json::from_slice(&body_of(resp).await).unwrap();
        assert!(!status.is_live);
    }

    #[tokio::test]
    async fn malformed_addr_is_bad_request() {
        let mut api = build_api();
        let resp = api.call(req(Method::GET, "/msd/fresh/not-base64!!", Vec::new())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_register_body_is_bad_request() {
        let mut api = build_api();
        let resp = api.call(req(Method::PUT, "/msd/register", b"not json".to_vec())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let mut api = build_api();
        let resp = api.call(req(Method::GET, "/nope", Vec::new())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn node_info_reports_configured_identity() {
        let mut api = build_api();
        let resp = api.call(req(Method::GET, "/msd/node-info", Vec::new())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let info: serde_json::Value = serde_json::from_slice(&body_of(resp).await).unwrap();
        assert_eq!(info["node"], "n1");
    }
}
