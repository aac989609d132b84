use std::{
    collections::HashMap,
    convert::Infallible,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// In-memory stand-in for the three upstream services the harvester talks
/// to: a chain JSON-RPC node, the attestation index, and the payload
/// gateway. Blocks are synthetic with a fixed spacing, so binary searches
/// land on deterministic timestamps.
#[derive(Clone)]
pub struct MockNetwork {
    genesis_timestamp: u64,
    block_spacing: u64,
    head: Arc<AtomicU64>,
    rpc_unavailable: Arc<AtomicBool>,
    inner: Arc<RwLock<MockNetworkInner>>,
    rpc_calls: Arc<AtomicU64>,
    index_queries: Arc<AtomicU64>,
    payload_fetches: Arc<AtomicU64>,
}

#[derive(Default)]
struct MockNetworkInner {
    // signer (lowercase hex) -> [(bucketed timestamp, locator)]
    attestations: HashMap<String, Vec<(u64, String)>>,
    payloads: HashMap<String, Vec<u8>>,
}

impl MockNetwork {
    pub fn new(genesis_timestamp: u64, block_spacing: u64, head: u64) -> Self {
        assert!(block_spacing > 0, "block spacing must be positive");
        Self {
            genesis_timestamp,
            block_spacing,
            head: Arc::new(AtomicU64::new(head)),
            rpc_unavailable: Arc::new(AtomicBool::new(false)),
            inner: Arc::new(RwLock::new(MockNetworkInner::default())),
            rpc_calls: Arc::new(AtomicU64::new(0)),
            index_queries: Arc::new(AtomicU64::new(0)),
            payload_fetches: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn head_timestamp(&self) -> u64 {
        self.block_timestamp(self.head.load(Ordering::SeqCst))
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn set_rpc_unavailable(&self, unavailable: bool) {
        self.rpc_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn rpc_calls(&self) -> u64 {
        self.rpc_calls.load(Ordering::SeqCst)
    }

    pub fn index_queries(&self) -> u64 {
        self.index_queries.load(Ordering::SeqCst)
    }

    pub fn payload_fetches(&self) -> u64 {
        self.payload_fetches.load(Ordering::SeqCst)
    }

    /// Registers an attestation record and its payload: a well-formed signed
    /// package carrying a single price point.
    pub fn publish_package(
        &self,
        signer: &str,
        bucketed_timestamp: u64,
        locator: &str,
        symbol: &str,
        value: f64,
    ) {
        let payload = json!({
            "dataPoints": [{ "dataFeedId": symbol, "value": value }],
            "timestampMilliseconds": bucketed_timestamp * 1000,
            "signerAddress": signer.to_ascii_lowercase(),
            "signature": "c2lnbmVkLWJ5LWZpeHR1cmU=",
        });
        self.register_attestation(signer, bucketed_timestamp, locator);
        self.publish_payload(locator, serde_json::to_vec(&payload).expect("fixture json"));
    }

    /// Registers an index record without any payload behind it, so the
    /// gateway answers 404 for its locator.
    pub fn register_attestation(&self, signer: &str, bucketed_timestamp: u64, locator: &str) {
        let mut inner = self.inner.write().expect("mock network poisoned");
        inner
            .attestations
            .entry(signer.to_ascii_lowercase())
            .or_default()
            .push((bucketed_timestamp, locator.to_owned()));
    }

    pub fn publish_payload(&self, locator: &str, bytes: Vec<u8>) {
        let mut inner = self.inner.write().expect("mock network poisoned");
        inner.payloads.insert(locator.to_owned(), bytes);
    }

    fn block_timestamp(&self, number: u64) -> u64 {
        self.genesis_timestamp + number * self.block_spacing
    }

    fn handle_rpc(&self, request: &Value) -> Value {
        self.rpc_calls.fetch_add(1, Ordering::SeqCst);
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request.get("method").and_then(Value::as_str).unwrap_or("");

        let result = match method {
            "eth_blockNumber" => {
                json!(format!("0x{:x}", self.head.load(Ordering::SeqCst)))
            }
            "eth_getBlockByNumber" => {
                let tag = request
                    .get("params")
                    .and_then(|params| params.get(0))
                    .and_then(Value::as_str)
                    .unwrap_or("0x0");
                let number = tag
                    .strip_prefix("0x")
                    .and_then(|digits| u64::from_str_radix(digits, 16).ok())
                    .unwrap_or(0);
                if number > self.head.load(Ordering::SeqCst) {
                    Value::Null
                } else {
                    json!({
                        "number": format!("0x{number:x}"),
                        "timestamp": format!("0x{:x}", self.block_timestamp(number)),
                    })
                }
            }
            other => {
                return json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32601, "message": format!("unknown method {other}") },
                });
            }
        };

        json!({ "jsonrpc": "2.0", "id": id, "result": result })
    }

    fn handle_index_query(&self, request: &Value) -> Value {
        self.index_queries.fetch_add(1, Ordering::SeqCst);
        let variables = request.get("variables").cloned().unwrap_or(Value::Null);
        let signer = variables
            .get("signer")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_ascii_lowercase();
        let from: u64 = variables
            .get("from")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);
        let to: u64 = variables
            .get("to")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(u64::MAX);

        let inner = self.inner.read().expect("mock network poisoned");
        let edges: Vec<Value> = inner
            .attestations
            .get(&signer)
            .map(|records| {
                records
                    .iter()
                    .filter(|(timestamp, _)| *timestamp >= from && *timestamp <= to)
                    .map(|(_, locator)| json!({ "node": { "id": locator } }))
                    .collect()
            })
            .unwrap_or_default();

        json!({ "data": { "transactions": { "edges": edges } } })
    }

    fn payload_for(&self, locator: &str) -> Option<Vec<u8>> {
        self.payload_fetches.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.read().expect("mock network poisoned");
        inner.payloads.get(locator).cloned()
    }
}

pub struct MockServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockServer {
    pub async fn start(network: MockNetwork) -> Result<Self> {
        let make_service = make_service_fn(move |_conn| {
            let network = network.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |request| {
                    let network = network.clone();
                    async move { route(network, request).await }
                }))
            }
        });

        let addr: SocketAddr = "127.0.0.1:0".parse().expect("loopback address");
        let server = Server::try_bind(&addr)
            .context("failed to bind mock server")?
            .serve(make_service);
        let addr = server.local_addr();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock server error: {err}");
            }
        });

        Ok(Self {
            addr,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn rpc_url(&self) -> String {
        format!("http://{}/rpc", self.addr)
    }

    pub fn index_url(&self) -> String {
        format!("http://{}/graphql", self.addr)
    }

    pub fn gateway_url(&self) -> String {
        format!("http://{}/payload", self.addr)
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn route(
    network: MockNetwork,
    request: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let response = match (method, path.as_str()) {
        (Method::POST, "/rpc") => {
            if network.rpc_unavailable.load(Ordering::SeqCst) {
                network.rpc_calls.fetch_add(1, Ordering::SeqCst);
                status_response(StatusCode::SERVICE_UNAVAILABLE)
            } else {
                match read_json(request).await {
                    Ok(body) => json_response(network.handle_rpc(&body)),
                    Err(_) => status_response(StatusCode::BAD_REQUEST),
                }
            }
        }
        (Method::POST, "/graphql") => match read_json(request).await {
            Ok(body) => json_response(network.handle_index_query(&body)),
            Err(_) => status_response(StatusCode::BAD_REQUEST),
        },
        (Method::GET, path) if path.starts_with("/payload/") => {
            let locator = path.trim_start_matches("/payload/");
            match network.payload_for(locator) {
                Some(bytes) => Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::from(bytes))
                    .expect("payload response"),
                None => status_response(StatusCode::NOT_FOUND),
            }
        }
        _ => status_response(StatusCode::NOT_FOUND),
    };

    Ok(response)
}

async fn read_json(request: Request<Body>) -> Result<Value> {
    let bytes = body::to_bytes(request.into_body())
        .await
        .context("failed to read request body")?;
    serde_json::from_slice(&bytes).context("request body is not JSON")
}

fn json_response(value: Value) -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/json")
        .body(Body::from(value.to_string()))
        .expect("json response")
}

fn status_response(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .expect("status response")
}
