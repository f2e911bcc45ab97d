//! In-process DAppChain node for integration tests.
//!
//! Serves JSON-RPC on `/rpc` and `/query` (HTTP) and on `/websocket` and
//! `/queryws` (WebSocket). Hosts two contracts:
//! - `BluePrint`: plain key/value store behind `SetMsg` / `GetMsg`
//! - the tile-map EVM contract, emitting `OnTileMapStateUpdate` on every write

#![allow(dead_code)]

use alloy::dyn_abi::{DynSolValue, JsonAbiExt};
use alloy::json_abi::JsonAbi;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use dappchain_client::client::codec::{self, PlainCall};
use dappchain_client::config::{ClientConfig, Substrate, TransportConfig};
use dappchain_client::contract::EventSchema;
use dappchain_client::contract::EventDto;
use dappchain_client::middleware::{CallTx, NonceTx, SignedTx, VmType};
use dappchain_client::quickstart::{
    MapEntry, OnTileMapStateUpdate, GET_MSG, GET_TILE_MAP_STATE, SET_MSG, SET_TILE_MAP_STATE,
    TILE_MAP_ABI,
};
use dappchain_client::transport::RawEvent;

pub const BLUEPRINT_ADDRESS: &str = "0x005b17864f3adbf53b1384f2e6f2120c6652f779";
pub const TILE_MAP_ADDRESS: &str = "0xf420fbbb810698a74120df3723315ee06f472870";

const CODE_INVALID_SIGNATURE: u32 = 1;
const CODE_INVALID_NONCE: u32 = 2;
const CODE_UNKNOWN_CONTRACT: u32 = 3;
const CODE_BAD_INPUT: u32 = 4;

/// Mutable node state.
#[derive(Default)]
struct Ledger {
    /// Last committed sequence per public key hex.
    nonces: HashMap<String, u64>,
    kv: HashMap<String, String>,
    tile_state: String,
    height: u64,
}

/// The mock node shared by all connections.
pub struct MockChain {
    registry: HashMap<String, String>,
    ledger: Mutex<Ledger>,
    tile_abi: JsonAbi,
    events: broadcast::Sender<RawEvent>,
    next_subscription: AtomicU64,
    /// Number of upcoming `nonce` queries that report one less than the truth.
    stale_nonce_reads: AtomicU32,
    /// Total `broadcast_tx_commit` requests seen.
    pub broadcasts: AtomicU32,
    /// Subscriptions cancelled by clients.
    pub unsubscribed: AtomicU32,
}

impl MockChain {
    fn new() -> Self {
        let mut registry = HashMap::new();
        registry.insert("BluePrint".to_string(), BLUEPRINT_ADDRESS.to_string());
        let (events, _) = broadcast::channel(64);
        Self {
            registry,
            ledger: Mutex::new(Ledger::default()),
            tile_abi: serde_json::from_str(TILE_MAP_ABI).unwrap(),
            events,
            next_subscription: AtomicU64::new(1),
            stale_nonce_reads: AtomicU32::new(0),
            broadcasts: AtomicU32::new(0),
            unsubscribed: AtomicU32::new(0),
        }
    }

    /// Make the next `count` nonce queries lag behind the committed value.
    pub fn serve_stale_nonces(&self, count: u32) {
        self.stale_nonce_reads.store(count, Ordering::SeqCst);
    }

    pub fn committed_nonce(&self, public_key: &[u8]) -> u64 {
        let key = codec::to_hex(public_key);
        self.ledger.lock().unwrap().nonces.get(&key).copied().unwrap_or(0)
    }

    pub fn stored(&self, key: &str) -> Option<String> {
        self.ledger.lock().unwrap().kv.get(key).cloned()
    }

    pub fn tile_state(&self) -> String {
        self.ledger.lock().unwrap().tile_state.clone()
    }

    /// Emit an event as if `contract` had logged it.
    pub fn emit(&self, event: RawEvent) {
        let _ = self.events.send(event);
    }

    /// Answer one request-reply method.
    fn handle(&self, method: &str, params: &Value) -> Result<Value, (i64, String)> {
        match method {
            "resolve" => {
                let name = params["name"].as_str().unwrap_or_default();
                Ok(self.registry.get(name).map_or(Value::Null, |a| json!(a)))
            }
            "nonce" => {
                let key = params["key"].as_str().unwrap_or_default().to_lowercase();
                let committed = self.ledger.lock().unwrap().nonces.get(&key).copied().unwrap_or(0);
                let stale = self
                    .stale_nonce_reads
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                Ok(json!(if stale { committed.saturating_sub(1) } else { committed }))
            }
            "broadcast_tx_commit" => {
                self.broadcasts.fetch_add(1, Ordering::SeqCst);
                let tx = params["tx"].as_str().ok_or((-32602, "missing tx".to_string()))?;
                let bytes = codec::from_hex(tx).map_err(|e| (-32602, e.to_string()))?;
                Ok(self.commit(&bytes))
            }
            "query" => self.query(params),
            other => Err((-32601, format!("method '{}' not found", other))),
        }
    }

    fn commit(&self, bytes: &[u8]) -> Value {
        let reject = |code: u32, log: &str| json!({"code": code, "log": log});

        let Ok(signed) = SignedTx::decode(bytes) else {
            return reject(CODE_BAD_INPUT, "undecodable tx");
        };
        if !signed.verify() {
            return reject(CODE_INVALID_SIGNATURE, "signature check failed");
        }
        let Ok(nonce_tx) = NonceTx::decode(&signed.inner) else {
            return reject(CODE_BAD_INPUT, "undecodable nonce envelope");
        };
        let Ok(call) = CallTx::decode(&nonce_tx.inner) else {
            return reject(CODE_BAD_INPUT, "undecodable call");
        };

        let key = codec::to_hex(&signed.public_key);
        let mut ledger = self.ledger.lock().unwrap();
        let expected = ledger.nonces.get(&key).copied().unwrap_or(0) + 1;
        if nonce_tx.sequence != expected {
            return reject(
                CODE_INVALID_NONCE,
                &format!("expected sequence {}, got {}", expected, nonce_tx.sequence),
            );
        }

        let contract = call.contract.to_hex();
        let mut emitted = None;
        match call.vm {
            VmType::Plain if contract == BLUEPRINT_ADDRESS => {
                let Ok(msg) = serde_json::from_slice::<PlainCall<MapEntry>>(&call.input) else {
                    return reject(CODE_BAD_INPUT, "bad plain input");
                };
                if msg.method != SET_MSG {
                    return reject(CODE_BAD_INPUT, "unknown plain method");
                }
                ledger.kv.insert(msg.args.key, msg.args.value);
            }
            VmType::Evm if contract == TILE_MAP_ADDRESS => {
                let Some(state) = self.decode_tile_write(&call.input) else {
                    return reject(CODE_BAD_INPUT, "bad evm input");
                };
                ledger.tile_state = state.clone();
                emitted = Some(state);
            }
            _ => return reject(CODE_UNKNOWN_CONTRACT, "no such contract"),
        }

        ledger.nonces.insert(key, nonce_tx.sequence);
        ledger.height += 1;
        let height = ledger.height;
        drop(ledger);

        if let Some(state) = emitted {
            self.emit(tile_event(&state, height));
        }

        let hash = signed.hash().map(|h| h.to_string()).unwrap_or_default();
        json!({"code": 0, "log": "", "hash": hash, "height": height})
    }

    fn decode_tile_write(&self, input: &[u8]) -> Option<String> {
        let function = self.tile_abi.function(SET_TILE_MAP_STATE)?.first()?;
        if input.len() < 4 || input[..4] != function.selector()[..] {
            return None;
        }
        match function.abi_decode_input(&input[4..]).ok()?.pop()? {
            DynSolValue::String(state) => Some(state),
            _ => None,
        }
    }

    fn query(&self, params: &Value) -> Result<Value, (i64, String)> {
        let input = params["input"]
            .as_str()
            .and_then(|s| codec::from_hex(s).ok())
            .ok_or((-32602, "missing input".to_string()))?;
        let contract = params["contract"].as_str().unwrap_or_default().to_lowercase();
        let ledger = self.ledger.lock().unwrap();

        match (params["vm"].as_str(), contract.as_str()) {
            (Some("plain"), BLUEPRINT_ADDRESS) => {
                let call: PlainCall<MapEntry> =
                    serde_json::from_slice(&input).map_err(|e| (-32602, e.to_string()))?;
                if call.method != GET_MSG {
                    return Err((-32602, format!("unknown method {}", call.method)));
                }
                Ok(match ledger.kv.get(&call.args.key) {
                    Some(value) => {
                        let out = serde_json::to_vec(&MapEntry::new(call.args.key.clone(), value.clone()))
                            .map_err(|e| (-32603, e.to_string()))?;
                        json!(codec::to_hex(&out))
                    }
                    None => Value::Null,
                })
            }
            (Some("evm"), TILE_MAP_ADDRESS) => {
                let function = self
                    .tile_abi
                    .function(GET_TILE_MAP_STATE)
                    .and_then(|f| f.first())
                    .ok_or((-32603, "abi".to_string()))?;
                if input.get(..4) != Some(&function.selector()[..]) {
                    return Err((-32602, "unknown selector".to_string()));
                }
                let out = DynSolValue::Tuple(vec![DynSolValue::String(ledger.tile_state.clone())])
                    .abi_encode_params();
                Ok(json!(codec::to_hex(&out)))
            }
            _ => Ok(Value::Null),
        }
    }
}

/// The raw form of `OnTileMapStateUpdate(state)` at `height`.
pub fn tile_event(state: &str, height: u64) -> RawEvent {
    let schema: EventSchema = OnTileMapStateUpdate::schema();
    let data = DynSolValue::Tuple(vec![DynSolValue::String(state.to_string())]).abi_encode_params();
    RawEvent {
        contract: TILE_MAP_ADDRESS.to_string(),
        topics: vec![schema.selector().to_string()],
        data: codec::to_hex(&data),
        block_height: height,
    }
}

fn reply(id: Value, result: Result<Value, (i64, String)>) -> Value {
    match result {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err((code, message)) => {
            json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
        }
    }
}

async fn http_rpc(State(chain): State<Arc<MockChain>>, Json(request): Json<Value>) -> Json<Value> {
    let method = request["method"].as_str().unwrap_or_default();
    Json(reply(request["id"].clone(), chain.handle(method, &request["params"])))
}

async fn ws_upgrade(State(chain): State<Arc<MockChain>>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| serve_socket(socket, chain))
}

async fn serve_socket(socket: WebSocket, chain: Arc<MockChain>) {
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // subscription id -> watched contracts
    let subscriptions: Arc<Mutex<HashMap<String, Vec<String>>>> = Arc::default();

    let forwarder = {
        let subscriptions = subscriptions.clone();
        let outbound = outbound.clone();
        let mut events = chain.events.subscribe();
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let targets: Vec<String> = subscriptions
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|(_, topics)| topics.contains(&event.contract))
                    .map(|(id, _)| id.clone())
                    .collect();
                for id in targets {
                    let note = json!({
                        "jsonrpc": "2.0",
                        "method": "subscription",
                        "params": {"subscription": id, "result": event},
                    });
                    let _ = outbound.send(note.to_string());
                }
            }
        })
    };

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text.as_str().to_owned(),
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(request) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let params = &request["params"];
        let result = match request["method"].as_str().unwrap_or_default() {
            "subscribe" => {
                let topics: Vec<String> = params["topics"]
                    .as_array()
                    .map(|t| t.iter().filter_map(|v| v.as_str()).map(str::to_lowercase).collect())
                    .unwrap_or_default();
                let id = format!("sub-{}", chain.next_subscription.fetch_add(1, Ordering::SeqCst));
                subscriptions.lock().unwrap().insert(id.clone(), topics);
                Ok(json!(id))
            }
            "unsubscribe" => {
                let id = params["subscription"].as_str().unwrap_or_default();
                let removed = subscriptions.lock().unwrap().remove(id).is_some();
                if removed {
                    chain.unsubscribed.fetch_add(1, Ordering::SeqCst);
                }
                Ok(json!(removed))
            }
            method => chain.handle(method, params),
        };
        let _ = outbound.send(reply(request["id"].clone(), result).to_string());
    }

    forwarder.abort();
    writer.abort();
}

/// Start a mock node on an ephemeral port.
pub async fn start_mock_chain() -> (SocketAddr, Arc<MockChain>) {
    let chain = Arc::new(MockChain::new());
    let app = Router::new()
        .route("/rpc", post(http_rpc))
        .route("/query", post(http_rpc))
        .route("/websocket", get(ws_upgrade))
        .route("/queryws", get(ws_upgrade))
        .with_state(chain.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, chain)
}

/// Node that answers every call wrongly, one fault per route.
///
/// - `/slow`: replies after 3 seconds
/// - `/garbage`: replies with a non-JSON body
/// - `/wrong-id`: replies to a different request id
/// - `/unavailable`: HTTP 500
/// - `/ws-silent`: accepts the socket, never answers
/// - `/ws-garbage`: answers every request with an invalid error object
pub async fn start_faulty_node() -> SocketAddr {
    let app = Router::new()
        .route(
            "/slow",
            post(|Json(request): Json<Value>| async move {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(reply(request["id"].clone(), Ok(json!(0))))
            }),
        )
        .route("/garbage", post(|| async { "<html>gateway</html>" }))
        .route(
            "/wrong-id",
            post(|Json(request): Json<Value>| async move {
                let id = request["id"].as_u64().unwrap_or_default() + 1000;
                Json(reply(json!(id), Ok(json!(0))))
            }),
        )
        .route(
            "/unavailable",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "node restarting") }),
        )
        .route(
            "/ws-silent",
            get(|upgrade: WebSocketUpgrade| async move { upgrade.on_upgrade(silent_socket) }),
        )
        .route(
            "/ws-garbage",
            get(|upgrade: WebSocketUpgrade| async move { upgrade.on_upgrade(garbage_socket) }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn silent_socket(mut socket: WebSocket) {
    while let Some(Ok(_)) = socket.recv().await {}
}

async fn garbage_socket(mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else { continue };
        let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        let frame = json!({"jsonrpc": "2.0", "id": request["id"], "error": "boom"});
        if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
            break;
        }
    }
}

pub fn http_config(addr: SocketAddr) -> ClientConfig {
    let mut config = ClientConfig::local_http();
    config.writer = TransportConfig::new(format!("http://{}/rpc", addr), Substrate::Http)
        .with_label("writer")
        .with_timeout_secs(5);
    config.reader = TransportConfig::new(format!("http://{}/query", addr), Substrate::Http)
        .with_label("reader")
        .with_timeout_secs(5);
    config
}

pub fn ws_config(addr: SocketAddr) -> ClientConfig {
    let mut config = ClientConfig::local_websocket();
    config.writer = TransportConfig::new(format!("ws://{}/websocket", addr), Substrate::WebSocket)
        .with_label("writer")
        .with_timeout_secs(5);
    config.reader = TransportConfig::new(format!("ws://{}/queryws", addr), Substrate::WebSocket)
        .with_label("reader")
        .with_timeout_secs(5);
    config
}

/// Wait up to `secs` seconds for the next item on `rx`.
pub async fn next_within<T>(rx: &mut mpsc::UnboundedReceiver<T>, secs: u64) -> Option<T> {
    tokio::time::timeout(Duration::from_secs(secs), rx.recv())
        .await
        .ok()
        .flatten()
}
