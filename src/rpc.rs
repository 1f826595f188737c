//! The private, node-to-node HTTP v1 surface: status, block range queries,
//! block proposals and transaction/peer gossip. [`ledger_core::HttpPeerTransport`]
//! is this server's client; the wire shapes here are exactly what it sends
//! and expects back.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use ledger_core::{Block, BlockHeight, BlockTx, PeerStatus, Result, StateEngine};
use shared::Address;
use std::str::FromStr;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub struct RpcState {
    pub engine: Arc<StateEngine>,
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

fn error_body(err: impl std::fmt::Display) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({ "error": err.to_string() })).unwrap_or_default()
}

async fn body_bytes(req: Request<Incoming>) -> Result<Bytes> {
    req.collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| shared::BlockchainError::NetworkError(e.to_string()))
}

fn status_payload(state: &RpcState) -> PeerStatus {
    PeerStatus {
        latest_block_hash: state.engine.latest_block_hash(),
        latest_block_number: state.engine.latest_block_number(),
        known_peers: state.engine.peers().known_peers(),
    }
}

fn parse_range(path: &str) -> Option<(BlockHeight, BlockHeight)> {
    let rest = path.strip_prefix("/node/block/list/")?;
    let (from, to) = rest.split_once('/')?;
    Some((from.parse().ok()?, to.parse().ok()?))
}

async fn handle_status(state: &RpcState) -> Response<Full<Bytes>> {
    match serde_json::to_vec(&status_payload(state)) {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(err) => json_response(StatusCode::INTERNAL_SERVER_ERROR, error_body(err)),
    }
}

async fn handle_block_list(state: &RpcState, path: &str) -> Response<Full<Bytes>> {
    let Some((from, to)) = parse_range(path) else {
        return empty_response(StatusCode::BAD_REQUEST);
    };
    match state.engine.query_blocks(from, to) {
        Ok(blocks) if blocks.is_empty() => empty_response(StatusCode::NO_CONTENT),
        Ok(blocks) => match serde_json::to_vec(&blocks) {
            Ok(body) => json_response(StatusCode::OK, body),
            Err(err) => json_response(StatusCode::INTERNAL_SERVER_ERROR, error_body(err)),
        },
        Err(err) => json_response(StatusCode::BAD_REQUEST, error_body(err)),
    }
}

async fn handle_block_propose(state: &RpcState, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let bytes = match body_bytes(req).await {
        Ok(bytes) => bytes,
        Err(err) => return json_response(StatusCode::BAD_REQUEST, error_body(err)),
    };
    let block: Block = match serde_json::from_slice(&bytes) {
        Ok(block) => block,
        Err(err) => return json_response(StatusCode::BAD_REQUEST, error_body(err)),
    };
    match state.engine.process_proposed_block(block) {
        Ok(()) => empty_response(StatusCode::OK),
        Err(err) => {
            warn!(%err, "rejected proposed block");
            json_response(StatusCode::NOT_ACCEPTABLE, error_body(err))
        }
    }
}

async fn handle_tx_submit(state: &RpcState, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let bytes = match body_bytes(req).await {
        Ok(bytes) => bytes,
        Err(err) => return json_response(StatusCode::BAD_REQUEST, error_body(err)),
    };
    let block_tx: BlockTx = match serde_json::from_slice(&bytes) {
        Ok(tx) => tx,
        Err(err) => return json_response(StatusCode::BAD_REQUEST, error_body(err)),
    };
    match state.engine.submit_transaction(block_tx) {
        Ok(hash) => json_response(
            StatusCode::OK,
            serde_json::to_vec(&serde_json::json!({ "hash": hash })).unwrap_or_default(),
        ),
        Err(err) => json_response(StatusCode::BAD_REQUEST, error_body(err)),
    }
}

async fn handle_tx_list(state: &RpcState) -> Response<Full<Bytes>> {
    match serde_json::to_vec(&state.engine.mempool_snapshot(None)) {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(err) => json_response(StatusCode::INTERNAL_SERVER_ERROR, error_body(err)),
    }
}

/// Public wallet-facing read: balance and nonce for a single account,
/// `GET /account/:address`.
async fn handle_account(state: &RpcState, path: &str) -> Response<Full<Bytes>> {
    let Some(raw) = path.strip_prefix("/account/") else {
        return empty_response(StatusCode::BAD_REQUEST);
    };
    let Ok(address) = Address::from_str(raw) else {
        return empty_response(StatusCode::BAD_REQUEST);
    };
    let account = state.engine.account(&address);
    match serde_json::to_vec(&serde_json::json!({
        "balance": account.balance,
        "nonce": account.nonce,
    })) {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(err) => json_response(StatusCode::INTERNAL_SERVER_ERROR, error_body(err)),
    }
}

async fn handle_add_peer(state: &RpcState, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let bytes = match body_bytes(req).await {
        Ok(bytes) => bytes,
        Err(err) => return json_response(StatusCode::BAD_REQUEST, error_body(err)),
    };
    let payload: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(err) => return json_response(StatusCode::BAD_REQUEST, error_body(err)),
    };
    let Some(host) = payload.get("host").and_then(|v| v.as_str()) else {
        return empty_response(StatusCode::BAD_REQUEST);
    };
    state.engine.peers().add(host.to_string());
    empty_response(StatusCode::OK)
}

async fn route(state: Arc<RpcState>, req: Request<Incoming>) -> Result<Response<Full<Bytes>>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/node/status") => handle_status(&state).await,
        (&Method::GET, p) if p.starts_with("/node/block/list/") => handle_block_list(&state, p).await,
        (&Method::POST, "/node/block/propose") => handle_block_propose(&state, req).await,
        (&Method::POST, "/node/tx/submit") => handle_tx_submit(&state, req).await,
        (&Method::GET, "/node/tx/list") => handle_tx_list(&state).await,
        (&Method::POST, "/node/peers") => handle_add_peer(&state, req).await,
        // Public wallet-facing reads: balance/nonce and submit, reusing the
        // same validation path as the node-to-node surface.
        (&Method::GET, p) if p.starts_with("/account/") => handle_account(&state, p).await,
        (&Method::GET, "/mempool") => handle_tx_list(&state).await,
        (&Method::POST, "/tx/submit") => handle_tx_submit(&state, req).await,
        _ => empty_response(StatusCode::NOT_FOUND),
    };
    Ok(response)
}

async fn serve_request(
    state: Arc<RpcState>,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    match route(state, req).await {
        Ok(response) => Ok(response),
        Err(err) => Ok(json_response(StatusCode::INTERNAL_SERVER_ERROR, error_body(err))),
    }
}

/// Serves the private node-to-node API on `addr` until the process exits.
/// Each accepted connection gets its own task, mirroring the teacher's
/// one-connection-per-task hyper server.
///
/// # Errors
///
/// Returns an error if the listening socket can't be bound.
pub async fn serve(addr: SocketAddr, state: Arc<RpcState>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| shared::BlockchainError::IoError(e.to_string()))?;
    info!(%addr, "node RPC listening");

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(%err, "failed to accept connection");
                continue;
            }
        };
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let svc = service_fn(move |req| serve_request(Arc::clone(&state), req));
            if let Err(err) = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(stream), svc)
                .await
            {
                error!(%peer_addr, %err, "connection error");
            }
        });
    }
}
