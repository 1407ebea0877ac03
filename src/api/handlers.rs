use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use std::sync::Arc;

use super::schema::{
    ErrorResponse, MineRequest, PeerRequest, ReconcileResponse, TransactionRequest, WalletRequest,
};
use crate::blockchain::{Address, LedgerError, ReconcileOutcome, SyncError};
use crate::network::{self, PeerRegistry, PeerTransport};
use crate::node::{format_timestamp, NodeContext, NodeError, ReceiveOutcome};

/// Shared state of every handler
pub struct AppState {
    pub node: Arc<NodeContext>,
    pub peers: PeerRegistry,
    pub transport: Arc<dyn PeerTransport>,
    /// URL peers use to reach this node
    pub public_url: String,
}

pub type AppData = web::Data<AppState>;

impl ResponseError for NodeError {
    fn status_code(&self) -> StatusCode {
        match self {
            NodeError::NoIdentity
            | NodeError::MalformedPayload(_)
            | NodeError::Transaction(_) => StatusCode::BAD_REQUEST,
            NodeError::Ledger(LedgerError::Mining(_)) => StatusCode::SERVICE_UNAVAILABLE,
            NodeError::Ledger(_) => StatusCode::BAD_REQUEST,
            NodeError::Sync(SyncError::PeerUnreachable(_)) => StatusCode::BAD_GATEWAY,
            NodeError::Sync(_) => StatusCode::BAD_REQUEST,
            NodeError::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

/// Response for the wallet endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    pub message: String,
    pub owner: String,
    pub address: String,
    pub balance: f64,
}

/// A transaction as shown to the user who created it
#[derive(Serialize, Deserialize, ToSchema)]
pub struct CreatedTransaction {
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
    pub timestamp: String,
}

/// Response for the create transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub message: String,
    pub transaction: CreatedTransaction,
    pub pending_count: usize,
}

/// Response for the balance endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: f64,
}

/// Response for the peer endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct PeersResponse {
    pub peers: Vec<String>,
}

fn blank_peer_url() -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        error: "peer_url must not be empty".to_string(),
    })
}

// An empty body means "use the defaults"; anything else must parse.
fn parse_mine_request(body: &[u8]) -> Result<MineRequest, NodeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(MineRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| NodeError::MalformedPayload(e.to_string()))
}

fn reconcile_response(outcome: ReconcileOutcome) -> ReconcileResponse {
    match outcome {
        ReconcileOutcome::Replaced {
            old_length,
            new_length,
        } => ReconcileResponse {
            message: "Blockchain synchronized".to_string(),
            replaced: true,
            old_length,
            new_length,
        },
        ReconcileOutcome::AlreadyUpToDate { length } => ReconcileResponse {
            message: "Local blockchain is already up to date".to_string(),
            replaced: false,
            old_length: length,
            new_length: length,
        },
    }
}

/// Create the node wallet
///
/// Generates a fresh key pair, replacing any previous one
#[utoipa::path(
    post,
    path = "/api/v1/wallet/create",
    request_body = WalletRequest,
    responses(
        (status = 201, description = "Wallet created successfully", body = WalletResponse),
        (status = 500, description = "Key generation failed", body = ErrorResponse)
    )
)]
pub async fn create_wallet(
    data: AppData,
    request: web::Json<WalletRequest>,
) -> actix_web::Result<HttpResponse> {
    let node = data.node.clone();
    let owner = request.into_inner().owner_name;

    let info = web::block(move || node.create_identity(&owner)).await??;

    Ok(HttpResponse::Created().json(WalletResponse {
        message: "Wallet created".to_string(),
        owner: info.owner,
        address: info.address,
        balance: info.balance,
    }))
}

/// Get the node wallet
#[utoipa::path(
    get,
    path = "/api/v1/wallet/info",
    responses(
        (status = 200, description = "Wallet address and balance", body = IdentityInfo),
        (status = 400, description = "No wallet on this node", body = ErrorResponse)
    )
)]
pub async fn wallet_info(data: AppData) -> actix_web::Result<HttpResponse> {
    let info = data.node.identity_info()?;
    Ok(HttpResponse::Ok().json(info))
}

/// Create a new transaction
///
/// Signs a transfer from the node wallet, admits it locally and pushes it to peers
#[utoipa::path(
    post,
    path = "/api/v1/transaction/create",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction created and propagated", body = TransactionResponse),
        (status = 400, description = "Invalid transaction", body = ErrorResponse)
    )
)]
pub async fn create_transaction(
    data: AppData,
    request: web::Json<TransactionRequest>,
) -> actix_web::Result<HttpResponse> {
    let node = data.node.clone();
    let TransactionRequest {
        recipient_address,
        amount,
    } = request.into_inner();

    let transaction =
        web::block(move || node.create_transaction(Address(recipient_address), amount)).await??;

    network::broadcast_transaction(data.transport.clone(), data.peers.list(), transaction.clone());

    Ok(HttpResponse::Created().json(TransactionResponse {
        message: "Transaction created and propagated".to_string(),
        transaction: CreatedTransaction {
            sender: transaction.sender_address.to_string(),
            recipient: transaction.recipient_address.to_string(),
            amount: transaction.amount,
            timestamp: format_timestamp(transaction.timestamp),
        },
        pending_count: data.node.pending_transactions().len(),
    }))
}

/// Receive a transaction from another node
#[utoipa::path(
    post,
    path = "/api/v1/transaction/receive",
    request_body = Transaction,
    responses(
        (status = 200, description = "Transaction admitted or already known"),
        (status = 400, description = "Malformed or invalid transaction", body = ErrorResponse)
    )
)]
pub async fn receive_transaction(
    data: AppData,
    body: web::Bytes,
) -> actix_web::Result<HttpResponse> {
    let node = data.node.clone();

    let outcome = web::block(move || node.receive_payload(&body)).await??;

    let message = match outcome {
        ReceiveOutcome::Admitted { .. } => "Transaction received",
        ReceiveOutcome::Duplicate => "Transaction already known",
    };
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": message,
        "result": outcome,
    })))
}

/// Get all pending transactions
#[utoipa::path(
    get,
    path = "/api/v1/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(data: AppData) -> HttpResponse {
    HttpResponse::Ok().json(data.node.pending_transactions())
}

/// Mine a new block
///
/// Includes every pending transaction plus the reward, then notifies peers
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    request_body = MineRequest,
    responses(
        (status = 200, description = "Block mined successfully", body = MinedBlock),
        (status = 400, description = "Malformed body or no reward address", body = ErrorResponse),
        (status = 503, description = "Mining deadline exceeded", body = ErrorResponse)
    )
)]
pub async fn mine_block(data: AppData, body: web::Bytes) -> actix_web::Result<HttpResponse> {
    let node = data.node.clone();
    let reward_address = parse_mine_request(&body)?.reward_address.map(Address);

    let mined = web::block(move || node.mine_block(reward_address)).await??;

    network::broadcast_new_block(
        data.transport.clone(),
        data.peers.list(),
        data.public_url.clone(),
    );

    Ok(HttpResponse::Ok().json(mined))
}

/// Get the chain summary
#[utoipa::path(
    get,
    path = "/api/v1/blockchain",
    responses(
        (status = 200, description = "Per-block summary and validity", body = ChainSummary)
    )
)]
pub async fn get_blockchain(data: AppData) -> HttpResponse {
    HttpResponse::Ok().json(data.node.chain_summary())
}

/// Get the chain with transactions expanded
#[utoipa::path(
    get,
    path = "/api/v1/blockchain/full",
    responses(
        (status = 200, description = "Every block with its transactions", body = FullChain)
    )
)]
pub async fn get_full_blockchain(data: AppData) -> HttpResponse {
    HttpResponse::Ok().json(data.node.full_chain())
}

/// Export the chain for synchronization
#[utoipa::path(
    get,
    path = "/api/v1/blockchain/export",
    responses(
        (status = 200, description = "Complete chain with signatures", body = ChainExport)
    )
)]
pub async fn export_blockchain(data: AppData) -> HttpResponse {
    HttpResponse::Ok().json(data.node.export_chain())
}

/// Pull a peer's chain and adopt it if longer
#[utoipa::path(
    post,
    path = "/api/v1/blockchain/sync",
    request_body = PeerRequest,
    responses(
        (status = 200, description = "Chain synchronized or already up to date", body = ReconcileResponse),
        (status = 400, description = "Empty peer URL or invalid peer chain", body = ErrorResponse),
        (status = 502, description = "Peer unreachable", body = ErrorResponse)
    )
)]
pub async fn sync_blockchain(
    data: AppData,
    request: web::Json<PeerRequest>,
) -> actix_web::Result<HttpResponse> {
    let peer = request.peer_url.trim().trim_end_matches('/');
    if peer.is_empty() {
        return Ok(blank_peer_url());
    }

    let outcome = network::sync_with_peer(data.node.clone(), data.transport.as_ref(), peer).await?;

    Ok(HttpResponse::Ok().json(reconcile_response(outcome)))
}

/// Reconcile against a chain supplied in the request body
#[utoipa::path(
    post,
    path = "/api/v1/blockchain/reconcile",
    request_body = ChainExport,
    responses(
        (status = 200, description = "Chain replaced or already up to date", body = ReconcileResponse),
        (status = 400, description = "Candidate chain is malformed or invalid", body = ErrorResponse)
    )
)]
pub async fn reconcile_blockchain(
    data: AppData,
    body: web::Bytes,
) -> actix_web::Result<HttpResponse> {
    let node = data.node.clone();

    let outcome = web::block(move || node.reconcile_payload(&body)).await??;

    Ok(HttpResponse::Ok().json(reconcile_response(outcome)))
}

/// Get the balance of an address
#[utoipa::path(
    get,
    path = "/api/v1/balance/{address}",
    params(
        ("address" = String, Path, description = "Address to look up")
    ),
    responses(
        (status = 200, description = "Committed balance", body = BalanceResponse)
    )
)]
pub async fn get_balance(data: AppData, address: web::Path<String>) -> HttpResponse {
    let address = Address(address.into_inner());
    let balance = data.node.balance(&address);

    HttpResponse::Ok().json(BalanceResponse {
        address: address.0,
        balance,
    })
}

/// Register a peer node
#[utoipa::path(
    post,
    path = "/api/v1/peers/register",
    request_body = PeerRequest,
    responses(
        (status = 201, description = "Peer registered", body = PeersResponse),
        (status = 400, description = "Empty peer URL", body = ErrorResponse)
    )
)]
pub async fn register_peer(data: AppData, request: web::Json<PeerRequest>) -> HttpResponse {
    if request.peer_url.trim().is_empty() {
        return blank_peer_url();
    }

    data.peers.register(&request.peer_url);
    HttpResponse::Created().json(PeersResponse {
        peers: data.peers.list(),
    })
}

/// List known peers
#[utoipa::path(
    get,
    path = "/api/v1/peers",
    responses(
        (status = 200, description = "Known peers", body = PeersResponse)
    )
)]
pub async fn get_peers(data: AppData) -> HttpResponse {
    HttpResponse::Ok().json(PeersResponse {
        peers: data.peers.list(),
    })
}
