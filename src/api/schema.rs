use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request for the create wallet endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WalletRequest {
    /// Label of the identity owner
    #[serde(default = "default_owner")]
    pub owner_name: String,
}

fn default_owner() -> String {
    "Anonymous".to_string()
}

/// Request for the create transaction endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The recipient's address
    pub recipient_address: String,

    /// The amount to transfer
    pub amount: f64,
}

/// Request for the mine endpoint
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct MineRequest {
    /// Who receives the reward; the node identity when absent
    #[serde(default)]
    pub reward_address: Option<String>,
}

/// Request naming another node
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PeerRequest {
    /// Base URL of the peer, e.g. http://localhost:5001
    pub peer_url: String,
}

/// Response for the reconcile and sync endpoints
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReconcileResponse {
    pub message: String,
    pub replaced: bool,
    pub old_length: usize,
    pub new_length: usize,
}

/// Body of every error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
