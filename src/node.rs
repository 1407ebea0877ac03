//! Node context: one ledger, at most one identity, and the operations the
//! HTTP shell exposes.
//!
//! Every mutation goes through a single writer lock. After each successful
//! mutation a fresh snapshot is published, so reads never wait for mining.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::blockchain::sync::parse_export;
use crate::blockchain::{
    Address, BalanceCache, Block, ChainExport, CryptoError, Identity, Ledger, LedgerError,
    LedgerSettings, MiningControl, ReconcileOutcome, SyncError, Transaction, TransactionError,
};

/// Errors surfaced by node operations
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("No identity on this node, create one first")]
    NoIdentity,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

/// Public facts about the node identity
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IdentityInfo {
    pub owner: String,
    pub address: String,
    pub balance: f64,
}

/// Summary of a freshly mined block
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MinedBlock {
    pub reward: f64,
    pub reward_address: String,
    pub balance_before: f64,
    pub new_balance: f64,
    pub blocks_count: usize,
    pub block_index: u64,
    pub block_hash: String,
    pub transactions_in_block: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BlockSummary {
    pub index: u64,
    pub timestamp: String,
    pub transactions: usize,
    pub hash: String,
    pub previous_hash: String,
    pub nonce: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChainSummary {
    pub length: usize,
    pub chain: Vec<BlockSummary>,
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionView {
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BlockDetail {
    pub index: u64,
    pub timestamp: String,
    pub transactions: Vec<TransactionView>,
    pub hash: String,
    pub previous_hash: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FullChain {
    pub chain: Vec<BlockDetail>,
}

/// What happened to a transaction pushed by a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReceiveOutcome {
    Admitted { block_index: u64 },
    Duplicate,
}

/// Renders epoch seconds the way the chain views show them
pub fn format_timestamp(timestamp: f64) -> String {
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1_000_000_000.0) as u32;

    DateTime::<Utc>::from_timestamp(secs as i64, nanos)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn same_transfer(a: &Transaction, b: &Transaction) -> bool {
    a.sender_address == b.sender_address
        && a.recipient_address == b.recipient_address
        && a.amount == b.amount
        && a.timestamp == b.timestamp
}

/// Everything one node owns
#[derive(Debug)]
pub struct NodeContext {
    writer: Mutex<Ledger>,
    snapshot: RwLock<Arc<Ledger>>,
    identity: RwLock<Option<Arc<Identity>>>,
    balances: BalanceCache,
    mining_timeout: Option<Duration>,
}

impl NodeContext {
    /// Creates a node holding only the genesis block and no identity
    pub fn new(settings: LedgerSettings, mining_timeout: Option<Duration>) -> Self {
        let ledger = Ledger::with_settings(settings);

        NodeContext {
            snapshot: RwLock::new(Arc::new(ledger.clone())),
            writer: Mutex::new(ledger),
            identity: RwLock::new(None),
            balances: BalanceCache::new(),
            mining_timeout,
        }
    }

    /// Latest published state; cheap and never blocked by mining
    pub fn snapshot(&self) -> Arc<Ledger> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_writer(&self) -> MutexGuard<'_, Ledger> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, ledger: &Ledger) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(ledger.clone());
    }

    pub fn identity(&self) -> Option<Arc<Identity>> {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn require_identity(&self) -> Result<Arc<Identity>, NodeError> {
        self.identity().ok_or(NodeError::NoIdentity)
    }

    /// Generates a key pair for `owner`, replacing any previous identity
    pub fn create_identity(&self, owner: &str) -> Result<IdentityInfo, NodeError> {
        let identity = Arc::new(Identity::generate(owner)?);
        info!("Created identity {} for {}", identity.address(), owner);

        *self.identity.write().unwrap_or_else(PoisonError::into_inner) = Some(identity.clone());
        Ok(self.info_for(&identity))
    }

    pub fn identity_info(&self) -> Result<IdentityInfo, NodeError> {
        let identity = self.require_identity()?;
        Ok(self.info_for(&identity))
    }

    fn info_for(&self, identity: &Identity) -> IdentityInfo {
        IdentityInfo {
            owner: identity.owner().to_string(),
            address: identity.address().to_string(),
            balance: self.balance(identity.address()),
        }
    }

    /// Committed balance of `address`
    pub fn balance(&self, address: &Address) -> f64 {
        self.balances.balance(&self.snapshot(), address)
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.snapshot().mempool().to_vec()
    }

    /// Creates, signs and admits a transfer from the node identity.
    ///
    /// # Returns
    ///
    /// The signed transaction, ready to be pushed to peers
    pub fn create_transaction(
        &self,
        recipient: Address,
        amount: f64,
    ) -> Result<Transaction, NodeError> {
        let identity = self.require_identity()?;

        let mut transaction = Transaction::new(
            identity.address().clone(),
            recipient,
            amount,
            identity.export_public_key().to_string(),
        );
        transaction.sign(&identity)?;

        let mut ledger = self.lock_writer();
        ledger.add_transaction(transaction.clone()).map_err(|err| {
            warn!("Rejected local transaction: {}", err);
            err
        })?;
        self.publish(&ledger);

        info!(
            "Transaction created: {} -> {} ({})",
            transaction.sender_address, transaction.recipient_address, transaction.amount
        );
        Ok(transaction)
    }

    /// Admits a transaction pushed by a peer unless the mempool already holds
    /// one with the same sender, recipient, amount and timestamp
    pub fn receive_transaction(
        &self,
        transaction: Transaction,
    ) -> Result<ReceiveOutcome, NodeError> {
        let mut ledger = self.lock_writer();

        if ledger
            .mempool()
            .iter()
            .any(|pending| same_transfer(pending, &transaction))
        {
            info!("Ignoring duplicate transaction from {}", transaction.sender_address);
            return Ok(ReceiveOutcome::Duplicate);
        }

        let block_index = ledger.add_transaction(transaction).map_err(|err| {
            warn!("Rejected remote transaction: {}", err);
            err
        })?;
        self.publish(&ledger);

        Ok(ReceiveOutcome::Admitted { block_index })
    }

    /// [`NodeContext::receive_transaction`] for an undecoded payload
    pub fn receive_payload(&self, payload: &[u8]) -> Result<ReceiveOutcome, NodeError> {
        let transaction: Transaction = serde_json::from_slice(payload)
            .map_err(|e| NodeError::MalformedPayload(e.to_string()))?;
        self.receive_transaction(transaction)
    }

    /// Mines the mempool into a block rewarding `reward_address`, or the node
    /// identity when none is given. Blocks the calling thread.
    pub fn mine_block(&self, reward_address: Option<Address>) -> Result<MinedBlock, NodeError> {
        let reward_address = match reward_address {
            Some(address) => address,
            None => self.require_identity()?.address().clone(),
        };

        let mut ledger = self.lock_writer();
        let balance_before = ledger.get_balance(&reward_address);

        // the deadline runs from lock acquisition, not from the request
        let block = match self.mining_timeout {
            Some(timeout) => {
                let control = MiningControl::with_deadline(Instant::now() + timeout);
                ledger.mine_pending_with(&reward_address, &control)?
            }
            None => ledger.mine_pending(&reward_address),
        };
        self.publish(&ledger);

        Ok(MinedBlock {
            reward: ledger.mining_reward(),
            reward_address: reward_address.to_string(),
            balance_before,
            new_balance: ledger.get_balance(&reward_address),
            blocks_count: ledger.len(),
            block_index: block.index,
            block_hash: block.hash,
            transactions_in_block: block.transactions.len(),
        })
    }

    pub fn chain_summary(&self) -> ChainSummary {
        let ledger = self.snapshot();

        ChainSummary {
            length: ledger.len(),
            chain: ledger
                .chain()
                .iter()
                .map(|block| BlockSummary {
                    index: block.index,
                    timestamp: format_timestamp(block.timestamp),
                    transactions: block.transactions.len(),
                    hash: block.hash.clone(),
                    previous_hash: block.previous_hash.clone(),
                    nonce: block.nonce,
                })
                .collect(),
            valid: ledger.is_chain_valid(),
        }
    }

    pub fn full_chain(&self) -> FullChain {
        let ledger = self.snapshot();

        FullChain {
            chain: ledger
                .chain()
                .iter()
                .map(|block| BlockDetail {
                    index: block.index,
                    timestamp: format_timestamp(block.timestamp),
                    transactions: block
                        .transactions
                        .iter()
                        .map(|transaction| TransactionView {
                            sender: transaction.sender_address.to_string(),
                            recipient: transaction.recipient_address.to_string(),
                            amount: transaction.amount,
                            timestamp: format_timestamp(transaction.timestamp),
                        })
                        .collect(),
                    hash: block.hash.clone(),
                    previous_hash: block.previous_hash.clone(),
                })
                .collect(),
        }
    }

    pub fn export_chain(&self) -> ChainExport {
        self.snapshot().export()
    }

    /// Adopts `candidate` if it is longer and structurally valid
    pub fn reconcile_with(&self, candidate: Vec<Block>) -> Result<ReconcileOutcome, NodeError> {
        let mut ledger = self.lock_writer();
        let outcome = ledger.reconcile(candidate)?;

        if let ReconcileOutcome::Replaced { .. } = outcome {
            self.publish(&ledger);
            self.balances.clear();
        }
        Ok(outcome)
    }

    /// [`NodeContext::reconcile_with`] for an undecoded export payload
    pub fn reconcile_payload(&self, payload: &[u8]) -> Result<ReconcileOutcome, NodeError> {
        let candidate = parse_export(payload)?;
        self.reconcile_with(candidate)
    }
}
