use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::transaction::{epoch_seconds, Transaction};

/// Previous hash sentinel of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Nonces tried between two checks of a `MiningControl`
const CONTROL_CHECK_INTERVAL: u64 = 1024;

/// Reasons a bounded mining run stops without a proof
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MiningError {
    #[error("Mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("Mining deadline exceeded after {attempts} attempts")]
    DeadlineExceeded { attempts: u64 },
}

/// Stop conditions for a mining run
#[derive(Debug, Clone, Default)]
pub struct MiningControl {
    cancel: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl MiningControl {
    pub fn with_deadline(deadline: Instant) -> Self {
        MiningControl {
            cancel: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    #[cfg(test)]
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    fn check(&self, attempts: u64) -> Result<(), MiningError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(MiningError::Cancelled { attempts });
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(MiningError::DeadlineExceeded { attempts })
            }
            _ => Ok(()),
        }
    }
}

/// True if the first `difficulty` hex digits of `hash` are all zero
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Represents a block in the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Index of the block in the chain
    pub index: u64,

    /// Creation time in seconds since the Unix epoch
    pub timestamp: f64,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Proof of work counter
    pub nonce: u64,

    /// Hash of the block as stated by whoever built it
    pub hash: String,

    /// Transactions in block order
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Creates a new unmined block
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `transactions` - The list of transactions to include in the block
    /// * `previous_hash` - The hash of the previous block
    ///
    /// # Returns
    ///
    /// A Block with nonce 0 and its hash already computed
    pub fn new(index: u64, transactions: Vec<Transaction>, previous_hash: String) -> Self {
        let mut block = Block {
            index,
            timestamp: epoch_seconds(),
            previous_hash,
            nonce: 0,
            hash: String::new(),
            transactions,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// The transaction-less first block; never mined
    pub fn genesis() -> Self {
        Block::new(0, Vec::new(), GENESIS_PREVIOUS_HASH.to_string())
    }

    /// Calculates the hash of the block from its current fields
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the block as a hexadecimal string
    pub fn calculate_hash(&self) -> String {
        let mut hasher = Sha256::new();

        let block_data = serde_json::json!({
            "index": self.index,
            "nonce": self.nonce,
            "previous_hash": self.previous_hash,
            "timestamp": self.timestamp,
            "transactions": self.transactions,
        });

        hasher.update(block_data.to_string().as_bytes());

        format!("{:x}", hasher.finalize())
    }

    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    /// Searches nonces until the hash satisfies `difficulty`.
    ///
    /// Runs synchronously with no upper bound on attempts.
    pub fn mine(&mut self, difficulty: usize) -> u64 {
        let mut attempts = 0;
        while !meets_difficulty(&self.hash, difficulty) {
            self.nonce += 1;
            self.hash = self.calculate_hash();
            attempts += 1;
        }
        attempts
    }

    /// Like [`Block::mine`] but gives up when `control` says so.
    ///
    /// On error the block is left unmined and must not be appended.
    pub fn mine_with(
        &mut self,
        difficulty: usize,
        control: &MiningControl,
    ) -> Result<u64, MiningError> {
        let mut attempts = 0;
        while !meets_difficulty(&self.hash, difficulty) {
            if attempts % CONTROL_CHECK_INTERVAL == 0 {
                control.check(attempts)?;
            }
            self.nonce += 1;
            self.hash = self.calculate_hash();
            attempts += 1;
        }
        Ok(attempts)
    }
}
