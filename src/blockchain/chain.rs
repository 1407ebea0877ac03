use log::{info, warn};
use thiserror::Error;

use super::block::{Block, MiningControl, MiningError};
use super::crypto::Address;
use super::transaction::{Transaction, TransactionError};

/// Leading zero hex digits required by default
pub const DEFAULT_DIFFICULTY: usize = 2;

/// Amount minted per block by default
pub const DEFAULT_MINING_REWARD: f64 = 10.0;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(#[from] TransactionError),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Mining aborted: {0}")]
    Mining(#[from] MiningError),
}

/// Tunables fixed at ledger creation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerSettings {
    pub difficulty: usize,
    pub mining_reward: f64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            difficulty: DEFAULT_DIFFICULTY,
            mining_reward: DEFAULT_MINING_REWARD,
        }
    }
}

/// A chain of blocks plus the transactions waiting for the next one
#[derive(Debug, Clone)]
pub struct Ledger {
    chain: Vec<Block>,
    mempool: Vec<Transaction>,
    settings: LedgerSettings,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Creates a ledger holding only the genesis block
    pub fn new() -> Self {
        Self::with_settings(LedgerSettings::default())
    }

    pub fn with_settings(settings: LedgerSettings) -> Self {
        Ledger {
            chain: vec![Block::genesis()],
            mempool: Vec::new(),
            settings,
        }
    }

    pub fn difficulty(&self) -> usize {
        self.settings.difficulty
    }

    pub fn mining_reward(&self) -> f64 {
        self.settings.mining_reward
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn mempool(&self) -> &[Transaction] {
        &self.mempool
    }

    /// The tip of the chain; the genesis block guarantees there is one
    pub fn latest_block(&self) -> &Block {
        &self.chain[self.chain.len() - 1]
    }

    /// Validates `transaction` and appends it to the mempool
    ///
    /// The balance check looks at committed blocks only, so two pending
    /// transfers may together spend more than the sender holds.
    ///
    /// # Returns
    ///
    /// The index of the block that will include this transaction
    pub fn add_transaction(&mut self, transaction: Transaction) -> Result<u64, LedgerError> {
        transaction.verify()?;

        if !transaction.amount.is_finite() || transaction.amount < 0.0 {
            return Err(LedgerError::InvalidAmount(transaction.amount));
        }

        if !transaction.is_reward() {
            let available = self.get_balance(&transaction.sender_address);
            if available < transaction.amount {
                return Err(LedgerError::InsufficientFunds {
                    required: transaction.amount,
                    available,
                });
            }
        }

        self.mempool.push(transaction);
        Ok(self.chain.len() as u64)
    }

    /// Mines the mempool plus a reward for `reward_address` into a new block
    pub fn mine_pending(&mut self, reward_address: &Address) -> Block {
        let mut block = self.assemble_block(reward_address);
        let attempts = block.mine(self.settings.difficulty);
        self.commit(block, attempts)
    }

    /// Mines the mempool plus a reward into a new block, honouring `control`.
    ///
    /// On abort chain and mempool are left exactly as they were.
    pub fn mine_pending_with(
        &mut self,
        reward_address: &Address,
        control: &MiningControl,
    ) -> Result<Block, LedgerError> {
        let mut block = self.assemble_block(reward_address);

        let attempts = block
            .mine_with(self.settings.difficulty, control)
            .map_err(|err| {
                warn!("Mining of block {} aborted: {}", block.index, err);
                err
            })?;

        Ok(self.commit(block, attempts))
    }

    /// Snapshot of the mempool followed by this block's reward
    fn assemble_block(&self, reward_address: &Address) -> Block {
        let mut transactions = self.mempool.clone();
        transactions.push(Transaction::new_reward(
            reward_address.clone(),
            self.settings.mining_reward,
        ));

        let block = Block::new(
            self.chain.len() as u64,
            transactions,
            self.latest_block().hash.clone(),
        );

        info!(
            "Mining block {} with {} transactions at difficulty {}",
            block.index,
            block.transactions.len(),
            self.settings.difficulty
        );

        block
    }

    // Append and clear happen together; nothing else touches the ledger in between.
    fn commit(&mut self, block: Block, attempts: u64) -> Block {
        info!("Mined block {} after {} attempts: {}", block.index, attempts, block.hash);

        self.chain.push(block.clone());
        self.mempool.clear();
        block
    }

    /// Signed sum of every committed credit and debit of `address`
    pub fn get_balance(&self, address: &Address) -> f64 {
        let mut balance = 0.0;

        for block in &self.chain {
            for transaction in &block.transactions {
                if &transaction.sender_address == address {
                    balance -= transaction.amount;
                }
                if &transaction.recipient_address == address {
                    balance += transaction.amount;
                }
            }
        }

        balance
    }

    /// Full integrity check of every block after genesis: stored hash,
    /// linkage and every transaction's signature.
    pub fn is_chain_valid(&self) -> bool {
        self.chain.windows(2).all(|pair| {
            let (previous, current) = (&pair[0], &pair[1]);

            current.has_valid_hash()
                && current.previous_hash == previous.hash
                && current.transactions.iter().all(Transaction::is_valid)
        })
    }

    /// Swaps in `chain` wholesale and discards the mempool
    pub(crate) fn replace_chain(&mut self, chain: Vec<Block>) {
        self.chain = chain;
        self.mempool.clear();
    }

    #[cfg(test)]
    pub(crate) fn chain_mut(&mut self) -> &mut Vec<Block> {
        &mut self.chain
    }
}
