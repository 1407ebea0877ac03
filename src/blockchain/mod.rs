// Blockchain module
//
// This module contains the ledger engine:
// - Identity key pairs and signatures
// - Transaction structure and validation
// - Block hashing and proof of work
// - Ledger (chain + mempool) and derived balances
// - Chain export and reconciliation

pub mod balance;
pub mod block;
pub mod chain;
pub mod crypto;
pub mod sync;
pub mod transaction;

// Re-export main components for easier access
pub use balance::BalanceCache;
pub use block::{Block, MiningControl};
pub use chain::{Ledger, LedgerError, LedgerSettings};
pub use crypto::{Address, CryptoError, DigitalSignature, Identity};
pub use sync::{ChainExport, ReconcileOutcome, SyncError};
pub use transaction::{Transaction, TransactionError};
