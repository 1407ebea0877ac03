//! Node configuration, from command line flags or `LEDGER_*` environment variables

use clap::Parser;

use std::time::Duration;

use crate::blockchain::chain::{LedgerSettings, DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD};

#[derive(Debug, Clone, Parser)]
#[command(name = "pow_ledger", version, about = "Proof-of-work ledger node")]
pub struct NodeConfig {
    /// Interface the HTTP server binds to
    #[arg(long, env = "LEDGER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port the HTTP server listens on
    #[arg(short, long, env = "LEDGER_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Leading zero hex digits required of every mined block
    #[arg(long, env = "LEDGER_DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: usize,

    /// Amount minted to the miner of each block
    #[arg(long, env = "LEDGER_MINING_REWARD", default_value_t = DEFAULT_MINING_REWARD)]
    pub mining_reward: f64,

    /// Base URL of a peer node, repeatable
    #[arg(long = "peer", env = "LEDGER_PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,

    /// URL peers use to reach this node; defaults to http://<host>:<port>
    #[arg(long, env = "LEDGER_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Give up on a block after this many seconds of mining
    #[arg(long, env = "LEDGER_MINING_TIMEOUT_SECS")]
    pub mining_timeout_secs: Option<u64>,

    /// Timeout for fire-and-forget pushes to peers
    #[arg(long, env = "LEDGER_BROADCAST_TIMEOUT_MS", default_value_t = 2000)]
    pub broadcast_timeout_ms: u64,

    /// Timeout for fetching a peer's chain
    #[arg(long, env = "LEDGER_SYNC_TIMEOUT_MS", default_value_t = 10000)]
    pub sync_timeout_ms: u64,
}

impl NodeConfig {
    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            difficulty: self.difficulty,
            mining_reward: self.mining_reward,
        }
    }

    pub fn public_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }

    pub fn mining_timeout(&self) -> Option<Duration> {
        self.mining_timeout_secs.map(Duration::from_secs)
    }

    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_millis(self.broadcast_timeout_ms)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    /// Rejects values the node cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if !self.mining_reward.is_finite() || self.mining_reward < 0.0 {
            return Err(format!("mining reward must be non-negative, got {}", self.mining_reward));
        }
        // a SHA-256 hex digest has 64 digits
        if self.difficulty > 64 {
            return Err(format!("difficulty must be at most 64, got {}", self.difficulty));
        }
        Ok(())
    }
}
