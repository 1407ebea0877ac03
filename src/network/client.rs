use async_trait::async_trait;
use futures::future::join_all;
use log::{info, warn};
use reqwest::Client;
use thiserror::Error;

use std::sync::Arc;
use std::time::Duration;

use crate::blockchain::{ReconcileOutcome, SyncError, Transaction};
use crate::node::{NodeContext, NodeError};

/// Errors that can occur talking to a peer
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("Peer {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },

    #[error("Peer {peer} answered with status {status}")]
    Status { peer: String, status: u16 },
}

/// How a node reaches its peers
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Raw export document of `peer`
    async fn fetch_chain(&self, peer: &str) -> Result<Vec<u8>, PeerError>;

    /// Hands a signed transaction to `peer`
    async fn push_transaction(
        &self,
        peer: &str,
        transaction: &Transaction,
    ) -> Result<(), PeerError>;

    /// Asks `peer` to pull from `origin`
    async fn request_sync(&self, peer: &str, origin: &str) -> Result<(), PeerError>;
}

/// HTTP transport speaking to the `/api/v1` routes of other nodes
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    client: Client,
    broadcast_timeout: Duration,
    sync_timeout: Duration,
}

impl HttpPeerClient {
    pub fn new(broadcast_timeout: Duration, sync_timeout: Duration) -> Self {
        HttpPeerClient {
            client: Client::new(),
            broadcast_timeout,
            sync_timeout,
        }
    }

    fn unreachable(peer: &str, err: reqwest::Error) -> PeerError {
        PeerError::Unreachable {
            peer: peer.to_string(),
            reason: err.to_string(),
        }
    }

    fn check_status(peer: &str, response: &reqwest::Response) -> Result<(), PeerError> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(PeerError::Status {
                peer: peer.to_string(),
                status: response.status().as_u16(),
            })
        }
    }
}

#[async_trait]
impl PeerTransport for HttpPeerClient {
    async fn fetch_chain(&self, peer: &str) -> Result<Vec<u8>, PeerError> {
        let response = self
            .client
            .get(format!("{}/api/v1/blockchain/export", peer))
            .timeout(self.sync_timeout)
            .send()
            .await
            .map_err(|e| Self::unreachable(peer, e))?;
        Self::check_status(peer, &response)?;

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::unreachable(peer, e))?;
        Ok(body.to_vec())
    }

    async fn push_transaction(
        &self,
        peer: &str,
        transaction: &Transaction,
    ) -> Result<(), PeerError> {
        let response = self
            .client
            .post(format!("{}/api/v1/transaction/receive", peer))
            .timeout(self.broadcast_timeout)
            .json(transaction)
            .send()
            .await
            .map_err(|e| Self::unreachable(peer, e))?;
        Self::check_status(peer, &response)
    }

    async fn request_sync(&self, peer: &str, origin: &str) -> Result<(), PeerError> {
        let response = self
            .client
            .post(format!("{}/api/v1/blockchain/sync", peer))
            .timeout(self.broadcast_timeout)
            .json(&serde_json::json!({ "peer_url": origin }))
            .send()
            .await
            .map_err(|e| Self::unreachable(peer, e))?;
        Self::check_status(peer, &response)
    }
}

/// Pulls `peer`'s chain and reconciles the local one against it
pub async fn sync_with_peer(
    node: Arc<NodeContext>,
    transport: &dyn PeerTransport,
    peer: &str,
) -> Result<ReconcileOutcome, NodeError> {
    info!("Syncing with {}", peer);

    let payload = transport
        .fetch_chain(peer)
        .await
        .map_err(|e| SyncError::PeerUnreachable(e.to_string()))?;

    // waits for the writer lock, which mining may hold for a while
    tokio::task::spawn_blocking(move || node.reconcile_payload(&payload))
        .await
        .map_err(|e| SyncError::PeerUnreachable(format!("sync task failed: {}", e)))?
}

/// Pushes `transaction` to every peer; returns how many accepted it
pub async fn push_transaction_to_peers(
    transport: &dyn PeerTransport,
    peers: &[String],
    transaction: &Transaction,
) -> usize {
    let results = join_all(
        peers
            .iter()
            .map(|peer| transport.push_transaction(peer, transaction)),
    )
    .await;

    count_delivered(results)
}

/// Asks every peer to pull from `origin`; returns how many acknowledged
pub async fn request_sync_from_peers(
    transport: &dyn PeerTransport,
    peers: &[String],
    origin: &str,
) -> usize {
    let results = join_all(peers.iter().map(|peer| transport.request_sync(peer, origin))).await;

    count_delivered(results)
}

fn count_delivered(results: Vec<Result<(), PeerError>>) -> usize {
    results
        .into_iter()
        .filter(|result| match result {
            Ok(()) => true,
            Err(err) => {
                warn!("Broadcast failed: {}", err);
                false
            }
        })
        .count()
}

/// Fire-and-forget transaction broadcast
pub fn broadcast_transaction(
    transport: Arc<dyn PeerTransport>,
    peers: Vec<String>,
    transaction: Transaction,
) {
    if peers.is_empty() {
        return;
    }
    tokio::spawn(async move {
        let delivered = push_transaction_to_peers(transport.as_ref(), &peers, &transaction).await;
        info!("Transaction delivered to {}/{} peers", delivered, peers.len());
    });
}

/// Fire-and-forget notice that a new block exists at `origin`
pub fn broadcast_new_block(transport: Arc<dyn PeerTransport>, peers: Vec<String>, origin: String) {
    if peers.is_empty() {
        return;
    }
    tokio::spawn(async move {
        let delivered = request_sync_from_peers(transport.as_ref(), &peers, &origin).await;
        info!("Sync requested from {}/{} peers", delivered, peers.len());
    });
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::blockchain::{Address, LedgerSettings};

    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory transport: peers are node contexts keyed by URL
    #[derive(Default)]
    pub(crate) struct LocalTransport {
        pub(crate) nodes: HashMap<String, Arc<NodeContext>>,
        pub(crate) sync_requests: Mutex<Vec<(String, String)>>,
    }

    impl LocalTransport {
        fn node(&self, peer: &str) -> Result<&Arc<NodeContext>, PeerError> {
            self.nodes.get(peer).ok_or_else(|| PeerError::Unreachable {
                peer: peer.to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    #[async_trait]
    impl PeerTransport for LocalTransport {
        async fn fetch_chain(&self, peer: &str) -> Result<Vec<u8>, PeerError> {
            let export = self.node(peer)?.export_chain();
            Ok(serde_json::to_vec(&export).unwrap())
        }

        async fn push_transaction(
            &self,
            peer: &str,
            transaction: &Transaction,
        ) -> Result<(), PeerError> {
            self.node(peer)?
                .receive_transaction(transaction.clone())
                .map(|_| ())
                .map_err(|_| PeerError::Status {
                    peer: peer.to_string(),
                    status: 400,
                })
        }

        async fn request_sync(&self, peer: &str, origin: &str) -> Result<(), PeerError> {
            self.node(peer)?;
            self.sync_requests
                .lock()
                .unwrap()
                .push((peer.to_string(), origin.to_string()));
            Ok(())
        }
    }

    fn node() -> Arc<NodeContext> {
        Arc::new(NodeContext::new(LedgerSettings::default(), None))
    }

    #[tokio::test]
    async fn test_sync_with_longer_peer() {
        let local = node();
        local.mine_block(Some(Address::from("local"))).unwrap();

        let remote = node();
        for _ in 0..3 {
            remote.mine_block(Some(Address::from("remote"))).unwrap();
        }

        let mut transport = LocalTransport::default();
        transport.nodes.insert("http://remote".to_string(), remote.clone());

        let outcome = sync_with_peer(local.clone(), &transport, "http://remote")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Replaced {
                old_length: 2,
                new_length: 4
            }
        );
        assert_eq!(local.snapshot().chain(), remote.snapshot().chain());

        // a second pull finds nothing new
        let outcome = sync_with_peer(local.clone(), &transport, "http://remote")
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::AlreadyUpToDate { length: 4 });
    }

    #[tokio::test]
    async fn test_sync_with_unreachable_peer() {
        let local = node();
        let transport = LocalTransport::default();

        let result = sync_with_peer(local.clone(), &transport, "http://nowhere").await;

        assert!(matches!(
            result,
            Err(NodeError::Sync(SyncError::PeerUnreachable(_)))
        ));
        assert_eq!(local.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_push_transaction_swallows_failures() {
        let sender = node();
        sender.create_identity("alice").unwrap();
        sender.mine_block(None).unwrap();
        let transaction = sender.create_transaction(Address::from("bob"), 3.0).unwrap();

        let funded = node();
        funded.reconcile_with(sender.snapshot().chain().to_vec()).unwrap();
        let unfunded = node();

        let mut transport = LocalTransport::default();
        transport.nodes.insert("http://funded".to_string(), funded.clone());
        transport.nodes.insert("http://unfunded".to_string(), unfunded.clone());

        let peers = vec![
            "http://funded".to_string(),
            "http://unfunded".to_string(),
            "http://offline".to_string(),
        ];
        let delivered = push_transaction_to_peers(&transport, &peers, &transaction).await;

        assert_eq!(delivered, 1);
        assert_eq!(funded.pending_transactions(), vec![transaction]);
        assert!(unfunded.pending_transactions().is_empty());
    }

    #[tokio::test]
    async fn test_request_sync_from_peers() {
        let mut transport = LocalTransport::default();
        transport.nodes.insert("http://a".to_string(), node());

        let peers = vec!["http://a".to_string(), "http://b".to_string()];
        let delivered = request_sync_from_peers(&transport, &peers, "http://me").await;

        assert_eq!(delivered, 1);
        assert_eq!(
            transport.sync_requests.lock().unwrap().as_slice(),
            &[("http://a".to_string(), "http://me".to_string())]
        );
    }
}
