// Network module
//
// Peer bookkeeping and the transport used to pull chains from peers and to
// push transactions and new-block notices to them.

pub mod client;
pub mod peers;

pub use client::{
    broadcast_new_block, broadcast_transaction, sync_with_peer, HttpPeerClient, PeerTransport,
};
pub use peers::PeerRegistry;
