//! Consistent-hash ring and RPC contract.
//!
//! The engine itself never talks to the network; these traits are the
//! seam the client layer plugs its ring and transport into. The client
//! layer (out of scope here) routes `put` to a key's successor with
//! reconnect-and-retry, fans `get` out to `redundancy()` consecutive
//! successors and keeps the reply with the greatest timestamp (tombstones
//! surface as "not found"), and exposes the tree dump behind a describe
//! call. Repeated transport failures remove the failing peer from the
//! local ring and move on to the next successor.

use crate::errors::StoreError;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::Receiver;

/// One node on the ring: transport address plus ring position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub addr: String,
    pub position: Vec<u8>,
}

/// Membership view of the consistent-hash ring.
pub trait Ring: Send + Sync {
    /// The nodes around `position`: predecessor, exact match if any,
    /// successor.
    fn remotes(&self, position: &[u8]) -> (Peer, Option<Peer>, Peer);

    /// Replace the membership list.
    fn set_nodes(&self, nodes: Vec<Peer>);

    /// Drop a node, typically after repeated transport failures.
    fn remove(&self, node: &Peer);

    /// Replication factor for client reads and writes.
    fn redundancy(&self) -> usize;
}

pub type CallResult = Result<Vec<u8>, StoreError>;

/// Transport to one remote node.
pub trait Remote: Send + Sync {
    /// Synchronous call; the reply is the serialized response payload.
    fn call(&self, method: &str, args: &[u8]) -> CallResult;

    /// Asynchronous call; the returned handle yields the reply when the
    /// transport completes.
    fn go(&self, method: &str, args: &[u8]) -> Receiver<CallResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_serializes() {
        let peer = Peer {
            addr: "10.0.0.1:9000".into(),
            position: vec![0xAB, 0xCD],
        };
        let encoded = bincode::serialize(&peer).unwrap();
        let decoded: Peer = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, peer);
    }
}
