//! facts committee members vote on
//!
//! a proposal is identified by the content hash of its claim, so members
//! who observed the same fact land on the same proposal.

use serde::{Deserialize, Serialize};

use crate::crypto::ContentHasher;
use crate::types::{Address, Balance, EpochId, PublicKey, H256};

pub trait Claim {
    fn content_hash(&self) -> H256;
}

/// outcome of an off-chain key generation round
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeygenResult {
    pub epoch_id: EpochId,
    /// generated group key
    pub pubkey: PublicKey,
    /// members that broke the round; non-empty means failure
    pub blames: Vec<Address>,
    /// recoverable signature (r || s || v) over keccak256(pubkey)
    ///
    /// not part of the content hash: ecdsa nonces differ per submission.
    pub signature: Vec<u8>,
}

impl KeygenResult {
    pub fn is_failure(&self) -> bool {
        !self.blames.is_empty()
    }
}

impl Claim for KeygenResult {
    fn content_hash(&self) -> H256 {
        let mut h = ContentHasher::new(b"keygen");
        h.u64(self.epoch_id).fixed(&self.pubkey.0);
        h.u64(self.blames.len() as u64);
        for b in &self.blames {
            h.fixed(&b.0);
        }
        h.finish()
    }
}

/// gas price observation for a connected chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkFee {
    pub chain: u64,
    pub height: u64,
    pub transaction_rate: u128,
    pub transaction_size: u128,
}

impl Claim for NetworkFee {
    fn content_hash(&self) -> H256 {
        let mut h = ContentHasher::new(b"network-fee");
        h.u64(self.chain)
            .u64(self.height)
            .u128(self.transaction_rate)
            .u128(self.transaction_size);
        h.finish()
    }
}

/// inbound cross-chain transfer seen on a source chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub from_chain: u64,
    pub to_chain: u64,
    pub tx_hash: H256,
    pub height: u64,
    pub token: Vec<u8>,
    pub amount: Balance,
    pub from: Vec<u8>,
    pub to: Vec<u8>,
}

impl Claim for TxIn {
    fn content_hash(&self) -> H256 {
        let mut h = ContentHasher::new(b"tx-in");
        h.u64(self.from_chain)
            .u64(self.to_chain)
            .fixed(&self.tx_hash.0)
            .u64(self.height)
            .bytes(&self.token)
            .u128(self.amount)
            .bytes(&self.from)
            .bytes(&self.to);
        h.finish()
    }
}

/// what an outbound transfer was for
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    #[default]
    Transfer,
    /// vault hand-off from a retiring key to the new one
    Migration,
}

/// outbound transfer signed by the committee and seen on the target chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub kind: TransferKind,
    pub chain: u64,
    pub tx_hash: H256,
    pub height: u64,
    pub token: Vec<u8>,
    pub amount: Balance,
    pub to: Vec<u8>,
    pub gas_used: u128,
}

impl Claim for TxOut {
    fn content_hash(&self) -> H256 {
        let mut h = ContentHasher::new(b"tx-out");
        h.u64(match self.kind {
            TransferKind::Transfer => 0,
            TransferKind::Migration => 1,
        })
        .u64(self.chain)
        .fixed(&self.tx_hash.0)
        .u64(self.height)
        .bytes(&self.token)
        .u128(self.amount)
        .bytes(&self.to)
        .u128(self.gas_used);
        h.finish()
    }
}
