//! registry records, orchestrator outcomes and events

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use warden_primitives::{Address, Balance, BlockNumber, EpochId, MaintainerStatus, PublicKey};

/// one maintainer, keyed by its validator identity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintainer {
    pub validator: Address,
    /// committee identity, derived from `secp256k1_pubkey`
    pub account: Address,
    pub status: MaintainerStatus,
    pub secp256k1_pubkey: PublicKey,
    pub ed25519_pubkey: [u8; 32],
    pub p2p_address: String,
    pub last_heartbeat: BlockNumber,
    pub last_active_epoch: EpochId,
    pub registered_block: BlockNumber,
}

/// everything a maintainer supplies on `register` and `update`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintainerKeys {
    pub account: Address,
    pub secp256k1_pubkey: PublicKey,
    pub ed25519_pubkey: [u8; 32],
    pub p2p_address: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    pub elected_block: BlockNumber,
    pub start_block: BlockNumber,
    pub end_block: BlockNumber,
    /// 0 until the hand-off away from this epoch finished
    pub migrated_block: BlockNumber,
    /// committee accounts in election order
    pub maintainers: Vec<Address>,
}

/// epoch pointers; 0 means none
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochState {
    pub current_epoch: EpochId,
    /// always `current_epoch + 1` while an election runs
    pub election_epoch: EpochId,
    /// last epoch whose reward was distributed
    pub reward_epoch: EpochId,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochScore {
    pub total: u128,
    pub per_member: BTreeMap<Address, u128>,
}

/// what one `orchestrate` call did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrchestrateOutcome {
    /// nothing due yet
    Idle,
    ElectionOpened { epoch_id: EpochId },
    /// the committee did not change; the epoch advanced without a new key
    ElectionSkipped { epoch_id: EpochId },
    Reelected { epoch_id: EpochId },
    InsufficientCandidates { available: usize },
    /// re-selection after a failed or stalled keygen produced the same set
    Unchanged,
    Rotated { epoch_id: EpochId },
    Retired { epoch_id: EpochId },
    Migrating { completed: bool },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RewardOutcome {
    /// the next unpaid epoch has not finished its hand-off
    NotReady,
    Paid(RewardReport),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewardReport {
    pub epoch_id: EpochId,
    pub total: Balance,
    pub paid: Balance,
    /// accounts whose transfer failed
    pub failed: Vec<Address>,
    /// rounding dust left in the treasury
    pub remainder: Balance,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MaintainerEvent {
    Registered { validator: Address, account: Address },
    Updated { validator: Address },
    Activated { validator: Address },
    Revoked { validator: Address },
    Deregistered { validator: Address },
    Heartbeat { account: Address, block: BlockNumber },
    Jailed { account: Address, release_block: BlockNumber },
    Released { account: Address },
    MaintainerLimitSet { limit: usize },
    ElectionOpened { epoch_id: EpochId, maintainers: Vec<Address> },
    ElectionSkipped { epoch_id: EpochId },
    Reelected { epoch_id: EpochId, maintainers: Vec<Address> },
    EpochRotated { retiring: EpochId, active: EpochId },
    EpochAdvanced { epoch_id: EpochId },
    RewardPaid { epoch_id: EpochId, account: Address, amount: Balance },
    RewardFailed { epoch_id: EpochId, account: Address, amount: Balance, reason: String },
    RewardDistributed { epoch_id: EpochId, total: Balance, paid: Balance, remainder: Balance },
}
