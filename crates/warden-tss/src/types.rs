//! tss instance, proposal and event types

use serde::{Deserialize, Serialize};
use warden_primitives::{
    Address, BlockNumber, EpochId, KeyHash, ProposalId, PublicKey, TssStatus, H256,
    MAX_MAINTAINER_LIMIT,
};

/// where an epoch's key lives
///
/// `Electing` is the slot of a committee whose key does not exist yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TssSlot {
    Electing,
    Key(KeyHash),
}

/// one TSS key and the committee holding it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TssInstance {
    pub status: TssStatus,
    pub epoch_id: EpochId,
    pub elect_block: BlockNumber,
    pub start_block: BlockNumber,
    pub end_block: BlockNumber,
    pub migrate_block: BlockNumber,
    /// none until keygen succeeds
    pub pubkey: Option<PublicKey>,
    pub maintainers: Vec<Address>,
}

impl TssInstance {
    pub(crate) fn electing(epoch_id: EpochId, maintainers: Vec<Address>, now: BlockNumber) -> Self {
        Self {
            status: TssStatus::KeygenPending,
            epoch_id,
            elect_block: now,
            start_block: 0,
            end_block: 0,
            migrate_block: 0,
            pubkey: None,
            maintainers,
        }
    }

    pub fn is_member(&self, who: &Address) -> bool {
        self.maintainers.contains(who)
    }
}

/// what a proposal decides; selects the delay penalty
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalKind {
    Keygen,
    NetworkFee,
    TxIn,
    TxOut,
    Migration,
}

/// committee members that voted, as a bitmap over the committee snapshot
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSet(u32);

impl VoteSet {
    pub fn contains(&self, index: usize) -> bool {
        index < MAX_MAINTAINER_LIMIT && self.0 & (1 << index) != 0
    }

    pub fn insert(&mut self, index: usize) {
        debug_assert!(index < MAX_MAINTAINER_LIMIT);
        self.0 |= 1 << index;
    }

    pub fn len(&self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// vote aggregation for one claim
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub kind: ProposalKind,
    /// epoch whose score the votes count towards
    pub epoch_id: EpochId,
    /// committee frozen when the first vote arrived
    pub committee: Vec<Address>,
    /// distinct voters so far
    pub count: u32,
    /// 0 until quorum, then the block it was reached at
    pub consensus_block: BlockNumber,
    pub(crate) voted: VoteSet,
}

impl Proposal {
    pub(crate) fn new(kind: ProposalKind, epoch_id: EpochId, committee: Vec<Address>) -> Self {
        Self { kind, epoch_id, committee, count: 0, consensus_block: 0, voted: VoteSet::default() }
    }

    pub fn member_index(&self, who: &Address) -> Option<usize> {
        self.committee.iter().position(|m| m == who)
    }

    pub fn has_voted(&self, who: &Address) -> bool {
        self.member_index(who).map_or(false, |i| self.voted.contains(i))
    }

    pub fn is_approved(&self) -> bool {
        self.consensus_block != 0
    }

    /// members that have not voted yet
    pub fn absentees(&self) -> impl Iterator<Item = &Address> + '_ {
        self.committee
            .iter()
            .enumerate()
            .filter(move |(i, _)| !self.voted.contains(*i))
            .map(|(_, m)| m)
    }
}

/// how a vote landed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    /// recorded, quorum not reached yet
    Pending { count: u32, needed: u32 },
    /// this vote reached quorum; the effect has been applied
    Approved,
    /// quorum was reached earlier; recorded for scoring only
    Late,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TssEvent {
    /// committee unchanged, epoch bound to the current key
    ElectionSkipped { epoch_id: EpochId, key: KeyHash },
    KeygenRequested { epoch_id: EpochId, maintainers: Vec<Address> },
    KeygenCompleted { epoch_id: EpochId, key: KeyHash },
    KeygenFailed { epoch_id: EpochId, blames: Vec<Address> },
    Rotated { retiring: Option<KeyHash>, active: KeyHash },
    Migrated { key: KeyHash },
    Retired { retired: Option<KeyHash>, active: KeyHash },
    EmergencyPaused { epoch_id: EpochId },
    Voted { proposal: ProposalId, who: Address, count: u32 },
    ProposalApproved { proposal: ProposalId, kind: ProposalKind, block: BlockNumber },
    NetworkFeePosted { chain: u64, height: u64 },
    TxInExecuted { tx_hash: H256 },
    TxOutExecuted { tx_hash: H256 },
    SlashPointAdded { account: Address, points: u128, total: u128 },
    SlashPointRemoved { account: Address, points: u128, total: u128 },
}
