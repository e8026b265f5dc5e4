//! error types for the TSS coordinator

use thiserror::Error;
use warden_primitives::{
    Address, BridgeError, CryptoError, EpochId, ErrorKind, KeyHash, TssStatus, MAX_MAINTAINER_LIMIT,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TssError {
    #[error("{0} is not a member of the voting committee")]
    NotCommitteeMember(Address),

    #[error("{0} already voted on this proposal")]
    AlreadyVoted(Address),

    #[error("committee must hold between 1 and {max} distinct members, got {0}", max = MAX_MAINTAINER_LIMIT)]
    InvalidCommittee(usize),

    #[error("no key election in progress for epoch {0}")]
    NoElection(EpochId),

    #[error("no tss instance for epoch {0}")]
    UnknownEpoch(EpochId),

    #[error("no active tss key")]
    NoActiveKey,

    #[error("epoch {epoch_id} tss is {actual:?}, expected {expected:?}")]
    InvalidStatus { epoch_id: EpochId, expected: TssStatus, actual: TssStatus },

    #[error("tss instance of epoch {0} is paused")]
    Paused(EpochId),

    #[error("blamed member {0} is not in the keygen committee")]
    InvalidBlame(Address),

    #[error("proposal is no longer open")]
    StaleProposal,

    #[error("key {0} is already registered")]
    DuplicateKey(KeyHash),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("bridge: {0}")]
    Bridge(String),

    #[error("maintainer registry: {0}")]
    Maintainer(String),
}

impl TssError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotCommitteeMember(_) => ErrorKind::Access,
            Self::Bridge(_) | Self::Maintainer(_) => ErrorKind::External,
            _ => ErrorKind::Precondition,
        }
    }
}

impl From<BridgeError> for TssError {
    fn from(e: BridgeError) -> Self {
        TssError::Bridge(e.0)
    }
}

pub type Result<T> = core::result::Result<T, TssError>;
