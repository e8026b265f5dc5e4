//! warden primitives
//!
//! shared vocabulary of the maintainer committee: identities, hashes,
//! lifecycle statuses, the parameter store, the claims members vote on and
//! the traits through which the registry, the TSS coordinator and their
//! external collaborators talk to each other.

pub mod claims;
pub mod crypto;
pub mod params;
pub mod traits;
pub mod types;

pub use claims::{Claim, KeygenResult, NetworkFee, TransferKind, TxIn, TxOut};
pub use crypto::{key_hash, keccak256, pubkey_to_address, CryptoError};
pub use params::{param_key, ParamError, ParameterStore, Parameters};
pub use traits::{
    Bridge, BridgeError, MaintainerHooks, Treasury, TransferError, TssManager, ValidatorSource,
};
pub use types::{
    Address, Balance, BlockNumber, EpochId, ErrorKind, KeyHash, MaintainerStatus, ProposalId,
    PublicKey, TssStatus, H256,
};

/// smallest committee the orchestrator will elect
pub const MIN_MAINTAINERS: usize = 3;

/// hard upper bound on committee size; vote sets are 32 bit masks
pub const MAX_MAINTAINER_LIMIT: usize = 30;

/// quorum: strictly more than two thirds (integer division) of the committee
pub fn quorum_threshold(committee_len: usize) -> usize {
    committee_len * 2 / 3 + 1
}

/// set equality over two committees; both are bounded by the member limit
pub fn same_members(a: &[Address], b: &[Address]) -> bool {
    a.len() == b.len() && a.iter().all(|m| b.contains(m))
}
