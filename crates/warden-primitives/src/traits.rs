//! seams between the core and everything around it
//!
//! ```text
//!  ValidatorSource ──▶ MaintainerRegistry ──TssManager──▶ TssCoordinator ──▶ Bridge
//!                           ▲    │                            │
//!        Treasury ◀─────────┘    └────◀──MaintainerHooks──────┘
//! ```
//!
//! the registry and the coordinator never hold each other. whoever drives a
//! call hands one a short-lived capability for the other.

use core::fmt;

use thiserror::Error;

use crate::claims::{NetworkFee, TxIn, TxOut};
use crate::types::{Address, Balance, BlockNumber, EpochId, KeyHash, TssStatus};

/// external source of validator identities, read-only to the core
pub trait ValidatorSource {
    /// signers eligible at the current block, in canonical order
    fn current_eligible_signers(&self) -> Vec<Address>;

    fn is_validator(&self, who: &Address) -> bool;

    /// validator account behind a signer key
    fn signer_to_account(&self, signer: &Address) -> Address;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bridge call failed: {0}")]
pub struct BridgeError(pub String);

/// asset bridging pipeline; applies approved observations and moves vaults
pub trait Bridge {
    /// start moving custody from `retiring` (none at genesis) to `active`
    fn rotate(&mut self, retiring: Option<KeyHash>, active: KeyHash) -> Result<(), BridgeError>;

    /// progress the vault hand-off; `true` once it is complete
    fn migrate(&mut self) -> Result<bool, BridgeError>;

    fn post_network_fee(&mut self, fee: &NetworkFee) -> Result<(), BridgeError>;

    fn execute_tx_in(&mut self, tx: &TxIn) -> Result<(), BridgeError>;

    fn execute_tx_out(&mut self, tx: &TxOut) -> Result<(), BridgeError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transfer of {amount} to {to} failed: {reason}")]
pub struct TransferError {
    pub to: Address,
    pub amount: Balance,
    pub reason: String,
}

/// native payout sink for epoch rewards
pub trait Treasury {
    fn transfer(&mut self, to: &Address, amount: Balance) -> Result<(), TransferError>;
}

/// what the registry may ask of the TSS coordinator
pub trait TssManager {
    type Error: fmt::Display;

    /// `Ok(false)` means the committee is unchanged and no key rotation is needed
    fn elect(
        &mut self,
        now: BlockNumber,
        epoch_id: EpochId,
        maintainers: &[Address],
    ) -> Result<bool, Self::Error>;

    fn rotate(&mut self, now: BlockNumber, current: EpochId, next: EpochId) -> Result<(), Self::Error>;

    /// `Ok(true)` once the incoming key reached `Migrated`
    fn migrate(&mut self, now: BlockNumber, next: EpochId) -> Result<bool, Self::Error>;

    fn retire(&mut self, now: BlockNumber, prev: EpochId, next: EpochId) -> Result<(), Self::Error>;

    fn tss_status(&self, epoch_id: EpochId) -> TssStatus;

    fn slash_point(&self, account: &Address) -> u128;

    /// jail release wipes the slate
    fn reset_slash_point(&mut self, account: &Address);
}

/// what the TSS coordinator may ask of the registry
pub trait MaintainerHooks {
    type Error: fmt::Display;

    fn add_to_jail(&mut self, account: &Address) -> Result<(), Self::Error>;

    fn add_score(&mut self, epoch_id: EpochId, account: &Address, score: u128);
}
