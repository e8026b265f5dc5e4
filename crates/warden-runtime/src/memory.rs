//! in-memory collaborators for tests and the devnet

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;
use warden_primitives::{
    Address, Balance, Bridge, BridgeError, KeyHash, NetworkFee, TransferError, Treasury, TxIn,
    TxOut, ValidatorSource,
};

/// fixed validator set; each validator signs with its own identity unless
/// a separate signer key is bound
#[derive(Clone, Debug, Default)]
pub struct InMemoryValidators {
    validators: Vec<Address>,
    signers: BTreeMap<Address, Address>,
}

impl InMemoryValidators {
    pub fn new(validators: Vec<Address>) -> Self {
        Self { validators, signers: BTreeMap::new() }
    }

    pub fn add(&mut self, validator: Address) {
        if !self.validators.contains(&validator) {
            self.validators.push(validator);
        }
    }

    pub fn remove(&mut self, validator: &Address) {
        self.validators.retain(|v| v != validator);
        self.signers.retain(|_, v| v != validator);
    }

    pub fn bind_signer(&mut self, signer: Address, validator: Address) {
        self.signers.insert(signer, validator);
    }

    fn signer_of(&self, validator: &Address) -> Address {
        self.signers
            .iter()
            .find(|(_, v)| *v == validator)
            .map_or(*validator, |(s, _)| *s)
    }
}

impl ValidatorSource for InMemoryValidators {
    fn current_eligible_signers(&self) -> Vec<Address> {
        self.validators.iter().map(|v| self.signer_of(v)).collect()
    }

    fn is_validator(&self, who: &Address) -> bool {
        self.validators.contains(who)
    }

    fn signer_to_account(&self, signer: &Address) -> Address {
        self.signers.get(signer).copied().unwrap_or(*signer)
    }
}

/// records what the core asked of the bridge
#[derive(Clone, Debug, Default)]
pub struct InMemoryBridge {
    pub retiring: Option<KeyHash>,
    pub active: Option<KeyHash>,
    /// `migrate` polls left before the vault hand-off completes
    pub migration_polls: u32,
    pending_polls: u32,
    pub fees: Vec<NetworkFee>,
    pub tx_in: Vec<TxIn>,
    pub tx_out: Vec<TxOut>,
    /// every call fails while set
    pub halted: bool,
}

impl InMemoryBridge {
    pub fn with_migration_polls(polls: u32) -> Self {
        Self { migration_polls: polls, ..Default::default() }
    }

    fn ensure_running(&self) -> Result<(), BridgeError> {
        if self.halted {
            return Err(BridgeError("bridge halted".into()));
        }
        Ok(())
    }
}

impl Bridge for InMemoryBridge {
    fn rotate(&mut self, retiring: Option<KeyHash>, active: KeyHash) -> Result<(), BridgeError> {
        self.ensure_running()?;
        self.retiring = retiring;
        self.active = Some(active);
        self.pending_polls = self.migration_polls;
        debug!(%active, "bridge rotation started");
        Ok(())
    }

    fn migrate(&mut self) -> Result<bool, BridgeError> {
        self.ensure_running()?;
        if self.pending_polls == 0 {
            return Ok(true);
        }
        self.pending_polls -= 1;
        Ok(self.pending_polls == 0)
    }

    fn post_network_fee(&mut self, fee: &NetworkFee) -> Result<(), BridgeError> {
        self.ensure_running()?;
        self.fees.push(fee.clone());
        Ok(())
    }

    fn execute_tx_in(&mut self, tx: &TxIn) -> Result<(), BridgeError> {
        self.ensure_running()?;
        self.tx_in.push(tx.clone());
        Ok(())
    }

    fn execute_tx_out(&mut self, tx: &TxOut) -> Result<(), BridgeError> {
        self.ensure_running()?;
        self.tx_out.push(tx.clone());
        Ok(())
    }
}

/// reward pool with per-account balances
#[derive(Clone, Debug, Default)]
pub struct InMemoryTreasury {
    pub reserve: Balance,
    pub balances: BTreeMap<Address, Balance>,
    pub frozen: BTreeSet<Address>,
}

impl InMemoryTreasury {
    pub fn with_reserve(reserve: Balance) -> Self {
        Self { reserve, ..Default::default() }
    }

    pub fn balance(&self, who: &Address) -> Balance {
        self.balances.get(who).copied().unwrap_or(0)
    }
}

impl Treasury for InMemoryTreasury {
    fn transfer(&mut self, to: &Address, amount: Balance) -> Result<(), TransferError> {
        let fail = |reason: &str| TransferError { to: *to, amount, reason: reason.into() };
        if self.frozen.contains(to) {
            return Err(fail("account frozen"));
        }
        self.reserve = self.reserve.checked_sub(amount).ok_or_else(|| fail("reserve exhausted"))?;
        *self.balances.entry(*to).or_default() += amount;
        Ok(())
    }
}
