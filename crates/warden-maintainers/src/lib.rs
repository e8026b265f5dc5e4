//! maintainer registry
//!
//! registration and status of committee members, jail terms, epochs, epoch
//! scores and rewards. the epoch orchestrator lives in [`orchestrator`] and
//! drives the TSS coordinator through [`TssManager`]; the coordinator reports
//! back through [`RegistryHooks`].
//!
//! ## member status
//!
//! ```text
//! register ──▶ Registered ──activate──▶ Standby ◀──▶ Ready ──▶ Active
//!                  │                      ▲  │                   │
//!                  └──────revoke──────────┼──┴──▶ Revoked ◀──────┘
//!                                  release│
//!                                      Jailed ◀── slash limit
//! ```

use std::collections::BTreeMap;

use tracing::{debug, info};
use warden_primitives::{
    crypto, params, Address, BlockNumber, EpochId, MaintainerHooks, MaintainerStatus,
    ParameterStore, TssManager, ValidatorSource, MAX_MAINTAINER_LIMIT, MIN_MAINTAINERS,
};

mod error;
pub mod orchestrator;
pub mod rewards;
mod types;


pub use error::{MaintainerError, Result};
pub use rewards::{reward_weight, split_reward};
pub use types::{
    Epoch, EpochScore, EpochState, Maintainer, MaintainerEvent, MaintainerKeys,
    OrchestrateOutcome, RewardOutcome, RewardReport,
};

#[derive(Clone, Debug)]
pub struct MaintainerRegistry {
    /// keyed by validator identity
    maintainers: BTreeMap<Address, Maintainer>,
    /// committee account -> validator
    accounts: BTreeMap<Address, Address>,
    epochs: BTreeMap<EpochId, Epoch>,
    state: EpochState,
    /// validator -> release block
    jail: BTreeMap<Address, BlockNumber>,
    scores: BTreeMap<EpochId, EpochScore>,
    maintainer_limit: usize,
    events: Vec<MaintainerEvent>,
}

impl Default for MaintainerRegistry {
    fn default() -> Self {
        Self {
            maintainers: BTreeMap::new(),
            accounts: BTreeMap::new(),
            epochs: BTreeMap::new(),
            state: EpochState::default(),
            jail: BTreeMap::new(),
            scores: BTreeMap::new(),
            maintainer_limit: MAX_MAINTAINER_LIMIT,
            events: Vec::new(),
        }
    }
}

impl MaintainerRegistry {
    pub fn new(maintainer_limit: usize) -> Result<Self> {
        let mut registry = Self::default();
        registry.maintainer_limit = check_limit(maintainer_limit)?;
        Ok(registry)
    }

    pub fn take_events(&mut self) -> Vec<MaintainerEvent> {
        core::mem::take(&mut self.events)
    }

    // ============ views ============

    pub fn maintainer(&self, validator: &Address) -> Option<&Maintainer> {
        self.maintainers.get(validator)
    }

    pub fn maintainer_by_account(&self, account: &Address) -> Option<&Maintainer> {
        self.accounts.get(account).and_then(|v| self.maintainers.get(v))
    }

    /// maintainers for the given validators, skipping unknown ones
    pub fn maintainer_infos(&self, validators: &[Address]) -> Vec<&Maintainer> {
        validators.iter().filter_map(|v| self.maintainers.get(v)).collect()
    }

    pub fn maintainers(&self) -> impl Iterator<Item = &Maintainer> {
        self.maintainers.values()
    }

    pub fn epoch_info(&self, epoch_id: EpochId) -> Option<&Epoch> {
        self.epochs.get(&epoch_id)
    }

    pub fn epoch_state(&self) -> EpochState {
        self.state
    }

    pub fn epoch_score(&self, epoch_id: EpochId) -> Option<&EpochScore> {
        self.scores.get(&epoch_id)
    }

    pub fn jail_release(&self, validator: &Address) -> Option<BlockNumber> {
        self.jail.get(validator).copied()
    }

    pub fn maintainer_limit(&self) -> usize {
        self.maintainer_limit
    }

    // ============ member operations ============

    pub fn register<V: ValidatorSource + ?Sized>(
        &mut self,
        now: BlockNumber,
        validators: &V,
        who: &Address,
        keys: MaintainerKeys,
    ) -> Result<()> {
        if !validators.is_validator(who) {
            return Err(MaintainerError::OnlyValidator);
        }
        if self.maintainers.contains_key(who) {
            return Err(MaintainerError::AlreadyRegistered(*who));
        }
        if self.accounts.contains_key(&keys.account) {
            return Err(MaintainerError::AccountTaken(keys.account));
        }
        check_keys(&keys)?;

        let account = keys.account;
        self.accounts.insert(account, *who);
        self.maintainers.insert(
            *who,
            Maintainer {
                validator: *who,
                account,
                status: MaintainerStatus::Registered,
                secp256k1_pubkey: keys.secp256k1_pubkey,
                ed25519_pubkey: keys.ed25519_pubkey,
                p2p_address: keys.p2p_address,
                last_heartbeat: now,
                last_active_epoch: 0,
                registered_block: now,
            },
        );
        info!(validator = %who, %account, "maintainer registered");
        self.events.push(MaintainerEvent::Registered { validator: *who, account });
        Ok(())
    }

    /// replace keys; only before the maintainer asked to be elected
    pub fn update(&mut self, who: &Address, keys: MaintainerKeys) -> Result<()> {
        let m = self.maintainers.get(who).ok_or(MaintainerError::NotRegistered(*who))?;
        if m.status != MaintainerStatus::Registered {
            return Err(MaintainerError::InvalidStatus { action: "update", actual: m.status });
        }
        if keys.account != m.account && self.accounts.contains_key(&keys.account) {
            return Err(MaintainerError::AccountTaken(keys.account));
        }
        check_keys(&keys)?;

        let old_account = m.account;
        self.accounts.remove(&old_account);
        self.accounts.insert(keys.account, *who);
        if let Some(m) = self.maintainers.get_mut(who) {
            m.account = keys.account;
            m.secp256k1_pubkey = keys.secp256k1_pubkey;
            m.ed25519_pubkey = keys.ed25519_pubkey;
            m.p2p_address = keys.p2p_address;
        }
        self.events.push(MaintainerEvent::Updated { validator: *who });
        Ok(())
    }

    /// opt in to elections
    pub fn activate(&mut self, who: &Address) -> Result<()> {
        let m = self.maintainers.get_mut(who).ok_or(MaintainerError::NotRegistered(*who))?;
        if m.status != MaintainerStatus::Registered {
            return Err(MaintainerError::InvalidStatus { action: "activate", actual: m.status });
        }
        m.status = MaintainerStatus::Standby;
        info!(validator = %who, "maintainer on standby");
        self.events.push(MaintainerEvent::Activated { validator: *who });
        Ok(())
    }

    /// opt out; a sitting member keeps signing until its epoch retires
    pub fn revoke(&mut self, who: &Address) -> Result<()> {
        let m = self.maintainers.get_mut(who).ok_or(MaintainerError::NotRegistered(*who))?;
        match m.status {
            MaintainerStatus::Registered
            | MaintainerStatus::Standby
            | MaintainerStatus::Ready
            | MaintainerStatus::Active => {}
            actual => return Err(MaintainerError::InvalidStatus { action: "revoke", actual }),
        }
        m.status = MaintainerStatus::Revoked;
        info!(validator = %who, "maintainer revoked");
        self.events.push(MaintainerEvent::Revoked { validator: *who });
        Ok(())
    }

    pub fn heartbeat(&mut self, now: BlockNumber, account: &Address) -> Result<()> {
        let validator = *self
            .accounts
            .get(account)
            .ok_or(MaintainerError::UnknownAccount(*account))?;
        if let Some(m) = self.maintainers.get_mut(&validator) {
            m.last_heartbeat = now;
        }
        debug!(%account, block = now, "heartbeat");
        self.events.push(MaintainerEvent::Heartbeat { account: *account, block: now });
        Ok(())
    }

    pub fn deregister(&mut self, who: &Address) -> Result<()> {
        let m = self.maintainers.get(who).ok_or(MaintainerError::NotRegistered(*who))?;
        match m.status {
            MaintainerStatus::Jailed | MaintainerStatus::Ready | MaintainerStatus::Active => {
                return Err(MaintainerError::InvalidStatus { action: "deregister", actual: m.status })
            }
            _ => {}
        }
        if self.recently_active(m) {
            return Err(MaintainerError::RecentlyActive);
        }

        let account = m.account;
        self.accounts.remove(&account);
        self.maintainers.remove(who);
        info!(validator = %who, "maintainer deregistered");
        self.events.push(MaintainerEvent::Deregistered { validator: *who });
        Ok(())
    }

    /// served the current or previous epoch, or sits in the running election
    fn recently_active(&self, m: &Maintainer) -> bool {
        if m.last_active_epoch != 0 && m.last_active_epoch + 1 >= self.state.current_epoch {
            return true;
        }
        [self.state.current_epoch, self.state.election_epoch]
            .iter()
            .filter_map(|id| self.epochs.get(id))
            .any(|e| e.maintainers.contains(&m.account))
    }

    /// admin call; the caller checks the admin
    pub fn set_maintainer_limit(&mut self, limit: usize) -> Result<()> {
        self.maintainer_limit = check_limit(limit)?;
        info!(limit, "maintainer limit set");
        self.events.push(MaintainerEvent::MaintainerLimitSet { limit });
        Ok(())
    }

    // ============ jail and scores ============

    fn jail_account(&mut self, now: BlockNumber, jail_block: BlockNumber, account: &Address) -> Result<()> {
        let validator = *self
            .accounts
            .get(account)
            .ok_or(MaintainerError::UnknownAccount(*account))?;
        let Some(m) = self.maintainers.get_mut(&validator) else {
            return Err(MaintainerError::UnknownAccount(*account));
        };
        // revoked members stay revoked; a running term is not extended
        if matches!(m.status, MaintainerStatus::Jailed | MaintainerStatus::Revoked) {
            return Ok(());
        }
        m.status = MaintainerStatus::Jailed;
        let release_block = now.saturating_add(jail_block);
        self.jail.insert(validator, release_block);
        info!(%account, release_block, "maintainer jailed");
        self.events.push(MaintainerEvent::Jailed { account: *account, release_block });
        Ok(())
    }

    /// lazy sweep of expired jail terms; released members start over
    pub fn release_jailed<T: TssManager + ?Sized>(&mut self, now: BlockNumber, tss: &mut T) -> usize {
        let expired: Vec<Address> = self
            .jail
            .iter()
            .filter(|(_, release)| **release <= now)
            .map(|(v, _)| *v)
            .collect();

        let sitting = self
            .epochs
            .get(&self.state.current_epoch)
            .map(|e| e.maintainers.clone())
            .unwrap_or_default();
        for validator in &expired {
            self.jail.remove(validator);
            let Some(m) = self.maintainers.get_mut(validator) else { continue };
            if m.status == MaintainerStatus::Jailed {
                // a member of the serving committee is still signing
                m.status = if sitting.contains(&m.account) {
                    MaintainerStatus::Active
                } else {
                    MaintainerStatus::Standby
                };
            }
            tss.reset_slash_point(&m.account);
            info!(account = %m.account, "maintainer released from jail");
            self.events.push(MaintainerEvent::Released { account: m.account });
        }
        expired.len()
    }

    fn add_score(&mut self, epoch_id: EpochId, account: &Address, score: u128) {
        let entry = self.scores.entry(epoch_id).or_default();
        entry.total = entry.total.saturating_add(score);
        let per = entry.per_member.entry(*account).or_default();
        *per = per.saturating_add(score);
    }
}

fn check_limit(limit: usize) -> Result<usize> {
    if !(MIN_MAINTAINERS..=MAX_MAINTAINER_LIMIT).contains(&limit) {
        return Err(MaintainerError::InvalidLimit(limit));
    }
    Ok(limit)
}

fn check_keys(keys: &MaintainerKeys) -> Result<()> {
    crypto::validate_pubkey(&keys.secp256k1_pubkey)?;
    let derived = crypto::pubkey_to_address(&keys.secp256k1_pubkey);
    if derived != keys.account {
        return Err(MaintainerError::AccountMismatch { declared: keys.account, derived });
    }
    if keys.ed25519_pubkey == [0u8; 32] {
        return Err(MaintainerError::EmptyEd25519Key);
    }
    if keys.p2p_address.trim().is_empty() {
        return Err(MaintainerError::EmptyP2pAddress);
    }
    Ok(())
}

/// registry as seen by the TSS coordinator during one call
pub struct RegistryHooks<'a, P: ?Sized> {
    pub registry: &'a mut MaintainerRegistry,
    pub params: &'a P,
    pub now: BlockNumber,
}

impl<'a, P: ParameterStore + ?Sized> RegistryHooks<'a, P> {
    pub fn new(registry: &'a mut MaintainerRegistry, params: &'a P, now: BlockNumber) -> Self {
        Self { registry, params, now }
    }
}

impl<P: ParameterStore + ?Sized> MaintainerHooks for RegistryHooks<'_, P> {
    type Error = MaintainerError;

    fn add_to_jail(&mut self, account: &Address) -> Result<()> {
        let jail_block = self.params.get_u64(params::JAIL_BLOCK);
        self.registry.jail_account(self.now, jail_block, account)
    }

    fn add_score(&mut self, epoch_id: EpochId, account: &Address, score: u128) {
        self.registry.add_score(epoch_id, account, score);
    }
}
