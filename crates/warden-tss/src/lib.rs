//! TSS coordinator
//!
//! owns every TSS key instance of the maintainer committee and turns member
//! votes into single-application effects.
//!
//! ## lifecycle
//!
//! ```text
//! elect ──▶ KeygenPending ──vote──▶ KeygenCompleted ──rotate──▶ Migrating
//!                 │                                                 │ migrate
//!                 └──vote(blame)──▶ KeygenFailed                    ▼
//!           Retired ◀──retire── Retiring     Active ◀──retire── Migrated
//! ```
//!
//! `EmergencyPause` is an admin override reachable from any state.
//!
//! the coordinator never reads a clock. keygen timeouts are the
//! orchestrator's business; it polls `tss_status` and re-elects.

use std::collections::BTreeMap;

use tracing::{info, warn};
use warden_primitives::{
    crypto::ContentHasher, same_members, Address, Bridge, BlockNumber, Claim, EpochId, KeyHash,
    KeygenResult, ProposalId, TssManager, TssStatus, MAX_MAINTAINER_LIMIT,
};

mod error;
mod types;
mod voting;


pub use error::{Result, TssError};
pub use types::{Proposal, ProposalKind, TssEvent, TssInstance, TssSlot, VoteOutcome, VoteSet};
pub use voting::SlashSchedule;

/// authoritative store of TSS instances, proposals and slash points
#[derive(Clone, Debug, Default)]
pub struct TssCoordinator {
    /// committee whose key is being generated
    electing: Option<TssInstance>,
    /// finalized keys
    instances: BTreeMap<KeyHash, TssInstance>,
    slots: BTreeMap<EpochId, TssSlot>,
    /// key holding custody: active, or retiring during a hand-off
    current: Option<KeyHash>,
    proposals: BTreeMap<ProposalId, Proposal>,
    slash: voting::SlashBook,
    events: Vec<TssEvent>,
}

impl TssCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// drain buffered events
    pub fn take_events(&mut self) -> Vec<TssEvent> {
        core::mem::take(&mut self.events)
    }

    // ============ views ============

    pub fn tss_status(&self, epoch_id: EpochId) -> TssStatus {
        self.tss_info(epoch_id).map_or(TssStatus::Unknown, |i| i.status)
    }

    pub fn tss_info(&self, epoch_id: EpochId) -> Option<&TssInstance> {
        match self.slots.get(&epoch_id)? {
            TssSlot::Electing => self.electing.as_ref().filter(|i| i.epoch_id == epoch_id),
            TssSlot::Key(key) => self.instances.get(key),
        }
    }

    pub fn slot(&self, epoch_id: EpochId) -> Option<TssSlot> {
        self.slots.get(&epoch_id).copied()
    }

    pub fn instance(&self, key: &KeyHash) -> Option<&TssInstance> {
        self.instances.get(key)
    }

    /// finalized instances, for audits
    pub fn instances(&self) -> impl Iterator<Item = (&KeyHash, &TssInstance)> {
        self.instances.iter()
    }

    pub fn electing(&self) -> Option<&TssInstance> {
        self.electing.as_ref()
    }

    pub fn current_key(&self) -> Option<KeyHash> {
        self.current
    }

    /// committee behind a key, for the bridge
    pub fn members(&self, key: &KeyHash) -> Option<&[Address]> {
        self.instances.get(key).map(|i| i.maintainers.as_slice())
    }

    pub fn proposal(&self, id: &ProposalId) -> Option<&Proposal> {
        self.proposals.get(id)
    }

    /// proposal id of a keygen claim, bound to the epoch's election round
    ///
    /// a re-election under the same epoch opens a new round, so an
    /// identical claim from the new committee lands on a new proposal.
    pub fn keygen_proposal_id(&self, result: &KeygenResult) -> Option<ProposalId> {
        let round = self.tss_info(result.epoch_id)?;
        let mut h = ContentHasher::new(b"keygen-round");
        h.fixed(&result.content_hash().0).u64(round.elect_block);
        h.u64(round.maintainers.len() as u64);
        for m in &round.maintainers {
            h.fixed(&m.0);
        }
        Some(h.finish())
    }

    pub fn slash_point(&self, account: &Address) -> u128 {
        self.slash.get(account)
    }

    pub fn reset_slash_point(&mut self, account: &Address) {
        self.slash.reset(account);
    }

    fn slot_key(&self, epoch_id: EpochId) -> Result<KeyHash> {
        match self.slots.get(&epoch_id) {
            Some(TssSlot::Key(key)) => Ok(*key),
            Some(TssSlot::Electing) => Err(TssError::InvalidStatus {
                epoch_id,
                expected: TssStatus::KeygenCompleted,
                actual: self.tss_status(epoch_id),
            }),
            None => Err(TssError::UnknownEpoch(epoch_id)),
        }
    }

    fn instance_mut(&mut self, epoch_id: EpochId) -> Result<&mut TssInstance> {
        match self.slots.get(&epoch_id) {
            Some(TssSlot::Key(key)) => {
                self.instances.get_mut(key).ok_or(TssError::UnknownEpoch(epoch_id))
            }
            Some(TssSlot::Electing) => self
                .electing
                .as_mut()
                .filter(|i| i.epoch_id == epoch_id)
                .ok_or(TssError::NoElection(epoch_id)),
            None => Err(TssError::UnknownEpoch(epoch_id)),
        }
    }

    fn expect_status(&self, epoch_id: EpochId, expected: TssStatus) -> Result<()> {
        let actual = self.tss_status(epoch_id);
        if actual != expected {
            return Err(TssError::InvalidStatus { epoch_id, expected, actual });
        }
        Ok(())
    }

    // ============ lifecycle ============

    /// open a key election, or bind the epoch to the current key when the
    /// committee did not change. returns whether a rotation is required.
    pub fn elect(&mut self, now: BlockNumber, epoch_id: EpochId, maintainers: &[Address]) -> Result<bool> {
        validate_committee(maintainers)?;

        if let Some(key) = self.current {
            if let Some(instance) = self.instances.get_mut(&key) {
                if same_members(&instance.maintainers, maintainers) {
                    instance.epoch_id = epoch_id;
                    self.slots.insert(epoch_id, TssSlot::Key(key));
                    self.electing = None;
                    info!(epoch_id, %key, "committee unchanged, keeping current key");
                    self.events.push(TssEvent::ElectionSkipped { epoch_id, key });
                    return Ok(false);
                }
            }
        }

        // open keygen proposals of a replaced round can never settle
        self.proposals
            .retain(|_, p| p.kind != ProposalKind::Keygen || p.epoch_id != epoch_id || p.is_approved());
        self.electing = Some(TssInstance::electing(epoch_id, maintainers.to_vec(), now));
        self.slots.insert(epoch_id, TssSlot::Electing);
        info!(epoch_id, members = maintainers.len(), "keygen requested");
        self.events.push(TssEvent::KeygenRequested {
            epoch_id,
            maintainers: maintainers.to_vec(),
        });
        Ok(true)
    }

    /// start the hand-off from the current key to the freshly generated one
    pub fn rotate<B: Bridge + ?Sized>(
        &mut self,
        now: BlockNumber,
        bridge: &mut B,
        current: EpochId,
        next: EpochId,
    ) -> Result<()> {
        let next_key = self.slot_key(next)?;
        self.expect_status(next, TssStatus::KeygenCompleted)?;

        let retiring = if current == 0 {
            None
        } else {
            let key = self.slot_key(current)?;
            self.expect_status(current, TssStatus::Active)?;
            Some(key)
        };

        if let Some(key) = retiring {
            if let Some(out) = self.instances.get_mut(&key) {
                out.status = TssStatus::Retiring;
                out.end_block = now;
            }
        }
        let incoming = self.instance_mut(next)?;
        incoming.status = TssStatus::Migrating;
        incoming.start_block = now;

        info!(current, next, "tss rotation started");
        self.events.push(TssEvent::Rotated { retiring, active: next_key });

        // state is settled before the bridge sees the rotation
        bridge.rotate(retiring, next_key)?;
        Ok(())
    }

    /// ask the bridge to progress the vault hand-off into `next`'s key
    pub fn migrate<B: Bridge + ?Sized>(&mut self, now: BlockNumber, bridge: &mut B, next: EpochId) -> Result<bool> {
        match self.tss_status(next) {
            TssStatus::Migrating => {}
            TssStatus::Migrated => return Ok(true),
            _ => return Ok(false),
        }
        if !bridge.migrate()? {
            return Ok(false);
        }

        let key = self.slot_key(next)?;
        let incoming = self.instance_mut(next)?;
        incoming.status = TssStatus::Migrated;
        incoming.migrate_block = now;
        info!(next, %key, "vault migration completed");
        self.events.push(TssEvent::Migrated { key });
        Ok(true)
    }

    /// finish the hand-off: outgoing key retired, incoming key active
    pub fn retire(&mut self, now: BlockNumber, prev: EpochId, next: EpochId) -> Result<()> {
        let next_key = self.slot_key(next)?;
        self.expect_status(next, TssStatus::Migrated)?;

        let retired = if prev == 0 {
            None
        } else {
            let key = self.slot_key(prev)?;
            self.expect_status(prev, TssStatus::Retiring)?;
            Some(key)
        };

        // only one retired key is kept beside the active one
        let stale: Vec<KeyHash> = self
            .instances
            .iter()
            .filter(|(_, i)| i.status == TssStatus::Retired)
            .map(|(k, _)| *k)
            .collect();
        for key in stale {
            self.instances.remove(&key);
            self.slots.retain(|_, slot| *slot != TssSlot::Key(key));
        }

        if let Some(key) = retired {
            if let Some(out) = self.instances.get_mut(&key) {
                out.status = TssStatus::Retired;
            }
        }
        let incoming = self.instance_mut(next)?;
        incoming.status = TssStatus::Active;
        if incoming.start_block == 0 {
            incoming.start_block = now;
        }
        self.current = Some(next_key);

        info!(prev, next, "tss key retired, new key active");
        self.events.push(TssEvent::Retired { retired, active: next_key });
        Ok(())
    }

    /// admin override; never exited automatically
    pub fn emergency_pause(&mut self, epoch_id: EpochId) -> Result<()> {
        let instance = self.instance_mut(epoch_id)?;
        instance.status = TssStatus::EmergencyPause;
        warn!(epoch_id, "tss instance paused");
        self.events.push(TssEvent::EmergencyPaused { epoch_id });
        Ok(())
    }
}

fn validate_committee(maintainers: &[Address]) -> Result<()> {
    if maintainers.is_empty() || maintainers.len() > MAX_MAINTAINER_LIMIT {
        return Err(TssError::InvalidCommittee(maintainers.len()));
    }
    let mut sorted = maintainers.to_vec();
    sorted.sort();
    sorted.dedup();
    if sorted.len() != maintainers.len() {
        return Err(TssError::InvalidCommittee(maintainers.len()));
    }
    Ok(())
}

/// coordinator plus the bridge it drives, handed to the registry for one call
pub struct TssHandle<'a, B: ?Sized> {
    pub tss: &'a mut TssCoordinator,
    pub bridge: &'a mut B,
}

impl<'a, B: ?Sized> TssHandle<'a, B> {
    pub fn new(tss: &'a mut TssCoordinator, bridge: &'a mut B) -> Self {
        Self { tss, bridge }
    }
}

impl<B: Bridge + ?Sized> TssManager for TssHandle<'_, B> {
    type Error = TssError;

    fn elect(&mut self, now: BlockNumber, epoch_id: EpochId, maintainers: &[Address]) -> Result<bool> {
        self.tss.elect(now, epoch_id, maintainers)
    }

    fn rotate(&mut self, now: BlockNumber, current: EpochId, next: EpochId) -> Result<()> {
        self.tss.rotate(now, &mut *self.bridge, current, next)
    }

    fn migrate(&mut self, now: BlockNumber, next: EpochId) -> Result<bool> {
        self.tss.migrate(now, &mut *self.bridge, next)
    }

    fn retire(&mut self, now: BlockNumber, prev: EpochId, next: EpochId) -> Result<()> {
        self.tss.retire(now, prev, next)
    }

    fn tss_status(&self, epoch_id: EpochId) -> TssStatus {
        self.tss.tss_status(epoch_id)
    }

    fn slash_point(&self, account: &Address) -> u128 {
        self.tss.slash_point(account)
    }

    fn reset_slash_point(&mut self, account: &Address) {
        self.tss.reset_slash_point(account)
    }
}
