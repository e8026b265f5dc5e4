//! epoch orchestrator
//!
//! one legal lifecycle transition per call, driven by an external trigger
//! (block hook, keeper, devnet loop). the TSS status of the running
//! election decides what happens next:
//!
//! | election status              | action                                  |
//! |------------------------------|-----------------------------------------|
//! | none                         | open election once the epoch is served  |
//! | `KeygenFailed`, stalled keygen | re-select, re-elect if the set changed |
//! | `KeygenCompleted`            | rotate                                  |
//! | `Migrated`                   | retire, advance the epoch               |
//! | anything else                | progress the migration                  |

use tracing::{debug, info};
use warden_primitives::{
    params, same_members, Address, BlockNumber, EpochId, MaintainerStatus, ParameterStore,
    TssManager, TssStatus, ValidatorSource, MIN_MAINTAINERS,
};

use crate::error::{MaintainerError, Result};
use crate::types::{Epoch, MaintainerEvent, OrchestrateOutcome};
use crate::MaintainerRegistry;

fn tss_error<E: core::fmt::Display>(e: E) -> MaintainerError {
    MaintainerError::Tss(e.to_string())
}

impl MaintainerRegistry {
    pub fn orchestrate<T, P, V>(
        &mut self,
        now: BlockNumber,
        params: &P,
        validators: &V,
        tss: &mut T,
    ) -> Result<OrchestrateOutcome>
    where
        T: TssManager + ?Sized,
        P: ParameterStore + ?Sized,
        V: ValidatorSource + ?Sized,
    {
        let election = self.state.election_epoch;
        if election == 0 {
            return self.open_election(now, params, validators, tss);
        }

        match tss.tss_status(election) {
            TssStatus::KeygenFailed => self.reelect(now, params, validators, tss, election),
            TssStatus::KeygenPending => {
                let timeout = params.get_u64(params::MAX_BLOCKS_FOR_UPDATE_TSS);
                let elected = self.epochs.get(&election).map_or(now, |e| e.elected_block);
                if timeout != 0 && now.saturating_sub(elected) > timeout {
                    info!(epoch_id = election, elected, "keygen timed out");
                    self.reelect(now, params, validators, tss, election)
                } else {
                    Ok(OrchestrateOutcome::Idle)
                }
            }
            TssStatus::KeygenCompleted => self.rotate(now, tss, election),
            TssStatus::Migrated => self.retire(now, tss, election),
            _ => {
                let completed = tss.migrate(now, election).map_err(tss_error)?;
                debug!(epoch_id = election, completed, "migration polled");
                Ok(OrchestrateOutcome::Migrating { completed })
            }
        }
    }

    fn open_election<T, P, V>(
        &mut self,
        now: BlockNumber,
        params: &P,
        validators: &V,
        tss: &mut T,
    ) -> Result<OrchestrateOutcome>
    where
        T: TssManager + ?Sized,
        P: ParameterStore + ?Sized,
        V: ValidatorSource + ?Sized,
    {
        let current = self.state.current_epoch;
        if current != 0 {
            if tss.tss_status(current) != TssStatus::Active {
                return Ok(OrchestrateOutcome::Idle);
            }
            let start = self.epochs.get(&current).map_or(0, |e| e.start_block);
            let served = now.saturating_sub(start);
            if served < params.get_u64(params::BLOCKS_PER_EPOCH) {
                return Ok(OrchestrateOutcome::Idle);
            }
        }

        self.release_jailed(now, tss);
        let candidates = self.select_candidates(params, validators, tss);
        if candidates.len() < MIN_MAINTAINERS {
            info!(available = candidates.len(), "not enough candidates for an election");
            return Ok(OrchestrateOutcome::InsufficientCandidates { available: candidates.len() });
        }

        let epoch_id = current + 1;
        if !tss.elect(now, epoch_id, &candidates).map_err(tss_error)? {
            self.advance_unchanged(now, epoch_id, candidates);
            return Ok(OrchestrateOutcome::ElectionSkipped { epoch_id });
        }

        self.mark_ready(&candidates);
        self.epochs.insert(
            epoch_id,
            Epoch { elected_block: now, maintainers: candidates.clone(), ..Default::default() },
        );
        self.state.election_epoch = epoch_id;
        info!(epoch_id, members = candidates.len(), "election opened");
        self.events.push(MaintainerEvent::ElectionOpened { epoch_id, maintainers: candidates });
        Ok(OrchestrateOutcome::ElectionOpened { epoch_id })
    }

    fn reelect<T, P, V>(
        &mut self,
        now: BlockNumber,
        params: &P,
        validators: &V,
        tss: &mut T,
        election: EpochId,
    ) -> Result<OrchestrateOutcome>
    where
        T: TssManager + ?Sized,
        P: ParameterStore + ?Sized,
        V: ValidatorSource + ?Sized,
    {
        self.release_jailed(now, tss);
        let candidates = self.select_candidates(params, validators, tss);

        let in_flight = self.epochs.get(&election).map(|e| e.maintainers.clone()).unwrap_or_default();
        for account in in_flight.iter().filter(|a| !candidates.contains(a)) {
            self.set_status_if(account, &[MaintainerStatus::Ready], MaintainerStatus::Standby);
        }

        if candidates.len() < MIN_MAINTAINERS {
            info!(epoch_id = election, available = candidates.len(), "not enough candidates to re-elect");
            return Ok(OrchestrateOutcome::InsufficientCandidates { available: candidates.len() });
        }
        if same_members(&in_flight, &candidates) {
            debug!(epoch_id = election, "re-selection unchanged, waiting for the committee to change");
            return Ok(OrchestrateOutcome::Unchanged);
        }

        if !tss.elect(now, election, &candidates).map_err(tss_error)? {
            // fell back to the sitting committee
            self.state.election_epoch = 0;
            self.advance_unchanged(now, election, candidates);
            return Ok(OrchestrateOutcome::ElectionSkipped { epoch_id: election });
        }

        self.mark_ready(&candidates);
        let epoch = self.epochs.entry(election).or_default();
        epoch.elected_block = now;
        epoch.maintainers = candidates.clone();
        info!(epoch_id = election, members = candidates.len(), "election reopened");
        self.events.push(MaintainerEvent::Reelected { epoch_id: election, maintainers: candidates });
        Ok(OrchestrateOutcome::Reelected { epoch_id: election })
    }

    fn rotate<T: TssManager + ?Sized>(
        &mut self,
        now: BlockNumber,
        tss: &mut T,
        election: EpochId,
    ) -> Result<OrchestrateOutcome> {
        let current = self.state.current_epoch;
        if let Some(e) = self.epochs.get_mut(&current) {
            e.end_block = now;
        }
        let committee = match self.epochs.get_mut(&election) {
            Some(e) => {
                e.start_block = now;
                e.maintainers.clone()
            }
            None => Vec::new(),
        };
        for account in &committee {
            self.mark_active(account, election);
        }

        tss.rotate(now, current, election).map_err(tss_error)?;
        info!(retiring = current, active = election, "epoch rotated");
        self.events.push(MaintainerEvent::EpochRotated { retiring: current, active: election });
        Ok(OrchestrateOutcome::Rotated { epoch_id: election })
    }

    fn retire<T: TssManager + ?Sized>(
        &mut self,
        now: BlockNumber,
        tss: &mut T,
        election: EpochId,
    ) -> Result<OrchestrateOutcome> {
        let current = self.state.current_epoch;
        let incoming = self.epochs.get(&election).map(|e| e.maintainers.clone()).unwrap_or_default();
        let outgoing = match self.epochs.get_mut(&current) {
            Some(e) => {
                e.migrated_block = now;
                e.maintainers.clone()
            }
            None => Vec::new(),
        };
        for account in outgoing.iter().filter(|a| !incoming.contains(a)) {
            self.set_status_if(account, &[MaintainerStatus::Active], MaintainerStatus::Standby);
        }
        self.state.current_epoch = election;
        self.state.election_epoch = 0;

        tss.retire(now, current, election).map_err(tss_error)?;
        info!(epoch_id = election, "epoch advanced");
        self.events.push(MaintainerEvent::EpochAdvanced { epoch_id: election });
        Ok(OrchestrateOutcome::Retired { epoch_id: election })
    }

    /// the committee is unchanged, so the key is too: close the current
    /// epoch and open the next one on the same key
    fn advance_unchanged(&mut self, now: BlockNumber, epoch_id: EpochId, committee: Vec<Address>) {
        let current = self.state.current_epoch;
        if let Some(e) = self.epochs.get_mut(&current) {
            e.end_block = now;
            e.migrated_block = now;
        }
        for account in &committee {
            self.mark_active(account, epoch_id);
        }
        self.epochs.insert(
            epoch_id,
            Epoch { elected_block: now, start_block: now, maintainers: committee, ..Default::default() },
        );
        self.state.current_epoch = epoch_id;
        info!(epoch_id, "committee unchanged, epoch advanced on the sitting key");
        self.events.push(MaintainerEvent::ElectionSkipped { epoch_id });
    }

    /// electable maintainers under the slash cap, lowest slash points
    /// first, ties in validator-source order
    pub fn select_candidates<T, P, V>(&self, params: &P, validators: &V, tss: &T) -> Vec<Address>
    where
        T: TssManager + ?Sized,
        P: ParameterStore + ?Sized,
        V: ValidatorSource + ?Sized,
    {
        let cap = params.get_by_name(params::MAX_SLASH_POINT_FOR_ELECT);
        let mut ranked: Vec<(u128, Address)> = Vec::new();
        for signer in validators.current_eligible_signers() {
            let validator = validators.signer_to_account(&signer);
            let Some(m) = self.maintainers.get(&validator) else { continue };
            if !m.status.is_electable() {
                continue;
            }
            let points = tss.slash_point(&m.account);
            if cap != 0 && points >= cap {
                continue;
            }
            if ranked.iter().any(|(_, a)| *a == m.account) {
                continue;
            }
            ranked.push((points, m.account));
        }
        // stable: equal points keep source order
        ranked.sort_by_key(|(points, _)| *points);
        ranked.truncate(self.maintainer_limit);
        ranked.into_iter().map(|(_, a)| a).collect()
    }

    fn mark_ready(&mut self, committee: &[Address]) {
        for account in committee {
            self.set_status_if(account, &[MaintainerStatus::Standby], MaintainerStatus::Ready);
        }
    }

    fn mark_active(&mut self, account: &Address, epoch_id: EpochId) {
        let Some(validator) = self.accounts.get(account) else { return };
        let Some(m) = self.maintainers.get_mut(validator) else { return };
        m.last_active_epoch = epoch_id;
        if matches!(m.status, MaintainerStatus::Standby | MaintainerStatus::Ready) {
            m.status = MaintainerStatus::Active;
        }
    }

    fn set_status_if(&mut self, account: &Address, from: &[MaintainerStatus], to: MaintainerStatus) {
        let Some(validator) = self.accounts.get(account) else { return };
        if let Some(m) = self.maintainers.get_mut(validator) {
            if from.contains(&m.status) {
                m.status = to;
            }
        }
    }
}
