//! quorum voting and vote settlement
//!
//! a vote before quorum is charged `OBSERVE_SLASH_POINT`. the vote that
//! reaches quorum freezes `consensus_block`, applies the effect once and
//! settles the committee: timely voters get the observe charge back plus
//! `VOTE_SCORE`, absentees pay the delay penalty of the proposal kind. a
//! member who shows up after quorum gets the delay penalty back, minus
//! `DELAY_RECOVER_SLASH_POINT` once `MAX_OBSERVE_DELAY_BLOCK` has passed.

use std::collections::BTreeMap;

use tracing::{debug, info};
use warden_primitives::{
    crypto, params, quorum_threshold, Address, Bridge, BlockNumber, Claim, EpochId,
    KeygenResult, MaintainerHooks, NetworkFee, ParameterStore, ProposalId, TransferKind,
    TssStatus, TxIn, TxOut,
};

use crate::error::{Result, TssError};
use crate::types::{Proposal, ProposalKind, TssEvent, TssSlot, VoteOutcome};
use crate::TssCoordinator;

/// penalty and score amounts, read from the parameter store once per vote
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlashSchedule {
    pub observe: u128,
    pub observe_delay: u128,
    pub keygen_delay: u128,
    pub migration_delay: u128,
    pub keygen_blame: u128,
    pub delay_recover: u128,
    pub max_delay_block: u64,
    pub vote_score: u128,
    pub delay_vote_score: u128,
    /// 0 disables jailing
    pub jail_limit: u128,
}

impl SlashSchedule {
    pub fn from_params<P: ParameterStore + ?Sized>(p: &P) -> Self {
        Self {
            observe: p.get_by_name(params::OBSERVE_SLASH_POINT),
            observe_delay: p.get_by_name(params::OBSERVE_DELAY_SLASH_POINT),
            keygen_delay: p.get_by_name(params::KEYGEN_DELAY_SLASH_POINT),
            migration_delay: p.get_by_name(params::MIGRATION_DELAY_SLASH_POINT),
            keygen_blame: p.get_by_name(params::KEYGEN_BLAME_SLASH_POINT),
            delay_recover: p.get_by_name(params::DELAY_RECOVER_SLASH_POINT),
            max_delay_block: p.get_u64(params::MAX_OBSERVE_DELAY_BLOCK),
            vote_score: p.get_by_name(params::VOTE_SCORE),
            delay_vote_score: p.get_by_name(params::DELAY_VOTE_SCORE),
            jail_limit: p.get_by_name(params::JAIL_SLASH_LIMIT),
        }
    }

    pub fn delay_for(&self, kind: ProposalKind) -> u128 {
        match kind {
            ProposalKind::Keygen => self.keygen_delay,
            ProposalKind::Migration => self.migration_delay,
            ProposalKind::NetworkFee | ProposalKind::TxIn | ProposalKind::TxOut => self.observe_delay,
        }
    }
}

/// per-account slash points; saturates at zero
#[derive(Clone, Debug, Default)]
pub(crate) struct SlashBook {
    points: BTreeMap<Address, u128>,
}

impl SlashBook {
    pub(crate) fn get(&self, account: &Address) -> u128 {
        self.points.get(account).copied().unwrap_or(0)
    }

    pub(crate) fn reset(&mut self, account: &Address) {
        self.points.remove(account);
    }

    /// add points; crossing `jail_limit` reports the member to the registry
    fn add<H: MaintainerHooks + ?Sized>(
        &mut self,
        hooks: &mut H,
        jail_limit: u128,
        account: &Address,
        points: u128,
        events: &mut Vec<TssEvent>,
    ) -> Result<()> {
        if points == 0 {
            return Ok(());
        }
        let prev = self.get(account);
        let total = prev.saturating_add(points);
        self.points.insert(*account, total);
        events.push(TssEvent::SlashPointAdded { account: *account, points, total });

        if jail_limit != 0 && prev < jail_limit && total >= jail_limit {
            info!(%account, total, "slash limit crossed, jailing");
            hooks
                .add_to_jail(account)
                .map_err(|e| TssError::Maintainer(e.to_string()))?;
        }
        Ok(())
    }

    fn sub(&mut self, account: &Address, points: u128, events: &mut Vec<TssEvent>) {
        if points == 0 {
            return;
        }
        let total = self.get(account).saturating_sub(points);
        if total == 0 {
            self.points.remove(account);
        } else {
            self.points.insert(*account, total);
        }
        events.push(TssEvent::SlashPointRemoved { account: *account, points, total });
    }
}

impl TssCoordinator {
    /// vote on the outcome of the off-chain key generation
    pub fn vote_keygen_result<H, P>(
        &mut self,
        hooks: &mut H,
        params: &P,
        now: BlockNumber,
        who: &Address,
        result: &KeygenResult,
    ) -> Result<VoteOutcome>
    where
        H: MaintainerHooks + ?Sized,
        P: ParameterStore + ?Sized,
    {
        if !result.is_failure() {
            crypto::verify_key_signature(&result.pubkey, &result.signature)?;
        }
        let id = self
            .keygen_proposal_id(result)
            .ok_or(TssError::NoElection(result.epoch_id))?;

        let fresh = match self.proposals.get(&id) {
            Some(p) if p.is_approved() => None,
            existing => {
                let electing = self
                    .electing
                    .as_ref()
                    .filter(|e| e.epoch_id == result.epoch_id)
                    .ok_or(TssError::NoElection(result.epoch_id))?;
                match electing.status {
                    TssStatus::KeygenPending => {}
                    TssStatus::EmergencyPause => return Err(TssError::Paused(result.epoch_id)),
                    actual => {
                        return Err(TssError::InvalidStatus {
                            epoch_id: result.epoch_id,
                            expected: TssStatus::KeygenPending,
                            actual,
                        })
                    }
                }
                if existing.is_some() {
                    None
                } else {
                    if let Some(b) = result.blames.iter().find(|b| !electing.is_member(b)) {
                        return Err(TssError::InvalidBlame(*b));
                    }
                    if !result.is_failure() && self.instances.contains_key(&crypto::key_hash(&result.pubkey)) {
                        return Err(TssError::DuplicateKey(crypto::key_hash(&result.pubkey)));
                    }
                    Some(Proposal::new(ProposalKind::Keygen, result.epoch_id, electing.maintainers.clone()))
                }
            }
        };

        let schedule = SlashSchedule::from_params(params);
        let outcome = self.cast(hooks, &schedule, now, who, id, fresh)?;
        if outcome == VoteOutcome::Approved {
            self.apply_keygen(hooks, &schedule, result)?;
        }
        Ok(outcome)
    }

    fn apply_keygen<H: MaintainerHooks + ?Sized>(
        &mut self,
        hooks: &mut H,
        schedule: &SlashSchedule,
        result: &KeygenResult,
    ) -> Result<()> {
        let epoch_id = result.epoch_id;
        if result.is_failure() {
            if let Some(electing) = self.electing.as_mut() {
                electing.status = TssStatus::KeygenFailed;
            }
            for blamed in &result.blames {
                self.slash
                    .add(hooks, schedule.jail_limit, blamed, schedule.keygen_blame, &mut self.events)?;
            }
            info!(epoch_id, blamed = result.blames.len(), "keygen failed");
            self.events.push(TssEvent::KeygenFailed { epoch_id, blames: result.blames.clone() });
            return Ok(());
        }

        let key = crypto::key_hash(&result.pubkey);
        let mut instance = self.electing.take().ok_or(TssError::NoElection(epoch_id))?;
        instance.pubkey = Some(result.pubkey);
        instance.status = TssStatus::KeygenCompleted;
        self.instances.insert(key, instance);
        self.slots.insert(epoch_id, TssSlot::Key(key));
        info!(epoch_id, %key, "keygen completed");
        self.events.push(TssEvent::KeygenCompleted { epoch_id, key });
        Ok(())
    }

    /// vote on a connected chain's network fee
    pub fn vote_network_fee<H, P, B>(
        &mut self,
        hooks: &mut H,
        params: &P,
        bridge: &mut B,
        now: BlockNumber,
        who: &Address,
        fee: &NetworkFee,
    ) -> Result<VoteOutcome>
    where
        H: MaintainerHooks + ?Sized,
        P: ParameterStore + ?Sized,
        B: Bridge + ?Sized,
    {
        let outcome = self.observe(hooks, params, now, who, fee.content_hash(), ProposalKind::NetworkFee)?;
        if outcome == VoteOutcome::Approved {
            bridge.post_network_fee(fee)?;
            self.events.push(TssEvent::NetworkFeePosted { chain: fee.chain, height: fee.height });
        }
        Ok(outcome)
    }

    /// vote on an inbound transfer
    pub fn vote_tx_in<H, P, B>(
        &mut self,
        hooks: &mut H,
        params: &P,
        bridge: &mut B,
        now: BlockNumber,
        who: &Address,
        tx: &TxIn,
    ) -> Result<VoteOutcome>
    where
        H: MaintainerHooks + ?Sized,
        P: ParameterStore + ?Sized,
        B: Bridge + ?Sized,
    {
        let outcome = self.observe(hooks, params, now, who, tx.content_hash(), ProposalKind::TxIn)?;
        if outcome == VoteOutcome::Approved {
            bridge.execute_tx_in(tx)?;
            self.events.push(TssEvent::TxInExecuted { tx_hash: tx.tx_hash });
        }
        Ok(outcome)
    }

    /// vote on an outbound transfer; vault migrations are slashed harder
    pub fn vote_tx_out<H, P, B>(
        &mut self,
        hooks: &mut H,
        params: &P,
        bridge: &mut B,
        now: BlockNumber,
        who: &Address,
        tx: &TxOut,
    ) -> Result<VoteOutcome>
    where
        H: MaintainerHooks + ?Sized,
        P: ParameterStore + ?Sized,
        B: Bridge + ?Sized,
    {
        let kind = match tx.kind {
            TransferKind::Transfer => ProposalKind::TxOut,
            TransferKind::Migration => ProposalKind::Migration,
        };
        let outcome = self.observe(hooks, params, now, who, tx.content_hash(), kind)?;
        if outcome == VoteOutcome::Approved {
            bridge.execute_tx_out(tx)?;
            self.events.push(TssEvent::TxOutExecuted { tx_hash: tx.tx_hash });
        }
        Ok(outcome)
    }

    /// observations are judged by the committee of the key holding custody
    fn observe<H, P>(
        &mut self,
        hooks: &mut H,
        params: &P,
        now: BlockNumber,
        who: &Address,
        id: ProposalId,
        kind: ProposalKind,
    ) -> Result<VoteOutcome>
    where
        H: MaintainerHooks + ?Sized,
        P: ParameterStore + ?Sized,
    {
        let key = self.current.ok_or(TssError::NoActiveKey)?;
        let instance = self.instances.get(&key).ok_or(TssError::NoActiveKey)?;
        if instance.status == TssStatus::EmergencyPause {
            return Err(TssError::Paused(instance.epoch_id));
        }
        let fresh = if self.proposals.contains_key(&id) {
            None
        } else {
            Some(Proposal::new(kind, instance.epoch_id, instance.maintainers.clone()))
        };
        let schedule = SlashSchedule::from_params(params);
        self.cast(hooks, &schedule, now, who, id, fresh)
    }

    /// record one vote and settle slash points
    fn cast<H: MaintainerHooks + ?Sized>(
        &mut self,
        hooks: &mut H,
        schedule: &SlashSchedule,
        now: BlockNumber,
        who: &Address,
        id: ProposalId,
        fresh: Option<Proposal>,
    ) -> Result<VoteOutcome> {
        let Self { proposals, slash, events, .. } = self;

        let proposal = match fresh {
            // outsiders must not leave an empty proposal behind
            Some(p) if p.member_index(who).is_none() => {
                return Err(TssError::NotCommitteeMember(*who))
            }
            Some(p) => proposals.entry(id).or_insert(p),
            None => proposals.get_mut(&id).ok_or(TssError::StaleProposal)?,
        };
        let index = proposal
            .member_index(who)
            .ok_or(TssError::NotCommitteeMember(*who))?;
        if proposal.voted.contains(index) {
            return Err(TssError::AlreadyVoted(*who));
        }
        proposal.voted.insert(index);
        proposal.count += 1;
        debug!(proposal = %id, %who, count = proposal.count, "vote recorded");
        events.push(TssEvent::Voted { proposal: id, who: *who, count: proposal.count });

        if proposal.is_approved() {
            settle_late(proposal, schedule, hooks, slash, events, now, who);
            return Ok(VoteOutcome::Late);
        }

        let needed = quorum_threshold(proposal.committee.len()) as u32;
        if proposal.count < needed {
            slash.add(hooks, schedule.jail_limit, who, schedule.observe, events)?;
            return Ok(VoteOutcome::Pending { count: proposal.count, needed });
        }

        proposal.consensus_block = now;
        info!(proposal = %id, kind = ?proposal.kind, block = now, "quorum reached");
        events.push(TssEvent::ProposalApproved { proposal: id, kind: proposal.kind, block: now });
        settle(proposal, schedule, hooks, slash, events, who)?;
        Ok(VoteOutcome::Approved)
    }
}

/// quorum settlement: refund and reward voters, charge absentees
fn settle<H: MaintainerHooks + ?Sized>(
    proposal: &Proposal,
    schedule: &SlashSchedule,
    hooks: &mut H,
    slash: &mut SlashBook,
    events: &mut Vec<TssEvent>,
    trigger: &Address,
) -> Result<()> {
    let epoch_id: EpochId = proposal.epoch_id;
    for (i, member) in proposal.committee.iter().enumerate() {
        if !proposal.voted.contains(i) {
            continue;
        }
        // the quorum vote itself was never charged
        if member != trigger {
            slash.sub(member, schedule.observe, events);
        }
        if schedule.vote_score != 0 {
            hooks.add_score(epoch_id, member, schedule.vote_score);
        }
    }

    let delay = schedule.delay_for(proposal.kind);
    for member in proposal.absentees() {
        slash.add(hooks, schedule.jail_limit, member, delay, events)?;
    }
    Ok(())
}

/// vote after quorum: refund the delay charge, keep a residue if very late
fn settle_late<H: MaintainerHooks + ?Sized>(
    proposal: &Proposal,
    schedule: &SlashSchedule,
    hooks: &mut H,
    slash: &mut SlashBook,
    events: &mut Vec<TssEvent>,
    now: BlockNumber,
    who: &Address,
) {
    let delay = schedule.delay_for(proposal.kind);
    let elapsed = now.saturating_sub(proposal.consensus_block);
    let refund = if elapsed > schedule.max_delay_block {
        delay.saturating_sub(schedule.delay_recover)
    } else {
        delay
    };
    slash.sub(who, refund, events);
    if schedule.delay_vote_score != 0 {
        hooks.add_score(proposal.epoch_id, who, schedule.delay_vote_score);
    }
    debug!(%who, elapsed, refund, "late vote settled");
}
