//! warden runtime
//!
//! composes the parameter store, the maintainer registry and the TSS
//! coordinator behind a single dispatch entry point. every call is
//! all-or-nothing: component state is snapshotted before the call and
//! restored when it fails. events of successful calls are stamped with the
//! block number and appended to the runtime log.
//!
//! external collaborators (validator source, bridge, treasury) are owned
//! by the runtime but never rolled back; the core orders its own state
//! changes before calling them.

use thiserror::Error;
use tracing::{debug, warn};
use warden_maintainers::{
    MaintainerError, MaintainerEvent, MaintainerKeys, MaintainerRegistry, OrchestrateOutcome,
    RegistryHooks, RewardOutcome,
};
use warden_primitives::{
    Address, Bridge, BlockNumber, EpochId, ErrorKind, KeygenResult, NetworkFee, ParamError,
    Parameters, Treasury, TxIn, TxOut, ValidatorSource, H256,
};
use warden_tss::{TssCoordinator, TssError, TssEvent, TssHandle, VoteOutcome};

pub mod genesis_config_presets;
pub mod memory;

#[cfg(test)]
mod integration_tests;

pub use genesis_config_presets::{GenesisConfig, GenesisError};

// ============ calls ============

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    /// origin: validator
    Register { keys: MaintainerKeys },
    Update { keys: MaintainerKeys },
    Activate,
    Revoke,
    Deregister,
    /// origin: committee account
    Heartbeat,
    VoteKeygen(KeygenResult),
    VoteNetworkFee(NetworkFee),
    VoteTxIn(TxIn),
    VoteTxOut(TxOut),
    /// origin: anyone
    Orchestrate,
    DistributeReward,
    /// origin: admin
    SetParam { key: H256, value: u128 },
    SetMaintainerLimit(usize),
    EmergencyPause(EpochId),
}

impl Call {
    fn name(&self) -> &'static str {
        match self {
            Call::Register { .. } => "register",
            Call::Update { .. } => "update",
            Call::Activate => "activate",
            Call::Revoke => "revoke",
            Call::Deregister => "deregister",
            Call::Heartbeat => "heartbeat",
            Call::VoteKeygen(_) => "vote_keygen",
            Call::VoteNetworkFee(_) => "vote_network_fee",
            Call::VoteTxIn(_) => "vote_tx_in",
            Call::VoteTxOut(_) => "vote_tx_out",
            Call::Orchestrate => "orchestrate",
            Call::DistributeReward => "distribute_reward",
            Call::SetParam { .. } => "set_param",
            Call::SetMaintainerLimit(_) => "set_maintainer_limit",
            Call::EmergencyPause(_) => "emergency_pause",
        }
    }
}

/// what a successful call produced
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallOutcome {
    Done,
    Vote(VoteOutcome),
    Orchestrate(OrchestrateOutcome),
    Reward(RewardOutcome),
}

// ============ events ============

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuntimeEvent {
    Maintainers(MaintainerEvent),
    Tss(TssEvent),
    ParameterSet { key: H256, value: u128 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRecord {
    pub block: BlockNumber,
    pub event: RuntimeEvent,
}

// ============ errors ============

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Maintainer(#[from] MaintainerError),

    #[error(transparent)]
    Tss(#[from] TssError),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Param(e) => e.kind(),
            Self::Maintainer(e) => e.kind(),
            Self::Tss(e) => e.kind(),
        }
    }
}

pub type DispatchResult = core::result::Result<CallOutcome, DispatchError>;

// ============ runtime ============

pub struct Runtime<V, B, Tr> {
    params: Parameters,
    registry: MaintainerRegistry,
    tss: TssCoordinator,
    pub validators: V,
    pub bridge: B,
    pub treasury: Tr,
    block: BlockNumber,
    events: Vec<EventRecord>,
}

impl<V, B, Tr> Runtime<V, B, Tr>
where
    V: ValidatorSource,
    B: Bridge,
    Tr: Treasury,
{
    pub fn new(params: Parameters, registry: MaintainerRegistry, validators: V, bridge: B, treasury: Tr) -> Self {
        Self {
            params,
            registry,
            tss: TssCoordinator::new(),
            validators,
            bridge,
            treasury,
            block: 1,
            events: Vec::new(),
        }
    }

    // ============ views ============

    pub fn block(&self) -> BlockNumber {
        self.block
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn registry(&self) -> &MaintainerRegistry {
        &self.registry
    }

    pub fn tss(&self) -> &TssCoordinator {
        &self.tss
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<EventRecord> {
        core::mem::take(&mut self.events)
    }

    // ============ blocks ============

    pub fn set_block(&mut self, block: BlockNumber) {
        self.block = block;
    }

    pub fn next_block(&mut self) -> BlockNumber {
        self.block += 1;
        self.block
    }

    // ============ dispatch ============

    pub fn dispatch(&mut self, origin: Address, call: Call) -> DispatchResult {
        let name = call.name();
        let snapshot = (self.params.clone(), self.registry.clone(), self.tss.clone());

        match self.apply(origin, call) {
            Ok(outcome) => {
                debug!(call = name, %origin, block = self.block, "dispatched");
                self.collect_events();
                Ok(outcome)
            }
            Err(e) => {
                (self.params, self.registry, self.tss) = snapshot;
                warn!(call = name, %origin, block = self.block, error = %e, "dispatch failed");
                Err(e)
            }
        }
    }

    fn apply(&mut self, origin: Address, call: Call) -> DispatchResult {
        let now = self.block;
        match call {
            Call::Register { keys } => {
                self.registry.register(now, &self.validators, &origin, keys)?;
            }
            Call::Update { keys } => self.registry.update(&origin, keys)?,
            Call::Activate => self.registry.activate(&origin)?,
            Call::Revoke => self.registry.revoke(&origin)?,
            Call::Deregister => self.registry.deregister(&origin)?,
            Call::Heartbeat => self.registry.heartbeat(now, &origin)?,

            Call::VoteKeygen(result) => {
                let mut hooks = RegistryHooks::new(&mut self.registry, &self.params, now);
                let vote = self
                    .tss
                    .vote_keygen_result(&mut hooks, &self.params, now, &origin, &result)?;
                return Ok(CallOutcome::Vote(vote));
            }
            Call::VoteNetworkFee(fee) => {
                let mut hooks = RegistryHooks::new(&mut self.registry, &self.params, now);
                let vote = self.tss.vote_network_fee(
                    &mut hooks,
                    &self.params,
                    &mut self.bridge,
                    now,
                    &origin,
                    &fee,
                )?;
                return Ok(CallOutcome::Vote(vote));
            }
            Call::VoteTxIn(tx) => {
                let mut hooks = RegistryHooks::new(&mut self.registry, &self.params, now);
                let vote = self
                    .tss
                    .vote_tx_in(&mut hooks, &self.params, &mut self.bridge, now, &origin, &tx)?;
                return Ok(CallOutcome::Vote(vote));
            }
            Call::VoteTxOut(tx) => {
                let mut hooks = RegistryHooks::new(&mut self.registry, &self.params, now);
                let vote = self
                    .tss
                    .vote_tx_out(&mut hooks, &self.params, &mut self.bridge, now, &origin, &tx)?;
                return Ok(CallOutcome::Vote(vote));
            }

            Call::Orchestrate => {
                let mut handle = TssHandle::new(&mut self.tss, &mut self.bridge);
                let outcome = self
                    .registry
                    .orchestrate(now, &self.params, &self.validators, &mut handle)?;
                return Ok(CallOutcome::Orchestrate(outcome));
            }
            Call::DistributeReward => {
                let handle = TssHandle::new(&mut self.tss, &mut self.bridge);
                let outcome = self
                    .registry
                    .distribute_reward(&self.params, &mut self.treasury, &handle)?;
                return Ok(CallOutcome::Reward(outcome));
            }

            Call::SetParam { key, value } => {
                self.params.set(&origin, key, value)?;
                self.push(RuntimeEvent::ParameterSet { key, value });
            }
            Call::SetMaintainerLimit(limit) => {
                self.params.ensure_admin(&origin)?;
                self.registry.set_maintainer_limit(limit)?;
            }
            Call::EmergencyPause(epoch_id) => {
                self.params.ensure_admin(&origin)?;
                self.tss.emergency_pause(epoch_id)?;
            }
        }
        Ok(CallOutcome::Done)
    }

    fn push(&mut self, event: RuntimeEvent) {
        self.events.push(EventRecord { block: self.block, event });
    }

    fn collect_events(&mut self) {
        for e in self.registry.take_events() {
            self.push(RuntimeEvent::Maintainers(e));
        }
        for e in self.tss.take_events() {
            self.push(RuntimeEvent::Tss(e));
        }
    }
}
