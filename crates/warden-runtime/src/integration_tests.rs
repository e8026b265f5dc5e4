//! integration tests for the warden runtime
//!
//! full flows across components:
//! - registration, election, keygen, rotation, migration, retirement
//! - observation quorum with slashing and jailing
//! - transactional dispatch and admin calls
//! - epoch rewards

use k256::ecdsa::SigningKey;
use proptest::prelude::*;
use warden_maintainers::{MaintainerKeys, OrchestrateOutcome, RewardOutcome};
use warden_primitives::{
    keccak256, key_hash, param_key, params, pubkey_to_address, Address, ErrorKind, KeyHash,
    KeygenResult, MaintainerStatus, PublicKey, TssStatus, TxIn, H256,
};
use warden_tss::{TssError, TssEvent, VoteOutcome};

use crate::memory::{InMemoryBridge, InMemoryTreasury, InMemoryValidators};
use crate::*;

type TestRuntime = Runtime<InMemoryValidators, InMemoryBridge, InMemoryTreasury>;

// ============ test setup ============

const ADMIN: Address = Address([0xad; 20]);
const EPOCH: u64 = 20;

fn genesis() -> GenesisConfig {
    let params = [
        (params::BLOCKS_PER_EPOCH, EPOCH as u128),
        (params::MAX_BLOCKS_FOR_UPDATE_TSS, 10),
        (params::MAX_SLASH_POINT_FOR_ELECT, 1_000),
        (params::JAIL_SLASH_LIMIT, 100),
        (params::JAIL_BLOCK, 30),
        (params::REWARD_PER_BLOCK, 100),
        (params::ADDITIONAL_REWARD_MAX_SLASH_POINT, 500),
        (params::OBSERVE_SLASH_POINT, 1),
        (params::OBSERVE_DELAY_SLASH_POINT, 10),
        (params::KEYGEN_DELAY_SLASH_POINT, 20),
        (params::MIGRATION_DELAY_SLASH_POINT, 30),
        (params::KEYGEN_BLAME_SLASH_POINT, 60),
        (params::DELAY_RECOVER_SLASH_POINT, 2),
        (params::MAX_OBSERVE_DELAY_BLOCK, 5),
        (params::VOTE_SCORE, 10),
        (params::DELAY_VOTE_SCORE, 5),
    ];
    GenesisConfig {
        admin: ADMIN,
        maintainer_limit: 7,
        params: params.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
    }
}

fn validator(i: u8) -> Address {
    Address::repeat_byte(0x10 + i)
}

fn node_keys(i: u8) -> MaintainerKeys {
    let sk = SigningKey::from_slice(&[i; 32]).unwrap();
    let point = sk.verifying_key().to_encoded_point(false);
    let secp256k1_pubkey = PublicKey::from_slice(&point.as_bytes()[1..]).unwrap();
    MaintainerKeys {
        account: pubkey_to_address(&secp256k1_pubkey),
        secp256k1_pubkey,
        ed25519_pubkey: [i; 32],
        p2p_address: format!("/dns4/node{i}.warden.local/tcp/30333"),
    }
}

fn account(i: u8) -> Address {
    node_keys(i).account
}

/// runtime with `n` validators, each running an activated maintainer
fn new_runtime(n: u8) -> TestRuntime {
    new_runtime_with(genesis(), n)
}

fn new_runtime_with(config: GenesisConfig, n: u8) -> TestRuntime {
    let validators = InMemoryValidators::new((1..=n).map(validator).collect());
    let mut rt = config
        .build(validators, InMemoryBridge::with_migration_polls(1), InMemoryTreasury::with_reserve(u128::MAX))
        .unwrap();
    for i in 1..=n {
        join(&mut rt, i);
    }
    rt.take_events();
    rt
}

fn join(rt: &mut TestRuntime, i: u8) {
    rt.validators.add(validator(i));
    rt.dispatch(validator(i), Call::Register { keys: node_keys(i) }).unwrap();
    rt.dispatch(validator(i), Call::Activate).unwrap();
}

fn keygen_result(epoch_id: u64, seed: u8) -> KeygenResult {
    let sk = SigningKey::from_slice(&[seed; 32]).unwrap();
    let point = sk.verifying_key().to_encoded_point(false);
    let pubkey = PublicKey::from_slice(&point.as_bytes()[1..]).unwrap();
    let (sig, recid) = sk.sign_prehash_recoverable(&keccak256(&pubkey.0)).unwrap();
    let mut signature = sig.to_bytes().to_vec();
    signature.push(recid.to_byte());
    KeygenResult { epoch_id, pubkey, blames: vec![], signature }
}

fn committee(rt: &TestRuntime, epoch_id: u64) -> Vec<Address> {
    rt.registry().epoch_info(epoch_id).unwrap().maintainers.clone()
}

fn orchestrate(rt: &mut TestRuntime) -> OrchestrateOutcome {
    match rt.dispatch(ADMIN, Call::Orchestrate) {
        Ok(CallOutcome::Orchestrate(outcome)) => outcome,
        other => panic!("orchestrate failed: {other:?}"),
    }
}

fn vote(rt: &mut TestRuntime, who: Address, call: Call) -> core::result::Result<VoteOutcome, DispatchError> {
    match rt.dispatch(who, call)? {
        CallOutcome::Vote(v) => Ok(v),
        other => panic!("not a vote: {other:?}"),
    }
}

/// every member of the electing committee votes the same key
fn finish_keygen(rt: &mut TestRuntime, epoch_id: u64, seed: u8) -> KeyHash {
    let result = keygen_result(epoch_id, seed);
    for member in committee(rt, epoch_id) {
        vote(rt, member, Call::VoteKeygen(result.clone())).unwrap();
    }
    key_hash(&result.pubkey)
}

/// rotate, migrate and retire into `epoch_id` once its key exists
fn hand_off(rt: &mut TestRuntime, epoch_id: u64) {
    rt.next_block();
    assert_eq!(orchestrate(rt), OrchestrateOutcome::Rotated { epoch_id });
    rt.next_block();
    assert_eq!(orchestrate(rt), OrchestrateOutcome::Migrating { completed: true });
    rt.next_block();
    assert_eq!(orchestrate(rt), OrchestrateOutcome::Retired { epoch_id });
}

/// genesis election through to an active epoch 1 key
fn bring_up(rt: &mut TestRuntime) -> KeyHash {
    assert_eq!(orchestrate(rt), OrchestrateOutcome::ElectionOpened { epoch_id: 1 });
    rt.next_block();
    let key = finish_keygen(rt, 1, 0x41);
    hand_off(rt, 1);
    rt.take_events();
    key
}

fn tx_in(seed: u8) -> TxIn {
    TxIn {
        from_chain: 56,
        to_chain: 1,
        tx_hash: H256([seed; 32]),
        height: 1_000 + seed as u64,
        token: b"USDT".to_vec(),
        amount: 250_000,
        from: vec![0x0a; 20],
        to: vec![0x0b; 20],
    }
}

fn active_instances(rt: &TestRuntime) -> usize {
    rt.tss().instances().filter(|(_, i)| i.status == TssStatus::Active).count()
}

// ============ lifecycle ============

#[test]
fn full_committee_lifecycle() {
    let mut rt = new_runtime(4);
    let first = bring_up(&mut rt);

    assert_eq!(rt.tss().current_key(), Some(first));
    assert_eq!(rt.tss().tss_status(1), TssStatus::Active);
    assert_eq!(rt.bridge.active, Some(first));
    assert_eq!(rt.registry().epoch_state().current_epoch, 1);
    for i in 1..=4 {
        assert_eq!(rt.registry().maintainer(&validator(i)).unwrap().status, MaintainerStatus::Active);
    }
    let start = rt.registry().epoch_info(1).unwrap().start_block;

    // a fifth maintainer joins; the next boundary elects a new committee
    join(&mut rt, 5);
    rt.set_block(start + EPOCH - 1);
    assert_eq!(orchestrate(&mut rt), OrchestrateOutcome::Idle);
    rt.next_block();
    assert_eq!(orchestrate(&mut rt), OrchestrateOutcome::ElectionOpened { epoch_id: 2 });
    assert_eq!(committee(&rt, 2).len(), 5);
    assert_eq!(rt.tss().tss_status(2), TssStatus::KeygenPending);

    rt.next_block();
    let second = finish_keygen(&mut rt, 2, 0x42);
    assert_eq!(rt.tss().tss_status(2), TssStatus::KeygenCompleted);

    rt.next_block();
    assert_eq!(orchestrate(&mut rt), OrchestrateOutcome::Rotated { epoch_id: 2 });
    assert_eq!(rt.tss().tss_status(1), TssStatus::Retiring);
    assert_eq!(rt.tss().tss_status(2), TssStatus::Migrating);
    assert_eq!((rt.bridge.retiring, rt.bridge.active), (Some(first), Some(second)));
    assert_eq!(active_instances(&rt), 0);

    rt.next_block();
    assert_eq!(orchestrate(&mut rt), OrchestrateOutcome::Migrating { completed: true });
    rt.next_block();
    assert_eq!(orchestrate(&mut rt), OrchestrateOutcome::Retired { epoch_id: 2 });
    assert_eq!(rt.tss().tss_status(1), TssStatus::Retired);
    assert_eq!(rt.tss().tss_status(2), TssStatus::Active);
    assert_eq!(rt.tss().current_key(), Some(second));
    assert_eq!(active_instances(&rt), 1);
    assert_eq!(rt.tss().members(&second).map(<[Address]>::len), Some(5));

    // epoch 1 closed, its reward is payable once
    let epoch = rt.registry().epoch_info(1).unwrap().clone();
    let total = (epoch.end_block - epoch.start_block) as u128 * 100;
    let Ok(CallOutcome::Reward(RewardOutcome::Paid(report))) = rt.dispatch(ADMIN, Call::DistributeReward) else {
        panic!("epoch 1 reward should be payable")
    };
    assert_eq!(report.total, total);
    assert_eq!(report.paid + report.remainder, total);
    assert!(report.failed.is_empty());
    let share = rt.treasury.balance(&account(1));
    assert!(share > 0);
    for i in 2..=4 {
        assert_eq!(rt.treasury.balance(&account(i)), share);
    }
    assert_eq!(rt.treasury.balance(&account(5)), 0);
    assert_eq!(
        rt.dispatch(ADMIN, Call::DistributeReward),
        Ok(CallOutcome::Reward(RewardOutcome::NotReady))
    );
}

#[test]
fn reward_before_hand_off_is_noop() {
    let mut rt = new_runtime(4);
    bring_up(&mut rt);
    assert_eq!(
        rt.dispatch(ADMIN, Call::DistributeReward),
        Ok(CallOutcome::Reward(RewardOutcome::NotReady))
    );
    assert!(rt.treasury.balances.is_empty());
}

#[test]
fn unchanged_committee_is_bookkeeping_only() {
    let mut rt = new_runtime(4);
    let key = bring_up(&mut rt);
    let start = rt.registry().epoch_info(1).unwrap().start_block;

    rt.set_block(start + EPOCH);
    assert_eq!(orchestrate(&mut rt), OrchestrateOutcome::ElectionSkipped { epoch_id: 2 });
    assert_eq!(rt.tss().instances().count(), 1);
    assert_eq!(rt.tss().slot(2), Some(warden_tss::TssSlot::Key(key)));
    assert_eq!(rt.registry().epoch_state().current_epoch, 2);
    assert!(!rt.events().iter().any(|r| matches!(r.event, RuntimeEvent::Tss(TssEvent::KeygenRequested { .. }))));

    // the next boundary counts from the bookkeeping epoch
    rt.set_block(start + 2 * EPOCH - 1);
    assert_eq!(orchestrate(&mut rt), OrchestrateOutcome::Idle);
}

#[test]
fn keygen_timeout_with_identical_set_opens_nothing() {
    let mut rt = new_runtime(4);
    assert_eq!(orchestrate(&mut rt), OrchestrateOutcome::ElectionOpened { epoch_id: 1 });
    rt.take_events();

    rt.set_block(rt.block() + 11);
    assert_eq!(orchestrate(&mut rt), OrchestrateOutcome::Unchanged);
    assert!(!rt.events().iter().any(|r| matches!(
        r.event,
        RuntimeEvent::Tss(TssEvent::KeygenRequested { .. })
            | RuntimeEvent::Maintainers(warden_maintainers::MaintainerEvent::Reelected { .. })
    )));
}

#[test]
fn blamed_member_is_replaced_after_failed_keygen() {
    let mut config = genesis();
    // one blame puts the member over the election cap
    config.params.insert(params::MAX_SLASH_POINT_FOR_ELECT.to_string(), 50);
    let mut rt = new_runtime_with(config, 5);
    assert_eq!(orchestrate(&mut rt), OrchestrateOutcome::ElectionOpened { epoch_id: 1 });

    let blame = KeygenResult {
        epoch_id: 1,
        pubkey: PublicKey([0u8; 64]),
        blames: vec![account(3)],
        signature: vec![],
    };
    for i in [1, 2, 4, 5] {
        vote(&mut rt, account(i), Call::VoteKeygen(blame.clone())).unwrap();
    }
    assert_eq!(rt.tss().tss_status(1), TssStatus::KeygenFailed);
    assert_eq!(rt.tss().slash_point(&account(3)), 80);

    rt.next_block();
    assert_eq!(orchestrate(&mut rt), OrchestrateOutcome::Reelected { epoch_id: 1 });
    assert!(!committee(&rt, 1).contains(&account(3)));
    assert_eq!(
        rt.registry().maintainer(&validator(3)).unwrap().status,
        MaintainerStatus::Standby
    );

    rt.next_block();
    finish_keygen(&mut rt, 1, 0x41);
    hand_off(&mut rt, 1);
    assert_eq!(active_instances(&rt), 1);
}

#[test]
fn failed_keygen_can_fail_again_after_reelection() {
    let mut config = genesis();
    config.params.insert(params::JAIL_SLASH_LIMIT.to_string(), 1_000);
    let mut rt = new_runtime_with(config, 5);
    orchestrate(&mut rt);

    let blame = KeygenResult {
        epoch_id: 1,
        pubkey: PublicKey([0u8; 64]),
        blames: vec![account(3)],
        signature: vec![],
    };
    for i in [1, 2, 4, 5] {
        vote(&mut rt, account(i), Call::VoteKeygen(blame.clone())).unwrap();
    }
    assert_eq!(rt.tss().tss_status(1), TssStatus::KeygenFailed);

    // the blamed member stays under the election cap, a sixth joins
    join(&mut rt, 6);
    rt.next_block();
    assert_eq!(orchestrate(&mut rt), OrchestrateOutcome::Reelected { epoch_id: 1 });
    assert_eq!(committee(&rt, 1).len(), 6);
    assert_eq!(rt.tss().tss_status(1), TssStatus::KeygenPending);

    rt.next_block();
    for i in [1, 2, 4, 5] {
        assert!(matches!(
            vote(&mut rt, account(i), Call::VoteKeygen(blame.clone())),
            Ok(VoteOutcome::Pending { .. })
        ));
    }
    assert_eq!(vote(&mut rt, account(6), Call::VoteKeygen(blame)), Ok(VoteOutcome::Approved));
    assert_eq!(rt.tss().tss_status(1), TssStatus::KeygenFailed);
    // absent and blamed in both rounds
    assert_eq!(rt.tss().slash_point(&account(3)), 160);
}

// ============ votes ============

#[test]
fn committee_of_five_reaches_quorum_on_fourth_vote() {
    let mut rt = new_runtime(5);
    bring_up(&mut rt);
    let tx = tx_in(1);

    for i in 1..=3 {
        vote(&mut rt, account(i), Call::VoteTxIn(tx.clone())).unwrap();
    }
    let id = warden_primitives::Claim::content_hash(&tx);
    let proposal = rt.tss().proposal(&id).unwrap();
    assert_eq!((proposal.count, proposal.consensus_block), (3, 0));
    assert!(rt.bridge.tx_in.is_empty());

    rt.next_block();
    assert_eq!(vote(&mut rt, account(4), Call::VoteTxIn(tx.clone())), Ok(VoteOutcome::Approved));
    assert_eq!(rt.bridge.tx_in, vec![tx.clone()]);
    assert_eq!(rt.tss().proposal(&id).unwrap().consensus_block, rt.block());

    assert_eq!(
        vote(&mut rt, account(4), Call::VoteTxIn(tx.clone())).map_err(|e| e.kind()),
        Err(ErrorKind::Precondition)
    );
    assert_eq!(vote(&mut rt, account(5), Call::VoteTxIn(tx)), Ok(VoteOutcome::Late));
    assert_eq!(rt.bridge.tx_in.len(), 1);

    let score = rt.registry().epoch_score(1).unwrap();
    assert!(score.per_member[&account(5)] < score.per_member[&account(1)]);
}

#[test]
fn failed_call_leaves_no_trace() {
    let mut rt = new_runtime(4);
    bring_up(&mut rt);
    let tx = tx_in(2);

    vote(&mut rt, account(1), Call::VoteTxIn(tx.clone())).unwrap();
    vote(&mut rt, account(2), Call::VoteTxIn(tx.clone())).unwrap();
    let events_before = rt.events().len();

    rt.bridge.halted = true;
    let err = vote(&mut rt, account(3), Call::VoteTxIn(tx.clone())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::External);

    let id = warden_primitives::Claim::content_hash(&tx);
    assert_eq!(rt.tss().proposal(&id).unwrap().count, 2);
    assert_eq!(rt.tss().slash_point(&account(1)), 1);
    assert_eq!(rt.tss().slash_point(&account(3)), 0);
    assert_eq!(rt.tss().slash_point(&account(4)), 0);
    assert_eq!(rt.events().len(), events_before);

    rt.bridge.halted = false;
    assert_eq!(vote(&mut rt, account(3), Call::VoteTxIn(tx)), Ok(VoteOutcome::Approved));
    assert_eq!(rt.tss().slash_point(&account(1)), 0);
    assert_eq!(rt.tss().slash_point(&account(4)), 10);
}

#[test]
fn outsider_vote_rejected() {
    let mut rt = new_runtime(4);
    bring_up(&mut rt);
    let err = vote(&mut rt, account(9), Call::VoteTxIn(tx_in(3))).unwrap_err();
    assert_eq!(err, DispatchError::Tss(TssError::NotCommitteeMember(account(9))));
    assert_eq!(err.kind(), ErrorKind::Access);
}

#[test]
fn repeat_absentee_is_jailed_and_released() {
    let mut config = genesis();
    config.params.insert(params::JAIL_SLASH_LIMIT.to_string(), 25);
    let mut rt = new_runtime_with(config, 4);
    bring_up(&mut rt);
    let start = rt.registry().epoch_info(1).unwrap().start_block;

    for seed in 10..13 {
        for i in 1..=3 {
            vote(&mut rt, account(i), Call::VoteTxIn(tx_in(seed))).unwrap();
        }
    }
    assert_eq!(rt.tss().slash_point(&account(4)), 30);
    let m = rt.registry().maintainer(&validator(4)).unwrap();
    assert_eq!(m.status, MaintainerStatus::Jailed);
    let release = rt.registry().jail_release(&validator(4)).unwrap();
    assert_eq!(release, rt.block() + 30);
    assert!(rt
        .events()
        .iter()
        .any(|r| matches!(&r.event, RuntimeEvent::Maintainers(warden_maintainers::MaintainerEvent::Jailed { account: a, .. }) if *a == account(4))));

    // the sweep at the next boundary releases and wipes the slate
    rt.set_block(release.max(start + EPOCH));
    assert_eq!(orchestrate(&mut rt), OrchestrateOutcome::ElectionSkipped { epoch_id: 2 });
    assert_eq!(rt.tss().slash_point(&account(4)), 0);
    assert_eq!(rt.registry().maintainer(&validator(4)).unwrap().status, MaintainerStatus::Active);
}

// ============ member and admin calls ============

#[test]
fn register_by_non_validator_rejected() {
    let mut rt = new_runtime(0);
    let err = rt
        .dispatch(validator(1), Call::Register { keys: node_keys(1) })
        .unwrap_err();
    assert_eq!(err.to_string(), "only validator can register");
    assert_eq!(err.kind(), ErrorKind::Access);
    assert!(rt.registry().maintainer(&validator(1)).is_none());
    assert!(rt.events().is_empty());
}

#[test]
fn heartbeat_is_recorded() {
    let mut rt = new_runtime(3);
    rt.set_block(42);
    rt.dispatch(account(2), Call::Heartbeat).unwrap();
    assert_eq!(rt.registry().maintainer(&validator(2)).unwrap().last_heartbeat, 42);
    assert_eq!(rt.events().last().map(|r| r.block), Some(42));
}

#[test]
fn admin_calls_are_guarded() {
    let mut rt = new_runtime(4);
    let key = param_key(params::BLOCKS_PER_EPOCH);

    let err = rt.dispatch(validator(1), Call::SetParam { key, value: 5 }).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Access);
    assert!(rt.dispatch(validator(1), Call::SetMaintainerLimit(5)).is_err());
    assert!(rt.dispatch(validator(1), Call::EmergencyPause(1)).is_err());

    rt.dispatch(ADMIN, Call::SetParam { key, value: 5 }).unwrap();
    assert_eq!(warden_primitives::ParameterStore::get(rt.params(), &key), 5);
    rt.dispatch(ADMIN, Call::SetMaintainerLimit(3)).unwrap();
    assert_eq!(rt.registry().maintainer_limit(), 3);
    assert_eq!(
        rt.dispatch(ADMIN, Call::SetMaintainerLimit(40)).map_err(|e| e.kind()),
        Err(ErrorKind::Precondition)
    );
}

#[test]
fn emergency_pause_freezes_votes() {
    let mut rt = new_runtime(4);
    bring_up(&mut rt);
    rt.dispatch(ADMIN, Call::EmergencyPause(1)).unwrap();
    assert_eq!(rt.tss().tss_status(1), TssStatus::EmergencyPause);
    assert_eq!(
        vote(&mut rt, account(1), Call::VoteTxIn(tx_in(4))),
        Err(DispatchError::Tss(TssError::Paused(1)))
    );

    // a paused key never counts as served
    rt.set_block(rt.block() + 10 * EPOCH);
    assert_eq!(orchestrate(&mut rt), OrchestrateOutcome::Idle);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn unchanged_committee_creates_no_instance(n in 3u8..8, extra in 0u64..50) {
        let mut rt = new_runtime(n);
        bring_up(&mut rt);
        let start = rt.registry().epoch_info(1).unwrap().start_block;

        rt.set_block(start + EPOCH + extra);
        prop_assert_eq!(orchestrate(&mut rt), OrchestrateOutcome::ElectionSkipped { epoch_id: 2 });
        prop_assert_eq!(rt.tss().instances().count(), 1);
        prop_assert_eq!(active_instances(&rt), 1);
        prop_assert!(rt.tss().electing().is_none());
    }
}
