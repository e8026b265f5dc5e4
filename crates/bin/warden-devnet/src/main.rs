//! warden devnet
//!
//! Runs the maintainer committee in a single process against in-memory
//! collaborators. Every maintainer is simulated: keygen rounds are answered
//! with deterministic secp256k1 keys and the committee observes a synthetic
//! inbound transfer at a fixed interval.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use k256::ecdsa::SigningKey;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use warden_maintainers::{MaintainerKeys, OrchestrateOutcome, RewardOutcome};
use warden_primitives::{
    keccak256, pubkey_to_address, Address, BlockNumber, EpochId, KeygenResult, PublicKey,
    TssStatus, TxIn, H256,
};
use warden_runtime::genesis_config_presets::{self, GenesisConfig, DEV_RUNTIME_PRESET};
use warden_runtime::memory::{InMemoryBridge, InMemoryTreasury, InMemoryValidators};
use warden_runtime::{Call, CallOutcome, Runtime};

type DevRuntime = Runtime<InMemoryValidators, InMemoryBridge, InMemoryTreasury>;

/// treasury funding for rewards
const RESERVE: u128 = 1_000_000_000_000_000_000_000_000;
/// bridge polls before a vault hand-off completes
const MIGRATION_POLLS: u32 = 2;

#[derive(Parser)]
#[command(name = "warden-devnet")]
#[command(about = "Warden devnet - maintainer committee lifecycle in a single process")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Simulate the committee for a number of blocks
    Run {
        /// Genesis preset
        #[arg(short, long, default_value = DEV_RUNTIME_PRESET)]
        preset: String,

        /// Genesis document (json); overrides --preset
        #[arg(short, long)]
        genesis: Option<PathBuf>,

        /// Maintainers registered at genesis
        #[arg(short, long, default_value = "4")]
        maintainers: u8,

        /// Number of blocks to produce
        #[arg(short, long, default_value = "100")]
        blocks: u64,

        /// Observe a synthetic inbound transfer every N blocks (0 = never)
        #[arg(long, default_value = "5")]
        tx_every: u64,

        /// Register another maintainer every N blocks (0 = never)
        #[arg(long, default_value = "0")]
        join_every: u64,

        /// Maintainers (1-based) that never vote, e.g. --offline 2,3
        #[arg(long, value_delimiter = ',')]
        offline: Vec<u8>,
    },

    /// Print a genesis preset as json
    Genesis {
        #[arg(default_value = DEV_RUNTIME_PRESET)]
        preset: String,
    },

    /// List genesis presets
    Presets,
}

fn main() -> Result<()> {
    let mut filter = EnvFilter::from_default_env();
    for target in ["warden_devnet", "warden_runtime", "warden_maintainers", "warden_tss"] {
        filter = filter.add_directive(format!("{target}=info").parse()?);
    }
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { preset, genesis, maintainers, blocks, tx_every, join_every, offline } => {
            let config = load_genesis(&preset, genesis.as_ref())?;
            let mut devnet = Devnet::new(&config, maintainers, &offline)?;
            for _ in 0..blocks {
                devnet.step(tx_every, join_every)?;
            }
            devnet.summary();
        }
        Command::Genesis { preset } => {
            let bytes = genesis_config_presets::get_preset(&preset)
                .ok_or_else(|| anyhow!("unknown preset {preset:?}"))?;
            println!("{}", String::from_utf8(bytes)?);
        }
        Command::Presets => {
            for name in genesis_config_presets::preset_names() {
                println!("{name}");
            }
        }
    }
    Ok(())
}

fn load_genesis(preset: &str, path: Option<&PathBuf>) -> Result<GenesisConfig> {
    match path {
        Some(path) => {
            let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            Ok(GenesisConfig::from_json(&bytes)?)
        }
        None => genesis_config_presets::preset(preset)
            .ok_or_else(|| anyhow!("unknown preset {preset:?}, see `warden-devnet presets`")),
    }
}

// ============ deterministic identities ============

fn signing_key(domain: u8, index: u64) -> Result<SigningKey> {
    let mut preimage = vec![domain];
    preimage.extend_from_slice(&index.to_be_bytes());
    SigningKey::from_slice(&keccak256(&preimage)).map_err(|e| anyhow!("derived key rejected: {e}"))
}

fn public_key(sk: &SigningKey) -> Result<PublicKey> {
    let point = sk.verifying_key().to_encoded_point(false);
    PublicKey::from_slice(&point.as_bytes()[1..]).ok_or_else(|| anyhow!("unexpected point encoding"))
}

fn validator(i: u8) -> Address {
    let hash = keccak256(&[b'v', i]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    Address(out)
}

fn node_keys(i: u8) -> Result<MaintainerKeys> {
    let secp256k1_pubkey = public_key(&signing_key(b'm', i as u64)?)?;
    let mut ed25519_pubkey = keccak256(&[b'e', i]);
    ed25519_pubkey[0] |= 1;
    Ok(MaintainerKeys {
        account: pubkey_to_address(&secp256k1_pubkey),
        secp256k1_pubkey,
        ed25519_pubkey,
        p2p_address: format!("/ip4/127.0.0.1/tcp/{}", 30333 + i as u16),
    })
}

/// group key of one keygen round, with its proof of possession
///
/// every round gets a fresh key: a re-election must not reuse the
/// proposal of the committee it replaced.
fn keygen_result(epoch_id: EpochId, elect_block: BlockNumber) -> Result<KeygenResult> {
    let sk = signing_key(b'k', (epoch_id << 32) | elect_block)?;
    let pubkey = public_key(&sk)?;
    let (sig, recid) = sk.sign_prehash_recoverable(&keccak256(&pubkey.0))?;
    let mut signature = sig.to_bytes().to_vec();
    signature.push(recid.to_byte());
    Ok(KeygenResult { epoch_id, pubkey, blames: vec![], signature })
}

// ============ simulation ============

struct Devnet {
    rt: DevRuntime,
    admin: Address,
    nodes: u8,
    /// accounts that never vote
    offline: BTreeSet<Address>,
    /// keygen rounds already answered, by (epoch, elect block)
    answered: BTreeSet<(EpochId, BlockNumber)>,
    tx_seq: u64,
}

impl Devnet {
    fn new(config: &GenesisConfig, maintainers: u8, offline: &[u8]) -> Result<Self> {
        let rt = config.build(
            InMemoryValidators::default(),
            InMemoryBridge::with_migration_polls(MIGRATION_POLLS),
            InMemoryTreasury::with_reserve(RESERVE),
        )?;
        let offline = offline
            .iter()
            .map(|i| node_keys(*i).map(|k| k.account))
            .collect::<Result<_>>()?;

        let mut devnet = Self {
            rt,
            admin: config.admin,
            nodes: 0,
            offline,
            answered: BTreeSet::new(),
            tx_seq: 0,
        };
        for _ in 0..maintainers {
            devnet.join()?;
        }
        info!(maintainers, admin = %devnet.admin, "genesis state initialized");
        Ok(devnet)
    }

    fn join(&mut self) -> Result<()> {
        let i = self
            .nodes
            .checked_add(1)
            .ok_or_else(|| anyhow!("maintainer index space exhausted"))?;
        let who = validator(i);
        self.rt.validators.add(who);
        self.rt
            .dispatch(who, Call::Register { keys: node_keys(i)? })
            .with_context(|| format!("registering maintainer {i}"))?;
        self.rt
            .dispatch(who, Call::Activate)
            .with_context(|| format!("activating maintainer {i}"))?;
        self.nodes = i;
        info!(index = i, validator = %who, "maintainer joined");
        Ok(())
    }

    fn step(&mut self, tx_every: u64, join_every: u64) -> Result<()> {
        let block = self.rt.next_block();

        if join_every != 0 && block % join_every == 0 {
            self.join()?;
        }

        match self.rt.dispatch(self.admin, Call::Orchestrate)? {
            CallOutcome::Orchestrate(OrchestrateOutcome::Idle) => {}
            CallOutcome::Orchestrate(outcome) => info!(block, ?outcome, "orchestrated"),
            other => debug!(?other, "unexpected orchestrate outcome"),
        }

        self.answer_keygen()?;
        if tx_every != 0 && block % tx_every == 0 {
            self.observe_transfer();
        }

        if let CallOutcome::Reward(RewardOutcome::Paid(report)) =
            self.rt.dispatch(self.admin, Call::DistributeReward)?
        {
            info!(
                epoch_id = report.epoch_id,
                total = report.total,
                paid = report.paid,
                remainder = report.remainder,
                "epoch reward paid"
            );
        }

        for record in self.rt.take_events() {
            debug!(block = record.block, event = ?record.event);
        }
        Ok(())
    }

    fn answer_keygen(&mut self) -> Result<()> {
        let (round, committee) = match self.rt.tss().electing() {
            Some(e) if e.status == TssStatus::KeygenPending => {
                ((e.epoch_id, e.elect_block), e.maintainers.clone())
            }
            _ => return Ok(()),
        };
        if !self.answered.insert(round) {
            return Ok(());
        }

        let result = keygen_result(round.0, round.1)?;
        info!(epoch_id = round.0, members = committee.len(), "answering keygen round");
        for member in committee {
            self.vote(member, Call::VoteKeygen(result.clone()));
        }
        Ok(())
    }

    fn observe_transfer(&mut self) {
        let Some(key) = self.rt.tss().current_key() else { return };
        let Some(committee) = self.rt.tss().members(&key).map(<[Address]>::to_vec) else { return };

        self.tx_seq += 1;
        let tx = TxIn {
            from_chain: 56,
            to_chain: 1,
            tx_hash: H256(keccak256(&self.tx_seq.to_be_bytes())),
            height: self.tx_seq,
            token: b"USDT".to_vec(),
            amount: 1_000 * self.tx_seq as u128,
            from: vec![0x0a; 20],
            to: vec![0x0b; 20],
        };
        for member in committee {
            self.vote(member, Call::VoteTxIn(tx.clone()));
        }
    }

    /// a rejected vote is logged, never fatal
    fn vote(&mut self, member: Address, call: Call) {
        if self.offline.contains(&member) {
            return;
        }
        match self.rt.dispatch(member, call) {
            Ok(outcome) => debug!(%member, ?outcome, "vote"),
            Err(e) => warn!(%member, error = %e, "vote rejected"),
        }
    }

    fn summary(&self) {
        let state = self.rt.registry().epoch_state();
        println!("\n=== Devnet Summary ===");
        println!("Block: {}", self.rt.block());
        println!("Current epoch: {}", state.current_epoch);
        println!("Election epoch: {}", state.election_epoch);
        println!("Rewarded through epoch: {}", state.reward_epoch);
        match self.rt.tss().current_key() {
            Some(key) => println!("Active key: {key}"),
            None => println!("Active key: none"),
        }
        println!("Bridge: {} inbound transfers executed", self.rt.bridge.tx_in.len());

        println!("\nMaintainers:");
        for m in self.rt.registry().maintainers() {
            println!(
                "  {}  {:<10}  slash {:>5}  balance {}",
                m.account,
                format!("{:?}", m.status),
                self.rt.tss().slash_point(&m.account),
                self.rt.treasury.balance(&m.account),
            );
        }
    }
}
