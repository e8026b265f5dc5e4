//! identities, hashes and lifecycle status enums

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// block height on the coordinating ledger
pub type BlockNumber = u64;

/// epoch index (0 = no epoch)
pub type EpochId = u64;

/// native token amount
pub type Balance = u128;

/// 20 byte account identity (keccak address of a secp256k1 key)
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; 20]);

/// 32 byte content hash
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct H256(pub [u8; 32]);

/// hash of a finalized TSS public key
pub type KeyHash = H256;

/// hash of a voted claim
pub type ProposalId = H256;

/// 64 byte uncompressed secp256k1 public key (x || y, no 0x04 prefix)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; 64]);

macro_rules! hex_newtype {
    ($name:ident, $len:expr) => {
        impl $name {
            pub const LEN: usize = $len;

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                let arr: [u8; $len] = bytes.try_into().ok()?;
                Some(Self(arr))
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(self, f)
            }
        }

        impl FromStr for $name {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix("0x").unwrap_or(s);
                let mut out = [0u8; $len];
                hex::decode_to_slice(raw, &mut out)?;
                Ok(Self(out))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_newtype!(Address, 20);
hex_newtype!(H256, 32);
hex_newtype!(PublicKey, 64);

impl Address {
    /// deterministic test/devnet identity
    pub fn repeat_byte(b: u8) -> Self {
        Self([b; 20])
    }
}

impl H256 {
    pub const ZERO: H256 = H256([0u8; 32]);
}

/// maintainer lifecycle status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaintainerStatus {
    #[default]
    Unknown,
    /// registered, not yet opted in
    Registered,
    /// eligible for election
    Standby,
    /// selected into an in-flight election
    Ready,
    /// member of the current committee
    Active,
    /// suspended until the jail term is swept
    Jailed,
    /// voluntarily left
    Revoked,
}

impl MaintainerStatus {
    /// statuses the orchestrator may elect
    pub fn is_electable(&self) -> bool {
        matches!(self, Self::Standby | Self::Ready | Self::Active)
    }
}

/// TSS instance status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TssStatus {
    #[default]
    Unknown,
    KeygenPending,
    KeygenCompleted,
    KeygenFailed,
    Migrating,
    Migrated,
    Retiring,
    Retired,
    Active,
    EmergencyPause,
}

/// broad error class shared by every crate in the workspace
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// caller is not the expected collaborator or committee member
    Access,
    /// invalid state, input or duplicate action
    Precondition,
    /// a collaborator call failed
    External,
}
