//! named numeric parameters addressed by keccak256(name)
//!
//! unset parameters read as zero. every consumer documents what zero means
//! for the value it reads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::keccak256;
use crate::types::{Address, ErrorKind, H256};

/// blocks an epoch must serve before the next election may open
pub const BLOCKS_PER_EPOCH: &str = "BLOCKS_PER_EPOCH";
/// keygen pending longer than this triggers re-election (0 = never)
pub const MAX_BLOCKS_FOR_UPDATE_TSS: &str = "MAX_BLOCKS_FOR_UPDATE_TSS";
/// candidates at or above this slash point are skipped (0 = no limit)
pub const MAX_SLASH_POINT_FOR_ELECT: &str = "MAX_SLASH_POINT_FOR_ELECT";
/// slash point at which a member is jailed (0 = never jail)
pub const JAIL_SLASH_LIMIT: &str = "JAIL_SLASH_LIMIT";
/// jail term in blocks
pub const JAIL_BLOCK: &str = "JAIL_BLOCK";
/// native reward minted per served block
pub const REWARD_PER_BLOCK: &str = "REWARD_PER_BLOCK";
/// members below this slash point share the proportional half
pub const ADDITIONAL_REWARD_MAX_SLASH_POINT: &str = "ADDITIONAL_REWARD_MAX_SLASH_POINT";
/// provisional charge per vote, refunded at quorum
pub const OBSERVE_SLASH_POINT: &str = "OBSERVE_SLASH_POINT";
/// non-voter charge for fee and transfer observations
pub const OBSERVE_DELAY_SLASH_POINT: &str = "OBSERVE_DELAY_SLASH_POINT";
/// non-voter charge for keygen results
pub const KEYGEN_DELAY_SLASH_POINT: &str = "KEYGEN_DELAY_SLASH_POINT";
/// non-voter charge for vault migration transfers
pub const MIGRATION_DELAY_SLASH_POINT: &str = "MIGRATION_DELAY_SLASH_POINT";
/// charge for each member blamed by a failed keygen
pub const KEYGEN_BLAME_SLASH_POINT: &str = "KEYGEN_BLAME_SLASH_POINT";
/// residual charge kept from a late vote past the delay window
pub const DELAY_RECOVER_SLASH_POINT: &str = "DELAY_RECOVER_SLASH_POINT";
/// late votes within this many blocks of quorum get a full refund
pub const MAX_OBSERVE_DELAY_BLOCK: &str = "MAX_OBSERVE_DELAY_BLOCK";
/// score credited to a timely voter
pub const VOTE_SCORE: &str = "VOTE_SCORE";
/// score credited to a late voter
pub const DELAY_VOTE_SCORE: &str = "DELAY_VOTE_SCORE";

/// every parameter the core reads
pub const ALL_PARAMS: &[&str] = &[
    BLOCKS_PER_EPOCH,
    MAX_BLOCKS_FOR_UPDATE_TSS,
    MAX_SLASH_POINT_FOR_ELECT,
    JAIL_SLASH_LIMIT,
    JAIL_BLOCK,
    REWARD_PER_BLOCK,
    ADDITIONAL_REWARD_MAX_SLASH_POINT,
    OBSERVE_SLASH_POINT,
    OBSERVE_DELAY_SLASH_POINT,
    KEYGEN_DELAY_SLASH_POINT,
    MIGRATION_DELAY_SLASH_POINT,
    KEYGEN_BLAME_SLASH_POINT,
    DELAY_RECOVER_SLASH_POINT,
    MAX_OBSERVE_DELAY_BLOCK,
    VOTE_SCORE,
    DELAY_VOTE_SCORE,
];

/// storage key of a named parameter
pub fn param_key(name: &str) -> H256 {
    H256(keccak256(name.as_bytes()))
}

/// read side of the parameter store
pub trait ParameterStore {
    fn get(&self, key: &H256) -> u128;

    fn get_by_name(&self, name: &str) -> u128 {
        self.get(&param_key(name))
    }

    /// for block counts; values beyond u64 saturate
    fn get_u64(&self, name: &str) -> u64 {
        u64::try_from(self.get_by_name(name)).unwrap_or(u64::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("only the parameter admin may write, caller {0}")]
    NotAdmin(Address),
}

impl ParamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAdmin(_) => ErrorKind::Access,
        }
    }
}

/// in-memory parameter store with a single privileged writer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Parameters {
    admin: Address,
    values: BTreeMap<H256, u128>,
}

impl Parameters {
    pub fn new(admin: Address) -> Self {
        Self { admin, values: BTreeMap::new() }
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn ensure_admin(&self, who: &Address) -> Result<(), ParamError> {
        if who != &self.admin {
            return Err(ParamError::NotAdmin(*who));
        }
        Ok(())
    }

    /// access-controlled write
    pub fn set(&mut self, who: &Address, key: H256, value: u128) -> Result<(), ParamError> {
        self.ensure_admin(who)?;
        self.values.insert(key, value);
        Ok(())
    }

    /// genesis-time write, bypasses the admin check
    pub fn with(mut self, name: &str, value: u128) -> Self {
        self.values.insert(param_key(name), value);
        self
    }
}

impl ParameterStore for Parameters {
    fn get(&self, key: &H256) -> u128 {
        self.values.get(key).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_reads_zero() {
        let p = Parameters::new(Address::repeat_byte(1));
        assert_eq!(p.get_by_name(JAIL_BLOCK), 0);
    }

    #[test]
    fn admin_only_writes() {
        let admin = Address::repeat_byte(1);
        let mut p = Parameters::new(admin);
        let key = param_key(JAIL_BLOCK);

        assert_eq!(
            p.set(&Address::repeat_byte(2), key, 10),
            Err(ParamError::NotAdmin(Address::repeat_byte(2)))
        );
        assert_eq!(p.get(&key), 0);

        p.set(&admin, key, 10).unwrap();
        assert_eq!(p.get_by_name(JAIL_BLOCK), 10);
    }

    #[test]
    fn u64_reads_saturate() {
        let p = Parameters::new(Address::default()).with(BLOCKS_PER_EPOCH, u128::MAX);
        assert_eq!(p.get_u64(BLOCKS_PER_EPOCH), u64::MAX);
    }

    #[test]
    fn names_are_distinct_keys() {
        let mut keys: Vec<_> = ALL_PARAMS.iter().map(|n| param_key(n)).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), ALL_PARAMS.len());
    }
}
