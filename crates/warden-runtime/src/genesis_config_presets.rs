//! genesis documents and the predefined presets

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use warden_maintainers::{MaintainerError, MaintainerRegistry};
use warden_primitives::{params, Address, Bridge, Parameters, Treasury, ValidatorSource};

use crate::Runtime;

pub const DEV_RUNTIME_PRESET: &str = "development";
pub const LOCAL_TESTNET_RUNTIME_PRESET: &str = "local_testnet";

#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("unknown parameter {0:?}")]
    UnknownParameter(String),

    #[error(transparent)]
    Maintainer(#[from] MaintainerError),

    #[error("malformed genesis document: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenesisConfig {
    /// sole writer of parameters and admin calls
    pub admin: Address,
    pub maintainer_limit: usize,
    /// parameter name -> value; unset parameters read zero
    #[serde(default)]
    pub params: BTreeMap<String, u128>,
}

impl GenesisConfig {
    pub fn from_json(bytes: &[u8]) -> Result<Self, GenesisError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_value(&self) -> Result<Value, GenesisError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn parameters(&self) -> Result<Parameters, GenesisError> {
        let mut store = Parameters::new(self.admin);
        for (name, value) in &self.params {
            if !params::ALL_PARAMS.contains(&name.as_str()) {
                return Err(GenesisError::UnknownParameter(name.clone()));
            }
            store = store.with(name, *value);
        }
        Ok(store)
    }

    pub fn build<V, B, Tr>(&self, validators: V, bridge: B, treasury: Tr) -> Result<Runtime<V, B, Tr>, GenesisError>
    where
        V: ValidatorSource,
        B: Bridge,
        Tr: Treasury,
    {
        let params = self.parameters()?;
        let registry = MaintainerRegistry::new(self.maintainer_limit)?;
        Ok(Runtime::new(params, registry, validators, bridge, treasury))
    }
}

/// well known admin of the development presets
pub fn dev_admin() -> Address {
    Address::repeat_byte(0xad)
}

fn testnet_genesis(admin: Address, maintainer_limit: usize, blocks_per_epoch: u128) -> GenesisConfig {
    let params = [
        (params::BLOCKS_PER_EPOCH, blocks_per_epoch),
        (params::MAX_BLOCKS_FOR_UPDATE_TSS, blocks_per_epoch / 2),
        (params::MAX_SLASH_POINT_FOR_ELECT, 1_000),
        (params::JAIL_SLASH_LIMIT, 2_000),
        (params::JAIL_BLOCK, blocks_per_epoch * 2),
        (params::REWARD_PER_BLOCK, 1_000_000_000),
        (params::ADDITIONAL_REWARD_MAX_SLASH_POINT, 500),
        (params::OBSERVE_SLASH_POINT, 1),
        (params::OBSERVE_DELAY_SLASH_POINT, 10),
        (params::KEYGEN_DELAY_SLASH_POINT, 200),
        (params::MIGRATION_DELAY_SLASH_POINT, 100),
        (params::KEYGEN_BLAME_SLASH_POINT, 500),
        (params::DELAY_RECOVER_SLASH_POINT, 2),
        (params::MAX_OBSERVE_DELAY_BLOCK, 5),
        (params::VOTE_SCORE, 10),
        (params::DELAY_VOTE_SCORE, 5),
    ];
    GenesisConfig {
        admin,
        maintainer_limit,
        params: params.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
    }
}

fn development_config_genesis() -> GenesisConfig {
    testnet_genesis(dev_admin(), 4, 20)
}

fn local_testnet_genesis() -> GenesisConfig {
    testnet_genesis(dev_admin(), 7, 600)
}

pub fn preset(id: &str) -> Option<GenesisConfig> {
    match id {
        DEV_RUNTIME_PRESET => Some(development_config_genesis()),
        LOCAL_TESTNET_RUNTIME_PRESET => Some(local_testnet_genesis()),
        _ => None,
    }
}

/// json representation of the preset named `id`
pub fn get_preset(id: &str) -> Option<Vec<u8>> {
    serde_json::to_vec_pretty(&preset(id)?).ok()
}

pub fn preset_names() -> Vec<&'static str> {
    vec![DEV_RUNTIME_PRESET, LOCAL_TESTNET_RUNTIME_PRESET]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_roundtrip_through_json() {
        for name in preset_names() {
            let bytes = get_preset(name).unwrap();
            let config = GenesisConfig::from_json(&bytes).unwrap();
            assert_eq!(Some(config.clone()), preset(name));
            assert!(config.parameters().is_ok());
        }
        assert!(get_preset("mainnet").is_none());
    }

    #[test]
    fn unknown_parameter_rejected() {
        let json = br#"{
            "admin": "0xadadadadadadadadadadadadadadadadadadadad",
            "maintainer_limit": 5,
            "params": { "BLOCKS_PER_EPOCH": 10, "BLOCKS_PER_EPOCK": 11 }
        }"#;
        let config = GenesisConfig::from_json(json).unwrap();
        assert!(matches!(
            config.parameters(),
            Err(GenesisError::UnknownParameter(name)) if name == "BLOCKS_PER_EPOCK"
        ));
    }

    #[test]
    fn admin_is_hex() {
        let value = development_config_genesis().to_value().unwrap();
        assert_eq!(value["admin"], "0xadadadadadadadadadadadadadadadadadadadad");
    }
}
