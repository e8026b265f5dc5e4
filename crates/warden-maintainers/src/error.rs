//! error types for the maintainer registry

use thiserror::Error;
use warden_primitives::{Address, CryptoError, ErrorKind, MaintainerStatus, MAX_MAINTAINER_LIMIT, MIN_MAINTAINERS};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaintainerError {
    #[error("only validator can register")]
    OnlyValidator,

    #[error("validator {0} already registered a maintainer")]
    AlreadyRegistered(Address),

    #[error("committee account {0} is already bound to another validator")]
    AccountTaken(Address),

    #[error("no maintainer registered for {0}")]
    NotRegistered(Address),

    #[error("no maintainer uses committee account {0}")]
    UnknownAccount(Address),

    #[error("declared account {declared} does not match key address {derived}")]
    AccountMismatch { declared: Address, derived: Address },

    #[error("ed25519 public key is empty")]
    EmptyEd25519Key,

    #[error("p2p address is empty")]
    EmptyP2pAddress,

    #[error("maintainer is {actual:?}, cannot {action}")]
    InvalidStatus { action: &'static str, actual: MaintainerStatus },

    #[error("maintainer served a recent epoch and cannot deregister yet")]
    RecentlyActive,

    #[error("maintainer limit must be between {min} and {max}, got {0}", min = MIN_MAINTAINERS, max = MAX_MAINTAINER_LIMIT)]
    InvalidLimit(usize),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("tss coordinator: {0}")]
    Tss(String),
}

impl MaintainerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OnlyValidator => ErrorKind::Access,
            Self::Tss(_) => ErrorKind::External,
            _ => ErrorKind::Precondition,
        }
    }
}

pub type Result<T> = core::result::Result<T, MaintainerError>;
