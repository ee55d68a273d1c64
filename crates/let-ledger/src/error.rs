use std::fmt;

use thiserror::Error;

use crate::{address::Address, ledger::Amount};

/// Coarse failure category of a rejected ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller lacks the privilege the operation requires.
    Unauthorized,
    /// A supplied value violates a structural precondition.
    InvalidArgument,
    /// The current state does not support the operation.
    InvalidState,
    /// The operation would push total supply past the emission cap.
    LimitExceeded,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::LimitExceeded => "limit_exceeded",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejection reasons for ledger operations. A rejected call never mutates state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("caller {caller} is not the owner")]
    NotOwner { caller: Address },

    #[error("caller {caller} is not a minter or owner")]
    NotMinterOrOwner { caller: Address },

    #[error("minter address can not be zero address")]
    ZeroMinterAddress,

    #[error("new owner is the zero address")]
    ZeroOwnerAddress,

    #[error("mint to the zero address")]
    MintToZeroAddress,

    #[error("amount must be more than 0")]
    ZeroAmount,

    #[error("max emission must be 0 or more than total supply (requested {requested}, total supply {total_supply})")]
    CapBelowSupply {
        requested: Amount,
        total_supply: Amount,
    },

    #[error("given address {account} is not a minter")]
    NotAMinter { account: Address },

    #[error("emission limit reached (total supply {total_supply}, requested {requested}, max emission {max_emission})")]
    EmissionLimitReached {
        requested: Amount,
        total_supply: Amount,
        max_emission: Amount,
    },

    #[error("supply arithmetic overflow")]
    SupplyOverflow,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotOwner { .. } | LedgerError::NotMinterOrOwner { .. } => {
                ErrorKind::Unauthorized
            }
            LedgerError::ZeroMinterAddress
            | LedgerError::ZeroOwnerAddress
            | LedgerError::MintToZeroAddress
            | LedgerError::ZeroAmount
            | LedgerError::CapBelowSupply { .. } => ErrorKind::InvalidArgument,
            LedgerError::NotAMinter { .. } => ErrorKind::InvalidState,
            LedgerError::EmissionLimitReached { .. } | LedgerError::SupplyOverflow => {
                ErrorKind::LimitExceeded
            }
        }
    }

    /// Stable identifier of the rejection reason, suitable for logs and scripts.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotOwner { .. } => "caller_not_owner",
            LedgerError::NotMinterOrOwner { .. } => "caller_not_minter_or_owner",
            LedgerError::ZeroMinterAddress => "minter_zero_address",
            LedgerError::ZeroOwnerAddress => "owner_zero_address",
            LedgerError::MintToZeroAddress => "mint_to_zero_address",
            LedgerError::ZeroAmount => "zero_amount",
            LedgerError::CapBelowSupply { .. } => "cap_below_supply",
            LedgerError::NotAMinter { .. } => "not_a_minter",
            LedgerError::EmissionLimitReached { .. } => "emission_limit_reached",
            LedgerError::SupplyOverflow => "supply_overflow",
        }
    }
}

/// Reasons a snapshot cannot be turned back into a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot administrator is the zero address")]
    ZeroAdministrator,

    #[error("snapshot lists the zero address as a minter")]
    ZeroMinter,

    #[error("snapshot balances overflow the amount type")]
    BalanceOverflow,

    #[error("snapshot total supply {recorded} does not match balances sum {computed}")]
    SupplyMismatch { recorded: Amount, computed: Amount },

    #[error("snapshot total supply {total_supply} exceeds max emission {max_emission}")]
    CapExceeded {
        total_supply: Amount,
        max_emission: Amount,
    },

    #[error("snapshot decimals {0} unsupported")]
    Decimals(u8),

    #[error("snapshot digest mismatch: recorded {recorded}, computed {computed}")]
    DigestMismatch { recorded: String, computed: String },
}

/// Failures converting a decimal display string into raw units.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitsError {
    #[error("empty amount")]
    Empty,

    #[error("invalid character {0:?} in amount")]
    InvalidDigit(char),

    #[error("amount has more than {max} fractional digits")]
    TooManyDecimals { max: u8 },

    #[error("amount does not fit into 128 bits")]
    Overflow,
}
