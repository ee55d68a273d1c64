use serde::{Deserialize, Serialize};

use crate::{address::Address, ledger::Amount};

/// Record of one successful ledger mutation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Deployed {
        owner: Address,
        name: String,
        symbol: String,
    },
    MinterGranted {
        account: Address,
        by: Address,
    },
    MinterRevoked {
        account: Address,
        by: Address,
    },
    MaxEmissionChanged {
        #[serde(with = "amount_str")]
        previous: Amount,
        #[serde(with = "amount_str")]
        current: Amount,
    },
    Minted {
        by: Address,
        to: Address,
        #[serde(with = "amount_str")]
        amount: Amount,
    },
    OwnershipTransferred {
        previous: Address,
        current: Address,
    },
}

/// `u128` values are written as decimal strings so JSON readers that parse
/// numbers as doubles do not lose precision.
pub(crate) mod amount_str {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(D::Error::custom)
    }
}
