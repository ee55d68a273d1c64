use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    address::Address,
    error::SnapshotError,
    event::{amount_str, LedgerEvent},
    ledger::{Amount, Ledger, DECIMALS},
};

/// Serializable copy of a ledger's full state.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub administrator: Address,
    pub minters: BTreeSet<Address>,
    #[serde(with = "balances_str")]
    pub balances: BTreeMap<Address, Amount>,
    #[serde(with = "amount_str")]
    pub total_supply: Amount,
    #[serde(with = "amount_str")]
    pub max_emission: Amount,
    pub events: Vec<LedgerEvent>,
    #[serde(with = "digest_hex")]
    pub digest: [u8; 32],
}

impl LedgerSnapshot {
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }
}

impl Ledger {
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: DECIMALS,
            administrator: self.administrator,
            minters: self.minters.clone(),
            balances: self.balances.clone(),
            total_supply: self.total_supply,
            max_emission: self.max_emission,
            events: self.events.clone(),
            digest: self.state_digest(),
        }
    }

    /// Rebuilds a ledger, re-checking every state invariant and the digest.
    pub fn restore(snapshot: LedgerSnapshot) -> Result<Self, SnapshotError> {
        if snapshot.decimals != DECIMALS {
            return Err(SnapshotError::Decimals(snapshot.decimals));
        }
        if snapshot.administrator.is_zero() {
            return Err(SnapshotError::ZeroAdministrator);
        }
        if snapshot.minters.contains(&Address::ZERO) {
            return Err(SnapshotError::ZeroMinter);
        }
        let computed = snapshot
            .balances
            .values()
            .try_fold(0u128, |acc, amount| acc.checked_add(*amount))
            .ok_or(SnapshotError::BalanceOverflow)?;
        if computed != snapshot.total_supply {
            return Err(SnapshotError::SupplyMismatch {
                recorded: snapshot.total_supply,
                computed,
            });
        }
        if snapshot.max_emission > 0 && snapshot.total_supply > snapshot.max_emission {
            return Err(SnapshotError::CapExceeded {
                total_supply: snapshot.total_supply,
                max_emission: snapshot.max_emission,
            });
        }
        let recorded = snapshot.digest;
        let ledger = Ledger {
            name: snapshot.name,
            symbol: snapshot.symbol,
            administrator: snapshot.administrator,
            minters: snapshot.minters,
            // zero entries carry no information and would perturb the digest
            balances: snapshot
                .balances
                .into_iter()
                .filter(|(_, amount)| *amount > 0)
                .collect(),
            total_supply: snapshot.total_supply,
            max_emission: snapshot.max_emission,
            events: snapshot.events,
        };
        let computed = ledger.state_digest();
        if computed != recorded {
            return Err(SnapshotError::DigestMismatch {
                recorded: hex::encode(recorded),
                computed: hex::encode(computed),
            });
        }
        Ok(ledger)
    }

    /// Digest over token metadata, roles, cap and balances. The event log is
    /// not covered.
    pub fn state_digest(&self) -> [u8; 32] {
        let mut leaves: Vec<[u8; 32]> = Vec::new();

        let mut hasher = Sha256::new();
        hasher.update(b"meta");
        hasher.update((self.name.len() as u64).to_le_bytes());
        hasher.update(self.name.as_bytes());
        hasher.update((self.symbol.len() as u64).to_le_bytes());
        hasher.update(self.symbol.as_bytes());
        hasher.update([DECIMALS]);
        hasher.update(self.administrator.as_bytes());
        hasher.update(self.total_supply.to_le_bytes());
        hasher.update(self.max_emission.to_le_bytes());
        leaves.push(hasher.finalize().into());

        for minter in &self.minters {
            let mut hasher = Sha256::new();
            hasher.update(b"minter");
            hasher.update(minter.as_bytes());
            leaves.push(hasher.finalize().into());
        }
        for (account, amount) in &self.balances {
            let mut hasher = Sha256::new();
            hasher.update(b"acct");
            hasher.update(account.as_bytes());
            hasher.update(amount.to_le_bytes());
            leaves.push(hasher.finalize().into());
        }
        build_merkle(leaves)
    }
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"let-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity(leaves.len().div_ceil(2));
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

mod balances_str {
    use std::collections::BTreeMap;

    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    use crate::address::Address;

    pub fn serialize<S>(value: &BTreeMap<Address, u128>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value
            .iter()
            .map(|(addr, amount)| (*addr, amount.to_string()))
            .collect::<BTreeMap<Address, String>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<Address, u128>, D::Error>
    where
        D: Deserializer<'de>,
    {
        BTreeMap::<Address, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(addr, amount)| {
                let amount = amount.parse::<u128>().map_err(D::Error::custom)?;
                Ok::<_, D::Error>((addr, amount))
            })
            .collect()
    }
}

mod digest_hex {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| D::Error::custom("digest must be 32 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> Ledger {
        let owner = Address::new([1u8; 20]);
        let mut ledger = Ledger::new(owner, "LET coin", "LET").unwrap();
        ledger.set_minter_role(&owner, Address::new([2u8; 20])).unwrap();
        ledger.mint(&owner, Address::new([3u8; 20]), 1_000).unwrap();
        ledger.set_max_emission(&owner, 5_000).unwrap();
        ledger
    }

    #[test]
    fn digest_is_deterministic_and_tracks_state() {
        let mut ledger = populated();
        let owner = ledger.owner();
        let root1 = ledger.snapshot().digest;
        let root2 = ledger.snapshot().digest;
        assert_eq!(root1, root2);
        ledger.mint(&owner, Address::new([3u8; 20]), 1).unwrap();
        assert_ne!(ledger.snapshot().digest, root1);
    }

    #[test]
    fn restores_through_json() {
        let ledger = populated();
        let json = serde_json::to_string_pretty(&ledger.snapshot()).unwrap();
        let snapshot: LedgerSnapshot = serde_json::from_str(&json).unwrap();
        let restored = Ledger::restore(snapshot).unwrap();
        assert_eq!(restored, ledger);
    }

    #[test]
    fn tampered_balances_are_rejected() {
        let mut snapshot = populated().snapshot();
        snapshot.balances.insert(Address::new([4u8; 20]), 7);
        assert_eq!(
            Ledger::restore(snapshot.clone()).unwrap_err(),
            SnapshotError::SupplyMismatch {
                recorded: 1_000,
                computed: 1_007
            }
        );
        snapshot.total_supply = 1_007;
        assert!(matches!(
            Ledger::restore(snapshot).unwrap_err(),
            SnapshotError::DigestMismatch { .. }
        ));
    }

    #[test]
    fn foreign_decimals_and_overflowing_balances_are_rejected() {
        let mut snapshot = populated().snapshot();
        snapshot.decimals = 6;
        assert_eq!(
            Ledger::restore(snapshot).unwrap_err(),
            SnapshotError::Decimals(6)
        );

        let mut snapshot = populated().snapshot();
        snapshot.balances.insert(Address::new([4u8; 20]), u128::MAX);
        assert_eq!(
            Ledger::restore(snapshot).unwrap_err(),
            SnapshotError::BalanceOverflow
        );
    }

    #[test]
    fn invariant_violations_are_rejected() {
        let mut snapshot = populated().snapshot();
        snapshot.max_emission = 10;
        assert_eq!(
            Ledger::restore(snapshot).unwrap_err(),
            SnapshotError::CapExceeded {
                total_supply: 1_000,
                max_emission: 10
            }
        );

        let mut snapshot = populated().snapshot();
        snapshot.minters.insert(Address::ZERO);
        assert_eq!(
            Ledger::restore(snapshot).unwrap_err(),
            SnapshotError::ZeroMinter
        );

        let mut snapshot = populated().snapshot();
        snapshot.administrator = Address::ZERO;
        assert_eq!(
            Ledger::restore(snapshot).unwrap_err(),
            SnapshotError::ZeroAdministrator
        );
    }
}
