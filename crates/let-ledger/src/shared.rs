use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    address::Address,
    error::LedgerError,
    ledger::{Amount, Ledger},
    role::Role,
    snapshot::LedgerSnapshot,
};

/// Cloneable handle serving one [`Ledger`] to many threads.
///
/// Each mutation holds the write lock for its whole duration; queries share
/// the read lock and always see a state between two complete operations.
#[derive(Clone, Debug)]
pub struct SharedLedger {
    inner: Arc<RwLock<Ledger>>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ledger)),
        }
    }

    pub fn deploy(
        creator: Address,
        name: impl Into<String>,
        symbol: impl Into<String>,
    ) -> Result<Self, LedgerError> {
        Ledger::new(creator, name, symbol).map(Self::new)
    }

    /// Runs `f` against a consistent view of the ledger.
    pub fn read<R>(&self, f: impl FnOnce(&Ledger) -> R) -> R {
        f(&self.read_guard())
    }

    pub fn total_supply(&self) -> Amount {
        self.read(Ledger::total_supply)
    }

    pub fn max_emission(&self) -> Amount {
        self.read(Ledger::max_emission)
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.read(|ledger| ledger.balance_of(account))
    }

    pub fn has_role(&self, role: Role, account: &Address) -> bool {
        self.read(|ledger| ledger.has_role(role, account))
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.read(Ledger::snapshot)
    }

    pub fn set_minter_role(
        &self,
        caller: &Address,
        target: Address,
    ) -> Result<(), LedgerError> {
        self.write_guard().set_minter_role(caller, target)
    }

    pub fn revoke_minter_role(
        &self,
        caller: &Address,
        target: Address,
    ) -> Result<(), LedgerError> {
        self.write_guard().revoke_minter_role(caller, target)
    }

    pub fn set_max_emission(
        &self,
        caller: &Address,
        new_cap: Amount,
    ) -> Result<(), LedgerError> {
        self.write_guard().set_max_emission(caller, new_cap)
    }

    pub fn mint(
        &self,
        caller: &Address,
        recipient: Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.write_guard().mint(caller, recipient, amount)
    }

    pub fn transfer_ownership(
        &self,
        caller: &Address,
        new_owner: Address,
    ) -> Result<(), LedgerError> {
        self.write_guard().transfer_ownership(caller, new_owner)
    }

    // Operations validate before writing, so a panicking holder cannot leave a
    // half-applied mutation behind and the poison flag can be ignored.
    fn read_guard(&self) -> RwLockReadGuard<'_, Ledger> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Ledger> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
