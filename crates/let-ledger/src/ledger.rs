use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::{address::Address, error::LedgerError, event::LedgerEvent, role::Role};

pub type Amount = u128;

/// Display scaling exponent: one whole token is `10^DECIMALS` raw units.
pub const DECIMALS: u8 = 18;

/// Capped, role-gated issuance ledger.
///
/// All mutating operations take the calling identity explicitly. Checks run
/// before any write, so a rejected call leaves the ledger as it was.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ledger {
    pub(crate) name: String,
    pub(crate) symbol: String,
    pub(crate) administrator: Address,
    pub(crate) minters: BTreeSet<Address>,
    pub(crate) balances: BTreeMap<Address, Amount>,
    pub(crate) total_supply: Amount,
    pub(crate) max_emission: Amount,
    pub(crate) events: Vec<LedgerEvent>,
}

impl Ledger {
    /// Deploys a fresh ledger owned by `creator`.
    pub fn new(
        creator: Address,
        name: impl Into<String>,
        symbol: impl Into<String>,
    ) -> Result<Self, LedgerError> {
        if creator.is_zero() {
            return Err(LedgerError::ZeroOwnerAddress);
        }
        let name = name.into();
        let symbol = symbol.into();
        info!(owner = %creator, %name, %symbol, "ledger deployed");
        let deployed = LedgerEvent::Deployed {
            owner: creator,
            name: name.clone(),
            symbol: symbol.clone(),
        };
        Ok(Self {
            name,
            symbol,
            administrator: creator,
            minters: BTreeSet::new(),
            balances: BTreeMap::new(),
            total_supply: 0,
            max_emission: 0,
            events: vec![deployed],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        DECIMALS
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Current emission cap; 0 means uncapped.
    pub fn max_emission(&self) -> Amount {
        self.max_emission
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn owner(&self) -> Address {
        self.administrator
    }

    pub fn administrator(&self) -> Address {
        self.administrator
    }

    pub fn is_minter(&self, account: &Address) -> bool {
        self.minters.contains(account)
    }

    pub fn minters(&self) -> impl Iterator<Item = &Address> + '_ {
        self.minters.iter()
    }

    /// Accounts with a nonzero balance, in address order.
    pub fn holders(&self) -> impl Iterator<Item = (&Address, Amount)> + '_ {
        self.balances.iter().map(|(addr, amount)| (addr, *amount))
    }

    pub fn has_role(&self, role: Role, account: &Address) -> bool {
        match role {
            Role::Admin => self.administrator == *account,
            Role::Minter => self.minters.contains(account),
        }
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn set_minter_role(
        &mut self,
        caller: &Address,
        target: Address,
    ) -> Result<(), LedgerError> {
        self.only_owner("set_minter_role", caller)?;
        if target.is_zero() {
            return Err(reject(
                "set_minter_role",
                caller,
                LedgerError::ZeroMinterAddress,
            ));
        }
        if !self.minters.insert(target) {
            debug!(account = %target, "minter role already granted");
            return Ok(());
        }
        info!(account = %target, by = %caller, "minter role granted");
        self.events.push(LedgerEvent::MinterGranted {
            account: target,
            by: *caller,
        });
        Ok(())
    }

    pub fn revoke_minter_role(
        &mut self,
        caller: &Address,
        target: Address,
    ) -> Result<(), LedgerError> {
        self.only_owner("revoke_minter_role", caller)?;
        if !self.minters.remove(&target) {
            return Err(reject(
                "revoke_minter_role",
                caller,
                LedgerError::NotAMinter { account: target },
            ));
        }
        info!(account = %target, by = %caller, "minter role revoked");
        self.events.push(LedgerEvent::MinterRevoked {
            account: target,
            by: *caller,
        });
        Ok(())
    }

    /// Sets the emission cap. `0` removes the cap; any other value must not be
    /// below the current total supply.
    pub fn set_max_emission(
        &mut self,
        caller: &Address,
        new_cap: Amount,
    ) -> Result<(), LedgerError> {
        self.only_owner("set_max_emission", caller)?;
        if new_cap != 0 && new_cap < self.total_supply {
            return Err(reject(
                "set_max_emission",
                caller,
                LedgerError::CapBelowSupply {
                    requested: new_cap,
                    total_supply: self.total_supply,
                },
            ));
        }
        let previous = std::mem::replace(&mut self.max_emission, new_cap);
        info!(previous, current = new_cap, "max emission changed");
        self.events.push(LedgerEvent::MaxEmissionChanged {
            previous,
            current: new_cap,
        });
        Ok(())
    }

    pub fn mint(
        &mut self,
        caller: &Address,
        recipient: Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if *caller != self.administrator && !self.minters.contains(caller) {
            return Err(reject(
                "mint",
                caller,
                LedgerError::NotMinterOrOwner { caller: *caller },
            ));
        }
        if amount == 0 {
            return Err(reject("mint", caller, LedgerError::ZeroAmount));
        }
        if recipient.is_zero() {
            return Err(reject("mint", caller, LedgerError::MintToZeroAddress));
        }
        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| reject("mint", caller, LedgerError::SupplyOverflow))?;
        if self.max_emission > 0 && new_supply > self.max_emission {
            return Err(reject(
                "mint",
                caller,
                LedgerError::EmissionLimitReached {
                    requested: amount,
                    total_supply: self.total_supply,
                    max_emission: self.max_emission,
                },
            ));
        }
        // A single balance never exceeds total supply, so this cannot overflow.
        *self.balances.entry(recipient).or_insert(0) += amount;
        self.total_supply = new_supply;
        info!(by = %caller, to = %recipient, amount, total_supply = new_supply, "minted");
        self.events.push(LedgerEvent::Minted {
            by: *caller,
            to: recipient,
            amount,
        });
        Ok(())
    }

    pub fn transfer_ownership(
        &mut self,
        caller: &Address,
        new_owner: Address,
    ) -> Result<(), LedgerError> {
        self.only_owner("transfer_ownership", caller)?;
        if new_owner.is_zero() {
            return Err(reject(
                "transfer_ownership",
                caller,
                LedgerError::ZeroOwnerAddress,
            ));
        }
        let previous = std::mem::replace(&mut self.administrator, new_owner);
        info!(%previous, current = %new_owner, "ownership transferred");
        self.events.push(LedgerEvent::OwnershipTransferred {
            previous,
            current: new_owner,
        });
        Ok(())
    }

    fn only_owner(&self, op: &'static str, caller: &Address) -> Result<(), LedgerError> {
        if *caller == self.administrator {
            Ok(())
        } else {
            Err(reject(op, caller, LedgerError::NotOwner { caller: *caller }))
        }
    }
}

fn reject(op: &'static str, caller: &Address, err: LedgerError) -> LedgerError {
    warn!(op, caller = %caller, code = err.code(), kind = %err.kind(), "rejected: {err}");
    err
}
