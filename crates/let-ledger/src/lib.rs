//! Issuance ledger for the LET token.
//!
//! The crate models the policy a capped, access-controlled token enforces
//! when new supply is created:
//!
//! * [`ledger`] — the [`Ledger`] state object: balances, total supply, the
//!   emission cap and the administrator/minter roles.
//! * [`role`] — role tags recognised by [`Ledger::has_role`].
//! * [`event`] — the append-only log of successful mutations.
//! * [`snapshot`] — serializable, digest-checked copies of the ledger state.
//! * [`shared`] — a lock-guarded handle for serving one ledger to many threads.
//! * [`units`] — conversion between raw amounts and decimal display strings.
//!
//! Every mutating operation either applies completely or fails with a
//! [`LedgerError`] and leaves the ledger untouched.

pub mod address;
pub mod event;
pub mod ledger;
pub mod role;
pub mod shared;
pub mod snapshot;
pub mod units;

mod error;

pub use address::Address;
pub use error::{ErrorKind, LedgerError, SnapshotError, UnitsError};
pub use event::LedgerEvent;
pub use ledger::{Amount, Ledger, DECIMALS};
pub use role::Role;
pub use shared::SharedLedger;
pub use snapshot::LedgerSnapshot;
