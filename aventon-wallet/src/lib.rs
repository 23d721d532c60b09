pub mod account;
pub mod hold;
pub mod idempotency;
pub mod ledger;

pub use account::{Account, AccountBook};
pub use hold::{HoldRecord, HoldRegistry};
pub use idempotency::{Admission, IdempotencyGuard, StoredOutcome};
pub use ledger::{EntryType, LedgerEntry, LedgerStore};
