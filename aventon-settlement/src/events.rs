use aventon_wallet::LedgerEntry;
use serde::Serialize;

/// Emitted on the broadcast feed after a ledger write commits. Consumers
/// (the Postgres archiver, log taps) see entries strictly after the engine
/// state changed, never before.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementEvent {
    pub entry: LedgerEntry,
    /// Status the related reservation ended up in, when the commit moved one.
    pub reservation_status: Option<String>,
    pub timestamp: i64,
}
