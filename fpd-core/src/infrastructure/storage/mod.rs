pub mod memory;
pub mod rocks;

pub use memory::MemoryProviderStore;
pub use rocks::RocksProviderStore;

use crate::domain::{ProviderRecord, ProviderStatus};
use crate::foundation::{BtcPublicKey, ProviderError, Result};

/// Durable map from BTC public key to provider record.
///
/// All mutations are atomic. Height cursors only move forward; a write that
/// would regress either cursor, or break `last_voted <= last_processed`,
/// fails with `NotMonotone`.
pub trait ProviderStore: Send + Sync {
    /// Insert a new record. Fails with `AlreadyExists` for a known `btc_pk`.
    fn put_provider(&self, record: ProviderRecord) -> Result<()>;

    fn get_provider(&self, btc_pk: &BtcPublicKey) -> Result<Option<ProviderRecord>>;

    fn list_providers(&self) -> Result<Vec<ProviderRecord>>;

    /// Transition the status, validated against the lifecycle table.
    fn set_status(&self, btc_pk: &BtcPublicKey, status: ProviderStatus) -> Result<()>;

    /// Advance `last_voted_height`; `last_processed_height` is raised along
    /// with it so the invariant holds.
    fn set_last_voted_height(&self, btc_pk: &BtcPublicKey, height: u64) -> Result<()>;

    fn set_last_processed_height(&self, btc_pk: &BtcPublicKey, height: u64) -> Result<()>;

    /// Advance both cursors in one atomic write, as after a successful vote.
    fn set_heights(&self, btc_pk: &BtcPublicKey, last_voted: u64, last_processed: u64) -> Result<()>;
}

pub(crate) fn ensure_monotone(field: &'static str, current: u64, attempted: u64) -> Result<()> {
    if attempted < current {
        return Err(ProviderError::NotMonotone { field, current, attempted });
    }
    Ok(())
}

/// Apply a cursor update to a record after validating monotonicity.
pub(crate) fn apply_heights(record: &mut ProviderRecord, last_voted: u64, last_processed: u64) -> Result<()> {
    ensure_monotone("last_voted_height", record.last_voted_height, last_voted)?;
    ensure_monotone("last_processed_height", record.last_processed_height, last_processed)?;
    if last_voted > last_processed {
        return Err(ProviderError::NotMonotone {
            field: "last_voted_height",
            current: last_processed,
            attempted: last_voted,
        });
    }
    record.last_voted_height = last_voted;
    record.last_processed_height = last_processed;
    Ok(())
}
