use crate::domain::provider::validate_transition;
use crate::domain::{ProviderRecord, ProviderStatus};
use crate::foundation::{BtcPublicKey, ProviderError, Result};
use crate::infrastructure::storage::{apply_heights, ProviderStore};
use log::info;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// In-memory store used by tests and by the devnet mode.
pub struct MemoryProviderStore {
    inner: Mutex<HashMap<BtcPublicKey, ProviderRecord>>,
}

impl MemoryProviderStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(HashMap::new()) }
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, HashMap<BtcPublicKey, ProviderRecord>>> {
        self.inner
            .lock()
            .map_err(|_| ProviderError::storage("memory", "provider store lock poisoned"))
    }

    fn with_record<T>(
        &self,
        btc_pk: &BtcPublicKey,
        f: impl FnOnce(&mut ProviderRecord) -> Result<T>,
    ) -> Result<T> {
        let mut inner = self.lock_inner()?;
        let record = inner
            .get_mut(btc_pk)
            .ok_or_else(|| ProviderError::NotFound(btc_pk.to_string()))?;
        f(record)
    }
}

impl Default for MemoryProviderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderStore for MemoryProviderStore {
    fn put_provider(&self, record: ProviderRecord) -> Result<()> {
        let mut inner = self.lock_inner()?;
        if inner.contains_key(&record.btc_pk) {
            return Err(ProviderError::AlreadyExists(record.btc_pk.to_string()));
        }
        inner.insert(record.btc_pk, record);
        Ok(())
    }

    fn get_provider(&self, btc_pk: &BtcPublicKey) -> Result<Option<ProviderRecord>> {
        Ok(self.lock_inner()?.get(btc_pk).cloned())
    }

    fn list_providers(&self) -> Result<Vec<ProviderRecord>> {
        let mut records: Vec<ProviderRecord> = self.lock_inner()?.values().cloned().collect();
        records.sort_by_key(|record| *record.btc_pk.as_bytes());
        Ok(records)
    }

    fn set_status(&self, btc_pk: &BtcPublicKey, status: ProviderStatus) -> Result<()> {
        self.with_record(btc_pk, |record| {
            validate_transition(record.status, status)?;
            info!("provider status transition btc_pk={} from={} to={}", btc_pk, record.status, status);
            record.status = status;
            Ok(())
        })
    }

    fn set_last_voted_height(&self, btc_pk: &BtcPublicKey, height: u64) -> Result<()> {
        self.with_record(btc_pk, |record| {
            let processed = record.last_processed_height.max(height);
            apply_heights(record, height, processed)
        })
    }

    fn set_last_processed_height(&self, btc_pk: &BtcPublicKey, height: u64) -> Result<()> {
        self.with_record(btc_pk, |record| {
            let voted = record.last_voted_height;
            apply_heights(record, voted, height)
        })
    }

    fn set_heights(&self, btc_pk: &BtcPublicKey, last_voted: u64, last_processed: u64) -> Result<()> {
        self.with_record(btc_pk, |record| apply_heights(record, last_voted, last_processed))
    }
}
