use crate::domain::provider::validate_transition;
use crate::domain::{ProviderRecord, ProviderStatus};
use crate::foundation::{BtcPublicKey, ProviderError, Result};
use crate::infrastructure::storage::rocks::schema::*;
use crate::infrastructure::storage::{apply_heights, ProviderStore};
use bincode::Options;
use log::{debug, info};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options as RocksOptions, DB};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// RocksDB-backed provider store. Read-modify-write updates are serialized
/// through `write_lock` so cursor and status checks stay atomic.
pub struct RocksProviderStore {
    db: Arc<DB>,
    write_lock: Mutex<()>,
}

fn open_db_with_cfs(path: &Path) -> Result<DB> {
    let mut options = RocksOptions::default();
    options.create_if_missing(true);
    options.create_missing_column_families(true);
    options.set_use_fsync(true);
    options.set_paranoid_checks(true);
    options.optimize_for_point_lookup(64);

    let cfs = vec![
        ColumnFamilyDescriptor::new(CF_METADATA, RocksOptions::default()),
        ColumnFamilyDescriptor::new(CF_PROVIDER, RocksOptions::default()),
    ];

    DB::open_cf_descriptors(&options, path, cfs)
        .map_err(|err| ProviderError::storage("rocksdb open_cf_descriptors", err.to_string()))
}

impl RocksProviderStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("opening RocksProviderStore path={}", path.display());
        let db = open_db_with_cfs(path)?;
        let store = Self { db: Arc::new(db), write_lock: Mutex::new(()) };
        store.maybe_run_migrations()?;
        info!("RocksProviderStore opened path={}", path.display());
        Ok(store)
    }

    pub fn open_in_dir(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir)?;
        Self::open(dir.join("finality-providers"))
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| ProviderError::storage("rocksdb", format!("missing column family: {}", name)))
    }

    fn maybe_run_migrations(&self) -> Result<()> {
        match self.schema_version()? {
            None => {
                info!("initializing fresh db schema schema_version={}", SCHEMA_VERSION);
                self.set_schema_version(SCHEMA_VERSION)
            }
            Some(v) if v == SCHEMA_VERSION => Ok(()),
            Some(v) => Err(ProviderError::storage(
                "rocksdb",
                format!("database schema version {} is not supported (expected {})", v, SCHEMA_VERSION),
            )),
        }
    }

    fn schema_version(&self) -> Result<Option<u32>> {
        let cf = self.cf_handle(CF_METADATA)?;
        match self.db.get_cf(cf, SCHEMA_VERSION_KEY)? {
            Some(bytes) => {
                let array: [u8; 4] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| ProviderError::storage("rocksdb", "corrupt schema version"))?;
                Ok(Some(u32::from_be_bytes(array)))
            }
            None => Ok(None),
        }
    }

    fn set_schema_version(&self, version: u32) -> Result<()> {
        let cf = self.cf_handle(CF_METADATA)?;
        self.db.put_cf(cf, SCHEMA_VERSION_KEY, version.to_be_bytes()).map_err(ProviderError::from)
    }

    fn encode(record: &ProviderRecord) -> Result<Vec<u8>> {
        bincode::DefaultOptions::new().with_fixint_encoding().serialize(record).map_err(ProviderError::from)
    }

    fn decode(bytes: &[u8]) -> Result<ProviderRecord> {
        bincode::DefaultOptions::new().with_fixint_encoding().deserialize(bytes).map_err(ProviderError::from)
    }

    fn read_record(&self, btc_pk: &BtcPublicKey) -> Result<Option<ProviderRecord>> {
        let cf = self.cf_handle(CF_PROVIDER)?;
        match self.db.get_cf(cf, btc_pk.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_record(&self, record: &ProviderRecord) -> Result<()> {
        let cf = self.cf_handle(CF_PROVIDER)?;
        self.db.put_cf(cf, record.btc_pk.as_bytes(), Self::encode(record)?).map_err(ProviderError::from)
    }

    fn with_record<T>(
        &self,
        btc_pk: &BtcPublicKey,
        f: impl FnOnce(&mut ProviderRecord) -> Result<T>,
    ) -> Result<T> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ProviderError::storage("rocksdb", "write lock poisoned"))?;
        let mut record = self
            .read_record(btc_pk)?
            .ok_or_else(|| ProviderError::NotFound(btc_pk.to_string()))?;
        let out = f(&mut record)?;
        self.write_record(&record)?;
        Ok(out)
    }
}

impl ProviderStore for RocksProviderStore {
    fn put_provider(&self, record: ProviderRecord) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ProviderError::storage("rocksdb", "write lock poisoned"))?;
        if self.read_record(&record.btc_pk)?.is_some() {
            return Err(ProviderError::AlreadyExists(record.btc_pk.to_string()));
        }
        self.write_record(&record)
    }

    fn get_provider(&self, btc_pk: &BtcPublicKey) -> Result<Option<ProviderRecord>> {
        self.read_record(btc_pk)
    }

    fn list_providers(&self) -> Result<Vec<ProviderRecord>> {
        let cf = self.cf_handle(CF_PROVIDER)?;
        let mut records = Vec::new();
        for entry in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = entry?;
            records.push(Self::decode(&value)?);
        }
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
