//! Db Module
//!
//! Fans keys out over one store per device by key hash.

use bytes::Bytes;

use crate::config::DbConfig;
use crate::error::Result;
use crate::hash::{shard_for, LAYER_STORE};
use crate::metrics::MetricsSnapshot;
use crate::store::Store;

/// Multi-device key-value database
pub struct Db {
    stores: Vec<Store>,
}

impl Db {
    /// Open every configured store
    pub fn open(config: DbConfig) -> Result<Self> {
        config.validate()?;
        let stores = config
            .stores
            .into_iter()
            .map(Store::open)
            .collect::<Result<Vec<_>>>()?;
        tracing::info!(stores = stores.len(), "Db opened");
        Ok(Self { stores })
    }

    /// Build from already opened stores
    pub fn from_stores(stores: Vec<Store>) -> Self {
        Self { stores }
    }

    fn store(&self, key: &[u8]) -> &Store {
        &self.stores[shard_for(key, LAYER_STORE, self.stores.len())]
    }

    pub fn put(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<()> {
        let key = key.into();
        self.store(&key).put(key.clone(), value)
    }

    pub fn get(&self, key: &[u8]) -> Result<Bytes> {
        self.store(key).get(key)
    }

    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        self.store(key).delete(key)
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.store(key).exists(key)
    }

    pub fn flush(&self) -> Result<()> {
        self.stores.iter().try_for_each(Store::flush)
    }

    pub fn stores(&self) -> &[Store] {
        &self.stores
    }

    /// Counters summed over all stores
    pub fn metrics(&self) -> MetricsSnapshot {
        self.stores
            .iter()
            .fold(MetricsSnapshot::default(), |acc, store| acc.merge(&store.metrics()))
    }

    /// Close every store, reporting the first failure
    pub fn close(&self) -> Result<()> {
        let mut result = Ok(());
        for store in &self.stores {
            if let Err(e) = store.close() {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}
