//! RocksDB-backed list store.
//!
//! Column families:
//! - `lists`   : list documents (bincode, LZ4 compressed), keyed by list id
//! - `metadata`: per-list bookkeeping (bincode), keyed by list id
//!
//! Document and metadata are written in one atomic batch.

use async_trait::async_trait;
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::{ListStore, StoreError};
use crate::model::ListDocument;

const CF_LISTS: &str = "lists";
const CF_METADATA: &str = "metadata";

const COLUMN_FAMILIES: &[&str] = &[CF_LISTS, CF_METADATA];

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 256)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 16MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("listsync_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 256,
            write_buffer_size: 16 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Small caches, for tests.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
        }
    }
}

/// Bookkeeping stored next to each list document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMetadata {
    /// First save, epoch milliseconds
    pub created_at: i64,
    /// Latest save, epoch milliseconds
    pub updated_at: i64,
    /// Number of saves
    pub writes: u64,
    /// Uncompressed document size in bytes
    pub document_size: u64,
}

impl ListMetadata {
    fn new() -> Self {
        let now = now_millis();
        Self {
            created_at: now,
            updated_at: now,
            writes: 0,
            document_size: 0,
        }
    }

    fn encode(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let (meta, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        Ok(meta)
    }
}

/// RocksDB-backed [`ListStore`].
pub struct RocksListStore {
    /// Single-threaded mode; concurrency comes from tokio
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl RocksListStore {
    /// Open the store, creating the database and column families if needed.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        log::info!("Opened list store at {}", config.path.display());
        Ok(Self { db, config })
    }

    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        opts.set_block_based_table_factory(&block_opts);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            // Values are already LZ4 framed
            CF_LISTS => opts.set_compression_type(DBCompressionType::None),
            CF_METADATA => opts.optimize_for_point_lookup(config.block_cache_size as u64),
            _ => {}
        }

        opts
    }

    /// Load a document synchronously.
    pub fn get(&self, id: &str) -> Result<Option<ListDocument>, StoreError> {
        let cf = self.cf(CF_LISTS)?;
        let Some(compressed) = self.db.get_cf(&cf, id.as_bytes())? else {
            return Ok(None);
        };

        let bytes = lz4_flex::decompress_size_prepended(&compressed)
            .map_err(|e| StoreError::Compression(e.to_string()))?;
        let (doc, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        Ok(Some(doc))
    }

    /// Write a document and its metadata in one batch.
    pub fn put(&self, id: &str, doc: &ListDocument) -> Result<ListMetadata, StoreError> {
        let cf_lists = self.cf(CF_LISTS)?;
        let cf_meta = self.cf(CF_METADATA)?;

        let bytes = bincode::serde::encode_to_vec(doc, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let compressed = lz4_flex::compress_prepend_size(&bytes);

        let mut meta = self.metadata(id)?.unwrap_or_else(ListMetadata::new);
        meta.writes += 1;
        meta.updated_at = now_millis();
        meta.document_size = bytes.len() as u64;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_lists, id.as_bytes(), &compressed);
        batch.put_cf(&cf_meta, id.as_bytes(), meta.encode()?);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        Ok(meta)
    }

    pub fn metadata(&self, id: &str) -> Result<Option<ListMetadata>, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        match self.db.get_cf(&cf, id.as_bytes())? {
            Some(bytes) => ListMetadata::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// All list ids with a stored document.
    pub fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        let mut ids = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item?;
            let id = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Flush memtables to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family '{name}' not found")))
    }
}

#[async_trait]
impl ListStore for RocksListStore {
    async fn load(&self, id: &str) -> Result<Option<ListDocument>, StoreError> {
        self.get(id)
    }

    async fn save(&self, id: &str, doc: &ListDocument) -> Result<(), StoreError> {
        self.put(id, doc).map(|_| ())
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
