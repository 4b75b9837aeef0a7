use std::path::{Path, PathBuf};

use log::info;
use once_cell::sync::OnceCell;

use crate::buffer_pool::BufferPool;
use crate::catalog::Catalog;
use crate::config::DbConfig;
use crate::error::SmallResult;
use crate::log_manager::LogManager;

static DB: OnceCell<Database> = OnceCell::new();

/// Wires together the catalog, buffer pool, log manager, and resolved
/// config for one database. Components take each other as explicit
/// arguments rather than reaching for hidden global state, so tests can
/// build as many independent instances as they like; `Database::global`
/// merely offers a conventional process-wide instance on top.
pub struct Database {
    path: PathBuf,
    config: DbConfig,
    catalog: Catalog,
    buffer_pool: BufferPool,
    log_manager: LogManager,
}

impl Database {
    pub fn new<P: AsRef<Path>>(dir: P, config: DbConfig) -> Result<Database, crate::error::SmallError> {
        let path = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;
        let log_manager = LogManager::new(path.join("wal.log"))?;
        Ok(Database {
            path,
            buffer_pool: BufferPool::new(config.num_pages, config.shared_lock_timeout_ms, config.exclusive_lock_timeout_ms),
            catalog: Catalog::new(),
            log_manager,
            config,
        })
    }

    pub fn global() -> &'static Database {
        DB.get_or_init(|| {
            Database::new("data/default_db", DbConfig::from_env()).expect("failed to initialize default database")
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    pub fn log_manager(&self) -> &LogManager {
        &self.log_manager
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replays the WAL against the buffer pool. Call once, right after
    /// registering tables with the catalog, before serving any traffic.
    pub fn recover(&self) -> SmallResult {
        self.log_manager.recover(&self.buffer_pool, &self.catalog)
    }

    /// Forces a checkpoint and truncates the log. Call before process exit.
    pub fn shutdown(&self) -> SmallResult {
        info!("shutting down database at {:?}", self.path);
        self.log_manager.log_checkpoint(&self.buffer_pool, &self.catalog)
    }
}
