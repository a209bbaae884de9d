pub mod catalog;
pub mod config;
pub mod dao;
pub mod error;
pub mod query;
pub mod repository;
pub mod storage;
pub mod tracker;

use crate::catalog::normalize_table_name;
use crate::config::DatabaseConfig;
use crate::error::{QbError, ResourceType};
use crate::query::executor::{execute_query, execute_write};
use crate::query::mapper::RowMapper;
use crate::query::statement::BoundStatement;
use crate::repository::DaoError;
use crate::storage::sqlite::SqliteStore;
use crate::storage::{RowStore, WriteResult};
use crate::tracker::{InvalidationObserver, InvalidationTracker, ObserverId};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub use crate::dao::{QueryMethod, QuerySpec, WriteKind, WriteMethod, WriteOutcome};
pub use crate::query::live::{LiveQuery, LiveQueryWatcher, LiveState};
pub use crate::query::statement::Args;

struct DatabaseInner {
    config: DatabaseConfig,
    store: Arc<dyn RowStore>,
    tracker: Arc<InvalidationTracker>,
}

/// Handle to one store plus the invalidation tracker shared by every query
/// method and live query bound to it. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub fn open(config: DatabaseConfig, path: &Path) -> Result<Self, QbError> {
        config.validate()?;
        let store = SqliteStore::open(path, &config)?;
        Self::with_store(config, Arc::new(store))
    }

    pub fn open_in_memory(config: DatabaseConfig) -> Result<Self, QbError> {
        config.validate()?;
        let store = SqliteStore::open_in_memory(&config)?;
        Self::with_store(config, Arc::new(store))
    }

    /// Wraps an existing store. Writes that bypass this handle are invisible
    /// to the tracker unless reported through [`Database::notify_tables`].
    pub fn with_store(config: DatabaseConfig, store: Arc<dyn RowStore>) -> Result<Self, QbError> {
        config.validate()?;
        info!(
            empty_in_policy = ?config.empty_in_policy,
            max_bound_args = config.max_bound_args,
            journal_mode = ?config.journal_mode,
            validate_observed_tables = config.validate_observed_tables,
            "database opened"
        );
        Ok(Self {
            inner: Arc::new(DatabaseInner {
                config,
                store,
                tracker: Arc::new(InvalidationTracker::new()),
            }),
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &dyn RowStore {
        self.inner.store.as_ref()
    }

    pub fn invalidation_tracker(&self) -> &Arc<InvalidationTracker> {
        &self.inner.tracker
    }

    pub fn query<M: RowMapper + ?Sized>(
        &self,
        statement: &BoundStatement,
        mapper: &M,
    ) -> Result<M::Output, DaoError> {
        execute_query(self.store(), statement, mapper)
    }

    pub fn execute(&self, statement: BoundStatement) -> Result<WriteResult, DaoError> {
        self.execute_in_transaction(&[statement])
    }

    /// Commits every statement or none. Observers of the touched tables are
    /// notified after the commit, on the calling thread.
    pub fn execute_in_transaction(
        &self,
        statements: &[BoundStatement],
    ) -> Result<WriteResult, DaoError> {
        self.execute_declared(statements, BTreeSet::new())
    }

    /// Like [`Database::execute_in_transaction`], additionally reporting
    /// `declared` tables as changed. Covers tables the store cannot see being
    /// written, such as those behind triggers in another connection.
    pub fn execute_declared(
        &self,
        statements: &[BoundStatement],
        declared: BTreeSet<String>,
    ) -> Result<WriteResult, DaoError> {
        let result = execute_write(self.store(), statements)?;
        if statements.is_empty() {
            return Ok(result);
        }
        let mut changed = declared;
        changed.extend(result.changed_tables.iter().cloned());
        self.notify_tables(&changed);
        Ok(result)
    }

    /// Runs argument-free SQL such as schema DDL and notifies observers of any
    /// tables whose rows it changed.
    pub fn execute_script(&self, sql: &str) -> Result<(), QbError> {
        let changed = self.store().execute_script(sql)?;
        self.notify_tables(&changed);
        Ok(())
    }

    /// Marks `tables` as changed. Returns how many observers were invoked.
    pub fn notify_tables<I, S>(&self, tables: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.inner.tracker.notify_tables(tables)
    }

    /// Registers a non-owning observer. With `validate_observed_tables` on,
    /// every table must exist in the store.
    pub fn register_weak_observer(
        &self,
        tables: &BTreeSet<String>,
        observer: &Arc<dyn InvalidationObserver>,
    ) -> Result<ObserverId, QbError> {
        if self.inner.config.validate_observed_tables {
            let known = self.store().table_names()?;
            if let Some(missing) = tables
                .iter()
                .map(|t| normalize_table_name(t))
                .find(|t| !known.contains(t))
            {
                return Err(QbError::NotFound {
                    resource_type: ResourceType::Table,
                    resource_id: missing,
                });
            }
        }
        let id = self.inner.tracker.add_weak_observer(tables, observer)?;
        debug!(tables = ?tables, "live query registered");
        Ok(id)
    }
}
