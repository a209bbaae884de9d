use crate::error::QbError;
use crate::query::executor::execute_query;
use crate::query::mapper::RowMapper;
use crate::query::statement::BoundStatement;
use crate::repository::DaoError;
use crate::tracker::InvalidationObserver;
use crate::Database;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveState {
    /// No read has happened yet; nothing is registered with the tracker.
    Unregistered,
    /// The cached value reflects the store.
    Clean,
    /// A write to an observed table committed since the last computation.
    Stale,
}

/// Shared between the live query and the tracker; the tracker only holds it
/// weakly.
struct StaleFlag {
    stale: AtomicBool,
    invalidations: watch::Sender<u64>,
}

impl InvalidationObserver for StaleFlag {
    fn on_invalidated(&self, tables: &BTreeSet<String>) {
        self.stale.store(true, Ordering::Release);
        self.invalidations.send_modify(|n| *n += 1);
        debug!(tables = ?tables, "live query invalidated");
    }
}

struct LiveInner<M: RowMapper> {
    db: Database,
    statement: BoundStatement,
    tables: BTreeSet<String>,
    mapper: Arc<M>,
    registered: AtomicBool,
    flag: Arc<StaleFlag>,
    observer: Arc<dyn InvalidationObserver>,
    cache: Mutex<Option<Arc<M::Output>>>,
    computations: AtomicU64,
}

/// A query result that is computed on first read, cached, and recomputed on
/// the next read after a write to one of its tables commits.
pub struct LiveQuery<M: RowMapper> {
    inner: Arc<LiveInner<M>>,
}

impl<M: RowMapper> Clone for LiveQuery<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: RowMapper + 'static> LiveQuery<M> {
    pub(crate) fn new(
        db: Database,
        statement: BoundStatement,
        tables: BTreeSet<String>,
        mapper: Arc<M>,
    ) -> Self {
        let (invalidations, _) = watch::channel(0);
        let flag = Arc::new(StaleFlag {
            stale: AtomicBool::new(false),
            invalidations,
        });
        let observer: Arc<dyn InvalidationObserver> = flag.clone();
        Self {
            inner: Arc::new(LiveInner {
                db,
                statement,
                tables,
                mapper,
                registered: AtomicBool::new(false),
                flag,
                observer,
                cache: Mutex::new(None),
                computations: AtomicU64::new(0),
            }),
        }
    }

    pub fn tables(&self) -> &BTreeSet<String> {
        &self.inner.tables
    }

    pub fn statement(&self) -> &BoundStatement {
        &self.inner.statement
    }

    pub fn state(&self) -> LiveState {
        if !self.inner.registered.load(Ordering::Acquire) {
            LiveState::Unregistered
        } else if self.inner.flag.stale.load(Ordering::Acquire)
            || self.inner.cache.lock().is_none()
        {
            LiveState::Stale
        } else {
            LiveState::Clean
        }
    }

    /// How many times the pipeline has run for this query.
    pub fn computations(&self) -> u64 {
        self.inner.computations.load(Ordering::Relaxed)
    }

    /// Returns the cached value while clean; otherwise runs the query.
    ///
    /// The first call registers with the invalidation tracker before running
    /// the query. If registration fails the error is returned and the next call
    /// tries again.
    pub fn get(&self) -> Result<Arc<M::Output>, DaoError> {
        let inner = &self.inner;
        let mut cache = inner.cache.lock();

        if !inner.registered.load(Ordering::Acquire) {
            inner
                .db
                .register_weak_observer(&inner.tables, &inner.observer)?;
            inner.registered.store(true, Ordering::Release);
        }

        if let Some(value) = cache.as_ref() {
            if !inner.flag.stale.load(Ordering::Acquire) {
                return Ok(Arc::clone(value));
            }
        }

        // cleared before running so an invalidation racing the query marks the
        // new value stale again
        inner.flag.stale.store(false, Ordering::Release);
        inner.computations.fetch_add(1, Ordering::Relaxed);
        match execute_query(inner.db.store(), &inner.statement, inner.mapper.as_ref()) {
            Ok(value) => {
                let value = Arc::new(value);
                *cache = Some(Arc::clone(&value));
                Ok(value)
            }
            Err(err) => {
                inner.flag.stale.store(true, Ordering::Release);
                Err(err)
            }
        }
    }

    /// Watches for invalidations. Each `changed()` on the watcher resolves
    /// after the next committed write to an observed table.
    pub fn subscribe(&self) -> LiveQueryWatcher<M> {
        LiveQueryWatcher {
            query: self.clone(),
            rx: self.inner.flag.invalidations.subscribe(),
        }
    }
}

pub struct LiveQueryWatcher<M: RowMapper> {
    query: LiveQuery<M>,
    rx: watch::Receiver<u64>,
}

impl<M: RowMapper + 'static> LiveQueryWatcher<M> {
    /// Current value, computing it if needed. Registers the query with the
    /// tracker if this is the first read.
    pub fn current(&self) -> Result<Arc<M::Output>, DaoError> {
        self.query.get()
    }

    /// Waits for the next invalidation and returns the recomputed value. A
    /// query nobody has read yet is computed and registered first.
    pub async fn changed(&mut self) -> Result<Arc<M::Output>, DaoError> {
        if self.query.state() == LiveState::Unregistered {
            self.query.get()?;
        }
        self.rx.changed().await.map_err(|_| QbError::Unavailable {
            message: "live query dropped".into(),
        })?;
        self.query.get()
    }
}
