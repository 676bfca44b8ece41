//! Bounded pool of SQLite connections.
//!
//! Each connection is either idle in the pool or checked out by exactly one
//! [`PooledConnection`] guard. Callers that find the pool exhausted wait in a
//! strict FIFO queue; a release always serves the oldest waiter first.
//!
//! Engine work runs on tokio's blocking pool through
//! [`PooledConnection::interact`]. A deadline can be attached with
//! [`PooledConnection::interact_with_timeout`], which interrupts the running
//! statement when it expires.

use crate::error::{AppError, Result};
use crate::metrics::{POOL_ACQUIRE_DURATION_SECONDS, POOL_ACQUIRE_TIMEOUTS_TOTAL, POOL_CONNECTIONS};
use crate::monitor::RollingWindow;
use parking_lot::Mutex;
use rusqlite::{Connection, InterruptHandle};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pool failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The pool was shut down
    #[error("connection pool is shut down")]
    Closed,

    /// No connection became available in time
    #[error("no connection available after {0:?}")]
    AcquireTimeout(Duration),

    /// Opening a new connection failed
    #[error("failed to open connection: {0}")]
    Open(String),
}

/// Pool sizing and eviction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Connections kept open even when idle
    pub min_connections: usize,

    /// Hard ceiling on open connections
    pub max_connections: usize,

    /// How long `acquire` waits in the queue
    pub acquire_timeout: Duration,

    /// Idle connections unused for this long are closed by the sweep
    pub idle_timeout: Duration,

    /// Connections older than this are closed on release or sweep
    pub max_lifetime: Duration,

    /// Period of the background sweep
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 4,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(1800),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(AppError::Configuration(
                "max_connections must be greater than 0".to_string(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(AppError::Configuration(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        if self.acquire_timeout.is_zero() {
            return Err(AppError::Configuration(
                "acquire_timeout must be greater than 0".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(AppError::Configuration(
                "sweep_interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Opens connections to one database file with the pool's pragmas applied
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    path: PathBuf,
    busy_timeout: Duration,
    wal: bool,
}

impl ConnectionManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_millis(5000),
            wal: true,
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh connection
    pub fn open(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        if self.wal {
            let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }
}

struct Slot {
    id: u64,
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
    created_at: Instant,
    last_used: Instant,
    use_count: u64,
    generation: u64,
}

/// What a released connection hands to the oldest waiter
enum Grant {
    /// A ready connection, already counted as active
    Connection(Slot),
    /// Room to open a new connection
    Capacity,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<Grant>,
}

#[derive(Default)]
struct PoolState {
    /// Released connections; the back is the most recently used
    idle: VecDeque<Slot>,
    active: usize,
    /// Open connections plus reservations being opened
    total: usize,
    waiters: VecDeque<Waiter>,
    generation: u64,
    closed: bool,
}

#[derive(Default)]
struct PoolCounters {
    acquired: AtomicU64,
    released: AtomicU64,
    created: AtomicU64,
    destroyed: AtomicU64,
    timeouts: AtomicU64,
}

struct PoolInner {
    manager: ConnectionManager,
    config: PoolConfig,
    state: Mutex<PoolState>,
    counters: PoolCounters,
    acquire_latency: Mutex<RollingWindow>,
    next_id: AtomicU64,
}

/// Point-in-time pool diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolMetrics {
    pub total_connections: usize,
    pub active_connections: usize,
    pub idle_connections: usize,
    pub waiting_requests: usize,
    pub acquired: u64,
    pub released: u64,
    pub created: u64,
    pub destroyed: u64,
    pub timeouts: u64,
    /// Mean acquire latency over the last 100 acquisitions
    pub avg_acquire_ms: f64,
    pub generation: u64,
    pub closed: bool,
}

enum Step {
    Ready(Slot),
    Open,
    Wait(u64, oneshot::Receiver<Grant>),
}

/// Bounded pool of SQLite connections
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create an empty pool; connections are opened on demand
    pub fn new(manager: ConnectionManager, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                manager,
                config,
                state: Mutex::new(PoolState::default()),
                counters: PoolCounters::default(),
                acquire_latency: Mutex::new(RollingWindow::new(100)),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    /// Create a pool, bootstrap the schema on its first connection and
    /// warm it up to `min_connections`
    pub async fn open(manager: ConnectionManager, config: PoolConfig) -> Result<Self> {
        let pool = Self::new(manager, config)?;
        {
            let mut conn = pool.acquire().await?;
            conn.interact(|conn| crate::db::schema::ensure_schema(conn))
                .await?;
        }
        pool.warm_up().await?;

        info!(
            path = %pool.inner.manager.path().display(),
            min = pool.inner.config.min_connections,
            max = pool.inner.config.max_connections,
            "Connection pool opened"
        );
        Ok(pool)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.inner.manager
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Check out a connection.
    ///
    /// Returns an idle connection if there is one, opens a new one while
    /// below `max_connections`, and otherwise queues until a release or
    /// `acquire_timeout`.
    pub async fn acquire(&self) -> std::result::Result<PooledConnection, PoolError> {
        let started = Instant::now();

        let step = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(PoolError::Closed);
            }
            self.inner.next_step(&mut state)
        };

        let slot = match step {
            Step::Ready(slot) => slot,
            Step::Open => self.inner.open_reserved().await?,
            Step::Wait(id, rx) => {
                let mut waiting = Waiting {
                    inner: &self.inner,
                    id,
                    rx,
                    done: false,
                };
                match tokio::time::timeout(self.inner.config.acquire_timeout, &mut waiting.rx).await {
                    Ok(Ok(grant)) => {
                        waiting.done = true;
                        match grant {
                            Grant::Connection(slot) => slot,
                            Grant::Capacity => self.inner.open_reserved().await?,
                        }
                    }
                    Ok(Err(_)) => {
                        waiting.done = true;
                        return Err(PoolError::Closed);
                    }
                    Err(_) => {
                        drop(waiting);
                        self.inner.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                        POOL_ACQUIRE_TIMEOUTS_TOTAL.inc();
                        warn!(
                            timeout_ms = self.inner.config.acquire_timeout.as_millis() as u64,
                            "Timed out waiting for a pooled connection"
                        );
                        return Err(PoolError::AcquireTimeout(self.inner.config.acquire_timeout));
                    }
                }
            }
        };

        let elapsed = started.elapsed();
        self.inner.acquire_latency.lock().push(elapsed.as_secs_f64() * 1000.0);
        POOL_ACQUIRE_DURATION_SECONDS.observe(elapsed.as_secs_f64());
        self.inner.counters.acquired.fetch_add(1, Ordering::Relaxed);
        self.inner.publish();

        let mut slot = slot;
        slot.use_count += 1;
        debug!(
            connection_id = slot.id,
            wait_us = elapsed.as_micros() as u64,
            "Connection acquired"
        );

        Ok(PooledConnection {
            pool: Arc::clone(&self.inner),
            slot: Some(slot),
            tainted: false,
        })
    }

    /// Close idle connections past their idle timeout or lifetime, never going
    /// below `min_connections`. Returns the number closed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let config = &self.inner.config;
        let evicted = {
            let mut state = self.inner.state.lock();
            let mut kept = VecDeque::with_capacity(state.idle.len());
            let mut evicted = Vec::new();

            while let Some(slot) = state.idle.pop_front() {
                let stale = slot.generation != state.generation;
                let expired = now.duration_since(slot.created_at) >= config.max_lifetime
                    || now.duration_since(slot.last_used) >= config.idle_timeout;

                if stale || (expired && state.total > config.min_connections) {
                    state.total -= 1;
                    evicted.push(slot);
                } else {
                    kept.push_back(slot);
                }
            }
            state.idle = kept;
            evicted
        };

        let count = evicted.len();
        if count > 0 {
            self.inner
                .counters
                .destroyed
                .fetch_add(count as u64, Ordering::Relaxed);
            debug!(evicted = count, "Pool sweep closed idle connections");
        }
        drop(evicted);
        self.inner.publish();
        count
    }

    /// Open connections until `min_connections` are available. Returns the number opened.
    pub async fn warm_up(&self) -> Result<usize> {
        let mut opened = 0;
        loop {
            {
                let mut state = self.inner.state.lock();
                if state.closed || state.total >= self.inner.config.min_connections {
                    break;
                }
                state.total += 1;
            }
            let slot = self.inner.open_reserved().await?;
            self.inner.recycle(slot);
            opened += 1;
        }
        Ok(opened)
    }

    /// Discard every connection opened so far.
    ///
    /// Idle connections close now; checked-out ones close when released.
    pub fn reset(&self) {
        let drained: Vec<Slot> = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            let drained: Vec<Slot> = state.idle.drain(..).collect();
            state.total -= drained.len();
            drained
        };

        self.inner
            .counters
            .destroyed
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        info!(closed = drained.len(), "Connection pool reset");
        drop(drained);
        self.inner.publish();
    }

    /// Reject all waiters, close idle connections and refuse further acquires
    pub fn shutdown(&self) {
        let (drained, waiters) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let drained: Vec<Slot> = state.idle.drain(..).collect();
            state.total -= drained.len();
            let waiters: Vec<Waiter> = state.waiters.drain(..).collect();
            (drained, waiters)
        };

        self.inner
            .counters
            .destroyed
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        info!(
            closed = drained.len(),
            rejected_waiters = waiters.len(),
            "Connection pool shut down"
        );
        // Dropping the senders wakes every waiter with `Closed`
        drop(waiters);
        drop(drained);
        self.inner.publish();
    }

    /// Run [`sweep`](Self::sweep) and [`warm_up`](Self::warm_up) every
    /// `sweep_interval` until the pool is shut down or dropped
    pub fn spawn_maintenance(&self) -> JoinHandle<()> {
        let weak: Weak<PoolInner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let pool = ConnectionPool { inner };
                if pool.is_closed() {
                    break;
                }
                pool.sweep();
                if let Err(e) = pool.warm_up().await {
                    warn!(error = %e, "Failed to refill connection pool");
                }
            }
            debug!("Pool maintenance task stopped");
        })
    }

    pub fn metrics(&self) -> PoolMetrics {
        let state = self.inner.state.lock();
        let counters = &self.inner.counters;
        PoolMetrics {
            total_connections: state.total,
            active_connections: state.active,
            idle_connections: state.idle.len(),
            waiting_requests: state.waiters.len(),
            acquired: counters.acquired.load(Ordering::Relaxed),
            released: counters.released.load(Ordering::Relaxed),
            created: counters.created.load(Ordering::Relaxed),
            destroyed: counters.destroyed.load(Ordering::Relaxed),
            timeouts: counters.timeouts.load(Ordering::Relaxed),
            avg_acquire_ms: self.inner.acquire_latency.lock().mean(),
            generation: state.generation,
            closed: state.closed,
        }
    }
}

impl PoolInner {
    fn next_step(&self, state: &mut PoolState) -> Step {
        while let Some(slot) = state.idle.pop_back() {
            if slot.generation != state.generation {
                state.total -= 1;
                self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            state.active += 1;
            return Step::Ready(slot);
        }

        if state.total < self.config.max_connections {
            state.total += 1;
            return Step::Open;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(Waiter { id, tx });
        Step::Wait(id, rx)
    }

    /// Open a connection for a reservation already counted in `total`
    async fn open_reserved(self: &Arc<Self>) -> std::result::Result<Slot, PoolError> {
        let manager = self.manager.clone();
        let opened = tokio::task::spawn_blocking(move || manager.open()).await;

        let conn = match opened {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                self.free_capacity();
                return Err(PoolError::Open(e.to_string()));
            }
            Err(e) => {
                self.free_capacity();
                return Err(PoolError::Open(e.to_string()));
            }
        };

        let now = Instant::now();
        let interrupt = Arc::new(conn.get_interrupt_handle());
        let mut state = self.state.lock();
        if state.closed {
            state.total -= 1;
            return Err(PoolError::Closed);
        }
        state.active += 1;
        self.counters.created.fetch_add(1, Ordering::Relaxed);

        Ok(Slot {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
            created_at: now,
            last_used: now,
            use_count: 0,
            generation: state.generation,
        })
    }

    /// Return a checked-out slot: destroy it if it is stale, expired or the
    /// pool is closed, otherwise hand it to the oldest waiter or park it idle
    fn release(&self, mut slot: Slot, tainted: bool) {
        slot.last_used = Instant::now();
        self.counters.released.fetch_add(1, Ordering::Relaxed);

        let destroy = {
            let state = self.state.lock();
            state.closed
                || tainted
                || slot.generation != state.generation
                || slot.created_at.elapsed() >= self.config.max_lifetime
        };

        if destroy {
            {
                let mut state = self.state.lock();
                state.active -= 1;
            }
            self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
            debug!(connection_id = slot.id, "Connection closed on release");
            drop(slot);
            self.free_capacity();
        } else {
            self.recycle_active(slot);
        }
        self.publish();
    }

    /// Hand an active slot to the oldest waiter, or park it idle
    fn recycle_active(&self, slot: Slot) {
        let mut state = self.state.lock();
        if let Some(Grant::Connection(slot)) = offer(&mut state, Grant::Connection(slot)) {
            state.active -= 1;
            state.idle.push_back(slot);
        }
    }

    /// Park a freshly opened warm-up slot
    fn recycle(&self, slot: Slot) {
        self.recycle_active(slot);
    }

    /// A connection slot was given up: let the oldest waiter open one, or shrink
    fn free_capacity(&self) {
        let mut state = self.state.lock();
        if offer(&mut state, Grant::Capacity).is_some() {
            state.total -= 1;
        }
    }

    /// Put back a grant whose waiter went away before taking it
    fn return_grant(&self, grant: Grant) {
        match grant {
            Grant::Connection(slot) => self.recycle_active(slot),
            Grant::Capacity => self.free_capacity(),
        }
    }

    fn publish(&self) {
        let state = self.state.lock();
        POOL_CONNECTIONS
            .with_label_values(&["active"])
            .set(state.active as f64);
        POOL_CONNECTIONS
            .with_label_values(&["idle"])
            .set(state.idle.len() as f64);
        POOL_CONNECTIONS
            .with_label_values(&["waiting"])
            .set(state.waiters.len() as f64);
    }
}

/// Offer `grant` to waiters oldest first; returns it if nobody took it
fn offer(state: &mut PoolState, mut grant: Grant) -> Option<Grant> {
    while let Some(waiter) = state.waiters.pop_front() {
        match waiter.tx.send(grant) {
            Ok(()) => return None,
            Err(returned) => grant = returned,
        }
    }
    Some(grant)
}

/// Queue position of an acquire in progress. Dropping it before a grant was
/// consumed removes the waiter or returns the grant to the pool.
struct Waiting<'a> {
    inner: &'a Arc<PoolInner>,
    id: u64,
    rx: oneshot::Receiver<Grant>,
    done: bool,
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        {
            let mut state = self.inner.state.lock();
            if let Some(pos) = state.waiters.iter().position(|w| w.id == self.id) {
                state.waiters.remove(pos);
                return;
            }
        }
        if let Ok(grant) = self.rx.try_recv() {
            self.inner.return_grant(grant);
        }
    }
}

/// A checked-out connection; returned to the pool on drop
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    slot: Option<Slot>,
    tainted: bool,
}

impl PooledConnection {
    fn slot(&self) -> Result<&Slot> {
        self.slot
            .as_ref()
            .ok_or_else(|| AppError::Internal("pooled connection already released".to_string()))
    }

    pub fn id(&self) -> u64 {
        self.slot.as_ref().map_or(0, |s| s.id)
    }

    pub fn use_count(&self) -> u64 {
        self.slot.as_ref().map_or(0, |s| s.use_count)
    }

    pub fn created_at(&self) -> Option<Instant> {
        self.slot.as_ref().map(|s| s.created_at)
    }

    pub fn last_used(&self) -> Option<Instant> {
        self.slot.as_ref().map(|s| s.last_used)
    }

    pub fn generation(&self) -> u64 {
        self.slot.as_ref().map_or(0, |s| s.generation)
    }

    /// True while checked out
    pub fn is_active(&self) -> bool {
        self.slot.is_some()
    }

    /// Run `f` against the connection on the blocking pool
    pub async fn interact<F, T, E>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<AppError> + Send + 'static,
    {
        let conn = Arc::clone(&self.slot()?.conn);
        let outcome = tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await;

        match outcome {
            Ok(result) => result.map_err(Into::into),
            Err(e) => {
                self.tainted = true;
                Err(e.into())
            }
        }
    }

    /// Like [`interact`](Self::interact) but interrupts the statement and
    /// returns [`AppError::Timeout`] once `deadline` passes. The connection is
    /// closed instead of reused after a timeout.
    pub async fn interact_with_timeout<F, T, E>(&mut self, deadline: Duration, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<AppError> + Send + 'static,
    {
        let slot = self.slot()?;
        let conn = Arc::clone(&slot.conn);
        let interrupt = Arc::clone(&slot.interrupt);

        let mut handle = tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        });

        match tokio::time::timeout(deadline, &mut handle).await {
            Ok(Ok(result)) => result.map_err(Into::into),
            Ok(Err(e)) => {
                self.tainted = true;
                Err(e.into())
            }
            Err(_) => {
                interrupt.interrupt();
                self.tainted = true;
                warn!(
                    connection_id = self.id(),
                    deadline_ms = deadline.as_millis() as u64,
                    "Query exceeded its deadline and was interrupted"
                );
                Err(AppError::Timeout(format!(
                    "query exceeded {}ms",
                    deadline.as_millis()
                )))
            }
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.release(slot, self.tainted);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id())
            .field("use_count", &self.use_count())
            .field("generation", &self.generation())
            .field("tainted", &self.tainted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pool(dir: &TempDir, config: PoolConfig) -> ConnectionPool {
        let manager = ConnectionManager::new(dir.path().join("pool.sqlite3"));
        ConnectionPool::new(manager, config).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(PoolConfig::default().validate().is_ok());

        let config = PoolConfig {
            min_connections: 5,
            max_connections: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_acquire_reuses_idle_connection() {
        let dir = TempDir::new().unwrap();
        let pool = pool(&dir, PoolConfig::default());

        let first_id = {
            let conn = pool.acquire().await.unwrap();
            assert!(conn.is_active());
            conn.id()
        };

        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.id(), first_id);
        assert_eq!(conn.use_count(), 2);

        let metrics = pool.metrics();
        assert_eq!(metrics.created, 1);
        assert_eq!(metrics.active_connections, 1);
        assert_eq!(metrics.idle_connections, 0);
    }

    #[tokio::test]
    async fn test_interact_runs_sql() {
        let dir = TempDir::new().unwrap();
        let pool = pool(&dir, PoolConfig::default());
        let mut conn = pool.acquire().await.unwrap();

        let value: i64 = conn
            .interact(|c| c.query_row("SELECT 40 + 2", [], |r| r.get(0)))
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_exhausted() {
        let dir = TempDir::new().unwrap();
        let pool = pool(
            &dir,
            PoolConfig {
                max_connections: 1,
                acquire_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );

        let _held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.unwrap_err();
        assert_eq!(err, PoolError::AcquireTimeout(Duration::from_millis(50)));

        let metrics = pool.metrics();
        assert_eq!(metrics.timeouts, 1);
        assert_eq!(metrics.waiting_requests, 0);
    }

    #[tokio::test]
    async fn test_reset_discards_old_generation() {
        let dir = TempDir::new().unwrap();
        let pool = pool(&dir, PoolConfig::default());

        let held = pool.acquire().await.unwrap();
        let old_id = held.id();
        pool.reset();
        drop(held);

        let conn = pool.acquire().await.unwrap();
        assert_ne!(conn.id(), old_id);
        assert_eq!(conn.generation(), 1);
    }

    #[tokio::test]
    async fn test_interact_with_timeout_interrupts() {
        let dir = TempDir::new().unwrap();
        let pool = pool(&dir, PoolConfig::default());
        let mut conn = pool.acquire().await.unwrap();

        let result: Result<i64> = conn
            .interact_with_timeout(Duration::from_millis(20), |c| {
                c.query_row(
                    "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) SELECT count(*) FROM n",
                    [],
                    |r| r.get(0),
                )
            })
            .await;
        assert!(matches!(result, Err(AppError::Timeout(_))));
    }
}
