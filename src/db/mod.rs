//! Embedded SQLite storage: connection pool, schema and record store.

mod pool;
pub mod rows;
pub mod schema;
mod store;

pub use pool::{ConnectionManager, ConnectionPool, PoolConfig, PoolError, PoolMetrics, PooledConnection};
pub use store::{ImportSummary, RecordStore};
