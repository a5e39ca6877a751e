//! Database layer for the Switchboard platform.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! embedded SQL migrations, and the call-record store. A call record is the
//! single flat persistence unit of the system: one row per call identifier,
//! overwritten wholesale on every finalize.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: no external database process required; WAL
//!   allows concurrent readers with a single writer, which matches the
//!   finalize-heavy access pattern.
//! - **`r2d2` connection pool**: bounded connection reuse without manual
//!   lifetime management.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`, ensuring migrations ship with the server and cannot
//!   drift from the code that depends on them.

mod migrations;
mod pool;
mod records;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
pub use records::{load_call_record, save_call_record, StoreError};
