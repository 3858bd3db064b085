use std::path::PathBuf;

use discv5::enr::NodeId;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::{error::ContentStoreError, functions::register_distance_functions, sql};

pub const DATABASE_NAME: &str = "stele.sqlite";

/// How the node's radius is chosen and maintained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RadiusConfig {
    /// Radius fixed at `2^log2_radius - 1`. Storage capacity is advisory and
    /// the write path never evicts.
    Static { log2_radius: u32 },
    /// Radius derived from the database state at startup, shrinking as
    /// eviction makes room for closer content.
    Dynamic,
}

/// Struct for configuring a `ContentDb` instance.
#[derive(Clone)]
pub struct ContentDbConfig {
    pub node_data_dir: PathBuf,
    pub in_memory: bool,
    pub storage_capacity_bytes: u64,
    pub radius_config: RadiusConfig,
    pub node_id: NodeId,
    /// When set, the WAL is only checkpointed by explicit reclaim cycles.
    pub manual_checkpoint: bool,
}

impl ContentDbConfig {
    pub fn new(
        node_data_dir: PathBuf,
        storage_capacity_bytes: u64,
        radius_config: RadiusConfig,
        node_id: NodeId,
    ) -> Self {
        Self {
            node_data_dir,
            in_memory: false,
            storage_capacity_bytes,
            radius_config,
            node_id,
            manual_checkpoint: false,
        }
    }
}

/// Helper function for opening a SQLite connection pool.
///
/// Every new connection registers the distance predicates and applies the
/// journal pragmas; the scalar functions live on the connection and are never
/// persisted into the database file.
pub fn setup_sql(
    config: &ContentDbConfig,
) -> Result<Pool<SqliteConnectionManager>, ContentStoreError> {
    let manual_checkpoint = config.manual_checkpoint;
    let init = move |conn: &mut rusqlite::Connection| {
        register_distance_functions(conn)?;
        // Both pragmas return a result row, so they cannot go through
        // execute_batch.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        if manual_checkpoint {
            conn.query_row("PRAGMA wal_autocheckpoint = 0", [], |_| Ok(()))?;
        }
        Ok(())
    };

    let pool = if config.in_memory {
        // A private in-memory database exists per connection, so the pool
        // must never hand out a second one.
        let manager = SqliteConnectionManager::memory().with_init(init);
        Pool::builder().max_size(1).build(manager)?
    } else {
        let sql_path = config.node_data_dir.join(DATABASE_NAME);
        info!(path = %sql_path.display(), "Setting up SqliteDB");
        let manager = SqliteConnectionManager::file(sql_path).with_init(init);
        Pool::new(manager)?
    };
    pool.get()?.execute_batch(sql::CREATE_QUERY_DB)?;
    Ok(pool)
}
