use discv5::enr::NodeId;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use stele_primitives::{
    distance::{Distance, Metric, XorMetric},
    RawContentValue,
};
use tracing::info;

use crate::{
    config::{setup_sql, ContentDbConfig},
    error::ContentStoreError,
    sql, ContentId,
};

/// Fraction of the stored payload bytes dropped by one eviction pass.
///
/// Bulk eviction keeps radius updates rare; every radius change has to be
/// re-advertised through the wire layer.
pub const CONTENT_DELETION_FRACTION: f64 = 0.05;

/// The outcome of a write through the pruning write path.
#[derive(Clone, Debug, PartialEq)]
pub enum PutResult {
    /// The value was stored and the database stayed under capacity.
    Stored,
    /// The write pushed used size over capacity and an eviction pass ran.
    Pruned {
        /// Distance of the furthest element still stored after the pass.
        furthest_remaining: Distance,
        /// Deleted payload bytes relative to the total payload size. Zero
        /// when even the single furthest row exceeded the byte budget.
        deleted_fraction: f64,
        deleted_count: u64,
    },
}

/// Running totals of one fractional eviction pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FractionalEviction {
    /// Distance of the furthest element still stored after the pass.
    pub furthest_remaining: Distance,
    pub deleted_bytes: u64,
    pub total_content_size: u64,
    pub deleted_count: u64,
}

/// Content database addressed by 256-bit content id.
///
/// A single `kvstore` table holds at most one entry per content id. The XOR
/// distance predicates are evaluated inside SQLite, so eviction scans order
/// rows in the engine instead of pulling the table into memory.
///
/// Operations are blocking and synchronous. The caller serializes mutations;
/// concurrent writers from other processes are unsupported.
pub struct ContentDb {
    config: ContentDbConfig,
    sql_connection_pool: Pool<SqliteConnectionManager>,
}

impl ContentDb {
    pub fn new(config: ContentDbConfig) -> Result<Self, ContentStoreError> {
        if config.storage_capacity_bytes > i64::MAX as u64 {
            return Err(ContentStoreError::InvalidData {
                message: format!(
                    "storage capacity {} overflows the backend's byte counters",
                    config.storage_capacity_bytes
                ),
            });
        }
        let sql_connection_pool = setup_sql(&config)?;
        Ok(Self {
            config,
            sql_connection_pool,
        })
    }

    pub fn config(&self) -> &ContentDbConfig {
        &self.config
    }

    pub fn node_id(&self) -> &NodeId {
        &self.config.node_id
    }

    pub fn storage_capacity(&self) -> u64 {
        self.config.storage_capacity_bytes
    }

    /// Returns distance from the local node id to the content id.
    pub fn distance_to_content_id(&self, content_id: &ContentId) -> Distance {
        XorMetric::distance(&self.config.node_id.raw(), &content_id.raw())
    }

    /// Looks up the stored value, or `None` when the id is absent.
    pub fn get(&self, content_id: &ContentId) -> Result<Option<RawContentValue>, ContentStoreError> {
        let value = self
            .sql_connection_pool
            .get()?
            .prepare_cached(sql::LOOKUP_VALUE_QUERY)?
            .query_row([content_id.to_vec()], |row| row.get::<_, Vec<u8>>(0))
            .optional()?;
        Ok(value.map(RawContentValue::from))
    }

    /// Inserts or atomically replaces the value stored under `content_id`.
    pub fn put(&self, content_id: &ContentId, value: &[u8]) -> Result<(), ContentStoreError> {
        self.sql_connection_pool
            .get()?
            .prepare_cached(sql::INSERT_QUERY)?
            .execute(params![content_id.to_vec(), value])?;
        Ok(())
    }

    /// Returns whether data associated with the content id is stored.
    pub fn contains(&self, content_id: &ContentId) -> Result<bool, ContentStoreError> {
        let contains = self
            .sql_connection_pool
            .get()?
            .prepare_cached(sql::CONTAINS_QUERY)?
            .exists([content_id.to_vec()])?;
        Ok(contains)
    }

    /// Deletes the entry. Deleting an absent id is a no-op.
    pub fn delete(&self, content_id: &ContentId) -> Result<(), ContentStoreError> {
        self.sql_connection_pool
            .get()?
            .prepare_cached(sql::DELETE_QUERY)?
            .execute([content_id.to_vec()])?;
        Ok(())
    }

    /// Repacks the database file, releasing free pages back to the OS.
    pub fn vacuum(&self) -> Result<(), ContentStoreError> {
        self.sql_connection_pool
            .get()?
            .execute_batch(sql::VACUUM_QUERY)?;
        Ok(())
    }

    /// Checkpoints the write-ahead log. With `truncate`, the log file is
    /// reset to zero bytes afterwards.
    pub fn checkpoint(&self, truncate: bool) -> Result<(), ContentStoreError> {
        let pragma = if truncate {
            "PRAGMA wal_checkpoint(TRUNCATE)"
        } else {
            "PRAGMA wal_checkpoint(PASSIVE)"
        };
        self.sql_connection_pool
            .get()?
            .query_row(pragma, [], |_| Ok(()))?;
        Ok(())
    }

    // STATISTICS

    /// Total database file size in bytes. Reflects the high-water mark:
    /// deletions do not shrink it until [ContentDb::vacuum].
    pub fn size(&self) -> Result<u64, ContentStoreError> {
        let size = self
            .sql_connection_pool
            .get()?
            .prepare_cached(sql::TOTAL_SIZE_QUERY)?
            .query_row([], |row| row.get(0))?;
        Ok(size)
    }

    /// Bytes sitting on the freelist, reusable by future writes.
    pub fn unused_size(&self) -> Result<u64, ContentStoreError> {
        let size = self
            .sql_connection_pool
            .get()?
            .prepare_cached(sql::UNUSED_SIZE_QUERY)?
            .query_row([], |row| row.get(0))?;
        Ok(size)
    }

    /// Bytes the database actually occupies: `size() - unused_size()`. This
    /// is the number eviction decisions are made against.
    pub fn used_size(&self) -> Result<u64, ContentStoreError> {
        Ok(self.size()?.saturating_sub(self.unused_size()?))
    }

    /// Sum of stored payload lengths, without per-row overhead. Eviction
    /// expresses its byte budget as a fraction of this number.
    pub fn content_size(&self) -> Result<u64, ContentStoreError> {
        let size: f64 = self
            .sql_connection_pool
            .get()?
            .prepare_cached(sql::CONTENT_SIZE_QUERY)?
            .query_row([], |row| row.get(0))?;
        Ok(size.round() as u64)
    }

    /// Number of stored entries.
    pub fn content_count(&self) -> Result<u64, ContentStoreError> {
        let count = self
            .sql_connection_pool
            .get()?
            .prepare_cached(sql::CONTENT_COUNT_QUERY)?
            .query_row([], |row| row.get(0))?;
        Ok(count)
    }

    /// Distance from `origin` to the furthest stored content id, or `None`
    /// when the store is empty. Scans the whole table.
    pub fn largest_distance(
        &self,
        origin: &NodeId,
    ) -> Result<Option<Distance>, ContentStoreError> {
        let distance: Option<Vec<u8>> = self
            .sql_connection_pool
            .get()?
            .prepare_cached(sql::LARGEST_DISTANCE_QUERY)?
            .query_row([origin.raw().to_vec()], |row| row.get(0))?;
        Ok(distance.map(|bytes| Distance::from_be_slice(&bytes)))
    }

    // WRITE PATH

    /// Stores the value, then evicts a fraction of the furthest content when
    /// the write pushed used size over the configured capacity.
    pub fn put_and_prune(
        &self,
        content_id: &ContentId,
        value: &[u8],
    ) -> Result<PutResult, ContentStoreError> {
        self.put(content_id, value)?;
        if self.used_size()? < self.config.storage_capacity_bytes {
            return Ok(PutResult::Stored);
        }

        let eviction =
            self.delete_content_fraction(&self.config.node_id, CONTENT_DELETION_FRACTION)?;
        let deleted_fraction = if eviction.total_content_size == 0 {
            0.0
        } else {
            eviction.deleted_bytes as f64 / eviction.total_content_size as f64
        };
        info!(
            deleted_count = eviction.deleted_count,
            deleted_bytes = eviction.deleted_bytes,
            deleted_fraction,
            "Used size is over storage capacity, pruned furthest content"
        );
        Ok(PutResult::Pruned {
            furthest_remaining: eviction.furthest_remaining,
            deleted_fraction,
            deleted_count: eviction.deleted_count,
        })
    }

    /// Deletes content in order of descending distance from `target` until
    /// `fraction` of the stored payload bytes has been freed.
    ///
    /// The returned distance belongs to the furthest element still stored:
    /// the first row that did not fit in the byte budget. When even the
    /// single furthest row exceeds the budget, nothing is deleted and the
    /// current largest distance is returned with zeroed counters. Space is
    /// reclaimed lazily; this never vacuums.
    pub fn delete_content_fraction(
        &self,
        target: &NodeId,
        fraction: f64,
    ) -> Result<FractionalEviction, ContentStoreError> {
        if fraction <= 0.0 || fraction >= 1.0 {
            return Err(ContentStoreError::InvalidData {
                message: format!("deletion fraction {fraction} outside of (0, 1)"),
            });
        }
        let total_content_size = self.content_size()?;
        let budget = (fraction * total_content_size as f64) as u64;

        let conn = self.sql_connection_pool.get()?;
        let mut ordered = conn.prepare_cached(sql::ORDERED_BY_DISTANCE_DESC_QUERY)?;
        let mut delete = conn.prepare_cached(sql::DELETE_QUERY)?;

        let mut deleted_bytes = 0;
        let mut deleted_count = 0;
        let mut furthest_remaining = Distance::ZERO;

        let mut rows = ordered.query([target.raw().to_vec()])?;
        while let Some(row) = rows.next()? {
            let key: Vec<u8> = row.get(0)?;
            let payload_len: u64 = row.get(1)?;
            let distance: Vec<u8> = row.get(2)?;
            if deleted_bytes + payload_len <= budget {
                delete.execute([key])?;
                deleted_bytes += payload_len;
                deleted_count += 1;
            } else {
                furthest_remaining = Distance::from_be_slice(&distance);
                break;
            }
        }

        Ok(FractionalEviction {
            furthest_remaining,
            deleted_bytes,
            total_content_size,
            deleted_count,
        })
    }

    /// Deletes every entry whose distance from `node_id` exceeds `radius`.
    /// Returns the number of deleted entries.
    pub fn delete_content_out_of_radius(
        &self,
        node_id: &NodeId,
        radius: Distance,
    ) -> Result<u64, ContentStoreError> {
        let deleted = self
            .sql_connection_pool
            .get()?
            .prepare_cached(sql::DELETE_OUT_OF_RADIUS_QUERY)?
            .execute(params![
                node_id.raw().to_vec(),
                radius.big_endian().to_vec()
            ])?;
        Ok(deleted as u64)
    }

    /// Vacuums and, under manual checkpointing, truncates the write-ahead
    /// log, so that bulk deletions show up as reclaimed disk space.
    pub fn reclaim_and_truncate(&self) -> Result<(), ContentStoreError> {
        let size_before = self.size()?;
        self.vacuum()?;
        if self.config.manual_checkpoint {
            self.checkpoint(true)?;
        }
        info!(
            size_before,
            size_after = self.size()?,
            "Reclaimed unused database pages"
        );
        Ok(())
    }

    /// Drops everything outside `radius` and reclaims the space immediately.
    /// Meant for startup after a capacity reduction, and for operators.
    pub fn force_prune(&self, node_id: &NodeId, radius: Distance) -> Result<(), ContentStoreError> {
        info!(%radius, "Force pruning content outside of radius");
        let deleted = self.delete_content_out_of_radius(node_id, radius)?;
        info!(deleted, "Force pruning complete");
        self.reclaim_and_truncate()
    }
}
