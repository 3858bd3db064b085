use stele_metrics::storage::StorageMetricsReporter;
use stele_primitives::{distance::Distance, RawContentValue};

use crate::{
    config::ContentDbConfig,
    error::{fatal_database_error, ContentStoreError},
    radius::RadiusController,
    store::{ContentDb, PutResult},
    ContentId, ContentStore, ShouldWeStoreContent,
};

/// Storage layer for the history network.
///
/// Bridges the wire layer and the content database: reads serve straight from
/// the database, writes go through the pruning write path, and the radius
/// shrinks as pruning makes room. The wire layer reads the radius on every
/// neighbor lookup to decide whether an offer is in range.
pub struct HistoryStorage {
    db: ContentDb,
    radius_controller: RadiusController,
    metrics: StorageMetricsReporter,
}

impl HistoryStorage {
    pub fn new(config: ContentDbConfig) -> Result<Self, ContentStoreError> {
        let db = ContentDb::new(config)?;
        let radius_controller = RadiusController::new(db.config().radius_config.clone(), &db)?;

        let metrics = StorageMetricsReporter::new("history");
        metrics.report_storage_capacity_bytes(db.storage_capacity() as f64);
        metrics.report_radius(radius_controller.radius());
        metrics.report_entry_count(db.content_count()?);
        metrics.report_content_data_storage_bytes(db.content_size()? as f64);

        Ok(Self {
            db,
            radius_controller,
            metrics,
        })
    }

    /// Direct access to the underlying database, for maintenance tasks that
    /// run outside the handler contract.
    pub fn db(&self) -> &ContentDb {
        &self.db
    }

    /// Get a summary of the current state of storage.
    pub fn get_summary_info(&self) -> String {
        let timer = self.metrics.start_process_timer("get_summary_info");
        match self.db.size() {
            Ok(size) => self.metrics.report_total_storage_usage_bytes(size as f64),
            Err(err) => fatal_database_error(err),
        }
        self.metrics.stop_process_timer(timer);
        self.metrics.get_summary()
    }

    /// Drops content outside the current radius and reclaims the disk space.
    pub fn force_prune(&self) -> Result<(), ContentStoreError> {
        let node_id = *self.db.node_id();
        self.db.force_prune(&node_id, self.radius_controller.radius())
    }
}

impl ContentStore for HistoryStorage {
    fn get(&self, _content_key: &[u8], content_id: &ContentId) -> Option<RawContentValue> {
        let timer = self.metrics.start_process_timer("get");
        let value = self
            .db
            .get(content_id)
            .unwrap_or_else(|err| fatal_database_error(err));
        self.metrics.stop_process_timer(timer);
        value
    }

    fn store(&mut self, _content_key: &[u8], content_id: &ContentId, value: &[u8]) -> bool {
        let timer = self.metrics.start_process_timer("store");
        let pruned = if self.radius_controller.is_dynamic() {
            let result = self
                .db
                .put_and_prune(content_id, value)
                .unwrap_or_else(|err| fatal_database_error(err));
            match result {
                PutResult::Stored => false,
                PutResult::Pruned {
                    furthest_remaining,
                    deleted_fraction,
                    deleted_count,
                } => {
                    self.metrics.report_pruning(deleted_count);
                    if deleted_fraction > 0.0 {
                        self.radius_controller
                            .adjust(deleted_fraction, furthest_remaining);
                        self.metrics.report_radius(self.radius_controller.radius());
                    }
                    true
                }
            }
        } else {
            self.db
                .put(content_id, value)
                .unwrap_or_else(|err| fatal_database_error(err));
            false
        };
        self.metrics.stop_process_timer(timer);
        pruned
    }

    fn contains(&self, _content_key: &[u8], content_id: &ContentId) -> bool {
        self.db
            .contains(content_id)
            .unwrap_or_else(|err| fatal_database_error(err))
    }

    fn radius(&self) -> Distance {
        self.radius_controller.radius()
    }

    fn should_we_store(&self, content_id: &ContentId) -> ShouldWeStoreContent {
        if self.db.distance_to_content_id(content_id) > self.radius() {
            ShouldWeStoreContent::NotWithinRadius
        } else if self.contains(&[], content_id) {
            ShouldWeStoreContent::AlreadyStored
        } else {
            ShouldWeStoreContent::Store
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use anyhow::Result;
    use test_log::test;

    use super::*;
    use crate::{
        config::RadiusConfig,
        test_utils::{
            content_id_at_distance, create_in_memory_config, create_test_config_with_dir,
            generate_random_bytes, zero_node_id,
        },
    };

    #[test]
    fn handler_round_trip() -> Result<()> {
        let mut storage = HistoryStorage::new(create_in_memory_config(1_000_000))?;
        let content_id = content_id_at_distance(0x01);
        let content_key = vec![0x00, 0x01];
        let value = b"hello";

        assert!(storage.get(&content_key, &content_id).is_none());
        assert!(!storage.store(&content_key, &content_id, value));
        assert!(storage.contains(&content_key, &content_id));
        assert_eq!(
            storage.get(&content_key, &content_id),
            Some(RawContentValue::copy_from_slice(value))
        );

        storage.db().delete(&content_id)?;
        assert!(storage.get(&content_key, &content_id).is_none());
        Ok(())
    }

    #[test]
    fn dynamic_storage_shrinks_radius_under_pressure() -> Result<()> {
        let capacity: u64 = 1_000_000;
        let payload_len: usize = 40_960;
        let mut storage = HistoryStorage::new(create_in_memory_config(capacity))?;
        assert_eq!(storage.radius(), Distance::MAX);

        // Ids spread across the key space; the wire layer checks the radius
        // before offering, so out-of-range ids are skipped here too.
        let ids: Vec<_> = (0..30u8).map(|i| content_id_at_distance(i * 8)).collect();
        let mut last_radius = storage.radius();
        for content_id in &ids {
            if storage.should_we_store(content_id) != ShouldWeStoreContent::Store {
                continue;
            }
            storage.store(&[], content_id, &generate_random_bytes(payload_len));
            assert!(storage.radius() <= last_radius);
            last_radius = storage.radius();
        }

        assert!(storage.radius() < Distance::MAX);
        assert!(storage.db().used_size()? <= capacity + payload_len as u64 + 4096);

        // Every surviving id is inside the advertised radius.
        for content_id in &ids {
            if storage.contains(&[], content_id) {
                assert!(storage.db().distance_to_content_id(content_id) <= storage.radius());
            }
        }
        Ok(())
    }

    #[test]
    fn static_storage_never_evicts() -> Result<()> {
        let (temp_dir, config) =
            create_test_config_with_dir(1024, RadiusConfig::Static { log2_radius: 256 })?;
        let mut storage = HistoryStorage::new(config)?;

        // Write far past the advisory capacity.
        for i in 0..200u8 {
            let pruned = storage.store(&[], &content_id_at_distance(i), &generate_random_bytes(10_240));
            assert!(!pruned);
        }

        assert_eq!(storage.db().content_count()?, 200);
        assert_eq!(storage.radius(), Distance::MAX);
        temp_dir.close()?;
        Ok(())
    }

    #[test]
    fn restart_with_nearly_full_database_uses_largest_distance() -> Result<()> {
        let (temp_dir, config) = create_test_config_with_dir(100_000, RadiusConfig::Dynamic)?;
        {
            let storage = HistoryStorage::new(config.clone())?;
            assert_eq!(storage.radius(), Distance::MAX);
            // Fill past capacity behind the handler's back, so that the next
            // open sees a nearly full database.
            for i in 0..30u8 {
                storage
                    .db()
                    .put(&content_id_at_distance(i), &generate_random_bytes(4096))?;
            }
        }

        let storage = HistoryStorage::new(config)?;
        let largest = storage
            .db()
            .largest_distance(&zero_node_id())?
            .expect("database is not empty");
        assert_eq!(storage.radius(), largest);
        assert!(storage.radius() < Distance::MAX);
        temp_dir.close()?;
        Ok(())
    }

    #[test]
    fn zero_capacity_dynamic_storage_makes_progress() -> Result<()> {
        let mut storage = HistoryStorage::new(create_in_memory_config(0))?;
        assert_eq!(storage.radius(), Distance::ZERO);

        // Every store triggers a pruning pass and none of them hangs.
        for i in 0..5u8 {
            let pruned = storage.store(&[], &content_id_at_distance(i), b"payload");
            assert!(pruned);
            assert_eq!(storage.radius(), Distance::ZERO);
        }
        Ok(())
    }

    #[test]
    fn oversized_value_leaves_radius_unchanged() -> Result<()> {
        let mut storage = HistoryStorage::new(create_in_memory_config(100))?;
        let radius_before = storage.radius();

        let pruned = storage.store(
            &[],
            &content_id_at_distance(0x07),
            &generate_random_bytes(10_000),
        );
        assert!(pruned);
        assert_eq!(storage.radius(), radius_before);
        Ok(())
    }

    #[test]
    fn force_prune_respects_current_radius() -> Result<()> {
        let (temp_dir, config) =
            create_test_config_with_dir(1_000_000, RadiusConfig::Static { log2_radius: 128 })?;
        let storage = HistoryStorage::new(config)?;

        // Distance 0 is inside 2^128 - 1, anything with a high byte set is not.
        let near = content_id_at_distance(0);
        let far = content_id_at_distance(0x80);
        storage.db().put(&near, b"near")?;
        storage.db().put(&far, b"far")?;

        storage.force_prune()?;

        assert!(storage.db().contains(&near)?);
        assert!(!storage.db().contains(&far)?);
        temp_dir.close()?;
        Ok(())
    }

    #[test]
    fn should_we_store_tracks_radius_and_presence() -> Result<()> {
        let mut storage = HistoryStorage::new(create_in_memory_config(1_000_000))?;
        let content_id = content_id_at_distance(0x05);

        assert_eq!(
            storage.should_we_store(&content_id),
            ShouldWeStoreContent::Store
        );
        storage.store(&[], &content_id, b"value");
        assert_eq!(
            storage.should_we_store(&content_id),
            ShouldWeStoreContent::AlreadyStored
        );
        Ok(())
    }
}
