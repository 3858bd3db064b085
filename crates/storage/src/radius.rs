use std::cmp::max;

use alloy_primitives::U256;
use stele_primitives::distance::Distance;
use tracing::{debug, info, warn};

use crate::{config::RadiusConfig, error::ContentStoreError, store::ContentDb};

/// Owns the node's advertised radius and its adjustment policy.
///
/// With a dynamic configuration the radius is monotonically non-increasing
/// over the node's lifetime; with a static one it never changes.
pub struct RadiusController {
    radius: Distance,
    config: RadiusConfig,
}

impl RadiusController {
    /// Chooses the starting radius from the configuration and the state of
    /// the database.
    pub fn new(config: RadiusConfig, db: &ContentDb) -> Result<Self, ContentStoreError> {
        let radius = match &config {
            RadiusConfig::Static { log2_radius } => {
                let radius = Distance::from_log2_radius(*log2_radius);
                debug!(log2_radius, %radius, "Static radius configured");
                radius
            }
            RadiusConfig::Dynamic => Self::initial_dynamic_radius(db)?,
        };
        Ok(Self { radius, config })
    }

    fn initial_dynamic_radius(db: &ContentDb) -> Result<Distance, ContentStoreError> {
        let capacity = db.storage_capacity();
        if capacity == 0 {
            debug!("Storage capacity is 0 -> Using ZERO radius");
            return Ok(Distance::ZERO);
        }
        let used = db.used_size()?;
        if used as u128 * 100 > capacity as u128 * 95 {
            match db.largest_distance(db.node_id())? {
                Some(largest) => {
                    debug!(
                        used,
                        capacity,
                        %largest,
                        "Used size is near capacity -> Using distance to farthest for radius"
                    );
                    Ok(largest)
                }
                None => {
                    debug!(used, capacity, "No content found -> Using MAX radius");
                    Ok(Distance::MAX)
                }
            }
        } else {
            debug!(used, capacity, "Used size is below capacity -> Using MAX radius");
            Ok(Distance::MAX)
        }
    }

    pub fn radius(&self) -> Distance {
        self.radius
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.config, RadiusConfig::Dynamic)
    }

    /// Shrinks the radius after an eviction pass deleted `deleted_fraction`
    /// of the stored payload bytes.
    ///
    /// The new radius is the old one divided by `floor(1 / deleted_fraction)`,
    /// floored at the distance of the furthest element still stored; a
    /// smaller radius would reject content the node already holds.
    pub fn adjust(&mut self, deleted_fraction: f64, furthest_remaining: Distance) {
        if !self.is_dynamic() {
            warn!("Radius adjustment requested for a static radius. Skipping");
            return;
        }
        if deleted_fraction <= 0.0 {
            info!("Pruning pass freed no content, radius unchanged");
            return;
        }
        // The fraction is inverted up front so the 256-bit radius is only
        // ever divided by an integer.
        let inverse_fraction = U256::from((1.0 / deleted_fraction) as u64);
        let scaled = Distance::from(*self.radius / inverse_fraction);
        let new_radius = max(scaled, furthest_remaining);
        info!(old_radius = %self.radius, new_radius = %new_radius, "Adjusted radius after pruning");
        self.radius = new_radius;
    }
}
