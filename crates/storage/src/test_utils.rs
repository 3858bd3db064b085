use discv5::enr::NodeId;
use tempfile::TempDir;

use crate::{
    config::{ContentDbConfig, RadiusConfig},
    error::ContentStoreError,
    ContentId,
};

/// The all-zero node id. With this origin a content id reads directly as its
/// own distance.
pub fn zero_node_id() -> NodeId {
    NodeId::parse(&[0u8; 32]).expect("32 bytes is a valid node id length")
}

/// Content id whose distance from the zero node id is `distance * 2^248`.
pub fn content_id_at_distance(distance: u8) -> ContentId {
    let mut raw = [0u8; 32];
    raw[0] = distance;
    ContentId::from(raw)
}

pub fn generate_random_bytes(length: usize) -> Vec<u8> {
    (0..length).map(|_| rand::random::<u8>()).collect()
}

/// In-memory dynamic-radius config with the zero node id.
pub fn create_in_memory_config(storage_capacity_bytes: u64) -> ContentDbConfig {
    let mut config = ContentDbConfig::new(
        std::env::temp_dir(),
        storage_capacity_bytes,
        RadiusConfig::Dynamic,
        zero_node_id(),
    );
    config.in_memory = true;
    config
}

/// Creates a temporary directory and a file-backed config pointing at it.
pub fn create_test_config_with_dir(
    storage_capacity_bytes: u64,
    radius_config: RadiusConfig,
) -> Result<(TempDir, ContentDbConfig), ContentStoreError> {
    let temp_dir = TempDir::new()?;
    let config = ContentDbConfig::new(
        temp_dir.path().to_path_buf(),
        storage_capacity_bytes,
        radius_config,
        zero_node_id(),
    );
    Ok((temp_dir, config))
}
