pub mod config;
pub mod error;
pub mod functions;
pub mod history;
pub mod radius;
pub mod sql;
pub mod store;
pub mod test_utils;

use std::{collections::HashMap, ops::Deref, str::FromStr};

use alloy_primitives::B256;
pub use config::{ContentDbConfig, RadiusConfig, DATABASE_NAME};
use discv5::enr::NodeId;
pub use error::ContentStoreError;
pub use history::HistoryStorage;
pub use radius::RadiusController;
use rusqlite::types::{FromSql, FromSqlError, ValueRef};
use stele_primitives::{
    distance::{Distance, Metric, XorMetric},
    RawContentValue,
};
pub use store::{ContentDb, FractionalEviction, PutResult, CONTENT_DELETION_FRACTION};

/// An enum which tells us if we should store or not store content, and if not
/// why for better errors.
#[derive(Debug, PartialEq)]
pub enum ShouldWeStoreContent {
    Store,
    NotWithinRadius,
    AlreadyStored,
}

/// A data store for Portal Network content (data).
///
/// This is the contract between the wire layer and the storage layer. None of
/// these operations fail towards the caller: a backend failure aborts the
/// process, and the only observable negative outcome is the absent case.
pub trait ContentStore {
    /// Looks up a piece of content by `content_id`.
    ///
    /// The raw content key accompanies every request but does not participate
    /// in addressing; future schemas may key by it.
    fn get(&self, content_key: &[u8], content_id: &ContentId) -> Option<RawContentValue>;

    /// Puts a piece of content into the store.
    ///
    /// Returns whether the write triggered a pruning pass.
    fn store(&mut self, content_key: &[u8], content_id: &ContentId, value: &[u8]) -> bool;

    /// Returns whether data associated with `content_id` is stored.
    fn contains(&self, content_key: &[u8], content_id: &ContentId) -> bool;

    /// Returns the radius of the data store.
    fn radius(&self) -> Distance;

    /// Returns whether the content denoted by `content_id` is within the
    /// radius of the data store and not already stored within the data store.
    fn should_we_store(&self, content_id: &ContentId) -> ShouldWeStoreContent;
}

/// An in-memory `ContentStore`.
pub struct MemoryContentStore {
    /// The content store.
    store: HashMap<Vec<u8>, RawContentValue>,
    /// The `NodeId` of the local node.
    node_id: NodeId,
    /// The radius of the store.
    radius: Distance,
}

impl MemoryContentStore {
    /// Constructs a new `MemoryContentStore`.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            store: HashMap::new(),
            node_id,
            radius: Distance::MAX,
        }
    }

    /// Sets the radius of the store to `radius`.
    pub fn set_radius(&mut self, radius: Distance) {
        self.radius = radius;
    }

    /// Returns the distance to `content_id` from the local `NodeId`.
    fn distance_to_content_id(&self, content_id: &ContentId) -> Distance {
        XorMetric::distance(&self.node_id.raw(), &content_id.raw())
    }
}

impl ContentStore for MemoryContentStore {
    fn get(&self, _content_key: &[u8], content_id: &ContentId) -> Option<RawContentValue> {
        self.store.get(content_id.as_slice()).cloned()
    }

    fn store(&mut self, _content_key: &[u8], content_id: &ContentId, value: &[u8]) -> bool {
        self.store
            .insert(content_id.to_vec(), RawContentValue::copy_from_slice(value));
        false
    }

    fn contains(&self, _content_key: &[u8], content_id: &ContentId) -> bool {
        self.store.contains_key(content_id.as_slice())
    }

    fn radius(&self) -> Distance {
        self.radius
    }

    fn should_we_store(&self, content_id: &ContentId) -> ShouldWeStoreContent {
        if self.distance_to_content_id(content_id) > self.radius {
            ShouldWeStoreContent::NotWithinRadius
        } else if self.contains(&[], content_id) {
            ShouldWeStoreContent::AlreadyStored
        } else {
            ShouldWeStoreContent::Store
        }
    }
}

/// A 256-bit content identifier, stored on disk as its 32 byte big-endian
/// representation so that lexicographic and numeric order coincide.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentId(B256);

impl<T: Into<B256>> From<T> for ContentId {
    fn from(value: T) -> Self {
        Self(value.into())
    }
}

impl ContentId {
    /// Returns the raw 32 byte array.
    pub fn raw(&self) -> [u8; 32] {
        self.0 .0
    }
}

impl FromSql for ContentId {
    fn column_result(value: ValueRef<'_>) -> Result<Self, FromSqlError> {
        match value {
            ValueRef::Blob(bytes) => {
                if bytes.len() == B256::len_bytes() {
                    Ok(ContentId(B256::from_slice(bytes)))
                } else {
                    Err(FromSqlError::Other(
                        format!(
                            "ContentId is not possible from a blob of length {}",
                            bytes.len()
                        )
                        .into(),
                    ))
                }
            }
            ValueRef::Text(_) => {
                let hex_text = value.as_str()?;
                B256::from_str(hex_text)
                    .map(ContentId)
                    .map_err(|err| FromSqlError::Other(err.into()))
            }
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

impl Deref for ContentId {
    type Target = B256;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub mod test {
    use alloy_primitives::B512;

    use super::*;

    #[test]
    fn memory_store_get_and_contains() {
        let node_id = NodeId::random();
        let mut store = MemoryContentStore::new(node_id);

        let val = vec![0xef];

        // Arbitrary id not available.
        let arb_id = ContentId::from(node_id.raw());
        assert!(!store.contains(&[], &arb_id));
        assert!(store.get(&[], &arb_id).is_none());

        // Arbitrary id available and equal to the assigned value.
        assert!(!store.store(&[], &arb_id, &val));
        assert!(store.contains(&[], &arb_id));
        assert_eq!(
            store.get(&[], &arb_id),
            Some(RawContentValue::copy_from_slice(&val))
        );
    }

    #[test]
    fn memory_store_is_within_radius_and_unavailable() {
        let node_id = NodeId::random();
        let mut store = MemoryContentStore::new(node_id);

        let val = vec![0xef];

        // Arbitrary id within radius and unavailable.
        let arb_id = ContentId::from(node_id.raw());
        assert_eq!(store.should_we_store(&arb_id), ShouldWeStoreContent::Store);

        // Arbitrary id available.
        store.store(&[], &arb_id, &val);
        assert_eq!(
            store.should_we_store(&arb_id),
            ShouldWeStoreContent::AlreadyStored
        );

        // Arbitrary id outside radius.
        store.set_radius(Distance::ZERO);
        let far_id = ContentId::from(B256::repeat_byte(0xff));
        assert_eq!(
            store.should_we_store(&far_id),
            ShouldWeStoreContent::NotWithinRadius
        );
    }

    #[test]
    fn content_id_from_blob() {
        let content_id = ContentId(B256::random());
        let sql_value = ValueRef::from(content_id.as_slice());
        assert_eq!(ContentId::column_result(sql_value), Ok(content_id));
    }

    #[test]
    #[should_panic(expected = "ContentId is not possible from a blob of length 31")]
    fn content_id_from_blob_less_bytes() {
        let bytes = B256::random().0;
        ContentId::column_result(ValueRef::from(&bytes[..31])).unwrap();
    }

    #[test]
    #[should_panic(expected = "ContentId is not possible from a blob of length 33")]
    fn content_id_from_blob_more_bytes() {
        let bytes = B512::random().0;
        ContentId::column_result(ValueRef::from(&bytes[..33])).unwrap();
    }

    #[test]
    fn content_id_from_text() {
        let content_id_str = "0123456789abcdef0123456789ABCDEF0123456789abcdef0123456789ABCDEF";
        let content_id = ContentId(B256::from_str(content_id_str).unwrap());
        let sql_value = ValueRef::from(content_id_str);
        assert_eq!(ContentId::column_result(sql_value), Ok(content_id));
    }
}
