// SQLite statements
//
// The `kvstore` table layout is shared with other Portal clients; changing it
// breaks on-disk compatibility.

pub const CREATE_QUERY_DB: &str = "CREATE TABLE IF NOT EXISTS kvstore (
    key BLOB PRIMARY KEY,
    value BLOB
);";

pub const INSERT_QUERY: &str = "INSERT OR REPLACE INTO kvstore (key, value) VALUES (?1, ?2)";

pub const LOOKUP_VALUE_QUERY: &str = "SELECT value FROM kvstore WHERE key = (?1) LIMIT 1";

pub const CONTAINS_QUERY: &str = "SELECT 1 FROM kvstore WHERE key = (?1) LIMIT 1";

pub const DELETE_QUERY: &str = "DELETE FROM kvstore WHERE key = (?1)";

pub const TOTAL_SIZE_QUERY: &str =
    "SELECT page_count * page_size AS size FROM pragma_page_count(), pragma_page_size()";

pub const UNUSED_SIZE_QUERY: &str =
    "SELECT freelist_count * page_size AS size FROM pragma_freelist_count(), pragma_page_size()";

pub const CONTENT_SIZE_QUERY: &str = "SELECT TOTAL(length(value)) FROM kvstore";

pub const CONTENT_COUNT_QUERY: &str = "SELECT COUNT(key) FROM kvstore";

// 32 byte big-endian blobs compare like the unsigned integers they encode, so
// MAX and ORDER BY need no numeric conversion.
pub const LARGEST_DISTANCE_QUERY: &str = "SELECT MAX(xor_distance(?1, key)) FROM kvstore";

pub const ORDERED_BY_DISTANCE_DESC_QUERY: &str =
    "SELECT key, length(value), xor_distance(?1, key) AS distance FROM kvstore
     ORDER BY distance DESC";

pub const DELETE_OUT_OF_RADIUS_QUERY: &str =
    "DELETE FROM kvstore WHERE in_radius(?1, key, ?2) = 0";

pub const VACUUM_QUERY: &str = "VACUUM;";
