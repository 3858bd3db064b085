#![warn(clippy::unwrap_used)]
#![warn(clippy::uninlined_format_args)]

pub mod distance;

use alloy_primitives::Bytes;

/// Raw content value bytes. The store serves these verbatim; decoding and
/// validation belong to the consumer.
pub type RawContentValue = Bytes;
