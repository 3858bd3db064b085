use std::{fmt, ops::Deref};

use alloy_primitives::U256;

/// A radius advertised by a node in the DHT key space.
pub type DataRadius = U256;

/// Distance between two keys in the 256-bit DHT key space.
#[derive(Copy, Clone, PartialEq, Eq, Default, PartialOrd, Ord, Debug)]
pub struct Distance(U256);

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Distance {
    /// The maximum value.
    pub const MAX: Self = Self(U256::MAX);
    /// The minimum value.
    pub const ZERO: Self = Self(U256::ZERO);

    /// Returns the radius `2^log2_radius - 1`.
    ///
    /// `log2_radius` is clamped to 256, which yields [Distance::MAX]. A value
    /// of zero yields [Distance::ZERO].
    pub fn from_log2_radius(log2_radius: u32) -> Self {
        if log2_radius >= 256 {
            Self::MAX
        } else {
            Self((U256::from(1u8) << log2_radius as usize) - U256::from(1u8))
        }
    }

    /// Returns the integer base-2 logarithm of `self`.
    ///
    /// Returns `None` if `self` is zero, because the logarithm of zero is
    /// undefined. Otherwise, returns `Some(log2)` where `log2` is in the range
    /// [1, 256].
    pub fn log2(&self) -> Option<usize> {
        if self.0.is_zero() {
            None
        } else {
            Some(256 - self.0.leading_zeros())
        }
    }

    /// Returns the big-endian representation of `self`.
    pub fn big_endian(&self) -> [u8; 32] {
        self.0.to_be_bytes()
    }

    /// Interprets a 32-byte big-endian slice as a distance.
    ///
    /// Panics if `bytes` is longer than 32 bytes.
    pub fn from_be_slice(bytes: &[u8]) -> Self {
        Self(U256::from_be_slice(bytes))
    }
}

impl From<U256> for Distance {
    fn from(value: U256) -> Self {
        Distance(value)
    }
}

impl Deref for Distance {
    type Target = U256;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Types whose values represent a metric (distance function) that defines a
/// notion of distance between two elements in the DHT key space.
pub trait Metric {
    /// Returns the distance between two elements in the DHT key space.
    fn distance(x: &[u8; 32], y: &[u8; 32]) -> Distance;
}

/// The XOR metric defined in the Kademlia paper.
pub struct XorMetric;

impl Metric for XorMetric {
    fn distance(x: &[u8; 32], y: &[u8; 32]) -> Distance {
        let mut z: [u8; 32] = [0; 32];
        for i in 0..32 {
            z[i] = x[i] ^ y[i];
        }
        Distance(U256::from_be_slice(z.as_slice()))
    }
}
