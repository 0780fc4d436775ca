use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::CoreError;

/// Returns the current wall-clock time as milliseconds since Unix epoch.
pub fn physical_now() -> Result<u64, CoreError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .map_err(|_| CoreError::InvalidData("system clock before epoch".into()))
}

/// Optimistic-concurrency token stamped on every stored job write.
///
/// 12 bytes: 8 bytes wall_ms (big-endian u64) followed by 4 bytes counter
/// (big-endian u32). Byte order and `Ord` agree.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Revision {
    wall_ms: u64,
    counter: u32,
}

impl Revision {
    pub const ZERO: Revision = Revision { wall_ms: 0, counter: 0 };

    pub fn new(wall_ms: u64, counter: u32) -> Self {
        Self { wall_ms, counter }
    }

    pub fn wall_ms(&self) -> u64 {
        self.wall_ms
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn to_bytes(&self) -> [u8; 12] {
        let mut buf = [0u8; 12];
        buf[..8].copy_from_slice(&self.wall_ms.to_be_bytes());
        buf[8..].copy_from_slice(&self.counter.to_be_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8; 12]) -> Self {
        let mut wall = [0u8; 8];
        let mut counter = [0u8; 4];
        wall.copy_from_slice(&bytes[..8]);
        counter.copy_from_slice(&bytes[8..]);
        Self {
            wall_ms: u64::from_be_bytes(wall),
            counter: u32::from_be_bytes(counter),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; 12] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidData(format!("revision must be 12 bytes, got {}", bytes.len())))?;
        Ok(Self::from_bytes(&arr))
    }
}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Revision({}.{})", self.wall_ms, self.counter)
    }
}

impl Serialize for Revision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        Revision::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Mints strictly increasing revisions, even for writes landing in the same
/// millisecond or while the wall clock steps backwards.
pub struct RevisionClock {
    wall_ms: u64,
    counter: u32,
}

impl Default for RevisionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl RevisionClock {
    pub fn new() -> Self {
        Self {
            wall_ms: 0,
            counter: 0,
        }
    }

    /// Generate the next revision.
    pub fn tick(&mut self) -> Result<Revision, CoreError> {
        let now = physical_now()?;
        Ok(self.tick_at(now))
    }

    fn tick_at(&mut self, now: u64) -> Revision {
        let rev = if now > self.wall_ms {
            Revision::new(now, 0)
        } else {
            Revision::new(self.wall_ms, self.counter + 1)
        };

        self.wall_ms = rev.wall_ms;
        self.counter = rev.counter;
        rev
    }

    /// Fold in a revision read back from storage so freshly minted ones
    /// always sort after it.
    pub fn observe(&mut self, seen: Revision) {
        if seen.wall_ms > self.wall_ms
            || (seen.wall_ms == self.wall_ms && seen.counter > self.counter)
        {
            self.wall_ms = seen.wall_ms;
            self.counter = seen.counter;
        }
    }
}
