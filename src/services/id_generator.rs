//! Time-ordered 64-bit identifiers for locally created records.
//!
//! Layout, high to low: 1 unused sign bit, 41 bits of milliseconds since
//! [`EPOCH_MS`], 10 bits of generator id, 12 bits of per-millisecond sequence.
//! Uniqueness holds for a single generator instance per generator id; nothing
//! coordinates independent processes that share an id.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

/// 2020-01-01T00:00:00Z in Unix milliseconds
pub const EPOCH_MS: i64 = 1_577_836_800_000;

const SEQUENCE_BITS: u32 = 12;
const DATACENTER_BITS: u32 = 10;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + DATACENTER_BITS;

pub const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;
pub const MAX_DATACENTER_ID: u16 = (1 << DATACENTER_BITS) - 1;

/// The system clock moved backwards since the last id was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("clock moved backwards by {rewind_ms}ms, refusing to generate an id")]
pub struct ClockRewindError {
    pub rewind_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdGeneratorError {
    #[error("datacenter id {0} does not fit in 10 bits (max 1023)")]
    InvalidDatacenterId(u16),
}

/// A generated id. Never mutated, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnowflakeId(i64);

impl SnowflakeId {
    pub fn from_i64(raw: i64) -> Self {
        Self(raw)
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }

    /// Milliseconds since [`EPOCH_MS`]
    pub fn timestamp_offset_ms(self) -> i64 {
        self.0 >> TIMESTAMP_SHIFT
    }

    pub fn datacenter_id(self) -> u16 {
        ((self.0 >> SEQUENCE_BITS) & MAX_DATACENTER_ID as i64) as u16
    }

    pub fn sequence(self) -> u16 {
        (self.0 & MAX_SEQUENCE) as u16
    }

    pub fn created_at(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(EPOCH_MS + self.timestamp_offset_ms()).single()
    }
}

impl fmt::Display for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SnowflakeId> for i64 {
    fn from(id: SnowflakeId) -> Self {
        id.0
    }
}

/// Millisecond wall clock, swappable so tests can rewind or freeze time
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_millis() as i64,
            // Before 1970: report it as such so the generator rejects it as a rewind
            Err(before) => -(before.duration().as_millis() as i64),
        }
    }
}

#[derive(Debug, Default)]
struct GeneratorState {
    last_timestamp_ms: i64,
    sequence: i64,
}

/// Issues [`SnowflakeId`]s. Share one instance (behind an `Arc`) across all
/// callers that use the same datacenter id.
pub struct SnowflakeGenerator {
    datacenter_id: u16,
    clock: Arc<dyn Clock>,
    state: Mutex<GeneratorState>,
}

impl fmt::Debug for SnowflakeGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeGenerator")
            .field("datacenter_id", &self.datacenter_id)
            .finish_non_exhaustive()
    }
}

impl SnowflakeGenerator {
    pub fn new(datacenter_id: u16) -> Result<Self, IdGeneratorError> {
        Self::with_clock(datacenter_id, Arc::new(SystemClock))
    }

    pub fn with_clock(datacenter_id: u16, clock: Arc<dyn Clock>) -> Result<Self, IdGeneratorError> {
        if datacenter_id > MAX_DATACENTER_ID {
            return Err(IdGeneratorError::InvalidDatacenterId(datacenter_id));
        }
        Ok(Self {
            datacenter_id,
            clock,
            state: Mutex::new(GeneratorState::default()),
        })
    }

    pub fn datacenter_id(&self) -> u16 {
        self.datacenter_id
    }

    /// Next id. Calls are serialized by one lock, so ids come out in lock
    /// acquisition order and never repeat.
    ///
    /// When 4096 ids have been issued within one millisecond this spins,
    /// yielding the thread, until the clock ticks over.
    pub fn next_id(&self) -> Result<SnowflakeId, ClockRewindError> {
        // The state is two integers updated together, so a poisoned lock is still consistent
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut timestamp = self.clock.now_ms() - EPOCH_MS;

        if timestamp < state.last_timestamp_ms {
            let rewind_ms = state.last_timestamp_ms - timestamp;
            error!("⏪ Clock moved backwards by {}ms, rejecting id request", rewind_ms);
            return Err(ClockRewindError { rewind_ms });
        }

        if timestamp == state.last_timestamp_ms {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                debug!("Sequence exhausted at {}ms, waiting for the next millisecond", timestamp);
                timestamp = self.wait_next_millis(state.last_timestamp_ms);
            }
        } else {
            state.sequence = 0;
        }

        state.last_timestamp_ms = timestamp;

        Ok(SnowflakeId(
            (timestamp << TIMESTAMP_SHIFT)
                | ((self.datacenter_id as i64) << SEQUENCE_BITS)
                | state.sequence,
        ))
    }

    fn wait_next_millis(&self, last_timestamp_ms: i64) -> i64 {
        loop {
            let timestamp = self.clock.now_ms() - EPOCH_MS;
            if timestamp > last_timestamp_ms {
                return timestamp;
            }
            std::thread::yield_now();
        }
    }
}
