use std::fmt::Formatter;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use log::warn;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;
use crate::time::Timestamp;
use crate::Clock;

type Ticks = u64;

pub static LATEST: AtomicU64 = AtomicU64::new(0);
pub const SYS_MASK: Ticks = !0x0f;
/// How far ahead of the local wall clock a remote time may be before `sync` ignores it (1 hour).
pub const MAX_DRIFT: Ticks = 3_600_000_000_000;

/// Hybrid logical time. It stores an approximate (never decreasing) value of system time, that
/// can be safely used to compare date of occurrence of two events. It can also be serialized and
/// deserialized.
///
/// Call `HybridTime::now()` to receive current time. Every reading is strictly greater than any
/// reading taken before it and any remote time accepted by `HybridTime::sync`.
#[derive(Debug, Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash)]
pub struct HybridTime(Ticks);

impl HybridTime {

    fn sys_time() -> Ticks {
        let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        (d.as_nanos() as u64) & SYS_MASK
    }

    pub fn now() -> Self {
        loop {
            let ticks = LATEST.load(Ordering::Relaxed);
            let current = Self::sys_time();
            let latest = current.max(ticks).saturating_add(1);
            if LATEST.compare_exchange(ticks, latest, Ordering::AcqRel, Ordering::Relaxed).is_ok() {
                return HybridTime(latest)
            }
        }
    }

    /// Moves the local clock forward so that subsequent readings follow `remote`. Remote times
    /// more than `MAX_DRIFT` ahead of the local wall clock are ignored. Returns `true` if the
    /// remote time was accepted.
    pub fn sync(remote: HybridTime) -> bool {
        let limit = Self::sys_time().saturating_add(MAX_DRIFT);
        if remote.0 > limit {
            warn!("ignoring remote hybrid time {}: more than {} ticks ahead of the local clock", remote.0, MAX_DRIFT);
            return false;
        }
        LATEST.fetch_max(remote.0, Ordering::AcqRel);
        true
    }

    pub fn ticks(&self) -> Ticks { self.0 }

    /// Hybrid time corresponding to a wall-clock timestamp. Instants before the Unix epoch map
    /// to zero.
    pub fn from_timestamp(ts: Timestamp) -> Self {
        let nanos = (ts.as_micros().max(0) as u64).saturating_mul(1_000);
        HybridTime(nanos & SYS_MASK)
    }
}

impl From<HybridTime> for SystemTime {
    fn from(time: HybridTime) -> Self {
        UNIX_EPOCH + std::time::Duration::from_nanos(time.0)
    }
}

/// Accepts either a raw tick count or any date-time layout understood by `Timestamp::parse`.
impl FromStr for HybridTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<Ticks>() {
            Ok(ticks) => Ok(HybridTime(ticks)),
            Err(_) => Timestamp::parse(s).map(HybridTime::from_timestamp),
        }
    }
}

impl Serialize for HybridTime {
    fn serialize<S>(&self, serializer: S) -> Result<<S as Serializer>::Ok, <S as Serializer>::Error> where
        S: Serializer {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for HybridTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, <D as Deserializer<'de>>::Error> where
        D: Deserializer<'de> {

        struct TicksVisitor;
        impl<'de> Visitor<'de> for TicksVisitor {
            type Value = u64;

            fn expecting(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "hybrid time ticks")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> where E: serde::de::Error {
                Ok(v)
            }
        }

        let ticks = deserializer.deserialize_u64(TicksVisitor)?;
        let time = HybridTime(ticks);
        HybridTime::sync(time);
        Ok(time)
    }
}

impl Clock for HybridTime {
    #[inline]
    fn now() -> Self {
        HybridTime::now()
    }
}
