use std::sync::atomic::{AtomicI64, AtomicU64, Ordering::SeqCst};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// Strictly increasing, so two errors recorded back to back never share a key.
    fn micros(&self) -> i64;
}

/// Formats as `YYYY-MM-DD HH:MM:SS.mmm`.
pub fn db_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

pub fn db_time_before(at: DateTime<Utc>) -> String {
    db_time(at - Duration::milliseconds(1))
}

fn next_micros(last: &AtomicI64, now: i64) -> i64 {
    let previous = last
        .fetch_update(SeqCst, SeqCst, |last| Some(last.max(now - 1) + 1))
        .unwrap_or_else(|v| v);
    previous.max(now - 1) + 1
}

#[derive(Debug, Default)]
pub struct SystemClock {
    last_micros: AtomicI64,
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn micros(&self) -> i64 {
        next_micros(&self.last_micros, Utc::now().timestamp_micros())
    }
}

/// Always reports the same instant; microsecond keys still advance.
#[derive(Debug)]
pub struct FixedClock {
    at: DateTime<Utc>,
    last_micros: AtomicI64,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            at,
            last_micros: AtomicI64::new(0),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.at
    }

    fn micros(&self) -> i64 {
        next_micros(&self.last_micros, self.at.timestamp_micros())
    }
}

/// Fabricates identifiers for entities the server hasn't seen yet.
pub trait IdSource {
    fn next_id(&self) -> String;

    /// Even and increasing; the odd value below each one is left for the
    /// Created action that introduces it.
    fn next_sequence(&self) -> u64;
}

#[derive(Debug)]
pub struct RandomIds {
    sequence: AtomicU64,
}

impl RandomIds {
    pub fn new(clock: &dyn Clock) -> Self {
        let seed = clock.now().timestamp_micros().max(0) as u64;
        Self {
            sequence: AtomicU64::new(seed * 2),
        }
    }
}

impl IdSource for RandomIds {
    fn next_id(&self) -> String {
        rand::thread_rng().gen_range(1..=i64::MAX).to_string()
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(2, SeqCst) + 2
    }
}

#[derive(Debug)]
pub struct SequentialIds {
    counter: AtomicU64,
    sequence: AtomicU64,
}

impl SequentialIds {
    pub fn starting_at(first: u64) -> Self {
        Self {
            counter: AtomicU64::new(first),
            sequence: AtomicU64::new(0),
        }
    }
}

impl IdSource for SequentialIds {
    fn next_id(&self) -> String {
        self.counter.fetch_add(1, SeqCst).to_string()
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(2, SeqCst) + 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_micros_are_strictly_increasing() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let first = clock.micros();
        let second = clock.micros();
        let third = clock.micros();
        assert_eq!(first, clock.now().timestamp_micros());
        assert!(first < second && second < third);
    }

    #[test]
    fn test_db_time_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 6).unwrap();
        assert_eq!(db_time(at), "2024-03-09 14:05:06.000");
        assert_eq!(db_time_before(at), "2024-03-09 14:05:05.999");
    }

    #[test]
    fn test_sequences_leave_room_for_created() {
        let ids = SequentialIds::starting_at(100);
        assert_eq!(ids.next_id(), "100");
        assert_eq!(ids.next_id(), "101");
        let a = ids.next_sequence();
        let b = ids.next_sequence();
        assert_eq!(a % 2, 0);
        assert_eq!(b - a, 2);
    }
}
