//! RTMP timestamps are 32 bit unsigned integers representing the number of milliseconds from
//! an unknown epoch.  For the dispatch layer that epoch is the moment the dispatcher for a
//! connection was created, and every outbound message is stamped with the session time
//! elapsed since then.
//!
//! Sessions can outlive the roughly 49 days a 32 bit millisecond counter can represent, so the
//! session time wraps around instead of saturating.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use rml_rtmp_dispatch::time::RtmpTimestamp;
//!
//! let time = RtmpTimestamp::from_duration(Duration::from_millis(1500));
//! assert!(time == 1500);
//! assert_eq!(RtmpTimestamp::new(10) + 5, RtmpTimestamp::new(15));
//!
//! let wrapped = RtmpTimestamp::from_duration(Duration::from_millis(u32::MAX as u64 + 11));
//! assert!(wrapped == 10);
//! ```

use std::num::Wrapping;
use std::ops::Add;
use std::time::{Duration, Instant};

/// The representation of a RTMP timestamp
#[derive(Eq, PartialEq, Debug, Copy, Clone, Default)]
pub struct RtmpTimestamp {
    /// The time (as milliseconds from an unknown epoch) being represented by the timestamp
    pub value: u32,
}

impl RtmpTimestamp {
    /// Creates a new timestamp with the specified time value
    pub fn new(initial_value: u32) -> Self {
        RtmpTimestamp {
            value: initial_value,
        }
    }

    /// Creates a timestamp out of an elapsed duration, wrapping anything past `u32::MAX`
    /// milliseconds back around to zero.
    pub fn from_duration(elapsed: Duration) -> Self {
        let millis = elapsed.as_millis() % (u32::MAX as u128 + 1);
        RtmpTimestamp {
            value: millis as u32,
        }
    }
}

impl Add<u32> for RtmpTimestamp {
    type Output = RtmpTimestamp;

    fn add(self, other: u32) -> Self {
        RtmpTimestamp {
            value: (Wrapping(self.value) + Wrapping(other)).0,
        }
    }
}

impl PartialEq<u32> for RtmpTimestamp {
    fn eq(&self, other: &u32) -> bool {
        self.value == *other
    }
}

/// Tracks how long a session has been running
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    started_at: Instant,
}

impl SessionClock {
    /// Starts a clock at the current instant
    pub fn start() -> Self {
        SessionClock {
            started_at: Instant::now(),
        }
    }

    /// Amount of time since the clock was started
    pub fn session_time(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// The current session time as a RTMP timestamp
    pub fn timestamp(&self) -> RtmpTimestamp {
        RtmpTimestamp::from_duration(self.session_time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_converted_to_milliseconds() {
        let time = RtmpTimestamp::from_duration(Duration::from_secs(3));
        assert_eq!(time, RtmpTimestamp::new(3000));
    }

    #[test]
    fn duration_past_u32_max_wraps_around() {
        let elapsed = Duration::from_millis(u32::MAX as u64 + 1 + 250);
        let time = RtmpTimestamp::from_duration(elapsed);
        assert_eq!(time, RtmpTimestamp::new(250));
    }

    #[test]
    fn adding_past_u32_max_wraps_around() {
        let time = RtmpTimestamp::new(u32::MAX - 1) + 3;
        assert_eq!(time, RtmpTimestamp::new(1));
    }

    #[test]
    fn session_clock_starts_near_zero() {
        let clock = SessionClock::start();
        assert!(clock.timestamp().value < 60_000);
    }
}
