use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

///
/// Clock
///
/// Source of `_meta.lwt` timestamps and of the cleanup horizon.
///

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch, with 0.01 resolution.
    fn now(&self) -> f64;
}

///
/// SystemClock
///
/// Wall-clock time, forced strictly increasing: two calls in the same
/// millisecond differ by at least 0.01.
///

#[derive(Debug, Default)]
pub struct SystemClock {
    last: Mutex<f64>,
}

impl SystemClock {
    pub const RESOLUTION: f64 = 0.01;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |elapsed| elapsed.as_millis() as f64);

        let mut last = self.last.lock();
        let mut next = wall;
        if next <= *last {
            next = round_resolution(*last + Self::RESOLUTION);
        }
        *last = next;

        next
    }
}

fn round_resolution(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

///
/// ManualClock
///
/// Test clock; time moves only when told to.
///

#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    #[must_use]
    pub fn new(now: f64) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: f64) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, delta: f64) {
        *self.now.lock() += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_strictly_increasing() {
        let clock = SystemClock::new();
        let mut previous = clock.now();

        for _ in 0..1_000 {
            let next = clock.now();
            assert!(next > previous, "{next} <= {previous}");
            previous = next;
        }
    }

    #[test]
    fn manual_clock_moves_on_request() {
        let clock = ManualClock::new(50.0);
        assert!((clock.now() - 50.0).abs() < f64::EPSILON);

        clock.set(1_200.0);
        clock.advance(0.5);
        assert!((clock.now() - 1_200.5).abs() < f64::EPSILON);
    }
}
