//! Frame clock.

use std::time::Instant;

/// Tracks elapsed and per-frame delta time.
///
/// `update()` is called once per loop iteration; everything else reads the
/// values captured there.
pub struct Clock {
    start: Instant,
    last_frame: Instant,
    elapsed: f64,
    delta: f64,
}

impl Clock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            elapsed: 0.0,
            delta: 0.0,
        }
    }

    /// Advance the clock to now.
    pub fn update(&mut self) {
        let now = Instant::now();
        self.delta = now.duration_since(self.last_frame).as_secs_f64();
        self.elapsed = now.duration_since(self.start).as_secs_f64();
        self.last_frame = now;
    }

    /// Seconds since the previous `update()`
    pub fn delta_time(&self) -> f64 {
        self.delta
    }

    /// Seconds since the clock was created
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_zero_before_first_update() {
        let clock = Clock::new();
        assert_eq!(clock.delta_time(), 0.0);
    }

    #[test]
    fn update_advances_elapsed() {
        let mut clock = Clock::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        clock.update();
        assert!(clock.elapsed() > 0.0);
        assert!(clock.delta_time() > 0.0);
    }
}
