use std::time::{Duration, Instant};

/// Frame delta handed to script updates, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Timestep(pub f32);

impl Timestep {
    pub fn seconds(self) -> f32 {
        self.0
    }

    pub fn milliseconds(self) -> f32 {
        self.0 * 1000.0
    }
}

impl From<Duration> for Timestep {
    fn from(value: Duration) -> Self {
        Self(value.as_secs_f32())
    }
}

pub struct Time {
    start: Instant,
    last: Instant,
    pub delta: Duration,
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

impl Time {
    pub fn new() -> Self {
        let now = Instant::now();
        Self { start: now, last: now, delta: Duration::ZERO }
    }

    pub fn tick(&mut self) -> Timestep {
        let now = Instant::now();
        self.delta = now - self.last;
        self.last = now;
        self.timestep()
    }

    pub fn timestep(&self) -> Timestep {
        Timestep::from(self.delta)
    }

    pub fn elapsed_seconds(&self) -> f32 {
        self.last.duration_since(self.start).as_secs_f32()
    }
}
