use std::{thread, time::Duration};

/// Source of the fixed waits between actions.
///
/// The only suspension points of a run go through this trait.
pub trait Clock {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadClock;

impl Clock for ThreadClock {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}
