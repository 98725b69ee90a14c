use std::time::{SystemTime, SystemTimeError};

/// Keeps track of how long some stage of compilation took.
pub struct Timer {
    start_time: SystemTime,
}

impl Timer {
    /// Create a new `Timer` starting now.
    pub fn now() -> Self {
        Self {
            start_time: SystemTime::now(),
        }
    }

    /// Restart the timer.
    pub fn reset(&mut self) {
        self.start_time = SystemTime::now();
    }

    /// Print a message with the elapsed time since the timer was last reset.
    pub fn print_elapsed(&self, stage: &str) -> Result<(), SystemTimeError> {
        eprintln!("{} took {:?}", stage, self.start_time.elapsed()?);
        Ok(())
    }
}
