//! Simulated clock and instrumentation counters shared by all components.

/// Supplies the current simulated time and collects control-message instrumentation.
pub trait Environment {
    /// Returns the current simulated time.
    fn current_time(&self) -> f64;

    /// Called each time a server changes its frequency level.
    fn notify_frequency_change(&mut self);
}

/// Default environment driven by [`ClusterSimulation`](crate::simulation::ClusterSimulation).
#[derive(Clone, Debug, Default)]
pub struct SimEnvironment {
    time: f64,
    frequency_messages: u64,
}

impl SimEnvironment {
    /// Creates environment with the clock set to `time`.
    pub fn new(time: f64) -> Self {
        Self {
            time,
            frequency_messages: 0,
        }
    }

    /// Moves the clock to `time`.
    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    /// Advances the clock by `delta`.
    pub fn advance(&mut self, delta: f64) {
        self.time += delta;
    }

    /// Returns the number of frequency change messages sent so far.
    pub fn frequency_messages(&self) -> u64 {
        self.frequency_messages
    }
}

impl Environment for SimEnvironment {
    fn current_time(&self) -> f64 {
        self.time
    }

    fn notify_frequency_change(&mut self) {
        self.frequency_messages += 1;
    }
}
