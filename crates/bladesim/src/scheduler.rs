//! Ordering of the waiting list.

use sugars::boxed;

use crate::config::parse_config_value;
use crate::job::{JobId, JobStore};

/// Scheduler picks the next job to admit from the waiting list.
///
/// Returns the position of the chosen job in `waiting`, or `None` if the list is empty.
/// Implementations must be deterministic: for the same list and job states the same job is chosen.
pub trait Scheduler {
    fn next_job(&self, waiting: &[JobId], jobs: &JobStore) -> Option<usize>;

    fn name(&self) -> &str;
}

/// Creates scheduler from a config value such as `LeastRemainingFirst`.
pub fn scheduler_resolver(config_str: &str) -> Result<Box<dyn Scheduler>, String> {
    let (name, _) = parse_config_value(config_str);
    match name.as_str() {
        "" | "LeastRemainingFirst" => Ok(boxed!(LeastRemainingFirst::new())),
        "FirstComeFirstServed" | "FCFS" => Ok(boxed!(FirstComeFirstServed::new())),
        _ => Err(format!("Can't resolve scheduler: {}", config_str)),
    }
}

/// Picks the job with the least total remaining work, the earliest queued one among equals.
pub struct LeastRemainingFirst;

impl LeastRemainingFirst {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for LeastRemainingFirst {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for LeastRemainingFirst {
    fn next_job(&self, waiting: &[JobId], jobs: &JobStore) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (pos, &id) in waiting.iter().enumerate() {
            let remaining = jobs.get(id).total_remaining();
            match best {
                Some((_, best_remaining)) if best_remaining <= remaining => {}
                _ => best = Some((pos, remaining)),
            }
        }
        best.map(|(pos, _)| pos)
    }

    fn name(&self) -> &str {
        "LeastRemainingFirst"
    }
}

/// Picks the job that arrived first, the earliest queued one among equals.
pub struct FirstComeFirstServed;

impl FirstComeFirstServed {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for FirstComeFirstServed {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for FirstComeFirstServed {
    fn next_job(&self, waiting: &[JobId], jobs: &JobStore) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (pos, &id) in waiting.iter().enumerate() {
            let arrival = jobs.get(id).arrival_time;
            match best {
                Some((_, best_arrival)) if best_arrival <= arrival => {}
                _ => best = Some((pos, arrival)),
            }
        }
        best.map(|(pos, _)| pos)
    }

    fn name(&self) -> &str {
        "FirstComeFirstServed"
    }
}
