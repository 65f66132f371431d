//! Frequency scaling policies applied after each cycle.

use sugars::boxed;

use crate::config::{parse_config_value, parse_options};
use crate::environment::Environment;
use crate::server::BladeServer;

/// Decides frequency level changes of the system servers based on their state after a cycle.
pub trait FrequencyPolicy {
    /// Adjusts server frequencies. Returns the number of level changes made.
    fn apply(&mut self, servers: &mut [BladeServer], env: &mut dyn Environment) -> usize;

    fn name(&self) -> &str;
}

/// Creates frequency policy from a config value such as `Fixed` or `Threshold[low=30,high=80]`.
pub fn frequency_policy_resolver(config_str: &str) -> Result<Box<dyn FrequencyPolicy>, String> {
    let (name, options) = parse_config_value(config_str);
    match name.as_str() {
        "" | "Fixed" => Ok(boxed!(FixedFrequency {})),
        "Threshold" => {
            let options = parse_options(&options.unwrap_or_default());
            let parse = |key: &str, default: f64| -> Result<f64, String> {
                match options.get(key) {
                    Some(value) => value
                        .parse::<f64>()
                        .map_err(|e| format!("bad {} option {}: {}", key, value, e)),
                    None => Ok(default),
                }
            };
            let low = parse("low", 30.)?;
            let high = parse("high", 80.)?;
            if low > high {
                return Err(format!("Threshold policy requires low <= high, got {} > {}", low, high));
            }
            Ok(boxed!(ThresholdFrequency::new(low, high)))
        }
        _ => Err(format!("Can't resolve frequency policy: {}", config_str)),
    }
}

/// Keeps every server at its current frequency level.
pub struct FixedFrequency {}

impl FrequencyPolicy for FixedFrequency {
    fn apply(&mut self, _servers: &mut [BladeServer], _env: &mut dyn Environment) -> usize {
        0
    }

    fn name(&self) -> &str {
        "Fixed"
    }
}

/// Raises the level of servers whose CPU utilization is above `high` percent and lowers it for
/// working servers whose utilization is below `low` percent. Idle servers are left untouched.
pub struct ThresholdFrequency {
    low: f64,
    high: f64,
}

impl ThresholdFrequency {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }
}

impl FrequencyPolicy for ThresholdFrequency {
    fn apply(&mut self, servers: &mut [BladeServer], env: &mut dyn Environment) -> usize {
        let mut changes = 0;
        for server in servers.iter_mut() {
            if server.readiness().is_idle() || server.active_count() == 0 {
                continue;
            }
            let cpu = server.cpu_percent();
            let changed = if cpu > self.high {
                server.increase_frequency(env)
            } else if cpu < self.low {
                server.decrease_frequency(env)
            } else {
                false
            };
            if changed {
                changes += 1;
            }
        }
        changes
    }

    fn name(&self) -> &str {
        "Threshold"
    }
}
