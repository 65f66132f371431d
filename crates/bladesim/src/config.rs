//! Simulation configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::power::HardwareProfile;
use crate::trace::SyntheticWorkloadConfig;

/// Holds raw simulation config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawSimulationConfig {
    pub step_duration: Option<f64>,
    pub simulation_length: Option<f64>,
    pub blade_types: Option<Vec<HardwareProfile>>,
    pub systems: Option<Vec<SystemConfig>>,
}

/// Source of jobs of a compute system.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadConfig {
    /// Trace file path.
    Trace(String),
    /// Randomly generated jobs.
    Synthetic(SyntheticWorkloadConfig),
}

/// Holds configuration of a single compute system.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SystemConfig {
    /// System name used in logs and violation records.
    pub name: String,
    /// Blade type of the system servers.
    #[serde(default = "default_blade_type")]
    pub blade_type: String,
    /// Number of servers.
    pub servers: u32,
    /// Resource allocation algorithm, e.g. `FirstFit`.
    #[serde(default)]
    pub allocator: String,
    /// Per-server heat recirculation coefficients used by `MinHeatRecirculation`.
    #[serde(default)]
    pub heat_recirculation: Vec<f64>,
    /// Waiting list scheduler, e.g. `LeastRemainingFirst`.
    #[serde(default)]
    pub scheduler: String,
    /// Frequency scaling policy, e.g. `Threshold[low=30,high=80]`.
    #[serde(default)]
    pub frequency_policy: String,
    pub workload: WorkloadConfig,
}

fn default_blade_type() -> String {
    HardwareProfile::DEFAULT_NAME.to_string()
}

/// Represents simulation configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SimulationConfig {
    /// Simulated time between consecutive cycles.
    pub step_duration: f64,
    /// Time after which the simulation stops, zero means run until all systems are done.
    pub simulation_length: f64,
    /// Hardware profiles of blade types.
    pub blade_types: Vec<HardwareProfile>,
    /// Configurations of compute systems.
    pub systems: Vec<SystemConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            step_duration: 1.,
            simulation_length: 0.,
            blade_types: vec![HardwareProfile::default_blade()],
            systems: Vec::new(),
        }
    }
}

impl SimulationConfig {
    /// Creates simulation config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Result<Self, String> {
        let contents =
            std::fs::read_to_string(file_name).map_err(|e| format!("Can't read file {}: {}", file_name, e))?;
        Self::from_yaml(&contents).map_err(|e| format!("{} (file {})", e, file_name))
    }

    /// Creates simulation config from YAML string.
    pub fn from_yaml(contents: &str) -> Result<Self, String> {
        let raw: RawSimulationConfig =
            serde_yaml::from_str(contents).map_err(|e| format!("Can't parse YAML: {}", e))?;

        let mut blade_types = raw.blade_types.unwrap_or_default();
        if !blade_types.iter().any(|b| b.name == HardwareProfile::DEFAULT_NAME) {
            blade_types.push(HardwareProfile::default_blade());
        }

        let config = Self {
            step_duration: raw.step_duration.unwrap_or(1.),
            simulation_length: raw.simulation_length.unwrap_or(0.),
            blade_types,
            systems: raw.systems.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Returns the hardware profile of the given blade type.
    pub fn blade_type(&self, name: &str) -> Option<&HardwareProfile> {
        self.blade_types.iter().find(|b| b.name == name)
    }

    /// Checks that the config is consistent.
    pub fn validate(&self) -> Result<(), String> {
        if self.step_duration <= 0. {
            return Err(format!("step_duration must be positive, got {}", self.step_duration));
        }
        for profile in &self.blade_types {
            profile.validate()?;
        }
        for system in &self.systems {
            if self.blade_type(&system.blade_type).is_none() {
                return Err(format!(
                    "system {} uses unknown blade type {}",
                    system.name, system.blade_type
                ));
            }
            if system.servers == 0 {
                return Err(format!("system {} has no servers", system.name));
            }
            if let WorkloadConfig::Synthetic(workload) = &system.workload {
                let max_nodes = workload.node_count.0.max(workload.node_count.1);
                if self.simulation_length <= 0. && max_nodes > system.servers as usize {
                    return Err(format!(
                        "system {} has {} servers but its workload requests up to {} nodes, \
                         set simulation_length or reduce node_count",
                        system.name, system.servers, max_nodes
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Parses config value string, which consists of two parts - name and options.
/// Example: `Threshold[low=30,high=80]` parts are name `Threshold` and options string `low=30,high=80`.
pub fn parse_config_value(config_str: &str) -> (String, Option<String>) {
    match config_str.split_once('[') {
        Some((l, r)) => (l.trim().to_string(), Some(r.to_string().replace(']', ""))),
        None => (config_str.trim().to_string(), None),
    }
}

/// Parses options string from config value, returns map with option names and values.
pub fn parse_options(options_str: &str) -> HashMap<String, String> {
    let mut options = HashMap::new();
    for option_str in options_str.split(',') {
        if let Some((name, value)) = option_str.split_once('=') {
            options.insert(name.trim().to_string(), value.trim().to_string());
        }
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_value() {
        assert_eq!(parse_config_value("FirstFit"), ("FirstFit".to_string(), None));
        let (name, options) = parse_config_value("Threshold[low=30,high=80]");
        assert_eq!(name, "Threshold");
        let options = parse_options(&options.unwrap());
        assert_eq!(options.get("low").unwrap(), "30");
        assert_eq!(options.get("high").unwrap(), "80");
        assert_eq!(options.get("other"), None);
    }

    #[test]
    fn test_defaults() {
        let config = SimulationConfig::from_yaml("systems: []").unwrap();
        assert_eq!(config.step_duration, 1.);
        assert_eq!(config.simulation_length, 0.);
        assert!(config.blade_type("default").is_some());
    }

    #[test]
    fn test_unplaceable_synthetic_workload() {
        let yaml = "
systems:
  - name: hpc
    servers: 2
    workload:
      synthetic:
        count: 5
        seed: 1
        inter_arrival: [0.0, 1.0]
        runtime: [1.0, 2.0]
        cpu_utilization: [0.5, 0.5]
        node_count: [3, 3]
        deadline: 10.0
";
        assert!(SimulationConfig::from_yaml(yaml).is_err());
        let bounded = format!("simulation_length: 5\n{}", yaml);
        assert!(SimulationConfig::from_yaml(&bounded).is_ok());
    }

    #[test]
    fn test_unknown_blade_type() {
        let yaml = "
systems:
  - name: hpc
    blade_type: missing
    servers: 2
    workload:
      trace: jobs.txt
";
        assert!(SimulationConfig::from_yaml(yaml).is_err());
    }
}
