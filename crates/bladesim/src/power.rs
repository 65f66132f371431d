//! Blade hardware profiles and power consumption models.

use dyn_clone::{clone_trait_object, DynClone};
use serde::{Deserialize, Serialize};

/// Frequency and power tables of a blade type.
///
/// The tables are indexed by frequency level, from the slowest level to the fastest one.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct HardwareProfile {
    /// Blade type name.
    pub name: String,
    /// Admissible MIPS values, one per frequency level.
    pub frequency_levels: Vec<f64>,
    /// Power consumption in W of a fully loaded blade, one value per frequency level.
    pub busy_power: Vec<f64>,
    /// Power consumption in W of an idle but powered blade, one value per frequency level.
    pub idle_power: Vec<f64>,
    /// Power consumption in W of a blade in standby.
    pub standby_power: f64,
}

impl HardwareProfile {
    /// Name of the built-in blade type.
    pub const DEFAULT_NAME: &'static str = "default";

    /// Built-in blade type with three frequency levels.
    pub fn default_blade() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            frequency_levels: vec![1., 1.2, 1.4],
            busy_power: vec![220., 250., 290.],
            idle_power: vec![140., 150., 160.],
            standby_power: 45.,
        }
    }

    /// Returns the number of frequency levels.
    pub fn levels(&self) -> usize {
        self.frequency_levels.len()
    }

    /// Returns the index of the level with the given MIPS value.
    pub fn level_of(&self, mips: f64) -> Option<usize> {
        self.frequency_levels.iter().position(|&m| m == mips)
    }

    /// Checks that the tables are consistent.
    pub fn validate(&self) -> Result<(), String> {
        if self.frequency_levels.is_empty() {
            return Err(format!("blade type {} has no frequency levels", self.name));
        }
        if self.busy_power.len() != self.levels() || self.idle_power.len() != self.levels() {
            return Err(format!(
                "blade type {}: {} frequency levels but {} busy and {} idle power values",
                self.name,
                self.levels(),
                self.busy_power.len(),
                self.idle_power.len()
            ));
        }
        if self.frequency_levels.iter().any(|&m| m < 0. || !m.is_finite()) {
            return Err(format!("blade type {} has invalid MIPS values", self.name));
        }
        if self
            .busy_power
            .iter()
            .chain(self.idle_power.iter())
            .chain(std::iter::once(&self.standby_power))
            .any(|&p| p < 0. || !p.is_finite())
        {
            return Err(format!("blade type {} has negative power values", self.name));
        }
        if let Some(level) = (0..self.levels()).find(|&i| self.busy_power[i] < self.idle_power[i]) {
            return Err(format!(
                "blade type {}: busy power {} is below idle power {} at level {}",
                self.name, self.busy_power[level], self.idle_power[level], level
            ));
        }
        Ok(())
    }
}

impl Default for HardwareProfile {
    fn default() -> Self {
        Self::default_blade()
    }
}

/// A model for estimating the power consumption of a blade.
pub trait PowerModel: DynClone {
    /// Returns power consumption in W of an active blade at the given frequency level.
    ///
    /// CPU load should be passed as a float in 0.0-1.0 range.
    /// Returns `None` if the level is unknown to the model.
    fn get_power(&self, level: usize, cpu_load: f64) -> Option<f64>;

    /// Returns power consumption in W of a blade in standby.
    fn standby_power(&self) -> f64;
}

clone_trait_object!(PowerModel);

/// A power model based on linear interpolation between the idle and busy power of the current
/// frequency level.
#[derive(Clone)]
pub struct DvfsPowerModel {
    busy_power: Vec<f64>,
    idle_power: Vec<f64>,
    standby_power: f64,
}

impl DvfsPowerModel {
    pub fn new(profile: &HardwareProfile) -> Self {
        Self {
            busy_power: profile.busy_power.clone(),
            idle_power: profile.idle_power.clone(),
            standby_power: profile.standby_power,
        }
    }
}

impl PowerModel for DvfsPowerModel {
    fn get_power(&self, level: usize, cpu_load: f64) -> Option<f64> {
        let idle = *self.idle_power.get(level)?;
        let busy = *self.busy_power.get(level)?;
        Some(idle + (busy - idle) * cpu_load)
    }

    fn standby_power(&self) -> f64 {
        self.standby_power
    }
}

/// Accumulates energy consumption from a piecewise constant power signal.
#[derive(Debug, Clone, Default)]
pub struct EnergyMeter {
    energy_consumed: f64,
    current_power: f64,
    prev_time: f64,
}

impl EnergyMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoked each time the power consumption is changed to update the total energy consumption.
    pub fn update(&mut self, time: f64, power: f64) {
        self.energy_consumed += (time - self.prev_time) * self.current_power;
        self.current_power = power;
        self.prev_time = time;
    }

    /// Returns the energy consumed up to `time`, including the current power level.
    pub fn energy_consumed(&self, time: f64) -> f64 {
        self.energy_consumed + (time - self.prev_time).max(0.) * self.current_power
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_dvfs_model() {
        let model = DvfsPowerModel::new(&HardwareProfile::default_blade());
        assert_abs_diff_eq!(model.get_power(0, 0.).unwrap(), 140.);
        assert_abs_diff_eq!(model.get_power(0, 0.5).unwrap(), 180.);
        assert_abs_diff_eq!(model.get_power(2, 1.).unwrap(), 290.);
        assert_eq!(model.get_power(3, 0.5), None);
        assert_eq!(model.standby_power(), 45.);
    }

    #[test]
    fn test_validate() {
        assert!(HardwareProfile::default_blade().validate().is_ok());

        let mut profile = HardwareProfile::default_blade();
        profile.busy_power.pop();
        assert!(profile.validate().is_err());

        let mut profile = HardwareProfile::default_blade();
        profile.frequency_levels.clear();
        assert!(profile.validate().is_err());

        let mut profile = HardwareProfile::default_blade();
        profile.standby_power = -1.;
        assert!(profile.validate().is_err());

        let mut profile = HardwareProfile::default_blade();
        profile.busy_power[1] = 100.;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_energy_meter() {
        let mut meter = EnergyMeter::new();
        meter.update(0., 100.);
        meter.update(2., 50.);
        assert_abs_diff_eq!(meter.energy_consumed(2.), 200.);
        assert_abs_diff_eq!(meter.energy_consumed(4.), 300.);
    }
}
