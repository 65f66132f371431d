//! Cluster simulation driver.

use std::collections::BTreeMap;
use std::fs::File;

use serde::Serialize;

use crate::allocator::allocator_resolver;
use crate::config::{SimulationConfig, SystemConfig, WorkloadConfig};
use crate::environment::{Environment, SimEnvironment};
use crate::frequency::frequency_policy_resolver;
use crate::log::LogContext;
use crate::power::EnergyMeter;
use crate::scheduler::scheduler_resolver;
use crate::server::BladeServer;
use crate::system::{ComputeSystem, SystemState};
use crate::trace::{JobSource, SyntheticJobSource, TraceReader};
use crate::violation::{Violation, ViolationLog};
use crate::{log_debug, log_info, log_warn};

/// State of a system after one simulation step.
#[derive(Serialize, Clone, Debug)]
pub struct CycleStats {
    pub time: f64,
    pub system: String,
    pub state: SystemState,
    pub running_nodes: usize,
    pub waiting_jobs: usize,
    pub admitted: usize,
    pub finished: usize,
    pub violations: usize,
    pub cpu_percent: f64,
    pub power: f64,
}

/// Final statistics of a single system.
#[derive(Serialize, Clone, Debug)]
pub struct SystemSummary {
    pub name: String,
    pub state: SystemState,
    pub servers: usize,
    pub jobs_admitted: u64,
    pub jobs_finished: u64,
    pub jobs_waiting: usize,
    pub node_shortages: usize,
    pub deadlines_passed: usize,
    pub mean_turnaround: Option<f64>,
    pub energy_consumed: f64,
}

/// Final statistics of a simulation run.
#[derive(Serialize, Clone, Debug)]
pub struct SimulationSummary {
    pub time: f64,
    pub cycles: u64,
    pub frequency_messages: u64,
    pub total_violations: usize,
    pub systems: Vec<SystemSummary>,
}

/// Runs compute systems in lockstep on a shared simulated clock.
pub struct ClusterSimulation {
    env: SimEnvironment,
    step_duration: f64,
    simulation_length: f64,
    systems: Vec<ComputeSystem>,
    energy_meters: Vec<EnergyMeter>,
    violations: ViolationLog,
    cycle_stats: Vec<CycleStats>,
    cycles: u64,
    next_server_id: u32,
}

impl ClusterSimulation {
    /// Creates empty simulation starting at time zero.
    pub fn new(step_duration: f64, simulation_length: f64) -> Self {
        Self {
            env: SimEnvironment::new(0.),
            step_duration,
            simulation_length,
            systems: Vec::new(),
            energy_meters: Vec::new(),
            violations: ViolationLog::new(),
            cycle_stats: Vec::new(),
            cycles: 0,
            next_server_id: 0,
        }
    }

    /// Creates simulation with the systems described in the config.
    pub fn from_config(config: &SimulationConfig) -> Result<Self, String> {
        config.validate()?;
        let mut sim = Self::new(config.step_duration, config.simulation_length);
        for system_config in &config.systems {
            let source: Box<dyn JobSource> = match &system_config.workload {
                WorkloadConfig::Trace(path) => Box::new(TraceReader::from_file(path)?),
                WorkloadConfig::Synthetic(params) => Box::new(SyntheticJobSource::new(params.clone())),
            };
            let system = sim.build_system(config, system_config, source)?;
            sim.add_system(system);
        }
        Ok(sim)
    }

    /// Creates system from its config using the given job source.
    /// Server ids are unique across all systems of the simulation.
    pub fn build_system(
        &mut self,
        config: &SimulationConfig,
        system_config: &SystemConfig,
        source: Box<dyn JobSource>,
    ) -> Result<ComputeSystem, String> {
        let profile = config.blade_type(&system_config.blade_type).ok_or_else(|| format!(
            "system {} uses unknown blade type {}",
            system_config.name, system_config.blade_type
        ))?;
        let scheduler = scheduler_resolver(&system_config.scheduler)?;
        let allocator = allocator_resolver(&system_config.allocator, &system_config.heat_recirculation)?;
        let frequency_policy = frequency_policy_resolver(&system_config.frequency_policy)?;

        let servers = (0..system_config.servers)
            .map(|i| {
                let id = self.next_server_id + i;
                BladeServer::new(id, &format!("{}-{}", system_config.name, i), profile)
            })
            .collect();
        self.next_server_id += system_config.servers;

        log_debug!(
            LogContext::new(self.env.current_time(), "simulation"),
            "created system {} with {} {} servers, scheduler {}, allocator {}, frequency policy {}",
            system_config.name,
            system_config.servers,
            profile.name,
            scheduler.name(),
            allocator.name(),
            frequency_policy.name()
        );
        Ok(
            ComputeSystem::new(&system_config.name, servers, scheduler, allocator, source)
                .with_frequency_policy(frequency_policy),
        )
    }

    /// Adds system to the simulation, returns its index.
    pub fn add_system(&mut self, system: ComputeSystem) -> usize {
        let mut meter = EnergyMeter::new();
        meter.update(self.env.current_time(), system.power_draw(&self.env));
        self.systems.push(system);
        self.energy_meters.push(meter);
        self.systems.len() - 1
    }

    /// Runs one cycle of every system that is not done and advances the clock.
    /// Returns false if all systems are done.
    pub fn step(&mut self) -> bool {
        let time = self.env.current_time();
        let mut active = false;
        for (system, meter) in self.systems.iter_mut().zip(self.energy_meters.iter_mut()) {
            if system.is_done() {
                continue;
            }
            active = true;
            let outcome = system.run_cycle(&mut self.env, &mut self.violations);
            let power = system.power_draw(&self.env);
            meter.update(time, power);
            self.cycle_stats.push(CycleStats {
                time,
                system: system.name().to_string(),
                state: system.state(),
                running_nodes: system.running_node_count(),
                waiting_jobs: system.waiting_list().len(),
                admitted: outcome.admitted,
                finished: outcome.finished,
                violations: outcome.violations,
                cpu_percent: system.mean_cpu_percent(),
                power,
            });
        }
        if active {
            self.cycles += 1;
            self.env.advance(self.step_duration);
        }
        active
    }

    /// Steps until all systems are done or the simulation length is reached.
    ///
    /// Also stops early when every unfinished system is stalled, see [`ComputeSystem::is_stalled`].
    pub fn run(&mut self) {
        while self.simulation_length <= 0. || self.env.current_time() < self.simulation_length {
            if !self.step() {
                break;
            }
            if self.is_stalled() {
                for system in self.systems.iter().filter(|s| !s.is_done()) {
                    log_warn!(
                        LogContext::new(self.env.current_time(), "simulation"),
                        "system {} is stalled with {} waiting and {} unfinished jobs",
                        system.name(),
                        system.waiting_list().len(),
                        system.total_jobs_admitted() - system.total_jobs_finished()
                    );
                }
                break;
            }
        }
        log_info!(
            LogContext::new(self.env.current_time(), "simulation"),
            "finished after {} cycles, {} violations",
            self.cycles,
            self.violations.len()
        );
    }

    /// Returns true if every system is done.
    pub fn is_done(&self) -> bool {
        self.systems.iter().all(|s| s.is_done())
    }

    /// Returns true if some system is unfinished and none of the unfinished systems can progress.
    pub fn is_stalled(&self) -> bool {
        !self.is_done() && self.systems.iter().filter(|s| !s.is_done()).all(|s| s.is_stalled())
    }

    pub fn time(&self) -> f64 {
        self.env.current_time()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn env(&self) -> &SimEnvironment {
        &self.env
    }

    pub fn violations(&self) -> &ViolationLog {
        &self.violations
    }

    pub fn systems(&self) -> &[ComputeSystem] {
        &self.systems
    }

    pub fn system(&self, name: &str) -> Option<&ComputeSystem> {
        self.systems.iter().find(|s| s.name() == name)
    }

    pub fn system_mut(&mut self, name: &str) -> Option<&mut ComputeSystem> {
        self.systems.iter_mut().find(|s| s.name() == name)
    }

    /// Returns the energy consumed by the system up to the current time.
    pub fn energy_consumed(&self, name: &str) -> Option<f64> {
        let index = self.systems.iter().position(|s| s.name() == name)?;
        Some(self.energy_meters[index].energy_consumed(self.env.current_time()))
    }

    pub fn cycle_stats(&self) -> &[CycleStats] {
        &self.cycle_stats
    }

    /// Writes per-cycle statistics as CSV.
    pub fn save_cycle_stats(&self, path: &str) -> Result<(), std::io::Error> {
        let file = File::create(path)?;
        let mut wtr = csv::Writer::from_writer(file);
        for stats in &self.cycle_stats {
            wtr.serialize(stats)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Collects final statistics.
    pub fn summary(&self) -> SimulationSummary {
        let time = self.env.current_time();
        let systems = self
            .systems
            .iter()
            .zip(self.energy_meters.iter())
            .map(|(system, meter)| {
                let turnarounds: Vec<f64> = system
                    .jobs()
                    .iter()
                    .filter_map(|job| job.exit_time().map(|exit| exit - job.arrival_time))
                    .collect();
                let mean_turnaround = if turnarounds.is_empty() {
                    None
                } else {
                    Some(turnarounds.iter().sum::<f64>() / turnarounds.len() as f64)
                };
                SystemSummary {
                    name: system.name().to_string(),
                    state: system.state(),
                    servers: system.servers().len(),
                    jobs_admitted: system.total_jobs_admitted(),
                    jobs_finished: system.total_jobs_finished(),
                    jobs_waiting: system.waiting_list().len(),
                    node_shortages: self.violations.count(system.name(), Violation::NodeShortage),
                    deadlines_passed: self.violations.count(system.name(), Violation::DeadlinePassed),
                    mean_turnaround,
                    energy_consumed: meter.energy_consumed(time),
                }
            })
            .collect();
        SimulationSummary {
            time,
            cycles: self.cycles,
            frequency_messages: self.env.frequency_messages(),
            total_violations: self.violations.len(),
            systems,
        }
    }

    /// Returns the number of violations recorded per system.
    pub fn violations_per_system(&self) -> BTreeMap<String, usize> {
        self.violations.per_system()
    }
}
