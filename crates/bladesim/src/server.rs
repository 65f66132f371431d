//! Blade server: fair CPU sharing among job fragments, frequency scaling and power draw.

use serde::Serialize;

use crate::environment::Environment;
use crate::fair_share::max_min_fair_share;
use crate::job::{Job, JobId, JobStore};
use crate::log::LogContext;
use crate::power::{DvfsPowerModel, HardwareProfile, PowerModel};
use crate::{log_debug, log_trace, log_warn};

/// Sum of active demands at which a server is considered overloaded.
pub const OVERLOAD_THRESHOLD: f64 = 1.;

/// Admission and power state of a server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Readiness {
    /// The server does not belong to any system yet.
    Unassigned,
    /// The server belongs to a system but is not configured for it.
    InSystemUnconfigured,
    /// The server is powered but kept idle.
    Idle,
    /// The server has spare capacity.
    Ready,
    /// The active demand reached the server capacity.
    Overloaded,
}

impl Readiness {
    /// Returns true for the states in which the server draws standby power.
    pub fn is_idle(&self) -> bool {
        matches!(
            self,
            Readiness::Unassigned | Readiness::InSystemUnconfigured | Readiness::Idle
        )
    }
}

/// Presence of a job on this server.
#[derive(Clone, Debug)]
struct Fragment {
    job: JobId,
    node_index: usize,
    demand: f64,
}

/// Outcome of running one cycle on a server.
#[derive(Clone, Debug, Default)]
pub struct CycleResult {
    pub cpu_percent: f64,
    /// Jobs whose last fragment finished on this server during the cycle.
    pub completions: Vec<JobId>,
}

pub struct BladeServer {
    id: u32,
    name: String,
    blade_type: String,
    frequency_levels: Vec<f64>,
    frequency_level: usize,
    power_model: Box<dyn PowerModel>,
    readiness: Readiness,
    backup_readiness: Option<Readiness>,
    active: Vec<Fragment>,
    blocked: Vec<Fragment>,
    current_cpu_percent: f64,
    dependency: bool,
    total_jobs: u64,
    total_finished: u64,
}

impl BladeServer {
    /// Creates unassigned server running at the fastest frequency level of the profile.
    pub fn new(id: u32, name: &str, profile: &HardwareProfile) -> Self {
        Self {
            id,
            name: name.to_string(),
            blade_type: profile.name.clone(),
            frequency_levels: profile.frequency_levels.clone(),
            frequency_level: profile.levels().saturating_sub(1),
            power_model: Box::new(DvfsPowerModel::new(profile)),
            readiness: Readiness::Unassigned,
            backup_readiness: None,
            active: Vec::new(),
            blocked: Vec::new(),
            current_cpu_percent: 0.,
            dependency: false,
            total_jobs: 0,
            total_finished: 0,
        }
    }

    /// Replaces the power model built from the hardware profile.
    pub fn with_power_model(mut self, power_model: Box<dyn PowerModel>) -> Self {
        self.power_model = power_model;
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn blade_type(&self) -> &str {
        &self.blade_type
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn set_readiness(&mut self, readiness: Readiness) {
        self.readiness = readiness;
    }

    /// Returns CPU utilization computed during the last cycle, in 0-100 range.
    pub fn cpu_percent(&self) -> f64 {
        self.current_cpu_percent
    }

    /// Returns true if the server holds finished fragments of jobs still running elsewhere.
    pub fn has_dependency(&self) -> bool {
        self.dependency
    }

    pub fn set_dependency(&mut self, dependency: bool) {
        self.dependency = dependency;
    }

    /// Returns true if the server can accept new work.
    pub fn is_available(&self) -> bool {
        self.readiness == Readiness::Ready
    }

    pub fn active_jobs(&self) -> impl Iterator<Item = JobId> + '_ {
        self.active.iter().map(|f| f.job)
    }

    pub fn blocked_jobs(&self) -> impl Iterator<Item = JobId> + '_ {
        self.blocked.iter().map(|f| f.job)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Returns true if the server holds active or finished fragments of unfinished jobs.
    pub fn holds_work(&self) -> bool {
        !self.active.is_empty() || !self.blocked.is_empty()
    }

    /// Returns the sum of demands of active fragments.
    pub fn demand(&self) -> f64 {
        self.active.iter().map(|f| f.demand).sum()
    }

    /// Returns the number of fragments fed to the server.
    pub fn total_jobs(&self) -> u64 {
        self.total_jobs
    }

    /// Returns the number of jobs whose completion was detected on this server.
    pub fn total_finished(&self) -> u64 {
        self.total_finished
    }

    pub fn frequency_level(&self) -> usize {
        self.frequency_level
    }

    pub fn levels(&self) -> usize {
        self.frequency_levels.len()
    }

    /// Returns the current capacity in MIPS. Zero means the capacity is unknown.
    pub fn mips(&self) -> f64 {
        self.frequency_levels.get(self.frequency_level).copied().unwrap_or(0.)
    }

    /// Places the fragment of `job` with the given node index on this server.
    pub fn feed_work(&mut self, job: &Job, node_index: usize) {
        self.active.push(Fragment {
            job: job.id,
            node_index,
            demand: job.utilization,
        });
        self.total_jobs += 1;
        self.update_readiness();
        self.update_dependency();
    }

    /// Divides the current capacity among active fragments and advances their work.
    pub fn run_cycle(&mut self, jobs: &mut JobStore, env: &dyn Environment) -> CycleResult {
        let ctx = LogContext::new(env.current_time(), &self.name);
        let mut result = CycleResult::default();

        if self.active.is_empty() {
            self.readiness = Readiness::Ready;
            self.update_dependency();
            self.current_cpu_percent = 0.;
            return result;
        }

        let mips = self.mips();
        if mips <= 0. {
            log_warn!(ctx, "zero capacity at frequency level {}", self.frequency_level);
        }
        let demands: Vec<f64> = self.active.iter().map(|f| f.demand).collect();
        let shares = max_min_fair_share(mips, &demands);

        let mut still_active = Vec::with_capacity(self.active.len());
        for (i, fragment) in self.active.drain(..).enumerate() {
            let share = shares.grants[i];
            let job = jobs.get_mut(fragment.job);
            log_trace!(ctx, "job {} node {} granted {:.4}", fragment.job, fragment.node_index, share);

            if !shares.satisfied[i] && share > fragment.demand {
                log_warn!(
                    ctx,
                    "share {:.4} exceeds demand {:.4} of job {}",
                    share,
                    fragment.demand,
                    fragment.job
                );
            }

            if share <= 0. {
                log_warn!(
                    ctx,
                    "job {} node {} got zero share with {:.4} work left, completing it without progress",
                    fragment.job,
                    fragment.node_index,
                    job.remaining(fragment.node_index)
                );
                job.force_complete(fragment.node_index);
            } else {
                job.consume(fragment.node_index, share);
            }

            if job.remaining(fragment.node_index) > 0. {
                still_active.push(fragment);
                continue;
            }

            if job.all_done() {
                if job.mark_finished(env.current_time()) {
                    log_debug!(ctx, "job {} finished", fragment.job);
                    self.total_finished += 1;
                    result.completions.push(fragment.job);
                }
                self.blocked.retain(|f| f.job != fragment.job);
            } else {
                log_debug!(ctx, "job {} node {} done, waiting for other nodes", fragment.job, fragment.node_index);
                self.blocked.push(fragment);
            }
        }
        self.active = still_active;

        self.current_cpu_percent = if mips > 0. { 100. * shares.total() / mips } else { 0. };
        result.cpu_percent = self.current_cpu_percent;
        self.update_readiness();
        self.update_dependency();
        result
    }

    /// Drops a finished job from the blocked fragments.
    pub fn release_job(&mut self, job: JobId) {
        self.blocked.retain(|f| f.job != job);
        self.update_dependency();
    }

    fn update_readiness(&mut self) {
        self.readiness = if self.demand() >= OVERLOAD_THRESHOLD {
            Readiness::Overloaded
        } else {
            Readiness::Ready
        };
    }

    fn update_dependency(&mut self) {
        self.dependency = !self.blocked.is_empty();
    }

    /// Switches to the next faster frequency level. Returns false at the fastest level.
    pub fn increase_frequency(&mut self, env: &mut dyn Environment) -> bool {
        if self.frequency_level + 1 >= self.levels() {
            return false;
        }
        self.frequency_level += 1;
        env.notify_frequency_change();
        self.check_capacity(env.current_time());
        true
    }

    /// Switches to the next slower frequency level. Returns false at the slowest level.
    pub fn decrease_frequency(&mut self, env: &mut dyn Environment) -> bool {
        if self.frequency_level == 0 {
            return false;
        }
        self.frequency_level -= 1;
        env.notify_frequency_change();
        self.check_capacity(env.current_time());
        true
    }

    /// Switches to the level with the given MIPS value, or to the slowest level if there is no such level.
    pub fn set_frequency_by_mips(&mut self, mips: f64, env: &dyn Environment) {
        match self.frequency_levels.iter().position(|&m| m == mips) {
            Some(level) => self.frequency_level = level,
            None => {
                let ctx = LogContext::new(env.current_time(), &self.name);
                log_warn!(ctx, "unknown frequency {}, falling back to the lowest level", mips);
                self.frequency_level = 0;
            }
        }
    }

    fn check_capacity(&self, time: f64) {
        if self.mips() <= 0. {
            let ctx = LogContext::new(time, &self.name);
            log_warn!(ctx, "frequency level {} has zero capacity", self.frequency_level);
        }
    }

    /// Returns busy, idle and standby power at the current frequency level.
    pub fn power_parameters(&self) -> (f64, f64, f64) {
        let standby = self.power_model.standby_power();
        let idle = self.power_model.get_power(self.frequency_level, 0.).unwrap_or(standby);
        let busy = self.power_model.get_power(self.frequency_level, 1.).unwrap_or(standby);
        (busy, idle, standby)
    }

    /// Returns the current power consumption in W.
    pub fn power_draw(&self, env: &dyn Environment) -> f64 {
        let ctx = LogContext::new(env.current_time(), &self.name);
        if self.mips() <= 0. {
            log_warn!(ctx, "zero capacity, reporting standby power");
            return self.power_model.standby_power();
        }
        let cpu_load = self.current_cpu_percent / 100.;
        let power = match self.power_model.get_power(self.frequency_level, cpu_load) {
            Some(power) => power,
            None => {
                log_warn!(
                    ctx,
                    "no power data for frequency level {}, using the lowest level",
                    self.frequency_level
                );
                self.power_model
                    .get_power(0, cpu_load)
                    .unwrap_or_else(|| self.power_model.standby_power())
            }
        };
        if self.readiness.is_idle() {
            return self.power_model.standby_power();
        }
        power
    }

    /// Saves the current readiness and forces the server into the idle state.
    /// An already idle server keeps the readiness saved before.
    pub fn force_idle(&mut self) {
        if self.readiness == Readiness::Idle {
            return;
        }
        self.backup_readiness = Some(self.readiness);
        self.readiness = Readiness::Idle;
    }

    /// Restores the readiness saved by [`force_idle`](Self::force_idle), if any.
    pub fn restore_readiness(&mut self) {
        if let Some(readiness) = self.backup_readiness.take() {
            self.readiness = readiness;
        }
    }

    /// Puts the server into the idle state at the slowest frequency level.
    pub fn make_idle(&mut self) {
        self.readiness = Readiness::Idle;
        self.frequency_level = 0;
    }

    /// Drops all fragments and counters and returns the server to the idle state at full speed.
    ///
    /// Work held by the server is lost, callers should restart only servers without work
    /// (see [`holds_work`](Self::holds_work)).
    pub fn restart(&mut self) {
        self.backup_readiness = None;
        self.active.clear();
        self.blocked.clear();
        self.current_cpu_percent = 0.;
        self.dependency = false;
        self.readiness = Readiness::Idle;
        self.frequency_level = self.levels().saturating_sub(1);
        self.total_jobs = 0;
        self.total_finished = 0;
    }
}
