//! Compute system: job admission, dispatching to servers and SLA violation detection.

use serde::Serialize;

use crate::allocator::ResourceAllocator;
use crate::environment::Environment;
use crate::frequency::{FixedFrequency, FrequencyPolicy};
use crate::job::{JobDescriptor, JobId, JobStore};
use crate::log::LogContext;
use crate::scheduler::Scheduler;
use crate::server::{BladeServer, Readiness};
use crate::trace::JobSource;
use crate::violation::{Violation, ViolationSink};
use crate::{log_debug, log_error, log_info};

/// Progress state of a compute system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SystemState {
    Active,
    /// External demand prevents progress, all servers are kept idle.
    Blocked,
    /// Every admitted job finished and the job source is exhausted.
    Done,
}

/// Summary of one system cycle.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CycleOutcome {
    pub ingested: usize,
    pub admitted: usize,
    pub finished: usize,
    pub violations: usize,
    pub frequency_changes: usize,
    #[serde(skip)]
    pub completions: Vec<JobId>,
}

/// A group of blade servers running batch jobs from a single job source.
///
/// Each cycle the system ingests the jobs that arrived up to the current time, admits waiting jobs
/// to servers picked by the resource allocator in the order given by the scheduler, runs every
/// server and collects finished jobs.
pub struct ComputeSystem {
    name: String,
    servers: Vec<BladeServer>,
    jobs: JobStore,
    waiting_list: Vec<JobId>,
    scheduler: Box<dyn Scheduler>,
    allocator: Box<dyn ResourceAllocator>,
    frequency_policy: Box<dyn FrequencyPolicy>,
    source: Box<dyn JobSource>,
    pending: Option<JobDescriptor>,
    source_exhausted: bool,
    retry_job: Option<JobId>,
    last_admitted: usize,
    state: SystemState,
    total_jobs_admitted: u64,
    total_jobs_finished: u64,
    cycle_violations: u64,
    accumulated_violations: u64,
    last_violation: Option<Violation>,
}

impl ComputeSystem {
    /// Creates system owning the given servers. The servers become ready to accept jobs.
    pub fn new(
        name: &str,
        mut servers: Vec<BladeServer>,
        scheduler: Box<dyn Scheduler>,
        allocator: Box<dyn ResourceAllocator>,
        source: Box<dyn JobSource>,
    ) -> Self {
        for server in servers.iter_mut() {
            server.set_readiness(Readiness::Ready);
        }
        Self {
            name: name.to_string(),
            servers,
            jobs: JobStore::new(),
            waiting_list: Vec::new(),
            scheduler,
            allocator,
            frequency_policy: Box::new(FixedFrequency {}),
            source,
            pending: None,
            source_exhausted: false,
            retry_job: None,
            last_admitted: 0,
            state: SystemState::Active,
            total_jobs_admitted: 0,
            total_jobs_finished: 0,
            cycle_violations: 0,
            accumulated_violations: 0,
            last_violation: None,
        }
    }

    /// Sets the policy applied to server frequencies after each cycle.
    pub fn with_frequency_policy(mut self, policy: Box<dyn FrequencyPolicy>) -> Self {
        self.frequency_policy = policy;
        self
    }

    fn ctx(&self, env: &dyn Environment) -> LogContext<'_> {
        LogContext::new(env.current_time(), &self.name)
    }

    /// Runs one cycle: ingests new jobs, admits waiting jobs, runs servers and detects completion.
    pub fn run_cycle(&mut self, env: &mut dyn Environment, sink: &mut dyn ViolationSink) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();
        if self.state == SystemState::Done {
            return outcome;
        }
        self.cycle_violations = 0;
        self.last_violation = None;
        self.last_admitted = 0;

        outcome.ingested = self.ingest_new_jobs(env);

        if self.state != SystemState::Blocked {
            outcome.admitted = self.admit_from_waiting_list(env, sink);
            self.last_admitted = outcome.admitted;
            for server in self.servers.iter_mut() {
                let result = server.run_cycle(&mut self.jobs, env);
                outcome.completions.extend(result.completions);
            }
            for &job in &outcome.completions {
                for server in self.servers.iter_mut() {
                    server.release_job(job);
                }
            }
            self.total_jobs_finished += outcome.completions.len() as u64;
            outcome.finished = outcome.completions.len();
            outcome.frequency_changes = self.frequency_policy.apply(&mut self.servers, env);
        }

        if self.state == SystemState::Blocked && !self.all_nodes_idle() {
            self.force_servers_idle();
        }

        outcome.violations = self.cycle_violations as usize;

        if self.total_jobs_finished == self.total_jobs_admitted && self.source_exhausted {
            log_info!(
                self.ctx(env),
                "all {} jobs finished, system is done",
                self.total_jobs_finished
            );
            self.state = SystemState::Done;
        }
        outcome
    }

    /// Moves the jobs that arrived up to the current time from the job source to the waiting list.
    ///
    /// A job arriving in the future is kept aside and ingested in a later cycle.
    /// Returns the number of ingested jobs.
    pub fn ingest_new_jobs(&mut self, env: &dyn Environment) -> usize {
        let now = env.current_time();
        let mut ingested = 0;
        while !self.source_exhausted {
            let descriptor = match self.pending.take().or_else(|| self.source.next()) {
                Some(descriptor) => descriptor,
                None => {
                    self.source_exhausted = true;
                    break;
                }
            };
            if descriptor.arrival_time > now {
                self.pending = Some(descriptor);
                break;
            }
            let id = self.jobs.insert(&descriptor);
            self.waiting_list.push(id);
            self.total_jobs_admitted += 1;
            ingested += 1;
            log_debug!(
                self.ctx(env),
                "job {} arrived: runtime {}, utilization {}, {} nodes",
                id,
                descriptor.runtime,
                descriptor.cpu_utilization,
                descriptor.node_count
            );
        }
        ingested
    }

    /// Places waiting jobs on servers until the waiting list is empty or the allocator reports a shortage.
    ///
    /// After a shortage the same job is retried first in the following cycles until it is placed.
    /// Returns the number of placed jobs.
    pub fn admit_from_waiting_list(&mut self, env: &dyn Environment, sink: &mut dyn ViolationSink) -> usize {
        let now = env.current_time();
        let mut admitted = 0;
        while !self.waiting_list.is_empty() {
            let position = match self.retry_job {
                Some(id) => self.waiting_list.iter().position(|&j| j == id),
                None => None,
            };
            let position = match position.or_else(|| self.scheduler.next_job(&self.waiting_list, &self.jobs)) {
                Some(position) => position,
                None => break,
            };
            let id = self.waiting_list[position];
            let node_count = self.jobs.get(id).node_count;

            let indexes = match self.allocator.allocate(&self.servers, node_count) {
                Some(indexes) if self.is_valid_allocation(&indexes, node_count) => indexes,
                Some(indexes) => {
                    log_error!(
                        self.ctx(env),
                        "allocator {} returned invalid servers {:?} for {} nodes",
                        self.allocator.name(),
                        indexes,
                        node_count
                    );
                    self.retry_job = Some(id);
                    self.record_violation(Violation::NodeShortage, env, sink);
                    break;
                }
                None => {
                    self.retry_job = Some(id);
                    self.record_violation(Violation::NodeShortage, env, sink);
                    break;
                }
            };

            let server_ids = indexes.iter().map(|&i| self.servers[i].id()).collect();
            self.jobs.get_mut(id).assign(server_ids);
            for (node_index, &i) in indexes.iter().enumerate() {
                self.servers[i].feed_work(self.jobs.get(id), node_index);
                self.servers[i].set_dependency(node_count > 1);
            }
            log_debug!(self.ctx(env), "job {} placed on servers {:?}", id, indexes);

            if self.jobs.get(id).deadline_passed(now) {
                self.record_violation(Violation::DeadlinePassed, env, sink);
            }

            self.waiting_list.remove(position);
            self.retry_job = None;
            admitted += 1;
        }
        admitted
    }

    fn is_valid_allocation(&self, indexes: &[usize], node_count: usize) -> bool {
        if indexes.len() != node_count || indexes.iter().any(|&i| i >= self.servers.len()) {
            return false;
        }
        let mut sorted = indexes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        sorted.len() == indexes.len()
    }

    fn record_violation(&mut self, kind: Violation, env: &dyn Environment, sink: &mut dyn ViolationSink) {
        self.cycle_violations += 1;
        self.accumulated_violations += 1;
        self.last_violation = Some(kind);
        sink.log_violation(env.current_time(), &self.name, kind);
        log_info!(self.ctx(env), "SLA violation: {}", kind);
    }

    fn all_nodes_idle(&self) -> bool {
        self.servers.iter().all(|s| s.readiness() == Readiness::Idle)
    }

    fn force_servers_idle(&mut self) {
        for server in self.servers.iter_mut() {
            server.force_idle();
        }
    }

    /// Marks the system as blocked by external demand. All servers are forced idle.
    pub fn block(&mut self) {
        if self.state != SystemState::Active {
            return;
        }
        self.state = SystemState::Blocked;
        if !self.all_nodes_idle() {
            self.force_servers_idle();
        }
    }

    /// Lifts the block and restores the server readiness saved when blocking.
    pub fn unblock(&mut self) {
        if self.state != SystemState::Blocked {
            return;
        }
        for server in self.servers.iter_mut() {
            server.restore_readiness();
        }
        self.state = SystemState::Active;
    }

    /// Returns the number of servers that are not idle.
    pub fn running_node_count(&self) -> usize {
        self.servers.iter().filter(|s| !s.readiness().is_idle()).count()
    }

    /// Returns the number of idle servers.
    pub fn idle_node_count(&self) -> usize {
        self.servers.iter().filter(|s| s.readiness() == Readiness::Idle).count()
    }

    /// Restarts the first idle server without work and makes it ready. Returns its index.
    ///
    /// Servers idled while still holding fragments are skipped, so no admitted job is dropped.
    pub fn activate_one_node(&mut self, env: &dyn Environment) -> Option<usize> {
        let index = self
            .servers
            .iter()
            .position(|s| s.readiness() == Readiness::Idle && !s.holds_work())?;
        self.servers[index].restart();
        self.servers[index].set_readiness(Readiness::Ready);
        log_debug!(
            self.ctx(env),
            "activated server {} at {} MIPS",
            self.servers[index].name(),
            self.servers[index].mips()
        );
        Some(index)
    }

    /// Returns the total power consumption of the servers in W.
    pub fn power_draw(&self, env: &dyn Environment) -> f64 {
        self.servers.iter().map(|s| s.power_draw(env)).sum()
    }

    /// Returns the mean CPU utilization of the servers, in 0-100 range.
    pub fn mean_cpu_percent(&self) -> f64 {
        if self.servers.is_empty() {
            return 0.;
        }
        self.servers.iter().map(|s| s.cpu_percent()).sum::<f64>() / self.servers.len() as f64
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SystemState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == SystemState::Done
    }

    /// Returns true if the system can make no further progress on its own.
    ///
    /// This is the case once the job source is exhausted and either the system is blocked or the
    /// last cycle admitted nothing while no server has active work left.
    pub fn is_stalled(&self) -> bool {
        if self.state == SystemState::Done || !self.source_exhausted {
            return false;
        }
        self.state == SystemState::Blocked
            || (self.last_admitted == 0 && self.servers.iter().all(|s| s.active_count() == 0))
    }

    pub fn servers(&self) -> &[BladeServer] {
        &self.servers
    }

    pub fn servers_mut(&mut self) -> &mut [BladeServer] {
        &mut self.servers
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    pub fn waiting_list(&self) -> &[JobId] {
        &self.waiting_list
    }

    pub fn is_source_exhausted(&self) -> bool {
        self.source_exhausted
    }

    pub fn total_jobs_admitted(&self) -> u64 {
        self.total_jobs_admitted
    }

    pub fn total_jobs_finished(&self) -> u64 {
        self.total_jobs_finished
    }

    /// Returns the number of violations recorded during the last cycle.
    pub fn cycle_violations(&self) -> u64 {
        self.cycle_violations
    }

    pub fn accumulated_violations(&self) -> u64 {
        self.accumulated_violations
    }

    /// Returns the kind of the last violation recorded during the last cycle.
    pub fn last_violation(&self) -> Option<Violation> {
        self.last_violation
    }
}
