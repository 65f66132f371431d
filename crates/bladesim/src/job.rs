//! Jobs and their per-node remaining work.

use std::fmt;

use serde::Serialize;

/// Identifier of a job inside its compute system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct JobId(pub usize);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Represents a single record produced by a job source.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobDescriptor {
    pub arrival_time: f64,
    pub runtime: f64,
    pub cpu_utilization: f64,
    pub node_count: usize,
    pub deadline: f64,
}

impl JobDescriptor {
    pub fn new(arrival_time: f64, runtime: f64, cpu_utilization: f64, node_count: usize, deadline: f64) -> Self {
        Self {
            arrival_time,
            runtime,
            cpu_utilization,
            node_count,
            deadline,
        }
    }
}

/// A logical job, possibly spanning several servers.
///
/// The job record is the single owner of the remaining work of every node. Each server that runs a
/// fragment of the job mutates only the entry at its own node index.
#[derive(Clone, Debug)]
pub struct Job {
    pub id: JobId,
    pub arrival_time: f64,
    pub start_time: f64,
    pub deadline: f64,
    pub runtime: f64,
    pub utilization: f64,
    pub node_count: usize,
    remaining: Vec<f64>,
    servers: Vec<u32>,
    finished: bool,
    exit_time: Option<f64>,
}

impl Job {
    /// Creates job from descriptor. Every node starts with `runtime * cpu_utilization` units of work.
    pub fn new(id: JobId, descriptor: &JobDescriptor) -> Self {
        let node_count = descriptor.node_count.max(1);
        let work = descriptor.runtime * descriptor.cpu_utilization;
        Self {
            id,
            arrival_time: descriptor.arrival_time,
            start_time: descriptor.arrival_time,
            deadline: descriptor.deadline,
            runtime: descriptor.runtime,
            utilization: descriptor.cpu_utilization,
            node_count,
            remaining: vec![work; node_count],
            servers: Vec::new(),
            finished: false,
            exit_time: None,
        }
    }

    /// Returns the remaining work of the node at `node_index`.
    pub fn remaining(&self, node_index: usize) -> f64 {
        self.remaining[node_index]
    }

    /// Returns the remaining work of all nodes.
    pub fn remaining_work(&self) -> &[f64] {
        &self.remaining
    }

    /// Returns the total remaining work over all nodes.
    pub fn total_remaining(&self) -> f64 {
        self.remaining.iter().map(|w| w.max(0.)).sum()
    }

    /// Decreases the remaining work of a node and returns the new value.
    pub fn consume(&mut self, node_index: usize, amount: f64) -> f64 {
        self.remaining[node_index] -= amount;
        self.remaining[node_index]
    }

    /// Marks the node as done without any progress.
    pub fn force_complete(&mut self, node_index: usize) {
        self.remaining[node_index] = 0.;
    }

    /// Returns true if the remaining work of every node is exhausted.
    pub fn all_done(&self) -> bool {
        self.remaining.iter().all(|&w| w <= 0.)
    }

    /// Returns the servers the job was placed on, in node index order.
    pub fn servers(&self) -> &[u32] {
        &self.servers
    }

    /// Fixes the node assignment. Has no effect if the job was already assigned.
    pub fn assign(&mut self, servers: Vec<u32>) -> bool {
        if !self.servers.is_empty() {
            return false;
        }
        self.servers = servers;
        true
    }

    /// Returns the node index of the given server within the assignment.
    pub fn node_index(&self, server_id: u32) -> Option<usize> {
        self.servers.iter().position(|&s| s == server_id)
    }

    /// Sets the completion flag. Returns false if the job was already marked as finished,
    /// so the completion is reported exactly once.
    pub fn mark_finished(&mut self, time: f64) -> bool {
        if self.finished {
            return false;
        }
        self.finished = true;
        self.exit_time = Some(time);
        true
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn exit_time(&self) -> Option<f64> {
        self.exit_time
    }

    /// Returns true if at time `now` the job waited longer than its deadline allows.
    pub fn deadline_passed(&self, now: f64) -> bool {
        now - self.start_time > self.deadline
    }
}

/// Arena holding all jobs of a compute system, indexed by [`JobId`].
///
/// Jobs are never removed: finished jobs stay in the store with their completion flag set.
#[derive(Clone, Debug, Default)]
pub struct JobStore {
    jobs: Vec<Job>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a job from the descriptor and returns its ID.
    pub fn insert(&mut self, descriptor: &JobDescriptor) -> JobId {
        let id = JobId(self.jobs.len());
        self.jobs.push(Job::new(id, descriptor));
        id
    }

    pub fn get(&self, id: JobId) -> &Job {
        &self.jobs[id.0]
    }

    pub fn get_mut(&mut self, id: JobId) -> &mut Job {
        &mut self.jobs[id.0]
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }
}
