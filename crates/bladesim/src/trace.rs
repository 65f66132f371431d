//! Job sources: trace files, in-memory lists and synthetic workloads.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};

use log::warn;
use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::job::JobDescriptor;

/// Source of job descriptors.
///
/// Jobs should be returned in non-decreasing order of their arrival times.
/// `next` must not block: it returns `None` once the source is exhausted.
pub trait JobSource {
    fn next(&mut self) -> Option<JobDescriptor>;
}

/// Reads jobs from a line-oriented trace.
///
/// Each line holds five numbers separated by spaces or tabs:
/// `arrival_time runtime cpu_utilization node_count deadline`.
/// Lines with fewer fields, unparsable or non-finite values, negative runtime or negative
/// utilization are skipped.
pub struct TraceReader<R: BufRead> {
    reader: R,
    line_number: usize,
    skipped: usize,
}

impl TraceReader<BufReader<File>> {
    /// Opens trace file.
    pub fn from_file(path: &str) -> Result<Self, String> {
        let file = File::open(path).map_err(|e| format!("Can't open trace {}: {}", path, e))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            skipped: 0,
        }
    }

    /// Returns the number of malformed lines skipped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn parse_line(line: &str) -> Option<JobDescriptor> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            return None;
        }
        let descriptor = JobDescriptor {
            arrival_time: fields[0].parse().ok()?,
            runtime: fields[1].parse().ok()?,
            cpu_utilization: fields[2].parse().ok()?,
            node_count: fields[3].parse().ok()?,
            deadline: fields[4].parse().ok()?,
        };
        let finite = [
            descriptor.arrival_time,
            descriptor.runtime,
            descriptor.cpu_utilization,
            descriptor.deadline,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite || descriptor.runtime < 0. || descriptor.cpu_utilization < 0. {
            return None;
        }
        Some(descriptor)
    }
}

impl<R: BufRead> JobSource for TraceReader<R> {
    fn next(&mut self) -> Option<JobDescriptor> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!("trace read failed after line {}: {}", self.line_number, e);
                    return None;
                }
            }
            self.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            match Self::parse_line(&line) {
                Some(descriptor) => return Some(descriptor),
                None => {
                    self.skipped += 1;
                    warn!("skipping malformed trace line {}: {:?}", self.line_number, line.trim_end());
                }
            }
        }
    }
}

/// Job source backed by a list of descriptors.
#[derive(Clone, Debug, Default)]
pub struct VecJobSource {
    jobs: VecDeque<JobDescriptor>,
}

impl VecJobSource {
    pub fn new(jobs: Vec<JobDescriptor>) -> Self {
        Self { jobs: jobs.into() }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl JobSource for VecJobSource {
    fn next(&mut self) -> Option<JobDescriptor> {
        self.jobs.pop_front()
    }
}

/// Parameters of a synthetic workload.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SyntheticWorkloadConfig {
    /// Number of jobs to generate.
    pub count: usize,
    pub seed: u64,
    /// Range of time between consecutive arrivals.
    pub inter_arrival: (f64, f64),
    pub runtime: (f64, f64),
    pub cpu_utilization: (f64, f64),
    /// Inclusive range of requested node counts.
    pub node_count: (usize, usize),
    pub deadline: f64,
}

impl Default for SyntheticWorkloadConfig {
    fn default() -> Self {
        Self {
            count: 100,
            seed: 123,
            inter_arrival: (0., 5.),
            runtime: (5., 50.),
            cpu_utilization: (0.1, 1.),
            node_count: (1, 4),
            deadline: 20.,
        }
    }
}

/// Generates jobs with uniformly distributed parameters.
pub struct SyntheticJobSource {
    config: SyntheticWorkloadConfig,
    rand: Pcg64,
    generated: usize,
    time: f64,
}

impl SyntheticJobSource {
    pub fn new(config: SyntheticWorkloadConfig) -> Self {
        Self {
            rand: Pcg64::seed_from_u64(config.seed),
            config,
            generated: 0,
            time: 0.,
        }
    }

    fn sample(&mut self, range: (f64, f64)) -> f64 {
        if range.1 <= range.0 {
            return range.0;
        }
        Uniform::new(range.0, range.1).sample(&mut self.rand)
    }
}

impl JobSource for SyntheticJobSource {
    fn next(&mut self) -> Option<JobDescriptor> {
        if self.generated >= self.config.count {
            return None;
        }
        self.generated += 1;
        self.time += self.sample(self.config.inter_arrival);
        let runtime = self.sample(self.config.runtime);
        let cpu_utilization = self.sample(self.config.cpu_utilization);
        let (low, high) = self.config.node_count;
        let node_count = if high > low {
            Uniform::new_inclusive(low, high).sample(&mut self.rand)
        } else {
            low
        };
        Some(JobDescriptor::new(
            self.time,
            runtime,
            cpu_utilization,
            node_count.max(1),
            self.config.deadline,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_reader_skips_malformed_lines() {
        let trace = "0 10 0.5 2 5\n\n1\t4\t0.3\t1\t2\n2 3 0.2 1\nbad 1 1 1 1\n0 10 NaN 1 5\n\
                     2 -4 0.5 1 5\n2 4 -0.5 1 5\n2 inf 0.5 1 5\n3 6 0.9 3 8 extra\n";
        let mut reader = TraceReader::new(trace.as_bytes());
        assert_eq!(reader.next(), Some(JobDescriptor::new(0., 10., 0.5, 2, 5.)));
        assert_eq!(reader.next(), Some(JobDescriptor::new(1., 4., 0.3, 1, 2.)));
        assert_eq!(reader.next(), Some(JobDescriptor::new(3., 6., 0.9, 3, 8.)));
        assert_eq!(reader.next(), None);
        assert_eq!(reader.skipped(), 6);
    }

    #[test]
    fn test_synthetic_source_is_reproducible() {
        let config = SyntheticWorkloadConfig {
            count: 20,
            ..Default::default()
        };
        let first: Vec<JobDescriptor> = {
            let mut source = SyntheticJobSource::new(config.clone());
            std::iter::from_fn(|| source.next()).collect()
        };
        let mut source = SyntheticJobSource::new(config);
        let second: Vec<JobDescriptor> = std::iter::from_fn(|| source.next()).collect();
        assert_eq!(first.len(), 20);
        assert_eq!(first, second);
        for pair in first.windows(2) {
            assert!(pair[0].arrival_time <= pair[1].arrival_time);
        }
        for job in &first {
            assert!(job.node_count >= 1 && job.node_count <= 4);
            assert!(job.cpu_utilization >= 0.1 && job.cpu_utilization < 1.);
        }
    }
}
