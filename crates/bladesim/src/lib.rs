#![doc = include_str!("../readme.md")]

pub mod allocator;
pub mod config;
pub mod environment;
pub mod fair_share;
pub mod frequency;
pub mod job;
pub mod log;
pub mod power;
pub mod scheduler;
pub mod server;
pub mod simulation;
pub mod system;
pub mod trace;
pub mod violation;

pub use colored;
pub use environment::{Environment, SimEnvironment};
pub use job::{JobDescriptor, JobId};
pub use server::{BladeServer, Readiness};
pub use simulation::ClusterSimulation;
pub use system::{ComputeSystem, SystemState};
pub use violation::{Violation, ViolationLog, ViolationSink};
