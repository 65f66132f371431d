//! SLA violation records.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;

use serde::Serialize;

/// Kind of SLA violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Violation {
    /// Not enough available servers for the requested node count.
    NodeShortage,
    /// The job waited longer than its deadline before being admitted.
    DeadlinePassed,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Violation::NodeShortage => write!(f, "node shortage"),
            Violation::DeadlinePassed => write!(f, "deadline passed"),
        }
    }
}

/// Receives violation events from compute systems.
pub trait ViolationSink {
    fn log_violation(&mut self, time: f64, system_name: &str, kind: Violation);
}

#[derive(Serialize, Clone, Debug)]
pub struct ViolationEntry {
    pub time: f64,
    pub system: String,
    pub kind: Violation,
}

/// In-memory violation log.
#[derive(Default, Clone, Debug)]
pub struct ViolationLog {
    entries: Vec<ViolationEntry>,
}

impl ViolationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ViolationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of violations of the given kind recorded for the system.
    pub fn count(&self, system_name: &str, kind: Violation) -> usize {
        self.entries
            .iter()
            .filter(|e| e.system == system_name && e.kind == kind)
            .count()
    }

    /// Returns the number of violations per system.
    pub fn per_system(&self) -> BTreeMap<String, usize> {
        let mut result = BTreeMap::new();
        for entry in &self.entries {
            *result.entry(entry.system.clone()).or_insert(0) += 1;
        }
        result
    }

    /// Writes the log as CSV.
    pub fn save_log(&self, path: &str) -> Result<(), std::io::Error> {
        let file = File::create(path)?;
        let mut wtr = csv::Writer::from_writer(file);
        for entry in &self.entries {
            wtr.serialize(entry)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ViolationSink for ViolationLog {
    fn log_violation(&mut self, time: f64, system_name: &str, kind: Violation) {
        self.entries.push(ViolationEntry {
            time,
            system: system_name.to_string(),
            kind,
        });
    }
}
