//! Resource allocation strategies selecting the servers for a job.

use sugars::boxed;

use crate::config::{parse_config_value, parse_options};
use crate::server::BladeServer;

/// Trait for implementation of resource allocation algorithms.
///
/// The algorithm is defined as a function of the system's server pool and the number of nodes
/// requested by a job. It returns the indexes of `node_count` distinct available servers
/// (see [`BladeServer::is_available`]) or `None` if there are not enough of them.
pub trait ResourceAllocator {
    fn allocate(&self, servers: &[BladeServer], node_count: usize) -> Option<Vec<usize>>;

    fn name(&self) -> &str;
}

/// Creates allocator from a config value such as `FirstFit` or `LeastLoaded`.
///
/// `heat_recirculation` holds per-server coefficients used by `MinHeatRecirculation`.
pub fn allocator_resolver(config_str: &str, heat_recirculation: &[f64]) -> Result<Box<dyn ResourceAllocator>, String> {
    let (name, options) = parse_config_value(config_str);
    match name.as_str() {
        "" | "FirstFit" => Ok(boxed!(FirstFit::new())),
        "LeastLoaded" => Ok(boxed!(LeastLoaded::new())),
        "MinHeatRecirculation" | "MHR" => {
            let mut coefficients = heat_recirculation.to_vec();
            if let Some(options) = options {
                if let Some(values) = parse_options(&options).get("coefficients") {
                    coefficients = values
                        .split(';')
                        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("bad coefficient {}: {}", v, e)))
                        .collect::<Result<Vec<f64>, String>>()?;
                }
            }
            Ok(boxed!(MinHeatRecirculation::new(coefficients)))
        }
        _ => Err(format!("Can't resolve allocator: {}", config_str)),
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Takes the first available servers in pool order.
pub struct FirstFit;

impl FirstFit {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for FirstFit {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceAllocator for FirstFit {
    fn allocate(&self, servers: &[BladeServer], node_count: usize) -> Option<Vec<usize>> {
        let selected: Vec<usize> = servers
            .iter()
            .enumerate()
            .filter(|(_, server)| server.is_available())
            .map(|(i, _)| i)
            .take(node_count)
            .collect();
        if selected.len() < node_count {
            return None;
        }
        Some(selected)
    }

    fn name(&self) -> &str {
        "FirstFit"
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Takes the available servers with the lowest active demand.
pub struct LeastLoaded;

impl LeastLoaded {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for LeastLoaded {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceAllocator for LeastLoaded {
    fn allocate(&self, servers: &[BladeServer], node_count: usize) -> Option<Vec<usize>> {
        let mut candidates: Vec<usize> = (0..servers.len()).filter(|&i| servers[i].is_available()).collect();
        if candidates.len() < node_count {
            return None;
        }
        candidates.sort_by(|&a, &b| servers[a].demand().total_cmp(&servers[b].demand()).then(a.cmp(&b)));
        candidates.truncate(node_count);
        Some(candidates)
    }

    fn name(&self) -> &str {
        "LeastLoaded"
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Takes the available servers with the lowest heat recirculation coefficient,
/// so that the placed load heats the inlet air of other servers as little as possible.
///
/// Servers without a coefficient are ranked after all servers that have one.
pub struct MinHeatRecirculation {
    coefficients: Vec<f64>,
}

impl MinHeatRecirculation {
    pub fn new(coefficients: Vec<f64>) -> Self {
        Self { coefficients }
    }

    fn coefficient(&self, server: usize) -> f64 {
        self.coefficients.get(server).copied().unwrap_or(f64::INFINITY)
    }
}

impl ResourceAllocator for MinHeatRecirculation {
    fn allocate(&self, servers: &[BladeServer], node_count: usize) -> Option<Vec<usize>> {
        let mut candidates: Vec<usize> = (0..servers.len()).filter(|&i| servers[i].is_available()).collect();
        if candidates.len() < node_count {
            return None;
        }
        candidates.sort_by(|&a, &b| self.coefficient(a).total_cmp(&self.coefficient(b)).then(a.cmp(&b)));
        candidates.truncate(node_count);
        Some(candidates)
    }

    fn name(&self) -> &str {
        "MinHeatRecirculation"
    }
}
