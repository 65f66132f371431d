use std::collections::BTreeSet;

use approx::assert_abs_diff_eq;

use bladesim::config::{SimulationConfig, WorkloadConfig};
use bladesim::job::JobDescriptor;
use bladesim::simulation::ClusterSimulation;
use bladesim::system::SystemState;
use bladesim::trace::VecJobSource;

fn name_wrapper(file_name: &str) -> String {
    format!("test-configs/{}", file_name)
}

#[test]
fn test_run_until_done() {
    let config = SimulationConfig::from_file(&name_wrapper("cluster.yaml")).unwrap();
    assert_eq!(config.systems.len(), 2);
    assert!(matches!(config.systems[1].workload, WorkloadConfig::Trace(_)));
    assert!(config.blade_type("low-power").is_some());

    let mut sim = ClusterSimulation::from_config(&config).unwrap();
    sim.run();
    assert!(sim.is_done());

    let summary = sim.summary();
    assert_eq!(summary.systems.len(), 2);
    for system in &summary.systems {
        assert_eq!(system.state, SystemState::Done);
        assert_eq!(system.jobs_admitted, system.jobs_finished);
        assert_eq!(system.jobs_waiting, 0);
        assert!(system.energy_consumed > 0.);
        assert!(system.mean_turnaround.is_some());
    }
    assert_eq!(summary.systems[0].jobs_admitted, 20);
    // one malformed trace line
    assert_eq!(summary.systems[1].jobs_admitted, 4);
    assert_eq!(summary.cycles, sim.cycles());
    assert_eq!(summary.total_violations, sim.violations().len());

    // server ids are unique across systems
    let mut ids: Vec<u32> = sim
        .systems()
        .iter()
        .flat_map(|s| s.servers().iter().map(|server| server.id()))
        .collect();
    ids.sort_unstable();
    let unique: BTreeSet<u32> = ids.iter().copied().collect();
    assert_eq!(ids.len(), 6);
    assert_eq!(unique.into_iter().collect::<Vec<u32>>(), ids);
    assert_eq!(sim.system("batch").unwrap().servers()[0].blade_type(), "low-power");
}

#[test]
fn test_simulation_length() {
    let config = SimulationConfig::from_file(&name_wrapper("limited.yaml")).unwrap();
    let mut sim = ClusterSimulation::from_config(&config).unwrap();
    sim.run();
    assert!(!sim.is_done());
    assert_eq!(sim.cycles(), 6);
    assert_abs_diff_eq!(sim.time(), 3., epsilon = 1e-12);
    assert_eq!(sim.cycle_stats().len(), 6);
    assert!(sim.cycle_stats().iter().all(|s| s.running_nodes == 1));

    // one fully loaded server at the top level of the default blade
    assert_abs_diff_eq!(sim.energy_consumed("long").unwrap(), 3. * (160. + 130. / 1.4), epsilon = 1e-6);
    assert_eq!(sim.energy_consumed("missing"), None);
}

#[test]
fn test_blocked_system_draws_standby_power() {
    let config = SimulationConfig::from_yaml("systems: []").unwrap();
    let mut sim = ClusterSimulation::from_config(&config).unwrap();
    let system_config = serde_yaml::from_str(
        "
name: hpc
servers: 2
workload:
  trace: unused.txt
",
    )
    .unwrap();
    let jobs = vec![JobDescriptor::new(0., 3., 0.5, 2, 100.)];
    let system = sim
        .build_system(&config, &system_config, Box::new(VecJobSource::new(jobs)))
        .unwrap();
    sim.add_system(system);

    sim.step();
    sim.system_mut("hpc").unwrap().block();
    sim.step();
    sim.step();
    let stats = sim.cycle_stats();
    assert_eq!(stats[1].state, SystemState::Blocked);
    assert_eq!(stats[1].running_nodes, 0);
    assert_eq!(stats[2].power, 2. * 45.);

    sim.system_mut("hpc").unwrap().unblock();
    sim.run();
    assert!(sim.is_done());
    // three cycles of work, two blocked cycles
    assert_eq!(sim.cycles(), 5);
}

#[test]
fn test_run_stops_when_stalled() {
    let config = SimulationConfig::from_yaml("systems: []").unwrap();
    let mut sim = ClusterSimulation::from_config(&config).unwrap();
    let system_config = serde_yaml::from_str(
        "
name: hpc
servers: 2
workload:
  trace: unused.txt
",
    )
    .unwrap();
    let jobs = vec![JobDescriptor::new(0., 5., 0.5, 3, 100.)];
    let system = sim
        .build_system(&config, &system_config, Box::new(VecJobSource::new(jobs)))
        .unwrap();
    sim.add_system(system);

    sim.run();
    assert!(!sim.is_done());
    assert!(sim.is_stalled());
    assert_eq!(sim.cycles(), 1);
    assert_eq!(sim.summary().systems[0].node_shortages, 1);
}

#[test]
fn test_bad_config() {
    let yaml = "
systems:
  - name: hpc
    servers: 2
    allocator: BestFit
    workload:
      trace: test-configs/jobs.txt
";
    let config = SimulationConfig::from_yaml(yaml).unwrap();
    assert!(ClusterSimulation::from_config(&config).is_err());

    let yaml = "
step_duration: 0
systems: []
";
    assert!(SimulationConfig::from_yaml(yaml).is_err());

    let yaml = "
blade_types:
  - name: broken
    frequency_levels: [1.0, 2.0]
    busy_power: [100]
    idle_power: [50, 60]
    standby_power: 10
";
    assert!(SimulationConfig::from_yaml(yaml).is_err());
}

#[test]
fn test_save_reports() {
    let config = SimulationConfig::from_file(&name_wrapper("cluster.yaml")).unwrap();
    let mut sim = ClusterSimulation::from_config(&config).unwrap();
    sim.run();

    let dir = std::env::temp_dir();
    let stats_path = dir.join("bladesim-test-cycles.csv");
    let violations_path = dir.join("bladesim-test-violations.csv");
    sim.save_cycle_stats(stats_path.to_str().unwrap()).unwrap();
    sim.violations().save_log(violations_path.to_str().unwrap()).unwrap();

    let contents = std::fs::read_to_string(&stats_path).unwrap();
    let mut lines = contents.lines();
    assert_eq!(
        lines.next(),
        Some("time,system,state,running_nodes,waiting_jobs,admitted,finished,violations,cpu_percent,power")
    );
    assert_eq!(lines.count(), sim.cycle_stats().len());
    std::fs::remove_file(stats_path).unwrap();
    std::fs::remove_file(violations_path).unwrap();
}
