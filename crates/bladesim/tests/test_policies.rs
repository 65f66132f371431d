use bladesim::allocator::{allocator_resolver, FirstFit, LeastLoaded, MinHeatRecirculation, ResourceAllocator};
use bladesim::environment::SimEnvironment;
use bladesim::frequency::{frequency_policy_resolver, FrequencyPolicy, ThresholdFrequency};
use bladesim::job::{JobDescriptor, JobStore};
use bladesim::power::HardwareProfile;
use bladesim::scheduler::{scheduler_resolver, FirstComeFirstServed, LeastRemainingFirst, Scheduler};
use bladesim::server::{BladeServer, Readiness};

fn ready_servers(count: u32) -> Vec<BladeServer> {
    let profile = HardwareProfile::default_blade();
    (0..count)
        .map(|i| {
            let mut server = BladeServer::new(i, &format!("s{}", i), &profile);
            server.set_readiness(Readiness::Ready);
            server
        })
        .collect()
}

fn load(server: &mut BladeServer, jobs: &mut JobStore, utilization: f64) {
    let id = jobs.insert(&JobDescriptor::new(0., 10., utilization, 1, 100.));
    server.feed_work(jobs.get(id), 0);
}

#[test]
fn test_first_fit() {
    let mut jobs = JobStore::new();
    let mut servers = ready_servers(4);
    load(&mut servers[1], &mut jobs, 1.);
    servers[2].make_idle();

    let allocator = FirstFit::new();
    assert_eq!(allocator.allocate(&servers, 1), Some(vec![0]));
    assert_eq!(allocator.allocate(&servers, 2), Some(vec![0, 3]));
    assert_eq!(allocator.allocate(&servers, 3), None);
}

#[test]
fn test_least_loaded() {
    let mut jobs = JobStore::new();
    let mut servers = ready_servers(3);
    load(&mut servers[0], &mut jobs, 0.5);
    load(&mut servers[2], &mut jobs, 0.25);

    let allocator = LeastLoaded::new();
    assert_eq!(allocator.allocate(&servers, 2), Some(vec![1, 2]));
    assert_eq!(allocator.allocate(&servers, 3), Some(vec![1, 2, 0]));
    assert_eq!(allocator.allocate(&servers, 4), None);
}

#[test]
fn test_min_heat_recirculation() {
    let servers = ready_servers(4);
    let allocator = MinHeatRecirculation::new(vec![0.3, 0.1, 0.2]);
    assert_eq!(allocator.allocate(&servers, 2), Some(vec![1, 2]));
    // servers without a coefficient come last
    assert_eq!(allocator.allocate(&servers, 4), Some(vec![1, 2, 0, 3]));

    let allocator = allocator_resolver("MHR[coefficients=0.5;0.4;0.3;0.2]", &[]).unwrap();
    assert_eq!(allocator.allocate(&servers, 1), Some(vec![3]));
}

#[test]
fn test_allocator_resolver() {
    assert_eq!(allocator_resolver("", &[]).unwrap().name(), "FirstFit");
    assert_eq!(allocator_resolver("LeastLoaded", &[]).unwrap().name(), "LeastLoaded");
    assert_eq!(
        allocator_resolver("MinHeatRecirculation", &[0.1, 0.2]).unwrap().name(),
        "MinHeatRecirculation"
    );
    assert!(allocator_resolver("BestFit", &[]).is_err());
    assert!(allocator_resolver("MHR[coefficients=0.1;x]", &[]).is_err());
}

#[test]
fn test_schedulers() {
    let mut jobs = JobStore::new();
    let long = jobs.insert(&JobDescriptor::new(0., 10., 0.5, 1, 100.));
    let short = jobs.insert(&JobDescriptor::new(1., 2., 0.5, 1, 100.));
    let tie = jobs.insert(&JobDescriptor::new(2., 1., 1., 1, 100.));
    let waiting = vec![long, short, tie];

    assert_eq!(LeastRemainingFirst::new().next_job(&waiting, &jobs), Some(1));
    assert_eq!(LeastRemainingFirst::new().next_job(&waiting[2..], &jobs), Some(0));
    assert_eq!(FirstComeFirstServed::new().next_job(&waiting, &jobs), Some(0));
    assert_eq!(FirstComeFirstServed::new().next_job(&[], &jobs), None);

    assert_eq!(scheduler_resolver("").unwrap().name(), "LeastRemainingFirst");
    assert_eq!(scheduler_resolver("FCFS").unwrap().name(), "FirstComeFirstServed");
    assert!(scheduler_resolver("Random").is_err());
}

#[test]
fn test_threshold_frequency() {
    let mut env = SimEnvironment::new(0.);
    let mut jobs = JobStore::new();
    let mut servers = ready_servers(3);
    load(&mut servers[0], &mut jobs, 0.25);
    load(&mut servers[1], &mut jobs, 1.);
    servers[1].set_frequency_by_mips(1., &env);
    for server in servers.iter_mut() {
        server.run_cycle(&mut jobs, &env);
    }

    let mut policy = ThresholdFrequency::new(30., 80.);
    assert_eq!(policy.apply(&mut servers, &mut env), 2);
    assert_eq!(servers[0].frequency_level(), 1);
    assert_eq!(servers[1].frequency_level(), 1);
    // no active work
    assert_eq!(servers[2].frequency_level(), 2);
    assert_eq!(env.frequency_messages(), 2);
}

#[test]
fn test_frequency_policy_resolver() {
    assert_eq!(frequency_policy_resolver("").unwrap().name(), "Fixed");
    assert_eq!(
        frequency_policy_resolver("Threshold[low=20,high=90]").unwrap().name(),
        "Threshold"
    );
    assert!(frequency_policy_resolver("Threshold[low=90,high=20]").is_err());
    assert!(frequency_policy_resolver("Threshold[low=abc]").is_err());
    assert!(frequency_policy_resolver("Ondemand").is_err());
}
