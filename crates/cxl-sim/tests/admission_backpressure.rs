//! Admission back-pressure at the driver API: a full queue refuses the
//! insert and drains at the configured pace.

use cxl_sim::{CxlSim, SimConfig};

fn config() -> SimConfig {
    SimConfig {
        pcie_insertq_size: 2,
        pcie_txvc_bw: 1,
        pcie_max_flit_wait_cycle: 0,
        forward_progress_period: 5_000,
        ..SimConfig::default()
    }
}

#[test]
fn third_insert_in_one_cycle_is_refused() {
    let mut sim = CxlSim::new(config()).unwrap();
    sim.register_mem_callback(|_, _, _| {});

    assert!(sim.insert_mem_request(0x1000, false, 0));
    assert!(sim.insert_mem_request(0x1040, false, 1));
    assert!(
        !sim.insert_mem_request(0x1080, false, 2),
        "admission queue holds two entries"
    );

    // One admission leaves the queue per cycle (txvc_bw = 1), freeing one
    // slot per tick for the retry.
    sim.tick(true);
    assert!(sim.insert_mem_request(0x1080, false, 2));
    assert!(!sim.insert_mem_request(0x10c0, false, 3));

    sim.tick(true);
    assert!(sim.insert_mem_request(0x10c0, false, 3));
}

#[test]
fn refused_inserts_are_not_counted() {
    let mut sim = CxlSim::new(config()).unwrap();
    sim.register_mem_callback(|_, _, _| {});

    assert!(sim.insert_mem_request(0x1000, false, 0));
    assert!(sim.insert_mem_request(0x1040, false, 1));
    assert!(!sim.insert_mem_request(0x1080, false, 2));

    assert_eq!(sim.report().mem_requests, 2);
    assert_eq!(sim.in_flight(), 2);
}
