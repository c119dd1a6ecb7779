//! Same-channel requests complete in admission order: reads share the WOD
//! channel and the uncached DRAM services in order.

use std::cell::RefCell;
use std::rc::Rc;

use cxl_sim::{CxlSim, SimConfig};

#[test]
fn reads_complete_in_admission_order() {
    let mut sim = CxlSim::new(SimConfig {
        ndp_cache_enable: false,
        pcie_max_flit_wait_cycle: 0,
        forward_progress_period: 10_000,
        ..SimConfig::default()
    })
    .unwrap();

    let order: Rc<RefCell<Vec<u64>>> = Rc::default();
    let seen = order.clone();
    sim.register_mem_callback(move |_addr, _write, handle| {
        seen.borrow_mut().push(handle);
    });

    let mut queued: Vec<u64> = (0..8).rev().collect();
    while order.borrow().len() < 8 {
        assert!(sim.cycle() < 10_000, "reads never drained");
        if let Some(&handle) = queued.last() {
            if sim.insert_mem_request(0x1000 + handle * 0x40, false, handle) {
                queued.pop();
            }
        }
        sim.tick(true);
    }

    assert_eq!(*order.borrow(), (0..8).collect::<Vec<u64>>());

    let report = sim.report();
    // Uncached: every read is one DRAM transaction and one callback.
    assert_eq!(report.dram_reads, 8);
    assert_eq!(report.dram_callbacks, 8);
    assert_eq!(report.mem_callbacks, 8);
}
