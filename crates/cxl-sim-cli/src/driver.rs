//! The reference driver: feeds a loaded trace into the interconnect, one
//! request per cycle, retrying back-pressured inserts from a pending queue
//! until every callback has fired.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::bail;
use cxl_sim::{CxlSim, DepKind, MemKind, UopKind};
use tracing::debug;

use crate::trace::{TraceEntry, TraceOp};

pub struct TraceDriver {
    pending: VecDeque<TraceEntry>,
    total: u64,
    inserted: u64,
    next_unique: u64,
    returned: Rc<Cell<u64>>,
}

impl TraceDriver {
    pub fn new(entries: Vec<TraceEntry>) -> Self {
        Self {
            total: entries.len() as u64,
            pending: entries.into(),
            inserted: 0,
            next_unique: 0,
            returned: Rc::new(Cell::new(0)),
        }
    }

    pub fn register_callbacks(&self, sim: &mut CxlSim) {
        let mem_returned = self.returned.clone();
        sim.register_mem_callback(move |addr, write, handle| {
            debug!(addr, write, handle, "mem request returned");
            mem_returned.set(mem_returned.get() + 1);
        });
        let uop_returned = self.returned.clone();
        sim.register_uop_callback(move |addr, _write, handle| {
            debug!(addr, handle, "uop returned");
            uop_returned.set(uop_returned.get() + 1);
        });
    }

    /// Run until every trace entry has come back; returns the final cycle.
    pub fn run(&mut self, sim: &mut CxlSim, max_cycles: Option<u64>) -> anyhow::Result<u64> {
        while self.returned.get() < self.total {
            if let Some(max) = max_cycles {
                if sim.cycle() >= max {
                    bail!(
                        "cycle limit {} reached with {}/{} requests returned",
                        max,
                        self.returned.get(),
                        self.total
                    );
                }
            }
            self.try_insert(sim);
            sim.tick(true);
        }
        Ok(sim.cycle())
    }

    fn try_insert(&mut self, sim: &mut CxlSim) {
        let Some(&entry) = self.pending.front() else {
            return;
        };
        if entry.cycle.is_some_and(|cycle| cycle > sim.cycle()) {
            return;
        }

        let handle = self.inserted;
        let admitted = match entry.op {
            TraceOp::Read => sim.insert_mem_request(entry.addr, false, handle),
            TraceOp::Write => sim.insert_mem_request(entry.addr, true, handle),
            TraceOp::Uop(variant) => {
                let (kind, mem) = uop_variant(variant);
                let unique_id = self.next_unique;
                let admitted = sim.insert_uop_request(
                    handle,
                    0,
                    kind,
                    mem,
                    entry.addr,
                    unique_id,
                    uop_latency(kind),
                    &dependencies(unique_id),
                );
                if admitted {
                    self.next_unique += 1;
                }
                admitted
            }
        };
        if admitted {
            self.pending.pop_front();
            self.inserted += 1;
        }
    }
}

/// Trace uop variants: 2 loads, 3 stores, anything else a plain integer op.
fn uop_variant(variant: u32) -> (UopKind, MemKind) {
    match variant {
        2 => (UopKind::Ld, MemKind::Load),
        3 => (UopKind::St, MemKind::Store),
        _ => (UopKind::Iadd, MemKind::NotMem),
    }
}

fn uop_latency(kind: UopKind) -> u64 {
    match kind {
        UopKind::Ld | UopKind::St => 1,
        _ => 3,
    }
}

/// Each trace uop depends on the one before it, giving the in-order
/// scheduler something to chew on.
fn dependencies(unique_id: u64) -> Vec<(u64, DepKind)> {
    if unique_id == 0 {
        Vec::new()
    } else {
        vec![(unique_id - 1, DepKind::PrevUop)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cxl_sim::SimConfig;

    #[test]
    fn small_trace_drains_completely() {
        let entries = vec![
            TraceEntry {
                addr: 0x1000,
                op: TraceOp::Read,
                cycle: None,
            },
            TraceEntry {
                addr: 0x2000,
                op: TraceOp::Write,
                cycle: Some(5),
            },
            TraceEntry {
                addr: 0x3000,
                op: TraceOp::Uop(2),
                cycle: None,
            },
        ];

        let mut sim = CxlSim::new(SimConfig {
            pcie_max_flit_wait_cycle: 0,
            forward_progress_period: 5_000,
            ..SimConfig::default()
        })
        .unwrap();
        let mut driver = TraceDriver::new(entries);
        driver.register_callbacks(&mut sim);

        let cycles = driver.run(&mut sim, Some(10_000)).unwrap();
        assert!(cycles > 0);
        assert_eq!(sim.in_flight(), 0);
        let report = sim.report();
        assert_eq!(report.mem_callbacks, 2);
        assert_eq!(report.uop_callbacks, 1);
    }

    #[test]
    fn cycle_limit_aborts_a_stuck_run() {
        let entries = vec![TraceEntry {
            addr: 0x1000,
            op: TraceOp::Read,
            // Never eligible within the cycle limit.
            cycle: Some(1_000_000),
        }];
        let mut sim = CxlSim::new(SimConfig::default()).unwrap();
        let mut driver = TraceDriver::new(entries);
        driver.register_callbacks(&mut sim);
        assert!(driver.run(&mut sim, Some(100)).is_err());
    }
}
