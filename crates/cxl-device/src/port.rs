//! Typed execution ports with per-slot occupancy countdowns.

use cxl_packets::ExecUnit;

#[derive(Clone, Copy, Debug)]
pub struct PortParams {
    pub count: usize,
    pub latency: u64,
}

struct Port {
    count: usize,
    latency: u64,
    /// Remaining occupancy per busy slot.
    busy: Vec<u64>,
}

pub struct ExecPorts {
    ports: Vec<Port>,
}

impl ExecPorts {
    pub fn new(params: &[PortParams; ExecUnit::COUNT]) -> Self {
        Self {
            ports: params
                .iter()
                .map(|p| Port {
                    count: p.count,
                    latency: p.latency,
                    busy: Vec::new(),
                })
                .collect(),
        }
    }

    pub fn available(&self, unit: ExecUnit) -> bool {
        let port = &self.ports[unit.index()];
        port.busy.len() < port.count
    }

    /// Claim a slot; `false` when every slot of the unit is busy.
    pub fn occupy(&mut self, unit: ExecUnit) -> bool {
        let port = &mut self.ports[unit.index()];
        if port.busy.len() < port.count {
            port.busy.push(port.latency);
            true
        } else {
            false
        }
    }

    pub fn run_a_cycle(&mut self) {
        for port in &mut self.ports {
            for remaining in &mut port.busy {
                *remaining -= 1;
            }
            port.busy.retain(|&remaining| remaining != 0);
        }
    }
}
