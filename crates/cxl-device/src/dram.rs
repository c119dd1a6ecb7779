//! DRAM timing collaborator.
//!
//! The interconnect model only needs enqueue/tick/complete semantics; real
//! command scheduling stays out of scope. `SimpleDram` services requests in
//! order with fixed per-type latencies, which is enough to exercise the
//! MSHR, response and clock-domain paths. A detailed engine can be swapped
//! in behind `DramModel`.

use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DramRequest {
    pub addr: u64,
    pub write: bool,
    pub is_uop: bool,
}

pub type DramCompletion = DramRequest;

pub trait DramModel {
    /// `false` is back-pressure; the caller retries next cycle.
    fn try_enqueue(&mut self, req: DramRequest) -> bool;

    /// Advance one DRAM-clock cycle.
    fn tick(&mut self);

    fn drain_completions(&mut self, out: &mut Vec<DramCompletion>);

    fn pending(&self) -> usize;
}

#[derive(Clone, Copy, Debug)]
pub struct SimpleDramParams {
    pub read_latency: u64,
    pub write_latency: u64,
    pub queue_depth: usize,
}

pub struct SimpleDram {
    params: SimpleDramParams,
    cycle: u64,
    queue: VecDeque<(DramRequest, u64)>,
    completed: Vec<DramCompletion>,
}

impl SimpleDram {
    pub fn new(params: SimpleDramParams) -> Self {
        Self {
            params,
            cycle: 0,
            queue: VecDeque::new(),
            completed: Vec::new(),
        }
    }
}

impl DramModel for SimpleDram {
    fn try_enqueue(&mut self, req: DramRequest) -> bool {
        if self.queue.len() >= self.params.queue_depth {
            return false;
        }
        let latency = if req.write {
            self.params.write_latency
        } else {
            self.params.read_latency
        };
        self.queue.push_back((req, self.cycle + latency));
        true
    }

    fn tick(&mut self) {
        self.cycle += 1;
        // In-order service keeps per-address request/response FIFO intact.
        while let Some(&(req, due)) = self.queue.front() {
            if due > self.cycle {
                break;
            }
            self.queue.pop_front();
            self.completed.push(req);
        }
    }

    fn drain_completions(&mut self, out: &mut Vec<DramCompletion>) {
        out.append(&mut self.completed);
    }

    fn pending(&self) -> usize {
        self.queue.len() + self.completed.len()
    }
}
