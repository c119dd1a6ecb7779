//! The offload executor: pending/issue/exec queues over typed ports, with a
//! cache+MSHR interlock for memory uops.

use std::collections::{HashMap, VecDeque};

use cxl_packets::{ExecUnit, Pools, ReqId, UopId};
use tracing::trace;

use crate::cache::NdpCache;
use crate::dram::{DramModel, DramRequest};
use crate::port::{ExecPorts, PortParams};
use crate::stats::DeviceStats;

#[derive(Clone, Debug)]
pub struct ExecutorParams {
    /// `true`: the pending scan stops at the first uop whose sources are
    /// not ready; `false`: out-of-order scan.
    pub in_order: bool,
    pub ports: [PortParams; ExecUnit::COUNT],
}

/// Outstanding DRAM traffic keyed by (address, is-uop); each key holds a
/// FIFO of requests so repeated accesses to one address resolve in order.
pub type InflightMap = HashMap<(u64, bool), VecDeque<ReqId>>;

pub struct UopExecutor {
    in_order: bool,
    cycle: u64,
    pending: VecDeque<ReqId>,
    issue: VecDeque<ReqId>,
    exec: Vec<ReqId>,
    ports: ExecPorts,
}

impl UopExecutor {
    pub fn new(params: &ExecutorParams) -> Self {
        Self {
            in_order: params.in_order,
            cycle: 0,
            pending: VecDeque::new(),
            issue: VecDeque::new(),
            exec: Vec::new(),
            ports: ExecPorts::new(&params.ports),
        }
    }

    pub fn insert(&mut self, req: ReqId) {
        self.pending.push_back(req);
    }

    pub fn occupancy(&self) -> usize {
        self.pending.len() + self.issue.len() + self.exec.len()
    }

    /// One executor cycle. Returns the uop requests that finished this
    /// cycle; the memory expander routes them to the response path.
    pub fn run_a_cycle(
        &mut self,
        pools: &mut Pools,
        mut cache: Option<&mut NdpCache>,
        dram: &mut dyn DramModel,
        inflight: &mut InflightMap,
        stats: &mut DeviceStats,
    ) -> Vec<ReqId> {
        let now = self.cycle;

        // Retire finished uops first so their dependents can issue on the
        // cycle the dependency clears.
        let retired = self.retire(pools, now);

        self.promote_pending(pools, now);
        self.issue_ready(pools, cache.as_deref_mut(), dram, inflight, stats, now);
        self.ports.run_a_cycle();

        self.cycle += 1;
        retired
    }

    fn retire(&mut self, pools: &Pools, now: u64) -> Vec<ReqId> {
        let mut retired = Vec::new();
        self.exec.retain(|&req| {
            let uop_id = uop_of(pools, req);
            let uop = pools.uops.get(uop_id);
            if uop.done_cycle != 0 && uop.done_cycle <= now {
                retired.push(req);
                false
            } else {
                true
            }
        });
        retired
    }

    /// Move dependency-clear uops with an available port into the issue
    /// queue, preserving program order.
    fn promote_pending(&mut self, pools: &mut Pools, now: u64) {
        let mut idx = 0;
        while idx < self.pending.len() {
            let req = self.pending[idx];
            let uop_id = uop_of(pools, req);
            let ready = check_src_ready(pools, uop_id, now);
            if !ready && self.in_order {
                break;
            }
            let unit = pools.uops.get(uop_id).kind.exec_unit();
            if ready && self.ports.available(unit) {
                let promoted = self.pending.remove(idx);
                debug_assert_eq!(promoted, Some(req));
                self.issue.push_back(req);
            } else {
                idx += 1;
            }
        }
    }

    fn issue_ready(
        &mut self,
        pools: &mut Pools,
        mut cache: Option<&mut NdpCache>,
        dram: &mut dyn DramModel,
        inflight: &mut InflightMap,
        stats: &mut DeviceStats,
        now: u64,
    ) {
        let mut deferred = VecDeque::new();
        while let Some(req) = self.issue.pop_front() {
            let uop_id = uop_of(pools, req);
            let issued = if pools.uops.get(uop_id).is_mem() {
                self.issue_mem(pools, req, uop_id, cache.as_deref_mut(), dram, inflight, stats, now)
            } else {
                self.issue_compute(pools, uop_id, now)
            };
            if issued {
                trace!(uop = pools.uops.get(uop_id).unique_id, cycle = now, "uop issued");
                self.exec.push(req);
            } else {
                deferred.push_back(req);
            }
        }
        self.issue = deferred;
    }

    fn issue_compute(&mut self, pools: &mut Pools, uop_id: UopId, now: u64) -> bool {
        let unit = pools.uops.get(uop_id).kind.exec_unit();
        if !self.ports.occupy(unit) {
            return false;
        }
        let uop = pools.uops.get_mut(uop_id);
        uop.exec_cycle = now;
        uop.done_cycle = now + uop.latency;
        true
    }

    /// Memory uops go through the cache. A hit completes after the cache
    /// latency; a miss takes (or merges into) an MSHR entry and waits for
    /// the fill, which stamps `done_cycle` from the DRAM callback.
    #[allow(clippy::too_many_arguments)]
    fn issue_mem(
        &mut self,
        pools: &mut Pools,
        req: ReqId,
        uop_id: UopId,
        cache: Option<&mut NdpCache>,
        dram: &mut dyn DramModel,
        inflight: &mut InflightMap,
        stats: &mut DeviceStats,
        now: u64,
    ) -> bool {
        if !self.ports.available(ExecUnit::Cache) {
            return false;
        }
        let addr = pools.uops.get(uop_id).addr;

        let handled = match cache {
            Some(cache) => {
                if cache.lookup(addr, true) {
                    stats.cache_hits += 1;
                    let latency = cache.latency();
                    let uop = pools.uops.get_mut(uop_id);
                    uop.exec_cycle = now;
                    uop.done_cycle = now + latency;
                    true
                } else {
                    let pfn = cache.pfn(addr);
                    let accepted = if cache.mshr.is_first_miss(pfn) {
                        cache.mshr.has_free_entry()
                            && dram.try_enqueue(DramRequest {
                                addr,
                                write: false,
                                is_uop: true,
                            })
                            && {
                                stats.dram_reads += 1;
                                cache.mshr.insert(req, pfn)
                            }
                    } else {
                        cache.mshr.insert(req, pfn)
                    };
                    if accepted {
                        stats.cache_misses += 1;
                        let uop = pools.uops.get_mut(uop_id);
                        uop.exec_cycle = now;
                        uop.done_cycle = 0;
                        pools.reqs.get_mut(req).dram_start = now;
                    }
                    accepted
                }
            }
            None => {
                let accepted = dram.try_enqueue(DramRequest {
                    addr,
                    write: false,
                    is_uop: true,
                });
                if accepted {
                    stats.dram_reads += 1;
                    inflight.entry((addr, true)).or_default().push_back(req);
                    let uop = pools.uops.get_mut(uop_id);
                    uop.exec_cycle = now;
                    uop.done_cycle = 0;
                    pools.reqs.get_mut(req).dram_start = now;
                }
                accepted
            }
        };

        if handled {
            let occupied = self.ports.occupy(ExecUnit::Cache);
            debug_assert!(occupied);
        }
        handled
    }
}

fn uop_of(pools: &Pools, req: ReqId) -> UopId {
    pools
        .reqs
        .get(req)
        .uop
        .expect("executor request without a uop")
}

/// A uop's sources are ready when every *older* valid source has finished
/// by `now`. A source whose pool slot was released (or reused under a new
/// unique id) already retired and no longer gates anything.
fn check_src_ready(pools: &mut Pools, uop_id: UopId, now: u64) -> bool {
    let uop = pools.uops.get(uop_id);
    if uop.src_ready {
        return true;
    }
    let own_unique = uop.unique_id;
    let mut ready = true;
    for src in &uop.sources {
        if src.unique_id > own_unique {
            continue;
        }
        if !pools.uops.is_live(src.uop) {
            continue;
        }
        let source = pools.uops.get(src.uop);
        if !source.valid || source.unique_id != src.unique_id {
            continue;
        }
        if source.done_cycle == 0 || source.done_cycle > now {
            ready = false;
            break;
        }
    }
    if ready {
        pools.uops.get_mut(uop_id).src_ready = true;
    }
    ready
}
