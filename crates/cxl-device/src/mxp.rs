//! The memory expander: the device endpoint of the link plus its local
//! memory path (pending queue, optional cache+MSHR, DRAM model, response
//! queue) and the offload executor.

use std::collections::VecDeque;

use cxl_link::{LinkParams, LinkPort, LinkStats};
use cxl_packets::{Pools, ReqId};
use tracing::{debug, trace};

use crate::cache::{CacheParams, NdpCache};
use crate::dram::{DramCompletion, DramModel, DramRequest};
use crate::executor::{ExecutorParams, InflightMap, UopExecutor};
use crate::stats::DeviceStats;

#[derive(Clone, Debug)]
pub struct DeviceParams {
    /// `None` runs the DRAM path uncached.
    pub cache: Option<CacheParams>,
    pub executor: ExecutorParams,
    /// Finished uops bypass the return link and surface directly at the
    /// simulator shell.
    pub uop_direct_offload: bool,
    /// Address bits below the line/page-frame number.
    pub line_offset_bits: u32,
    /// Responses admitted into TX-VC per cycle.
    pub txvc_bw: usize,
}

struct Response {
    req: ReqId,
    ready: u64,
}

pub struct MemoryExpander {
    pub link: LinkPort,
    pending: VecDeque<ReqId>,
    cache: Option<NdpCache>,
    dram: Box<dyn DramModel>,
    executor: UopExecutor,
    /// Outstanding uncached DRAM traffic, keyed by (address, is-uop).
    inflight: InflightMap,
    resp: VecDeque<Response>,
    direct_done: VecDeque<ReqId>,
    direct_offload: bool,
    txvc_bw: usize,
}

impl MemoryExpander {
    pub fn new(link: &LinkParams, device: &DeviceParams, dram: Box<dyn DramModel>) -> Self {
        Self {
            link: LinkPort::new(false, link),
            pending: VecDeque::new(),
            cache: device
                .cache
                .as_ref()
                .map(|params| NdpCache::new(params, device.line_offset_bits)),
            dram,
            executor: UopExecutor::new(&device.executor),
            inflight: InflightMap::new(),
            resp: VecDeque::new(),
            direct_done: VecDeque::new(),
            direct_offload: device.uop_direct_offload,
            txvc_bw: device.txvc_bw,
        }
    }

    /// One IO-domain cycle.
    pub fn run_a_cycle(
        &mut self,
        peer: &mut LinkPort,
        pools: &mut Pools,
        link_stats: &mut LinkStats,
        dev_stats: &mut DeviceStats,
    ) {
        self.end_transaction(pools, link_stats);
        self.process_pending(pools, dev_stats);
        self.run_executor(pools, dev_stats);
        self.link.run_rx_stages(pools, link_stats);
        self.link.run_tx_stages(peer, pools, link_stats);
        self.start_transaction(pools);
        self.link.advance_cycle();
    }

    /// One DRAM-domain cycle; the clock plan calls this zero or more times
    /// per IO cycle.
    pub fn run_a_cycle_internal(&mut self, pools: &mut Pools, dev_stats: &mut DeviceStats) {
        self.dram.tick();
        let mut completions: Vec<DramCompletion> = Vec::new();
        self.dram.drain_completions(&mut completions);
        for completion in completions {
            dev_stats.dram_callbacks += 1;
            self.handle_completion(pools, completion);
        }
    }

    /// Finished uops waiting for the shell when `uop_direct_offload` is on.
    pub fn pop_direct_done(&mut self) -> Option<ReqId> {
        self.direct_done.pop_front()
    }

    fn end_transaction(&mut self, pools: &mut Pools, stats: &mut LinkStats) {
        while let Some(req) = self.link.pull_rxvc(pools, stats) {
            trace!(req = pools.reqs.get(req).uid, "request reached the device");
            self.pending.push_back(req);
        }
    }

    /// Offer every pending request to the executor (uops) or the DRAM path
    /// (memory); back-pressured ones retry next cycle in order.
    fn process_pending(&mut self, pools: &mut Pools, stats: &mut DeviceStats) {
        let now = self.link.cycle();
        let mut remaining = VecDeque::new();
        while let Some(req) = self.pending.pop_front() {
            if pools.reqs.get(req).is_uop {
                self.executor.insert(req);
                continue;
            }
            if !self.try_start_mem(pools, req, now, stats) {
                remaining.push_back(req);
            }
        }
        self.pending = remaining;
    }

    fn try_start_mem(
        &mut self,
        pools: &mut Pools,
        req: ReqId,
        now: u64,
        stats: &mut DeviceStats,
    ) -> bool {
        let (addr, write) = {
            let r = pools.reqs.get(req);
            (r.addr, r.write)
        };

        let Some(cache) = self.cache.as_mut() else {
            // Uncached: straight to DRAM, correlated through the inflight
            // map.
            let accepted = self.dram.try_enqueue(DramRequest {
                addr,
                write,
                is_uop: false,
            });
            if accepted {
                count_dram(stats, write);
                pools.reqs.get_mut(req).dram_start = now;
                self.inflight.entry((addr, false)).or_default().push_back(req);
            }
            return accepted;
        };

        if cache.lookup(addr, true) {
            stats.cache_hits += 1;
            let ready = now + cache.latency();
            self.resp.push_back(Response { req, ready });
            return true;
        }

        let pfn = cache.pfn(addr);
        let accepted = if cache.mshr.is_first_miss(pfn) {
            cache.mshr.has_free_entry()
                && self.dram.try_enqueue(DramRequest {
                    addr,
                    write: false,
                    is_uop: false,
                })
                && {
                    count_dram(stats, false);
                    cache.mshr.insert(req, pfn)
                }
        } else {
            cache.mshr.insert(req, pfn)
        };
        if accepted {
            stats.cache_misses += 1;
            pools.reqs.get_mut(req).dram_start = now;
        }
        accepted
    }

    fn run_executor(&mut self, pools: &mut Pools, stats: &mut DeviceStats) {
        let retired = self.executor.run_a_cycle(
            pools,
            self.cache.as_mut(),
            self.dram.as_mut(),
            &mut self.inflight,
            stats,
        );
        let now = self.link.cycle();
        for req in retired {
            debug!(req = pools.reqs.get(req).uid, "uop finished");
            if self.direct_offload {
                self.direct_done.push_back(req);
            } else {
                self.resp.push_back(Response { req, ready: now });
            }
        }
    }

    fn handle_completion(&mut self, pools: &mut Pools, completion: DramCompletion) {
        let now = self.link.cycle();
        let fills: Vec<ReqId> = match self.cache.as_mut() {
            Some(cache) => {
                let pfn = cache.pfn(completion.addr);
                let merged = cache.mshr.clear(pfn);
                cache.insert(completion.addr);
                merged
            }
            None => {
                let key = (completion.addr, completion.is_uop);
                let queue = self
                    .inflight
                    .get_mut(&key)
                    .expect("DRAM completion for an unknown address");
                let req = queue
                    .pop_front()
                    .expect("DRAM completion for an empty inflight queue");
                if queue.is_empty() {
                    self.inflight.remove(&key);
                }
                vec![req]
            }
        };

        for req in fills {
            if pools.reqs.get(req).is_uop {
                // The executor retires the uop once it sees the stamp.
                let uop = pools.reqs.get(req).uop.expect("uop request without a uop");
                pools.uops.get_mut(uop).done_cycle = now.max(1);
            } else {
                self.resp.push_back(Response { req, ready: now });
            }
        }
    }

    /// Feed finished responses back into the link, up to `txvc_bw` per
    /// cycle, stopping at the first back-pressured one.
    fn start_transaction(&mut self, pools: &mut Pools) {
        let now = self.link.cycle();
        let mut sent = 0;
        while sent < self.txvc_bw {
            let Some(front) = self.resp.front() else {
                break;
            };
            if front.ready > now {
                break;
            }
            let req = front.req;
            if !self.link.push_txvc(pools, req) {
                break;
            }
            self.resp.pop_front();
            sent += 1;
        }
    }
}

fn count_dram(stats: &mut DeviceStats, write: bool) {
    if write {
        stats.dram_writes += 1;
    } else {
        stats.dram_reads += 1;
    }
}
