//! Cycle-driven simulator of a CXL Type-3 memory-expander interconnect.
//!
//! The shell owns the two endpoints (root complex and memory expander), the
//! packet pools, the two-domain clock plan and the statistics, and exposes
//! the driver API: insert requests, register completion callbacks, tick.
//!
//! ```
//! use cxl_sim::{CxlSim, SimConfig};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let mut sim = CxlSim::new(SimConfig::default()).unwrap();
//! let done = Rc::new(Cell::new(false));
//! let seen = done.clone();
//! sim.register_mem_callback(move |_addr, _write, _handle| seen.set(true));
//!
//! assert!(sim.insert_mem_request(0x1000, false, 7));
//! while !done.get() {
//!     sim.tick(true);
//! }
//! ```

mod clock;
mod config;
mod stats;

use std::collections::HashMap;

use cxl_device::{DeviceStats, MemoryExpander, SimpleDram};
use cxl_link::{LinkStats, RootComplex};
use cxl_packets::{Pools, ReqId, SrcInfo, Uop, UopId};
use tracing::{debug, info};

pub use clock::ClockPlan;
pub use config::{ConfigError, PortsConfig, SchedulerKind, SimConfig, UnitConfig};
pub use stats::{ShellStats, StatsError, StatsReport};

// Re-exported so embedding drivers only need this crate.
pub use cxl_device::{DramCompletion, DramModel, DramRequest};
pub use cxl_packets::{DepKind, MemKind, UopKind};

/// Completion callback: `(address, write, opaque driver handle)`.
pub type DoneCallback = Box<dyn FnMut(u64, bool, u64)>;

pub struct CxlSim {
    config: SimConfig,
    pools: Pools,
    rc: RootComplex,
    mxp: MemoryExpander,
    clock: ClockPlan,
    cycle: u64,

    link_stats: LinkStats,
    dev_stats: DeviceStats,
    shell_stats: ShellStats,

    mem_done_cb: Option<DoneCallback>,
    uop_done_cb: Option<DoneCallback>,

    /// Live uops by driver-assigned unique id, for source resolution.
    uop_map: HashMap<u64, UopId>,

    in_flight: u64,
    last_progress_cycle: u64,
}

impl CxlSim {
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        let dram = Box::new(SimpleDram::new(config.dram_params()));
        Self::with_dram(config, dram)
    }

    /// Build with a custom DRAM timing collaborator.
    pub fn with_dram(config: SimConfig, dram: Box<dyn DramModel>) -> Result<Self, ConfigError> {
        config.validate()?;
        let link = config.link_params();
        let device = config.device_params();
        let clock = ClockPlan::new(config.clock_io, config.clock_dram)?;

        info!(
            lanes = config.pcie_lanes,
            flit_bits = config.pcie_flit_bits,
            cache = config.ndp_cache_enable,
            "cxl interconnect initialized"
        );

        Ok(Self {
            rc: RootComplex::new(&link, config.pcie_insertq_size),
            mxp: MemoryExpander::new(&link, &device, dram),
            clock,
            cycle: 0,
            pools: Pools::new(),
            link_stats: LinkStats::default(),
            dev_stats: DeviceStats::default(),
            shell_stats: ShellStats::default(),
            mem_done_cb: None,
            uop_done_cb: None,
            uop_map: HashMap::new(),
            in_flight: 0,
            last_progress_cycle: 0,
            config,
        })
    }

    pub fn register_mem_callback(&mut self, cb: impl FnMut(u64, bool, u64) + 'static) {
        self.mem_done_cb = Some(Box::new(cb));
    }

    pub fn register_uop_callback(&mut self, cb: impl FnMut(u64, bool, u64) + 'static) {
        self.uop_done_cb = Some(Box::new(cb));
    }

    /// Admit one memory request. `false` is back-pressure from the
    /// admission queue; retry on a later cycle.
    pub fn insert_mem_request(&mut self, addr: u64, write: bool, handle: u64) -> bool {
        if self.rc.is_full() {
            return false;
        }
        debug!(addr, write, "mem request admitted");
        let req = self.pools.alloc_mem_request(addr, write, handle, self.cycle);
        self.rc.insert_request(req);
        self.note_admission();
        self.shell_stats.mem_requests += 1;
        true
    }

    /// Admit one offloaded uop. Sources name earlier uops by unique id;
    /// ids the shell no longer (or never) knows are skipped, matching the
    /// retirement rule that only live older sources gate issue.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_uop_request(
        &mut self,
        handle: u64,
        core_id: u32,
        uop_type: UopKind,
        mem_type: MemKind,
        addr: u64,
        unique_id: u64,
        latency: u64,
        sources: &[(u64, DepKind)],
    ) -> bool {
        if self.rc.is_full() {
            return false;
        }
        debug!(unique_id, ?uop_type, addr, "uop request admitted");

        let mut uop = Uop::new(core_id, unique_id, uop_type, mem_type, addr, latency);
        for &(src_unique, dep) in sources {
            if let Some(&src) = self.uop_map.get(&src_unique) {
                uop.sources.push(SrcInfo {
                    dep,
                    uop: src,
                    unique_id: src_unique,
                });
            }
        }
        let uop_id = self.pools.uops.acquire(uop);
        self.uop_map.insert(unique_id, uop_id);

        let req = self.pools.alloc_uop_request(addr, uop_id, handle, self.cycle);
        self.rc.insert_request(req);
        self.note_admission();
        self.shell_stats.uop_requests += 1;
        true
    }

    /// Advance one IO-clock cycle: tick both endpoints, run the DRAM domain
    /// for however many internal cycles the clock plan schedules, then
    /// deliver finished requests to the driver.
    pub fn tick(&mut self, _pll_locked: bool) {
        self.mxp.run_a_cycle(
            &mut self.rc.link,
            &mut self.pools,
            &mut self.link_stats,
            &mut self.dev_stats,
        );
        self.rc
            .run_a_cycle(&mut self.mxp.link, &mut self.pools, &mut self.link_stats);

        let dram_cycles = self.clock.advance_io_cycle();
        for _ in 0..dram_cycles {
            self.mxp.run_a_cycle_internal(&mut self.pools, &mut self.dev_stats);
        }

        while let Some(req) = self.rc.pop_done() {
            self.request_done(req);
        }
        while let Some(req) = self.mxp.pop_direct_done() {
            self.request_done(req);
        }

        self.cycle += 1;
        self.check_forward_progress();
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight
    }

    pub fn report(&self) -> StatsReport {
        StatsReport::build(
            self.cycle,
            &self.link_stats,
            &self.dev_stats,
            &self.shell_stats,
        )
    }

    /// Flush statistics to the configured output directory.
    pub fn finalize(&self) -> Result<std::path::PathBuf, StatsError> {
        let path = self.report().write(&self.config.stats_out_dir)?;
        info!(path = %path.display(), "statistics written");
        Ok(path)
    }

    fn request_done(&mut self, req: ReqId) {
        let (addr, write, handle, is_uop, uop) = {
            let r = self.pools.reqs.get(req);
            (r.addr, r.write, r.handle, r.is_uop, r.uop)
        };
        debug!(addr, write, is_uop, "request completed");

        if is_uop {
            if let Some(cb) = self.uop_done_cb.as_mut() {
                cb(addr, write, handle);
            }
            self.shell_stats.uop_callbacks += 1;

            let uop_id = uop.expect("uop request without a uop");
            let unique_id = self.pools.uops.get(uop_id).unique_id;
            let mapped = self.uop_map.remove(&unique_id);
            assert_eq!(mapped, Some(uop_id), "uop map out of sync");
            self.pools.uops.get_mut(uop_id).valid = false;
            self.pools.uops.release(uop_id);
        } else {
            if let Some(cb) = self.mem_done_cb.as_mut() {
                cb(addr, write, handle);
            }
            self.shell_stats.mem_callbacks += 1;
        }

        self.pools.reqs.release(req);
        self.in_flight -= 1;
        self.last_progress_cycle = self.cycle;
    }

    fn note_admission(&mut self) {
        self.in_flight += 1;
        if self.in_flight == 1 {
            self.last_progress_cycle = self.cycle;
        }
    }

    /// A stall with requests in flight and nothing completing for a whole
    /// watchdog period is a simulator or configuration bug, not
    /// back-pressure; fail loudly.
    fn check_forward_progress(&self) {
        let period = self.config.forward_progress_period;
        if period == 0 || self.in_flight == 0 {
            return;
        }
        assert!(
            self.cycle - self.last_progress_cycle <= period,
            "forward progress stalled: {} requests in flight, none completed since cycle {} (now {})",
            self.in_flight,
            self.last_progress_cycle,
            self.cycle,
        );
    }
}
