//! Simulator configuration.
//!
//! Field names follow the knob names of the configuration surface; a JSON
//! file with any subset of them overrides the defaults. Unknown keys are a
//! fatal init error.

use std::path::{Path, PathBuf};

use cxl_device::{CacheParams, DeviceParams, ExecutorParams, PortParams, SimpleDramParams};
use cxl_link::LinkParams;
use cxl_packets::{Channel, ExecUnit};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("pcie_lanes must be a power of two no larger than 16, got {0}")]
    BadLaneCount(u32),
    #[error("clock frequency {0} does not scale to an integer with one decimal digit shift")]
    BadFrequency(f64),
    #[error("pcie_vc_cnt must be {expected}, got {got}")]
    BadVcCount { expected: usize, got: usize },
    #[error("ndp_cache_sets must be a power of two, got {0}")]
    BadCacheSets(usize),
    #[error("{0} must be nonzero")]
    ZeroKnob(&'static str),
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    InOrder,
    OutOfOrder,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UnitConfig {
    pub count: usize,
    pub latency: u64,
}

/// Per-unit issue port shape of the offload executor.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortsConfig {
    pub nop: UnitConfig,
    pub iadd: UnitConfig,
    pub imul: UnitConfig,
    pub idiv: UnitConfig,
    pub imisc: UnitConfig,
    pub fadd: UnitConfig,
    pub fmul: UnitConfig,
    pub fdiv: UnitConfig,
    pub fmisc: UnitConfig,
    pub cache: UnitConfig,
}

impl Default for PortsConfig {
    fn default() -> Self {
        let unit = |count, latency| UnitConfig { count, latency };
        Self {
            nop: unit(4, 1),
            iadd: unit(2, 1),
            imul: unit(2, 3),
            idiv: unit(1, 12),
            imisc: unit(2, 1),
            fadd: unit(2, 3),
            fmul: unit(2, 4),
            fdiv: unit(1, 12),
            fmisc: unit(2, 2),
            cache: unit(2, 1),
        }
    }
}

impl PortsConfig {
    fn port_params(&self) -> [PortParams; ExecUnit::COUNT] {
        let param = |unit: &UnitConfig| PortParams {
            count: unit.count,
            latency: unit.latency,
        };
        // Indexed by `ExecUnit`.
        [
            param(&self.nop),
            param(&self.iadd),
            param(&self.imul),
            param(&self.idiv),
            param(&self.imisc),
            param(&self.fadd),
            param(&self.fmul),
            param(&self.fdiv),
            param(&self.fmisc),
            param(&self.cache),
        ]
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// IO (link) clock, GHz.
    pub clock_io: f64,
    /// Device DRAM clock, GHz.
    pub clock_dram: f64,

    pub pcie_lanes: u32,
    /// GT/s per lane.
    pub pcie_per_lane_bw: f64,
    pub pcie_vc_cnt: usize,
    pub pcie_txvc_capacity: usize,
    pub pcie_rxvc_capacity: usize,
    pub pcie_txdll_capacity: usize,
    pub pcie_txreplay_capacity: usize,
    pub pcie_replay_bw: usize,
    pub pcie_txvc_bw: usize,
    pub pcie_insertq_size: usize,

    pub pcie_txtrans_latency: u64,
    pub pcie_rxtrans_latency: u64,
    pub pcie_txdll_latency: u64,
    pub pcie_rxdll_latency: u64,
    pub pcie_arbmux_latency: u64,

    pub pcie_flit_bits: u32,
    pub pcie_slots_per_flit: usize,
    pub pcie_max_flit_wait_cycle: u64,
    pub pcie_max_msg_per_flit: u16,
    pub pcie_data_msg_bits: u32,
    pub pcie_req_msg_bits: u32,
    pub pcie_rwd_msg_bits: u32,
    pub pcie_ndr_msg_bits: u32,
    pub pcie_drs_msg_bits: u32,
    pub pcie_uop_msg_bits: u32,

    /// Address bits below the cache-line / page-frame number.
    pub cacheline_offset_bits: u32,

    pub ndp_cache_enable: bool,
    pub ndp_cache_sets: usize,
    pub ndp_cache_assoc: usize,
    pub ndp_cache_latency: u64,
    pub ndp_mshr_assoc: usize,
    pub ndp_mshr_capacity: usize,
    pub ndp_scheduler: SchedulerKind,
    pub ndp_ports: PortsConfig,
    pub uop_direct_offload: bool,

    /// DRAM-clock cycles.
    pub dram_read_latency: u64,
    pub dram_write_latency: u64,
    pub dram_queue_depth: usize,

    pub stats_out_dir: PathBuf,
    /// Cycles without any request completing while requests are in flight
    /// before the simulation is declared stuck; 0 disables the watchdog.
    pub forward_progress_period: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            clock_io: 0.8,
            clock_dram: 1.2,
            pcie_lanes: 8,
            pcie_per_lane_bw: 32.0,
            pcie_vc_cnt: Channel::COUNT,
            pcie_txvc_capacity: 8,
            pcie_rxvc_capacity: 8,
            pcie_txdll_capacity: 8,
            pcie_txreplay_capacity: 8,
            pcie_replay_bw: 2,
            pcie_txvc_bw: 2,
            pcie_insertq_size: 32,
            pcie_txtrans_latency: 5,
            pcie_rxtrans_latency: 5,
            pcie_txdll_latency: 5,
            pcie_rxdll_latency: 5,
            pcie_arbmux_latency: 2,
            pcie_flit_bits: 544,
            pcie_slots_per_flit: 4,
            pcie_max_flit_wait_cycle: 4,
            pcie_max_msg_per_flit: 4,
            pcie_data_msg_bits: 128,
            pcie_req_msg_bits: 87,
            pcie_rwd_msg_bits: 87,
            pcie_ndr_msg_bits: 30,
            pcie_drs_msg_bits: 40,
            pcie_uop_msg_bits: 88,
            cacheline_offset_bits: 6,
            ndp_cache_enable: true,
            ndp_cache_sets: 64,
            ndp_cache_assoc: 8,
            ndp_cache_latency: 2,
            ndp_mshr_assoc: 8,
            ndp_mshr_capacity: 4,
            ndp_scheduler: SchedulerKind::InOrder,
            ndp_ports: PortsConfig::default(),
            uop_direct_offload: false,
            dram_read_latency: 24,
            dram_write_latency: 16,
            dram_queue_depth: 32,
            stats_out_dir: PathBuf::from("."),
            forward_progress_period: 100_000,
        }
    }
}

impl SimConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Record the fully-applied knob values (file overrides merged with
    /// defaults) next to the statistics, so a run is reproducible from its
    /// output directory alone.
    pub fn write_applied(&self, dir: &Path) -> Result<std::path::PathBuf, ConfigError> {
        let path = dir.join("cxl_params.json");
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.pcie_lanes, 1 | 2 | 4 | 8 | 16) {
            return Err(ConfigError::BadLaneCount(self.pcie_lanes));
        }
        if self.pcie_vc_cnt != Channel::COUNT {
            return Err(ConfigError::BadVcCount {
                expected: Channel::COUNT,
                got: self.pcie_vc_cnt,
            });
        }

        let nonzero: [(&'static str, u64); 10] = [
            ("pcie_slots_per_flit", self.pcie_slots_per_flit as u64),
            ("pcie_flit_bits", u64::from(self.pcie_flit_bits)),
            ("pcie_txvc_capacity", self.pcie_txvc_capacity as u64),
            ("pcie_rxvc_capacity", self.pcie_rxvc_capacity as u64),
            ("pcie_txdll_capacity", self.pcie_txdll_capacity as u64),
            ("pcie_txreplay_capacity", self.pcie_txreplay_capacity as u64),
            ("pcie_replay_bw", self.pcie_replay_bw as u64),
            ("pcie_txvc_bw", self.pcie_txvc_bw as u64),
            ("pcie_insertq_size", self.pcie_insertq_size as u64),
            ("dram_queue_depth", self.dram_queue_depth as u64),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::ZeroKnob(name));
            }
        }

        if self.ndp_cache_enable {
            if !self.ndp_cache_sets.is_power_of_two() {
                return Err(ConfigError::BadCacheSets(self.ndp_cache_sets));
            }
            if self.ndp_cache_assoc == 0 {
                return Err(ConfigError::ZeroKnob("ndp_cache_assoc"));
            }
            if self.ndp_mshr_assoc == 0 {
                return Err(ConfigError::ZeroKnob("ndp_mshr_assoc"));
            }
            if self.ndp_mshr_capacity == 0 {
                return Err(ConfigError::ZeroKnob("ndp_mshr_capacity"));
            }
        }
        Ok(())
    }

    pub fn link_params(&self) -> LinkParams {
        LinkParams {
            lanes: self.pcie_lanes,
            per_lane_bw: self.pcie_per_lane_bw,
            clock_io: self.clock_io,
            flit_bits: self.pcie_flit_bits,
            slots_per_flit: self.pcie_slots_per_flit,
            max_flit_wait_cycle: self.pcie_max_flit_wait_cycle,
            max_msg_per_flit: self.pcie_max_msg_per_flit,
            txvc_capacity: self.pcie_txvc_capacity,
            rxvc_capacity: self.pcie_rxvc_capacity,
            txdll_capacity: self.pcie_txdll_capacity,
            txreplay_capacity: self.pcie_txreplay_capacity,
            replay_bw: self.pcie_replay_bw,
            txvc_bw: self.pcie_txvc_bw,
            txtrans_latency: self.pcie_txtrans_latency,
            rxtrans_latency: self.pcie_rxtrans_latency,
            txdll_latency: self.pcie_txdll_latency,
            rxdll_latency: self.pcie_rxdll_latency,
            arbmux_latency: self.pcie_arbmux_latency,
            req_msg_bits: self.pcie_req_msg_bits,
            rwd_msg_bits: self.pcie_rwd_msg_bits,
            ndr_msg_bits: self.pcie_ndr_msg_bits,
            drs_msg_bits: self.pcie_drs_msg_bits,
            data_msg_bits: self.pcie_data_msg_bits,
            uop_msg_bits: self.pcie_uop_msg_bits,
        }
    }

    pub fn device_params(&self) -> DeviceParams {
        DeviceParams {
            cache: self.ndp_cache_enable.then(|| CacheParams {
                sets: self.ndp_cache_sets,
                assoc: self.ndp_cache_assoc,
                latency: self.ndp_cache_latency,
                mshr_assoc: self.ndp_mshr_assoc,
                mshr_capacity: self.ndp_mshr_capacity,
            }),
            executor: ExecutorParams {
                in_order: self.ndp_scheduler == SchedulerKind::InOrder,
                ports: self.ndp_ports.port_params(),
            },
            uop_direct_offload: self.uop_direct_offload,
            line_offset_bits: self.cacheline_offset_bits,
            txvc_bw: self.pcie_txvc_bw,
        }
    }

    pub fn dram_params(&self) -> SimpleDramParams {
        SimpleDramParams {
            read_latency: self.dram_read_latency,
            write_latency: self.dram_write_latency,
            queue_depth: self.dram_queue_depth,
        }
    }
}
