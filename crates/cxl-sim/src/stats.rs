//! Statistics registry and JSON report.

use std::path::{Path, PathBuf};

use cxl_device::DeviceStats;
use cxl_link::LinkStats;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("failed to write statistics file")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize statistics")]
    Serialize(#[from] serde_json::Error),
}

/// Shell-level request accounting.
#[derive(Default, Debug, Clone)]
pub struct ShellStats {
    pub mem_requests: u64,
    pub uop_requests: u64,
    pub mem_callbacks: u64,
    pub uop_callbacks: u64,
}

/// The serialized report: every counter base with its derived average or
/// ratio, mirroring the stat names of the configuration surface.
#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub cycles: u64,

    pub pcie_goodput_base: u64,
    pub pcie_goodput_bits: u64,
    pub pcie_goodput_ratio: f64,

    pub pcie_flit_base: u64,
    pub avg_pcie_phys_latency: f64,

    pub pcie_txtrans_base: u64,
    pub avg_pcie_txtrans_latency: f64,

    pub pcie_txdll_base: u64,
    pub avg_pcie_txdll_latency: f64,

    pub pcie_rxdll_base: u64,
    pub avg_pcie_rxdll_latency: f64,

    pub pcie_rxtrans_base: u64,
    pub avg_pcie_rxtrans_latency: f64,

    pub ndp_cache_hits: u64,
    pub ndp_cache_misses: u64,
    pub ndp_cache_hit_rate: f64,

    pub dram_reads: u64,
    pub dram_writes: u64,
    pub dram_callbacks: u64,

    pub mem_requests: u64,
    pub uop_requests: u64,
    pub mem_callbacks: u64,
    pub uop_callbacks: u64,
}

impl StatsReport {
    pub fn build(
        cycles: u64,
        link: &LinkStats,
        device: &DeviceStats,
        shell: &ShellStats,
    ) -> Self {
        Self {
            cycles,
            pcie_goodput_base: link.goodput_flit_bits,
            pcie_goodput_bits: link.goodput_good_bits,
            pcie_goodput_ratio: link.goodput_ratio(),
            pcie_flit_base: link.flit_base,
            avg_pcie_phys_latency: link.avg_phys_latency(),
            pcie_txtrans_base: link.txtrans_base,
            avg_pcie_txtrans_latency: link.avg_txtrans_latency(),
            pcie_txdll_base: link.txdll_base,
            avg_pcie_txdll_latency: link.avg_txdll_latency(),
            pcie_rxdll_base: link.rxdll_base,
            avg_pcie_rxdll_latency: link.avg_rxdll_latency(),
            pcie_rxtrans_base: link.rxtrans_base,
            avg_pcie_rxtrans_latency: link.avg_rxtrans_latency(),
            ndp_cache_hits: device.cache_hits,
            ndp_cache_misses: device.cache_misses,
            ndp_cache_hit_rate: device.cache_hit_rate(),
            dram_reads: device.dram_reads,
            dram_writes: device.dram_writes,
            dram_callbacks: device.dram_callbacks,
            mem_requests: shell.mem_requests,
            uop_requests: shell.uop_requests,
            mem_callbacks: shell.mem_callbacks,
            uop_callbacks: shell.uop_callbacks,
        }
    }

    /// Write the report as `cxl_stats.json` under `out_dir` and return the
    /// full path.
    pub fn write(&self, out_dir: &Path) -> Result<PathBuf, StatsError> {
        let path = out_dir.join("cxl_stats.json");
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, text)?;
        Ok(path)
    }
}
