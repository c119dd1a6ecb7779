//! Per-stage link counters, shared by both endpoints.
//!
//! Each `*_base` / `*_sum` pair yields an average (or, for goodput, a
//! ratio); the simulator shell folds these into the final report.

#[derive(Default, Debug, Clone)]
pub struct LinkStats {
    /// Wire bits offered per sent flit (the fixed flit width).
    pub goodput_flit_bits: u64,
    /// Message bits actually carried by sent flits.
    pub goodput_good_bits: u64,

    /// Flits fully received (past RX-DLL).
    pub flit_base: u64,
    pub phys_latency_sum: u64,

    /// Messages accepted into the replay buffer.
    pub txtrans_base: u64,
    pub txtrans_latency_sum: u64,

    /// Flits launched onto the wire.
    pub txdll_base: u64,
    pub txdll_latency_sum: u64,

    /// Flits clearing RX-DLL.
    pub rxdll_base: u64,
    pub rxdll_latency_sum: u64,

    /// Messages dispatched from RX-VC.
    pub rxtrans_base: u64,
    pub rxtrans_latency_sum: u64,
}

impl LinkStats {
    pub fn goodput_ratio(&self) -> f64 {
        ratio(self.goodput_good_bits, self.goodput_flit_bits)
    }

    pub fn avg_phys_latency(&self) -> f64 {
        ratio(self.phys_latency_sum, self.flit_base)
    }

    pub fn avg_txtrans_latency(&self) -> f64 {
        ratio(self.txtrans_latency_sum, self.txtrans_base)
    }

    pub fn avg_txdll_latency(&self) -> f64 {
        ratio(self.txdll_latency_sum, self.txdll_base)
    }

    pub fn avg_rxdll_latency(&self) -> f64 {
        ratio(self.rxdll_latency_sum, self.rxdll_base)
    }

    pub fn avg_rxtrans_latency(&self) -> f64 {
        ratio(self.rxtrans_latency_sum, self.rxtrans_base)
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
