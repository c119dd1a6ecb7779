//! Link-layer tuning parameters, resolved once at init from the simulator
//! configuration and shared by both endpoints.

use cxl_packets::MsgKind;

#[derive(Clone, Debug)]
pub struct LinkParams {
    /// Must be a power of two no larger than 16 (validated at init).
    pub lanes: u32,
    /// Per-lane transfer rate in GT/s.
    pub per_lane_bw: f64,
    /// IO-domain clock in GHz.
    pub clock_io: f64,

    pub flit_bits: u32,
    pub slots_per_flit: usize,
    pub max_flit_wait_cycle: u64,
    pub max_msg_per_flit: u16,

    pub txvc_capacity: usize,
    pub rxvc_capacity: usize,
    /// TX flit-output buffer depth (the DLL-facing staging queue).
    pub txdll_capacity: usize,
    pub txreplay_capacity: usize,
    pub replay_bw: usize,
    /// Messages admitted into TX-VC per `start_transaction` call.
    pub txvc_bw: usize,

    pub txtrans_latency: u64,
    pub rxtrans_latency: u64,
    pub txdll_latency: u64,
    pub rxdll_latency: u64,
    pub arbmux_latency: u64,

    pub req_msg_bits: u32,
    pub rwd_msg_bits: u32,
    pub ndr_msg_bits: u32,
    pub drs_msg_bits: u32,
    pub data_msg_bits: u32,
    pub uop_msg_bits: u32,
}

impl LinkParams {
    /// On-the-wire cycles for one flit, excluding the ARB/MUX constant.
    pub fn phys_latency(&self) -> u64 {
        let cycles = f64::from(self.flit_bits) / (f64::from(self.lanes) * self.per_lane_bw)
            * self.clock_io;
        cycles.ceil() as u64
    }

    /// How many in-flight flits the receive side of the physical layer
    /// accepts; grows with lane count (CXL 2.0 physical layer).
    pub fn phys_capacity(&self) -> usize {
        match self.lanes {
            1 | 2 | 4 => 1,
            8 => 2,
            16 => 4,
            other => panic!("pcie lane count must be a power of two <= 16, got {other}"),
        }
    }

    pub fn msg_bits(&self, kind: MsgKind) -> u32 {
        match kind {
            MsgKind::M2sReq => self.req_msg_bits,
            MsgKind::M2sRwd => self.rwd_msg_bits,
            MsgKind::M2sData | MsgKind::S2mData => self.data_msg_bits,
            MsgKind::M2sUop | MsgKind::S2mUop => self.uop_msg_bits,
            MsgKind::S2mNdr => self.ndr_msg_bits,
            MsgKind::S2mDrs => self.drs_msg_bits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(lanes: u32) -> LinkParams {
        LinkParams {
            lanes,
            per_lane_bw: 32.0,
            clock_io: 0.8,
            flit_bits: 544,
            slots_per_flit: 4,
            max_flit_wait_cycle: 0,
            max_msg_per_flit: 4,
            txvc_capacity: 8,
            rxvc_capacity: 8,
            txdll_capacity: 8,
            txreplay_capacity: 8,
            replay_bw: 1,
            txvc_bw: 1,
            txtrans_latency: 1,
            rxtrans_latency: 1,
            txdll_latency: 1,
            rxdll_latency: 1,
            arbmux_latency: 1,
            req_msg_bits: 87,
            rwd_msg_bits: 87,
            ndr_msg_bits: 30,
            drs_msg_bits: 40,
            data_msg_bits: 128,
            uop_msg_bits: 88,
        }
    }

    #[test]
    fn phys_latency_rounds_up_and_scales_with_lanes() {
        // 544 bits over 8 lanes at 32 GT/s and 0.8 GHz: 1.7 cycles -> 2.
        assert_eq!(params(8).phys_latency(), 2);
        // Twice the lanes: 0.85 cycles -> 1.
        assert_eq!(params(16).phys_latency(), 1);
    }

    #[test]
    fn phys_capacity_depends_on_lane_count() {
        assert_eq!(params(4).phys_capacity(), 1);
        assert_eq!(params(8).phys_capacity(), 2);
        assert_eq!(params(16).phys_capacity(), 4);
    }
}
