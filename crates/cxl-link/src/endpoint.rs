//! The per-endpoint link stack: TX/RX virtual channels, the replay-backed
//! data-link layer, and the serial physical layer.
//!
//! Both endpoints run the same stage sequence each cycle; they differ only
//! in how requests enter (`push_txvc`) and leave (`pull_rxvc`) the stack,
//! which the owning root complex or memory expander drives.

use std::collections::VecDeque;

use cxl_packets::{Channel, FlitId, Pools, ReqId};
use tracing::trace;

use crate::params::LinkParams;
use crate::stats::LinkStats;
use crate::vc::VcBuffer;

pub struct LinkPort {
    master: bool,
    cycle: u64,

    pub txvc: VcBuffer,
    pub rxvc: VcBuffer,

    replay: VecDeque<FlitId>,
    replay_cap: usize,
    replay_bw: usize,

    rxphys: VecDeque<FlitId>,
    phys_cap: usize,

    phys_latency: u64,
    arbmux_latency: u64,
    txdll_latency: u64,
    rxdll_latency: u64,
    flit_bits: u32,
    /// Completion cycle of the most recent wire transmission; the next one
    /// may not start earlier.
    prev_txphys_done: u64,
}

impl LinkPort {
    pub fn new(master: bool, params: &LinkParams) -> Self {
        Self {
            master,
            cycle: 0,
            txvc: VcBuffer::new(true, master, params),
            rxvc: VcBuffer::new(false, master, params),
            replay: VecDeque::new(),
            replay_cap: params.txreplay_capacity,
            replay_bw: params.replay_bw,
            rxphys: VecDeque::new(),
            phys_cap: params.phys_capacity(),
            phys_latency: params.phys_latency(),
            arbmux_latency: params.arbmux_latency,
            txdll_latency: params.txdll_latency,
            rxdll_latency: params.rxdll_latency,
            flit_bits: params.flit_bits,
            prev_txphys_done: 0,
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn advance_cycle(&mut self) {
        self.cycle += 1;
    }

    pub fn is_master(&self) -> bool {
        self.master
    }

    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    pub fn rxphys_len(&self) -> usize {
        self.rxphys.len()
    }

    pub fn has_free_rxvc(&self, channel: Channel) -> bool {
        !self.rxvc.is_full(channel)
    }

    pub fn phys_layer_full(&self) -> bool {
        self.rxphys.len() == self.phys_cap
    }

    fn insert_phys(&mut self, flit: FlitId) {
        assert!(!self.phys_layer_full(), "phys rx queue overflow");
        self.rxphys.push_back(flit);
    }

    /// Admit one request into the TX virtual channels. `false` means
    /// back-pressure: the target channel or the flit output buffer is full.
    pub fn push_txvc(&mut self, pools: &mut Pools, req: ReqId) -> bool {
        let channel = VcBuffer::channel_for(self.master, pools.reqs.get(req));
        if self.txvc.is_full(channel) || self.txvc.flit_buffer_full() {
            return false;
        }
        self.txvc.insert(pools, req);
        true
    }

    /// Dispatch the next finished request from RX-VC, draining the channel
    /// with the least free space first.
    pub fn pull_rxvc(&mut self, pools: &mut Pools, stats: &mut LinkStats) -> Option<ReqId> {
        let mut candidates: Vec<(usize, usize)> = Channel::ALL
            .iter()
            .filter(|&&ch| !self.rxvc.is_empty(ch))
            .map(|&ch| (self.rxvc.free_entries(ch), ch.index()))
            .collect();
        candidates.sort_unstable();

        for (_, index) in candidates {
            let channel = Channel::ALL[index];
            let Some(msg_id) = self.rxvc.pull_msg(pools, channel) else {
                continue;
            };
            let msg = pools.msgs.get(msg_id);
            stats.rxtrans_base += 1;
            stats.rxtrans_latency_sum += self.cycle - msg.rxvc_insert_start;
            let req = msg.req.expect("dispatched message without a request");
            pools.msgs.release(msg_id);
            return Some(req);
        }
        None
    }

    /// RX half of the cycle: transaction layer, DLL, physical layer.
    pub fn run_rx_stages(&mut self, pools: &mut Pools, stats: &mut LinkStats) {
        self.process_rxtrans();
        self.process_rxdll();
        self.process_rxphys(pools, stats);
    }

    /// TX half of the cycle: physical layer, DLL, transaction layer.
    pub fn run_tx_stages(&mut self, peer: &mut LinkPort, pools: &mut Pools, stats: &mut LinkStats) {
        self.process_txphys(peer, pools, stats);
        self.process_txdll(peer, pools, stats);
        self.process_txtrans(pools);
    }

    fn process_rxtrans(&mut self) {
        self.rxvc.advance_cycle();
    }

    fn process_rxdll(&mut self) {
        // RX-DLL is pure latency, applied to `rxdll_done` at transmission.
    }

    fn process_rxphys(&mut self, pools: &mut Pools, stats: &mut LinkStats) {
        while let Some(&front) = self.rxphys.front() {
            let flit = pools.flits.get(front);
            if flit.rxdll_done > self.cycle {
                break;
            }
            let phys_latency = flit.phys_done - flit.phys_start;
            let rxdll_latency = self.cycle - flit.phys_done;
            self.rxphys.pop_front();

            stats.flit_base += 1;
            stats.phys_latency_sum += phys_latency;
            stats.rxdll_base += 1;
            stats.rxdll_latency_sum += rxdll_latency;

            self.rxvc.receive_flit(pools, front);
        }
    }

    fn process_txphys(&mut self, peer: &mut LinkPort, pools: &mut Pools, stats: &mut LinkStats) {
        self.refresh_replay_buffer(pools);

        if peer.phys_layer_full() {
            return;
        }
        let pending: Vec<FlitId> = self.replay.iter().copied().collect();
        for flit_id in pending {
            let flit = pools.flits.get(flit_id);
            if flit.phys_sent {
                continue;
            }
            if flit.replay_insert_done > self.cycle {
                break;
            }

            // Transmission is serial: this flit goes on the wire only once
            // the previous one has left it.
            let latency = self.phys_latency + 2 * self.arbmux_latency;
            let start = self.prev_txphys_done.max(self.cycle);
            let done = start + latency;
            self.prev_txphys_done = done;

            let replay_insert_start = flit.replay_insert_start;
            let good_bits = flit.bits;
            let flit = pools.flits.get_mut(flit_id);
            flit.phys_start = start;
            flit.phys_done = done;
            flit.rxdll_done = done + self.rxdll_latency;
            flit.phys_sent = true;
            trace!(flit = flit.uid, start, done, "flit on the wire");

            peer.insert_phys(flit_id);

            stats.txdll_base += 1;
            stats.txdll_latency_sum += self.cycle - replay_insert_start;
            stats.goodput_flit_bits += u64::from(self.flit_bits);
            stats.goodput_good_bits += u64::from(good_bits);
            break;
        }
    }

    fn process_txdll(&mut self, peer: &LinkPort, pools: &mut Pools, stats: &mut LinkStats) {
        let mut moved = 0;
        while self.replay.len() < self.replay_cap && moved < self.replay_bw {
            let Some(flit_id) = self.txvc.peek_flit() else {
                break;
            };
            if !self.peer_credit_ok(peer, pools, flit_id) {
                break;
            }
            self.txvc.pop_flit();

            let flit = pools.flits.get_mut(flit_id);
            flit.replay_insert_start = self.cycle;
            flit.replay_insert_done = self.cycle + self.txdll_latency;

            // TX transaction latency is measured per message when its flit
            // is accepted by the DLL; DATA children are accounted against
            // their parent's admission time.
            let slot_ids: Vec<_> = pools.flits.get(flit_id).slots.iter().copied().collect();
            for slot_id in slot_ids {
                for msg_id in pools.slots.get(slot_id).msgs.clone() {
                    let msg = pools.msgs.get(msg_id);
                    let start = match msg.parent {
                        Some(parent) => pools.msgs.get(parent).txvc_insert_start,
                        None => msg.txvc_insert_start,
                    };
                    stats.txtrans_base += 1;
                    stats.txtrans_latency_sum += self.cycle - start;
                }
            }

            self.replay.push_back(flit_id);
            moved += 1;
        }
    }

    fn process_txtrans(&mut self, pools: &mut Pools) {
        self.txvc.generate_flits(pools);
        self.txvc.advance_cycle();
    }

    /// Flow control: the peer must hold a free RX-VC entry for every
    /// non-data message in the flit. DATA never occupies an RX channel.
    fn peer_credit_ok(&self, peer: &LinkPort, pools: &Pools, flit: FlitId) -> bool {
        pools.flits.get(flit).slots.iter().all(|&slot| {
            pools.slots.get(slot).msgs.iter().all(|&msg| {
                let msg = pools.msgs.get(msg);
                msg.is_data || peer.has_free_rxvc(msg.channel)
            })
        })
    }

    /// Drop flits whose transmission completed; in this abstract model the
    /// peer's reception doubles as the ACK.
    fn refresh_replay_buffer(&mut self, pools: &Pools) {
        while let Some(&front) = self.replay.front() {
            let flit = pools.flits.get(front);
            if flit.phys_sent && flit.phys_done <= self.cycle {
                self.replay.pop_front();
            } else {
                break;
            }
        }
    }
}
