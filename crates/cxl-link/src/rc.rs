//! Root complex: admits driver requests into the link and hands finished
//! responses back.

use std::collections::VecDeque;

use cxl_packets::{Pools, ReqId};

use crate::endpoint::LinkPort;
use crate::params::LinkParams;
use crate::stats::LinkStats;

pub struct RootComplex {
    pub link: LinkPort,
    pending: VecDeque<ReqId>,
    pending_cap: usize,
    done: VecDeque<ReqId>,
    txvc_bw: usize,
}

impl RootComplex {
    pub fn new(params: &LinkParams, insertq_size: usize) -> Self {
        Self {
            link: LinkPort::new(true, params),
            pending: VecDeque::new(),
            pending_cap: insertq_size,
            done: VecDeque::new(),
            txvc_bw: params.txvc_bw,
        }
    }

    /// Admission back-pressure signal for the driver API.
    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.pending_cap
    }

    pub fn insert_request(&mut self, req: ReqId) {
        assert!(!self.is_full(), "insert into a full admission queue");
        self.pending.push_back(req);
    }

    pub fn pop_done(&mut self) -> Option<ReqId> {
        self.done.pop_front()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn run_a_cycle(&mut self, peer: &mut LinkPort, pools: &mut Pools, stats: &mut LinkStats) {
        self.end_transaction(pools, stats);
        self.link.run_rx_stages(pools, stats);
        self.link.run_tx_stages(peer, pools, stats);
        self.start_transaction(pools);
        self.link.advance_cycle();
    }

    /// Feed up to `txvc_bw` admitted requests into TX-VC, stopping at the
    /// first back-pressured one to preserve order.
    fn start_transaction(&mut self, pools: &mut Pools) {
        let mut sent = 0;
        while sent < self.txvc_bw {
            let Some(&head) = self.pending.front() else {
                break;
            };
            if !self.link.push_txvc(pools, head) {
                break;
            }
            self.pending.pop_front();
            sent += 1;
        }
    }

    fn end_transaction(&mut self, pools: &mut Pools, stats: &mut LinkStats) {
        while let Some(req) = self.link.pull_rxvc(pools, stats) {
            self.done.push_back(req);
        }
    }
}
