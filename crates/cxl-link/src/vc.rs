//! Virtual-channel buffers and the flit builder.
//!
//! One `VcBuffer` instance serves either the TX or the RX side of an
//! endpoint. On TX it collects ready messages and packs them into flits
//! under the CXL.mem 68B composition rules (header-slot, general-slot and
//! per-flit message limits, data-slot expansion, rollover). On RX it holds
//! received messages until the transaction layer pulls them.

use std::collections::VecDeque;

use cxl_packets::{Channel, FlitId, MsgId, MsgKind, Pools, ReqId, Request, SlotId};
use tracing::trace;

use crate::params::LinkParams;

pub struct VcBuffer {
    is_tx: bool,
    master: bool,
    cycle: u64,

    channel_cap: usize,
    channel_cnt: [usize; Channel::COUNT],
    msgs: VecDeque<MsgId>,

    /// TX flit-output buffer (unused on RX).
    flits: VecDeque<FlitId>,
    flit_cap: usize,

    slots_per_flit: usize,
    max_flit_wait_cycle: u64,
    max_msg_per_flit: u16,
    trans_latency: u64,
    data_msg_bits: u32,
    msg_bits: [u32; MsgKind::COUNT],

    hslot_limit: [u8; MsgKind::COUNT],
    gslot_limit: [u8; MsgKind::COUNT],
    flit_limit: [u16; MsgKind::COUNT],
}

impl VcBuffer {
    pub fn new(is_tx: bool, master: bool, params: &LinkParams) -> Self {
        let mut msg_bits = [0u32; MsgKind::COUNT];
        let mut hslot_limit = [0u8; MsgKind::COUNT];
        let mut gslot_limit = [0u8; MsgKind::COUNT];
        let mut flit_limit = [0u16; MsgKind::COUNT];

        for kind in [
            MsgKind::M2sReq,
            MsgKind::M2sRwd,
            MsgKind::M2sData,
            MsgKind::M2sUop,
            MsgKind::S2mNdr,
            MsgKind::S2mDrs,
            MsgKind::S2mData,
            MsgKind::S2mUop,
        ] {
            msg_bits[kind.index()] = params.msg_bits(kind);
        }

        // CXL.mem 68B flit composition limits. UOP traffic packs like its
        // same-direction request class: M2S like REQ, S2M like NDR.
        hslot_limit[MsgKind::M2sReq.index()] = 1;
        hslot_limit[MsgKind::M2sRwd.index()] = 1;
        hslot_limit[MsgKind::M2sUop.index()] = 1;
        hslot_limit[MsgKind::S2mDrs.index()] = 2;
        hslot_limit[MsgKind::S2mNdr.index()] = 2;
        hslot_limit[MsgKind::S2mUop.index()] = 2;

        gslot_limit[MsgKind::M2sReq.index()] = 1;
        gslot_limit[MsgKind::M2sRwd.index()] = 1;
        gslot_limit[MsgKind::M2sUop.index()] = 1;
        gslot_limit[MsgKind::S2mDrs.index()] = 2;
        gslot_limit[MsgKind::S2mNdr.index()] = 2;
        gslot_limit[MsgKind::S2mUop.index()] = 2;

        flit_limit[MsgKind::M2sReq.index()] = 2;
        flit_limit[MsgKind::M2sRwd.index()] = 1;
        flit_limit[MsgKind::M2sUop.index()] = 2;
        flit_limit[MsgKind::S2mDrs.index()] = 3;
        flit_limit[MsgKind::S2mNdr.index()] = 2;
        flit_limit[MsgKind::S2mUop.index()] = 2;

        Self {
            is_tx,
            master,
            cycle: 0,
            channel_cap: if is_tx {
                params.txvc_capacity
            } else {
                params.rxvc_capacity
            },
            channel_cnt: [0; Channel::COUNT],
            msgs: VecDeque::new(),
            flits: VecDeque::new(),
            flit_cap: params.txdll_capacity,
            slots_per_flit: params.slots_per_flit,
            max_flit_wait_cycle: params.max_flit_wait_cycle,
            max_msg_per_flit: params.max_msg_per_flit,
            trans_latency: if is_tx {
                params.txtrans_latency
            } else {
                params.rxtrans_latency
            },
            data_msg_bits: params.data_msg_bits,
            msg_bits,
            hslot_limit,
            gslot_limit,
            flit_limit,
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn advance_cycle(&mut self) {
        self.cycle += 1;
    }

    pub fn is_full(&self, channel: Channel) -> bool {
        self.channel_cnt[channel.index()] >= self.channel_cap
    }

    pub fn is_empty(&self, channel: Channel) -> bool {
        self.channel_cnt[channel.index()] == 0
    }

    /// Saturating: a flit carrying several messages for one channel may
    /// transiently oversubscribe it, since the sender's credit check is
    /// per-message.
    pub fn free_entries(&self, channel: Channel) -> usize {
        self.channel_cap
            .saturating_sub(self.channel_cnt[channel.index()])
    }

    pub fn channel_len(&self, channel: Channel) -> usize {
        self.channel_cnt[channel.index()]
    }

    /// Channel selection is role-dependent: the master's writes carry data
    /// (RWD), while on the device side it is the *read* response that does
    /// (DRS).
    pub fn channel_for(master: bool, req: &Request) -> Channel {
        if req.is_uop {
            Channel::Uop
        } else if req.write == master {
            Channel::Wd
        } else {
            Channel::Wod
        }
    }

    fn msg_kind_for(&self, channel: Channel) -> MsgKind {
        match (self.master, channel) {
            (true, Channel::Wod) => MsgKind::M2sReq,
            (true, Channel::Wd) => MsgKind::M2sRwd,
            (true, Channel::Data) => MsgKind::M2sData,
            (true, Channel::Uop) => MsgKind::M2sUop,
            (false, Channel::Wod) => MsgKind::S2mNdr,
            (false, Channel::Wd) => MsgKind::S2mDrs,
            (false, Channel::Data) => MsgKind::S2mData,
            (false, Channel::Uop) => MsgKind::S2mUop,
        }
    }

    /// Admit a request into its channel. Capacity must have been checked by
    /// the caller (`push_txvc`).
    pub fn insert(&mut self, pools: &mut Pools, req_id: ReqId) {
        let req = pools.reqs.get(req_id);
        let channel = Self::channel_for(self.master, req);
        debug_assert!(!self.is_full(channel));
        let kind = self.msg_kind_for(channel);
        let msg = pools.alloc_message(kind, channel, self.msg_bits[kind.index()], Some(req_id));
        self.insert_channel(pools, msg);
    }

    fn insert_channel(&mut self, pools: &mut Pools, msg_id: MsgId) {
        let msg = pools.msgs.get_mut(msg_id);
        self.channel_cnt[msg.channel.index()] += 1;
        if self.is_tx {
            msg.txvc_insert_start = self.cycle;
            msg.txvc_insert_done = self.cycle + self.trans_latency;
        } else {
            msg.rxvc_insert_start = self.cycle;
            msg.rxvc_insert_done = self.cycle + self.trans_latency;
        }
        self.msgs.push_back(msg_id);
    }

    fn remove_msg(&mut self, pools: &Pools, msg_id: MsgId) {
        let channel = pools.msgs.get(msg_id).channel;
        debug_assert!(self.channel_cnt[channel.index()] > 0);
        self.channel_cnt[channel.index()] -= 1;
        let pos = self
            .msgs
            .iter()
            .position(|&m| m == msg_id)
            .expect("message not queued in this buffer");
        self.msgs.remove(pos);
    }

    pub fn flit_buffer_full(&self) -> bool {
        self.flits.len() >= self.flit_cap
    }

    pub fn peek_flit(&self) -> Option<FlitId> {
        self.flits.front().copied()
    }

    pub fn pop_flit(&mut self) -> FlitId {
        self.flits.pop_front().expect("pop from an empty flit buffer")
    }

    /// Oldest dispatchable message in `channel`: insertion latency elapsed
    /// and, for an RWD/DRS parent, all DATA children arrived.
    pub fn pull_msg(&mut self, pools: &Pools, channel: Channel) -> Option<MsgId> {
        debug_assert!(!self.is_tx);
        let spf = self.slots_per_flit as u32;
        let found = self.msgs.iter().copied().find(|&m| {
            let msg = pools.msgs.get(m);
            msg.channel == channel
                && msg.rxvc_ready(self.cycle)
                && !(msg.is_wdata() && msg.child_waiting(spf))
        })?;
        self.remove_msg(pools, found);
        Some(found)
    }

    /// Unpack an arriving flit: DATA messages credit their parent and go
    /// back to the pool, everything else enters its RX channel. The sender
    /// verified credits before launching the flit.
    pub fn receive_flit(&mut self, pools: &mut Pools, flit_id: FlitId) {
        debug_assert!(!self.is_tx);
        let slot_ids: Vec<SlotId> = pools.flits.get(flit_id).slots.iter().copied().collect();
        for slot_id in slot_ids {
            let msg_ids = pools.slots.get(slot_id).msgs.clone();
            for msg_id in msg_ids {
                if pools.msgs.get(msg_id).is_data {
                    let parent = pools
                        .msgs
                        .get(msg_id)
                        .parent
                        .expect("DATA message without a parent");
                    pools.msgs.get_mut(parent).arrived_children += 1;
                    pools.msgs.release(msg_id);
                } else {
                    self.insert_channel(pools, msg_id);
                }
            }
        }
        pools.release_flit(flit_id);
    }

    /// One TX cycle of the flit builder.
    pub fn generate_flits(&mut self, pools: &mut Pools) {
        debug_assert!(self.is_tx);
        let mut ready: Vec<MsgId> = self
            .msgs
            .iter()
            .copied()
            .filter(|&m| pools.msgs.get(m).txvc_ready(self.cycle))
            .collect();
        if ready.is_empty() {
            return;
        }

        match self.flits.back().copied() {
            // Empty output buffer: try to open a fresh flit.
            None => self.generate_new_flit(pools, &mut ready),
            Some(tail) => {
                if pools
                    .flits
                    .get(tail)
                    .is_rollover(&pools.slots, self.slots_per_flit)
                {
                    // Data rollover: the header goes in front of the tail
                    // flit; its data expansion still appends behind.
                    if let Some(hslot) = self.generate_hslot(pools, &mut ready) {
                        pools
                            .flits
                            .get_mut(tail)
                            .push_front(hslot, pools.slots.get(hslot));
                        self.expand_data(pools, tail, &[hslot]);
                    }
                } else if pools.flits.get(tail).num_slots() < self.slots_per_flit {
                    if let Some(gslot) = self.generate_gslot(pools, &mut ready, tail) {
                        pools
                            .flits
                            .get_mut(tail)
                            .push_back(gslot, pools.slots.get(gslot));
                        self.expand_data(pools, tail, &[gslot]);
                    }
                } else {
                    self.generate_new_flit(pools, &mut ready);
                }
            }
        }
    }

    fn generate_new_flit(&mut self, pools: &mut Pools, ready: &mut Vec<MsgId>) {
        let Some(hslot) = self.generate_hslot(pools, ready) else {
            return;
        };
        let flit = pools.alloc_flit();
        pools
            .flits
            .get_mut(flit)
            .push_back(hslot, pools.slots.get(hslot));

        for _ in 0..self.slots_per_flit - 1 {
            if ready.is_empty() {
                break;
            }
            if let Some(gslot) = self.generate_gslot(pools, ready, flit) {
                pools
                    .flits
                    .get_mut(flit)
                    .push_back(gslot, pools.slots.get(gslot));
            }
        }

        self.flits.push_back(flit);
        trace!(flit = pools.flits.get(flit).uid, slots = pools.flits.get(flit).num_slots(), "flit opened");

        let slots: Vec<SlotId> = pools.flits.get(flit).slots.iter().copied().collect();
        self.expand_data(pools, flit, &slots);
    }

    /// Build a header slot from the ready set. Gated on the oldest
    /// candidate's wait time; header slots hold a single message type.
    fn generate_hslot(&mut self, pools: &mut Pools, ready: &mut Vec<MsgId>) -> Option<SlotId> {
        debug_assert!(!ready.is_empty());
        let oldest = pools.msgs.get(ready[0]);
        if self.cycle.saturating_sub(oldest.txvc_insert_done) < self.max_flit_wait_cycle {
            return None;
        }

        let mut slot: Option<SlotId> = None;
        let mut taken: Vec<MsgId> = Vec::new();
        for &msg in ready.iter() {
            if !self.header_admits(pools, slot, msg) {
                continue;
            }
            let slot_id = match slot {
                Some(s) => s,
                None => {
                    let s = pools.alloc_slot();
                    pools.slots.get_mut(s).head = true;
                    slot = Some(s);
                    s
                }
            };
            pools
                .slots
                .get_mut(slot_id)
                .push_msg(msg, pools.msgs.get(msg));
            taken.push(msg);
        }

        if let Some(s) = slot {
            pools.slots.get_mut(s).assign_kind();
        }
        for msg in taken {
            ready.retain(|&m| m != msg);
            self.remove_msg(pools, msg);
        }
        slot
    }

    fn generate_gslot(
        &mut self,
        pools: &mut Pools,
        ready: &mut Vec<MsgId>,
        flit: FlitId,
    ) -> Option<SlotId> {
        let mut slot: Option<SlotId> = None;
        let mut taken: Vec<MsgId> = Vec::new();
        for &msg in ready.iter() {
            if !self.general_admits(pools, slot, msg, flit) {
                continue;
            }
            let slot_id = match slot {
                Some(s) => s,
                None => {
                    let s = pools.alloc_slot();
                    slot = Some(s);
                    s
                }
            };
            pools
                .slots
                .get_mut(slot_id)
                .push_msg(msg, pools.msgs.get(msg));
            taken.push(msg);
        }

        if let Some(s) = slot {
            pools.slots.get_mut(s).assign_kind();
        }
        for msg in taken {
            ready.retain(|&m| m != msg);
            self.remove_msg(pools, msg);
        }
        slot
    }

    fn header_admits(&self, pools: &Pools, slot: Option<SlotId>, msg: MsgId) -> bool {
        let kind = pools.msgs.get(msg).kind;
        let slot = match slot {
            None => return true,
            Some(s) => pools.slots.get(s),
        };
        if slot.is_empty() {
            return true;
        }
        if slot.msg_cnt[kind.index()] != 0 {
            slot.msg_cnt[kind.index()] < self.hslot_limit[kind.index()]
        } else {
            // Header slots never mix message types.
            false
        }
    }

    fn general_admits(&self, pools: &Pools, slot: Option<SlotId>, msg: MsgId, flit: FlitId) -> bool {
        let kind = pools.msgs.get(msg).kind;
        let flit = pools.flits.get(flit);
        let non_data: u16 = flit.msg_cnt.iter().sum::<u16>()
            - flit.msg_cnt[MsgKind::M2sData.index()]
            - flit.msg_cnt[MsgKind::S2mData.index()];
        let flit_ok = flit.msg_cnt[kind.index()] < self.flit_limit[kind.index()]
            && non_data < self.max_msg_per_flit;

        let slot_ok = match slot {
            None => true,
            Some(s) => {
                let slot = pools.slots.get(s);
                if slot.is_empty() {
                    true
                } else if slot.multi_kind() || slot.msg_cnt[kind.index()] == 0 {
                    // Only specific NDR/DRS combinations may share a slot.
                    let ndr = slot.msg_cnt[MsgKind::S2mNdr.index()];
                    let drs = slot.msg_cnt[MsgKind::S2mDrs.index()];
                    match kind {
                        MsgKind::S2mNdr => drs < 2 && ndr < 2,
                        MsgKind::S2mDrs => drs < 1 && ndr < 3,
                        _ => false,
                    }
                } else {
                    slot.msg_cnt[kind.index()] < self.gslot_limit[kind.index()]
                }
            }
        };
        slot_ok && flit_ok
    }

    /// Expand every request/response-with-data in `slots` into
    /// `slots_per_flit` DATA children, appended as G0 slots to `flit` and
    /// spilling into fresh flits once it fills up.
    fn expand_data(&mut self, pools: &mut Pools, flit: FlitId, slots: &[SlotId]) {
        let mut data_slots: Vec<SlotId> = Vec::new();
        for &slot in slots {
            let parents: Vec<MsgId> = pools
                .slots
                .get(slot)
                .msgs
                .iter()
                .copied()
                .filter(|&m| pools.msgs.get(m).is_wdata())
                .collect();
            for parent in parents {
                for _ in 0..self.slots_per_flit {
                    let child = pools.alloc_data_child(parent, self.data_msg_bits);
                    let data_slot = pools.alloc_slot();
                    pools
                        .slots
                        .get_mut(data_slot)
                        .push_msg(child, pools.msgs.get(child));
                    pools.slots.get_mut(data_slot).assign_kind();
                    data_slots.push(data_slot);
                }
            }
        }

        let mut spill: Option<FlitId> = None;
        for data_slot in data_slots {
            if spill.is_none() && pools.flits.get(flit).num_slots() < self.slots_per_flit {
                pools
                    .flits
                    .get_mut(flit)
                    .push_back(data_slot, pools.slots.get(data_slot));
                continue;
            }
            let target = match spill {
                Some(f) => f,
                None => {
                    let f = pools.alloc_flit();
                    spill = Some(f);
                    f
                }
            };
            pools
                .flits
                .get_mut(target)
                .push_back(data_slot, pools.slots.get(data_slot));
            if pools.flits.get(target).num_slots() == self.slots_per_flit {
                self.flits.push_back(target);
                spill = None;
            }
        }
        if let Some(f) = spill {
            self.flits.push_back(f);
        }
    }
}
