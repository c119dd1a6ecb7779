//! Link flits: the fixed-bit payload crossing the physical layer.

use std::collections::VecDeque;

use crate::message::MsgKind;
use crate::pool::{Pool, SlotId};
use crate::slot::Slot;

#[derive(Debug)]
pub struct Flit {
    pub uid: u64,
    /// Sum of the carried messages' bits; the on-the-wire size is the fixed
    /// configured flit width, so this is the "good" bit count.
    pub bits: u32,
    pub phys_sent: bool,
    pub msg_cnt: [u16; MsgKind::COUNT],

    pub replay_insert_start: u64,
    pub replay_insert_done: u64,
    pub phys_start: u64,
    pub phys_done: u64,
    pub rxdll_done: u64,

    pub slots: VecDeque<SlotId>,
}

impl Flit {
    pub fn new(uid: u64) -> Self {
        Self {
            uid,
            bits: 0,
            phys_sent: false,
            msg_cnt: [0; MsgKind::COUNT],
            replay_insert_start: 0,
            replay_insert_done: 0,
            phys_start: 0,
            phys_done: 0,
            rxdll_done: 0,
            slots: VecDeque::new(),
        }
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn push_back(&mut self, id: SlotId, slot: &Slot) {
        self.account(slot);
        self.slots.push_back(id);
    }

    /// Rollover headers are prepended so the header still opens the flit.
    pub fn push_front(&mut self, id: SlotId, slot: &Slot) {
        self.account(slot);
        self.slots.push_front(id);
    }

    fn account(&mut self, slot: &Slot) {
        self.bits += slot.bits;
        for (total, cnt) in self.msg_cnt.iter_mut().zip(slot.msg_cnt.iter()) {
            *total += u16::from(*cnt);
        }
    }

    /// A flit is a rollover target when it holds nothing but DATA slots and
    /// still has room: the next header slot is prepended to it instead of
    /// opening a new flit.
    pub fn is_rollover(&self, slot_pool: &Pool<Slot, SlotId>, slots_per_flit: usize) -> bool {
        if self
            .slots
            .iter()
            .any(|&slot| !slot_pool.get(slot).is_data())
        {
            return false;
        }
        self.num_slots() < slots_per_flit
    }
}
