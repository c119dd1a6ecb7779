//! Flit slots: the fixed sub-units a flit is composed of.

use crate::message::{Message, MsgKind};
use crate::pool::MsgId;

/// CXL.mem 68B-flit slot formats. A header slot (`H4`/`H5`) opens a flit;
/// general slots (`G0`/`G4`/`G5`/`G6`) continue it, with `G0` reserved for
/// DATA payload.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SlotKind {
    Invalid,
    H4,
    H5,
    G0,
    G4,
    G5,
    G6,
}

#[derive(Debug)]
pub struct Slot {
    pub uid: u64,
    pub bits: u32,
    pub head: bool,
    pub kind: SlotKind,
    pub msg_cnt: [u8; MsgKind::COUNT],
    pub msgs: Vec<MsgId>,
}

impl Slot {
    pub fn new(uid: u64) -> Self {
        Self {
            uid,
            bits: 0,
            head: false,
            kind: SlotKind::Invalid,
            msg_cnt: [0; MsgKind::COUNT],
            msgs: Vec::new(),
        }
    }

    pub fn push_msg(&mut self, id: MsgId, msg: &Message) {
        self.bits += msg.bits;
        self.msg_cnt[msg.kind.index()] += 1;
        self.msgs.push(id);
    }

    pub fn is_empty(&self) -> bool {
        self.msgs.is_empty()
    }

    pub fn is_data(&self) -> bool {
        self.kind == SlotKind::G0
    }

    /// More than one message type present.
    pub fn multi_kind(&self) -> bool {
        self.msg_cnt.iter().filter(|&&c| c != 0).count() > 1
    }

    /// Derive the slot format from the head flag and message counts. Must be
    /// called once the slot's message set is final.
    pub fn assign_kind(&mut self) {
        let cnt = |kind: MsgKind| self.msg_cnt[kind.index()];
        self.kind = if self.head {
            if cnt(MsgKind::M2sReq) != 0 || cnt(MsgKind::M2sUop) != 0 {
                SlotKind::H5
            } else if cnt(MsgKind::M2sRwd) != 0 {
                SlotKind::H4
            } else if cnt(MsgKind::S2mDrs) != 0 {
                SlotKind::H5
            } else if cnt(MsgKind::S2mNdr) != 0 || cnt(MsgKind::S2mUop) != 0 {
                SlotKind::H4
            } else {
                SlotKind::Invalid
            }
        } else if cnt(MsgKind::M2sReq) != 0 || cnt(MsgKind::M2sUop) != 0 {
            SlotKind::G4
        } else if cnt(MsgKind::M2sRwd) != 0 {
            SlotKind::G5
        } else if cnt(MsgKind::S2mDrs) != 0 && cnt(MsgKind::S2mNdr) != 0 {
            SlotKind::G4
        } else if cnt(MsgKind::S2mNdr) != 0 || cnt(MsgKind::S2mUop) != 0 {
            SlotKind::G5
        } else if cnt(MsgKind::S2mDrs) != 0 {
            SlotKind::G6
        } else if cnt(MsgKind::M2sData) != 0 || cnt(MsgKind::S2mData) != 0 {
            SlotKind::G0
        } else {
            SlotKind::Invalid
        };
    }
}
