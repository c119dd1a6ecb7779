//! Transaction-layer messages and virtual-channel identifiers.

use crate::pool::{MsgId, ReqId};

/// Virtual channels. `Wod`/`Wd` carry requests and responses without/with
/// data, `Data` carries the G0 payload slots of an RWD or DRS, `Uop` carries
/// offloaded-uop traffic.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Channel {
    Wod,
    Wd,
    Data,
    Uop,
}

impl Channel {
    pub const COUNT: usize = 4;

    pub const ALL: [Channel; Channel::COUNT] =
        [Channel::Wod, Channel::Wd, Channel::Data, Channel::Uop];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Message types, named by direction: master-to-subordinate (`M2s`) or
/// subordinate-to-master (`S2m`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MsgKind {
    M2sReq,
    M2sRwd,
    M2sData,
    M2sUop,
    S2mNdr,
    S2mDrs,
    S2mData,
    S2mUop,
}

impl MsgKind {
    pub const COUNT: usize = 8;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_data(self) -> bool {
        matches!(self, MsgKind::M2sData | MsgKind::S2mData)
    }
}

/// One transaction-layer unit. Lives in the message pool from TX-VC
/// admission until the RX side dispatches (or, for DATA, consumes) it.
#[derive(Debug)]
pub struct Message {
    /// Monotonic uid, assigned at acquisition.
    pub uid: u64,
    pub bits: u32,
    pub kind: MsgKind,
    pub channel: Channel,

    /// DATA payload marker. DATA messages carry a parent back-reference and
    /// are returned to the pool as soon as the RX side counts them.
    pub is_data: bool,
    pub parent: Option<MsgId>,
    /// For an RWD/DRS parent: DATA children seen by the receiver so far.
    pub arrived_children: u32,

    pub txvc_insert_start: u64,
    pub txvc_insert_done: u64,
    pub rxvc_insert_start: u64,
    pub rxvc_insert_done: u64,

    /// The driver request this message resulted from. DATA messages have
    /// none; they reach the request through `parent`.
    pub req: Option<ReqId>,
}

impl Message {
    pub fn new(uid: u64, kind: MsgKind, channel: Channel, bits: u32, req: Option<ReqId>) -> Self {
        Self {
            uid,
            bits,
            kind,
            channel,
            is_data: kind.is_data(),
            parent: None,
            arrived_children: 0,
            txvc_insert_start: 0,
            txvc_insert_done: 0,
            rxvc_insert_start: 0,
            rxvc_insert_done: 0,
            req,
        }
    }

    /// Request-with-data or response-with-data; these expand into DATA
    /// children when slotted.
    pub fn is_wdata(&self) -> bool {
        self.channel == Channel::Wd
    }

    pub fn txvc_ready(&self, cycle: u64) -> bool {
        self.txvc_insert_done <= cycle
    }

    pub fn rxvc_ready(&self, cycle: u64) -> bool {
        self.rxvc_insert_done <= cycle
    }

    pub fn child_waiting(&self, slots_per_flit: u32) -> bool {
        self.arrived_children < slots_per_flit
    }
}
