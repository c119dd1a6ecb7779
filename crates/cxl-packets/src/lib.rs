//! Packet hierarchy for the CXL interconnect model: driver requests, uops,
//! transaction-layer messages, flit slots and flits, all stored in slab
//! pools with stable ids.

mod flit;
mod message;
mod pool;
mod request;
mod slot;
mod uop;

pub use flit::Flit;
pub use message::{Channel, Message, MsgKind};
pub use pool::{FlitId, MsgId, Pool, PoolId, ReqId, SlotId, UopId};
pub use request::Request;
pub use slot::{Slot, SlotKind};
pub use uop::{DepKind, ExecUnit, MemKind, SrcInfo, Uop, UopKind};

/// All packet storage, owned by the simulator shell and threaded by
/// reference through the pipeline stages.
#[derive(Default)]
pub struct Pools {
    pub reqs: Pool<Request, ReqId>,
    pub uops: Pool<Uop, UopId>,
    pub msgs: Pool<Message, MsgId>,
    pub slots: Pool<Slot, SlotId>,
    pub flits: Pool<Flit, FlitId>,

    next_req_uid: u64,
    next_msg_uid: u64,
    next_slot_uid: u64,
    next_flit_uid: u64,
}

impl Pools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_mem_request(
        &mut self,
        addr: u64,
        write: bool,
        handle: u64,
        admit_cycle: u64,
    ) -> ReqId {
        self.next_req_uid += 1;
        self.reqs
            .acquire(Request::mem(self.next_req_uid, addr, write, handle, admit_cycle))
    }

    pub fn alloc_uop_request(
        &mut self,
        addr: u64,
        uop: UopId,
        handle: u64,
        admit_cycle: u64,
    ) -> ReqId {
        self.next_req_uid += 1;
        self.reqs
            .acquire(Request::uop(self.next_req_uid, addr, uop, handle, admit_cycle))
    }

    pub fn alloc_message(
        &mut self,
        kind: MsgKind,
        channel: Channel,
        bits: u32,
        req: Option<ReqId>,
    ) -> MsgId {
        self.next_msg_uid += 1;
        self.msgs
            .acquire(Message::new(self.next_msg_uid, kind, channel, bits, req))
    }

    /// Allocate one DATA child of an RWD/DRS parent and link it back.
    pub fn alloc_data_child(&mut self, parent: MsgId, bits: u32) -> MsgId {
        let parent_kind = self.msgs.get(parent).kind;
        debug_assert!(
            matches!(parent_kind, MsgKind::M2sRwd | MsgKind::S2mDrs),
            "data expansion on a message without data: {parent_kind:?}"
        );
        let kind = match parent_kind {
            MsgKind::M2sRwd => MsgKind::M2sData,
            _ => MsgKind::S2mData,
        };
        let child = self.alloc_message(kind, Channel::Data, bits, None);
        self.msgs.get_mut(child).parent = Some(parent);
        child
    }

    pub fn alloc_slot(&mut self) -> SlotId {
        self.next_slot_uid += 1;
        self.slots.acquire(Slot::new(self.next_slot_uid))
    }

    pub fn alloc_flit(&mut self) -> FlitId {
        self.next_flit_uid += 1;
        self.flits.acquire(Flit::new(self.next_flit_uid))
    }

    /// Release a flit together with its slots. The carried messages stay
    /// live; the receiver owns them from here on.
    pub fn release_flit(&mut self, flit: FlitId) {
        let flit = self.flits.release(flit);
        for slot in flit.slots {
            self.slots.release(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn data_children_link_back_to_their_parent() {
        let mut pools = Pools::new();
        let req = pools.alloc_mem_request(0x1000, true, 1, 0);
        let rwd = pools.alloc_message(MsgKind::M2sRwd, Channel::Wd, 87, Some(req));

        let child = pools.alloc_data_child(rwd, 128);
        let child_msg = pools.msgs.get(child);
        assert_eq!(child_msg.kind, MsgKind::M2sData);
        assert_eq!(child_msg.channel, Channel::Data);
        assert!(child_msg.is_data);
        assert_eq!(child_msg.parent, Some(rwd));
    }

    #[test]
    fn slot_kind_follows_head_flag_and_contents() {
        let mut pools = Pools::new();
        let req = pools.alloc_mem_request(0x2000, false, 2, 0);
        let msg = pools.alloc_message(MsgKind::M2sReq, Channel::Wod, 87, Some(req));

        let head_slot = pools.alloc_slot();
        let slot = pools.slots.get_mut(head_slot);
        slot.head = true;
        slot.push_msg(msg, pools.msgs.get(msg));
        slot.assign_kind();
        assert_eq!(pools.slots.get(head_slot).kind, SlotKind::H5);

        let general_slot = pools.alloc_slot();
        let slot = pools.slots.get_mut(general_slot);
        slot.push_msg(msg, pools.msgs.get(msg));
        slot.assign_kind();
        assert_eq!(pools.slots.get(general_slot).kind, SlotKind::G4);
    }

    #[test]
    fn ndr_drs_mix_resolves_to_g4() {
        let mut pools = Pools::new();
        let ndr = pools.alloc_message(MsgKind::S2mNdr, Channel::Wod, 30, None);
        let drs = pools.alloc_message(MsgKind::S2mDrs, Channel::Wd, 40, None);

        let slot_id = pools.alloc_slot();
        let slot = pools.slots.get_mut(slot_id);
        slot.push_msg(ndr, pools.msgs.get(ndr));
        slot.push_msg(drs, pools.msgs.get(drs));
        slot.assign_kind();

        let slot = pools.slots.get(slot_id);
        assert!(slot.multi_kind());
        assert_eq!(slot.kind, SlotKind::G4);
        assert_eq!(slot.bits, 70);
    }

    #[test]
    fn rollover_is_all_data_and_short() {
        let mut pools = Pools::new();
        let req = pools.alloc_mem_request(0x3000, true, 3, 0);
        let rwd = pools.alloc_message(MsgKind::M2sRwd, Channel::Wd, 87, Some(req));

        let flit_id = pools.alloc_flit();
        for _ in 0..2 {
            let child = pools.alloc_data_child(rwd, 128);
            let slot_id = pools.alloc_slot();
            let slot = pools.slots.get_mut(slot_id);
            slot.push_msg(child, pools.msgs.get(child));
            slot.assign_kind();
            assert_eq!(slot.kind, SlotKind::G0);
            pools
                .flits
                .get_mut(flit_id)
                .push_back(slot_id, pools.slots.get(slot_id));
        }

        assert!(pools.flits.get(flit_id).is_rollover(&pools.slots, 4));
        assert!(!pools.flits.get(flit_id).is_rollover(&pools.slots, 2));
    }
}
