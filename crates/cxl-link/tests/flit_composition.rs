//! Flit-builder composition: header/general slot limits, per-flit limits,
//! data expansion and rollover.

use cxl_link::{LinkParams, VcBuffer};
use cxl_packets::{Channel, MsgKind, Pools, ReqId, SlotKind};
use pretty_assertions::assert_eq;

fn params() -> LinkParams {
    LinkParams {
        lanes: 8,
        per_lane_bw: 32.0,
        clock_io: 0.8,
        flit_bits: 544,
        slots_per_flit: 4,
        max_flit_wait_cycle: 0,
        max_msg_per_flit: 4,
        txvc_capacity: 16,
        rxvc_capacity: 16,
        txdll_capacity: 16,
        txreplay_capacity: 8,
        replay_bw: 2,
        txvc_bw: 2,
        // Zero latency keeps every inserted message immediately ready.
        txtrans_latency: 0,
        rxtrans_latency: 0,
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

fn insert_mem(vc: &mut VcBuffer, pools: &mut Pools, addr: u64, write: bool) -> ReqId {
    let req = pools.alloc_mem_request(addr, write, 0, 0);
    vc.insert(pools, req);
    req
}

/// Pop every queued flit and return (slot kinds, per-kind message counts)
/// per flit.
fn drain_flits(vc: &mut VcBuffer, pools: &Pools) -> Vec<(Vec<SlotKind>, [u16; MsgKind::COUNT])> {
    let mut out = Vec::new();
    while let Some(flit) = vc.peek_flit() {
        vc.pop_flit();
        let flit = pools.flits.get(flit);
        let kinds = flit
            .slots
            .iter()
            .map(|&slot| pools.slots.get(slot).kind)
            .collect();
        out.push((kinds, flit.msg_cnt));
    }
    out
}

#[test]
fn master_mix_respects_slot_and_flit_limits() {
    let mut pools = Pools::new();
    let mut vc = VcBuffer::new(true, true, &params());

    // Three reads and one write, all ready in the same cycle.
    for i in 0..3 {
        insert_mem(&mut vc, &mut pools, 0x1000 + i * 0x40, false);
    }
    insert_mem(&mut vc, &mut pools, 0x4000, true);

    vc.generate_flits(&mut pools);
    let flits = drain_flits(&mut vc, &pools);

    // Flit 0: header REQ, general REQ, general RWD (flit REQ limit is 2,
    // so the third read is left behind), then one DATA slot; the three
    // remaining DATA slots roll into flit 1.
    assert_eq!(flits.len(), 2);
    let (kinds, cnt) = &flits[0];
    assert_eq!(
        kinds.as_slice(),
        &[SlotKind::H5, SlotKind::G4, SlotKind::G5, SlotKind::G0]
    );
    assert_eq!(cnt[MsgKind::M2sReq.index()], 2);
    assert_eq!(cnt[MsgKind::M2sRwd.index()], 1);
    assert_eq!(cnt[MsgKind::M2sData.index()], 1);

    let (kinds, cnt) = &flits[1];
    assert_eq!(
        kinds.as_slice(),
        &[SlotKind::G0, SlotKind::G0, SlotKind::G0]
    );
    assert_eq!(cnt[MsgKind::M2sData.index()], 3);

    // The third read is still queued.
    assert_eq!(vc.channel_len(Channel::Wod), 1);
}

#[test]
fn rollover_flit_takes_the_next_header_in_front() {
    let mut pools = Pools::new();
    let mut vc = VcBuffer::new(true, true, &params());

    // A lone write leaves a rollover flit: one header flit plus a tail
    // holding a single DATA slot.
    insert_mem(&mut vc, &mut pools, 0x4000, true);
    vc.generate_flits(&mut pools);

    // The next read's header slot is prepended to the rollover flit.
    insert_mem(&mut vc, &mut pools, 0x1000, false);
    vc.generate_flits(&mut pools);

    let flits = drain_flits(&mut vc, &pools);
    assert_eq!(flits.len(), 2);
    assert_eq!(
        flits[0].0.as_slice(),
        &[SlotKind::H4, SlotKind::G0, SlotKind::G0, SlotKind::G0]
    );
    assert_eq!(
        flits[1].0.as_slice(),
        &[SlotKind::H5, SlotKind::G0],
        "header must open the rollover flit"
    );
}

#[test]
fn device_responses_pack_ndr_and_drs_within_limits() {
    let mut pools = Pools::new();
    let mut vc = VcBuffer::new(true, false, &params());

    // Two write responses (NDR) and two read responses (DRS).
    insert_mem(&mut vc, &mut pools, 0x1000, true);
    insert_mem(&mut vc, &mut pools, 0x2000, true);
    insert_mem(&mut vc, &mut pools, 0x3000, false);
    insert_mem(&mut vc, &mut pools, 0x4000, false);

    vc.generate_flits(&mut pools);
    let flits = drain_flits(&mut vc, &pools);

    // Header: both NDR (same type, limit 2). One general slot takes both
    // DRS; the 8 DATA children need 2 slots here, 4 in the next flit and
    // 2 in a rollover tail.
    assert_eq!(flits.len(), 3);
    let (kinds, cnt) = &flits[0];
    assert_eq!(kinds[0], SlotKind::H4);
    assert_eq!(cnt[MsgKind::S2mNdr.index()], 2);
    assert_eq!(cnt[MsgKind::S2mDrs.index()], 2);
    assert_eq!(cnt[MsgKind::S2mData.index()], 2);
    assert_eq!(flits[1].1[MsgKind::S2mData.index()], 4);
    assert_eq!(flits[2].1[MsgKind::S2mData.index()], 2);
}

#[test]
fn rwd_is_not_dispatched_until_every_data_child_arrived() {
    let params = params();
    let mut pools = Pools::new();
    let mut tx = VcBuffer::new(true, true, &params);
    let mut rx = VcBuffer::new(false, false, &params);

    let req = insert_mem(&mut tx, &mut pools, 0x4000, true);
    tx.generate_flits(&mut pools);

    // First flit: RWD header plus three of its four DATA children.
    let first = tx.peek_flit().expect("header flit");
    tx.pop_flit();
    rx.receive_flit(&mut pools, first);

    assert!(
        rx.pull_msg(&pools, Channel::Wd).is_none(),
        "three children are not enough"
    );

    // The rollover flit delivers the fourth child.
    let second = tx.peek_flit().expect("rollover flit");
    tx.pop_flit();
    rx.receive_flit(&mut pools, second);

    let msg = rx.pull_msg(&pools, Channel::Wd).expect("all children arrived");
    assert_eq!(pools.msgs.get(msg).req, Some(req));
    assert_eq!(pools.msgs.get(msg).arrived_children, 4);
}

#[test]
fn composition_limits_hold_under_sustained_load() {
    let mut pools = Pools::new();
    let mut vc = VcBuffer::new(true, false, &params());

    let hslot_limit = |kind: MsgKind| match kind {
        MsgKind::M2sReq | MsgKind::M2sRwd | MsgKind::M2sUop => 1,
        MsgKind::S2mDrs | MsgKind::S2mNdr | MsgKind::S2mUop => 2,
        _ => 0,
    };
    let flit_limit = |kind: MsgKind| match kind {
        MsgKind::M2sReq | MsgKind::M2sUop | MsgKind::S2mNdr | MsgKind::S2mUop => 2,
        MsgKind::M2sRwd => 1,
        MsgKind::S2mDrs => 3,
        _ => u16::MAX,
    };

    let mut flit_count = 0;
    for round in 0..32u64 {
        // Alternate bursts of responses with and without data.
        for i in 0..3 {
            insert_mem(&mut vc, &mut pools, (round * 8 + i) * 0x40, round % 2 == 0);
        }
        vc.generate_flits(&mut pools);

        while let Some(flit_id) = vc.peek_flit() {
            vc.pop_flit();
            let flit = pools.flits.get(flit_id);
            flit_count += 1;

            assert!(flit.num_slots() <= 4);
            for kind in [
                MsgKind::S2mNdr,
                MsgKind::S2mDrs,
                MsgKind::M2sReq,
                MsgKind::M2sRwd,
            ] {
                assert!(
                    flit.msg_cnt[kind.index()] <= flit_limit(kind),
                    "flit limit exceeded for {kind:?}"
                );
            }

            for (pos, &slot_id) in flit.slots.iter().enumerate() {
                let slot = pools.slots.get(slot_id);
                if pos == 0 && slot.head {
                    // Header slots hold exactly one message type.
                    assert!(!slot.multi_kind(), "mixed header slot");
                    for kind in [MsgKind::S2mNdr, MsgKind::S2mDrs] {
                        assert!(slot.msg_cnt[kind.index()] <= hslot_limit(kind));
                    }
                }
                if slot.kind == SlotKind::G0 {
                    assert_eq!(slot.msgs.len(), 1, "data slots carry one DATA message");
                }
            }
        }
    }
    assert!(flit_count > 0);
}
