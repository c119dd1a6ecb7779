//! Root-complex admission queue: back-pressure and paced draining.

use cxl_link::{LinkParams, LinkPort, LinkStats, RootComplex};
use cxl_packets::Pools;

fn params() -> LinkParams {
    LinkParams {
        lanes: 8,
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
        replay_bw: 2,
        // One admission per cycle: the queue drains one entry per tick.
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
fn admission_queue_back_pressures_and_drains_one_per_cycle() {
    let params = params();
    let mut pools = Pools::new();
    let mut rc = RootComplex::new(&params, 2);
    let mut device = LinkPort::new(false, &params);
    let mut stats = LinkStats::default();

    for i in 0..2 {
        assert!(!rc.is_full());
        let req = pools.alloc_mem_request(0x1000 + i * 0x40, false, i, 0);
        rc.insert_request(req);
    }
    assert!(rc.is_full(), "third insert must see back-pressure");
    assert_eq!(rc.pending_len(), 2);

    rc.run_a_cycle(&mut device, &mut pools, &mut stats);
    assert_eq!(rc.pending_len(), 1, "exactly one admission per cycle");
    assert!(!rc.is_full());

    rc.run_a_cycle(&mut device, &mut pools, &mut stats);
    assert_eq!(rc.pending_len(), 0);
}

#[test]
#[should_panic(expected = "full admission queue")]
fn inserting_past_capacity_is_a_bug() {
    let params = params();
    let mut pools = Pools::new();
    let mut rc = RootComplex::new(&params, 1);

    let a = pools.alloc_mem_request(0x1000, false, 0, 0);
    rc.insert_request(a);
    let b = pools.alloc_mem_request(0x2000, false, 1, 0);
    rc.insert_request(b);
}
