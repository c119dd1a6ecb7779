//! Driver-level requests.

use crate::pool::UopId;

/// One in-flight memory or uop operation, created at admission and released
/// after the driver callback fires. `handle` is an opaque token the
/// embedding driver uses to find its own bookkeeping again.
#[derive(Debug)]
pub struct Request {
    pub uid: u64,
    pub addr: u64,
    pub write: bool,
    pub is_uop: bool,
    pub uop: Option<UopId>,
    pub handle: u64,
    pub admit_cycle: u64,
    /// Cycle the request entered the DRAM model, for latency accounting.
    pub dram_start: u64,
}

impl Request {
    pub fn mem(uid: u64, addr: u64, write: bool, handle: u64, admit_cycle: u64) -> Self {
        Self {
            uid,
            addr,
            write,
            is_uop: false,
            uop: None,
            handle,
            admit_cycle,
            dram_start: 0,
        }
    }

    pub fn uop(uid: u64, addr: u64, uop: UopId, handle: u64, admit_cycle: u64) -> Self {
        Self {
            uid,
            addr,
            write: false,
            is_uop: true,
            uop: Some(uop),
            handle,
            admit_cycle,
            dram_start: 0,
        }
    }
}
