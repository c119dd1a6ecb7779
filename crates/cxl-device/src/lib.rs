//! Device-side back-end of the memory expander: cache + MSHR, DRAM timing
//! collaborator, typed execution ports and the offload executor, glued to
//! the link by `MemoryExpander`.

mod cache;
mod dram;
mod executor;
mod mxp;
mod port;
mod stats;

pub use cache::{CacheParams, Mshr, NdpCache};
pub use dram::{DramCompletion, DramModel, DramRequest, SimpleDram, SimpleDramParams};
pub use executor::{ExecutorParams, InflightMap, UopExecutor};
pub use mxp::{DeviceParams, MemoryExpander};
pub use port::{ExecPorts, PortParams};
pub use stats::DeviceStats;
