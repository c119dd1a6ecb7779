//! The PCIe/CXL link model: virtual-channel buffers with the flit builder,
//! the replay-backed data-link layer, the serial physical layer, and the
//! root complex that fronts the whole stack for the driver.

mod endpoint;
mod params;
mod rc;
mod stats;
mod vc;

pub use endpoint::LinkPort;
pub use params::LinkParams;
pub use rc::RootComplex;
pub use stats::LinkStats;
pub use vc::VcBuffer;
