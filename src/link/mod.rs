//! Device links
//!
//! Provides the [`DeviceLink`] seam the sequencer drives and an in-process
//! simulated device used by the demo binary and the tests.

mod sim;
mod traits;

pub use sim::{DeviceStatus, SimConfig, SimulatedDevice};
pub use traits::DeviceLink;
