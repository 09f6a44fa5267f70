//! Stepwise
//!
//! Runs programs of device commands against a device that executes one long
//! command at a time, confirming completion of each command through the
//! device's status property before moving on.

pub mod link;
pub mod sequencer;

pub use link::{DeviceLink, DeviceStatus, SimConfig, SimulatedDevice};
pub use sequencer::{EventNotifier, ProgramSequencer, SequencerConfig, Snapshot};
pub use stepwise_shared::{
    load_program, parse_program, protocol, Command, EventKind, LinkError, MacroState, MicroState,
    Program, ProgramError, ProgramEvent, SequenceError, IDLE_CURSOR,
};
