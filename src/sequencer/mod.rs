//! Sequencer Module
//!
//! Drives a device through a program one command at a time and publishes
//! program, counter and state changes to subscribers.

mod notifier;
mod reply;
mod runner;

pub use notifier::EventNotifier;
pub use runner::{ProgramSequencer, SequencerConfig, Snapshot};
