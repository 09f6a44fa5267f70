//! Stepwise Shared Types
//!
//! This crate provides the program model, protocol constants, error types and
//! the pure execution state machine shared by the sequencer runtime and its
//! device links.

pub mod error;
pub mod events;
pub mod program;
pub mod state_machine;

// Re-export commonly used types at crate root
pub use error::{LinkError, ProgramError, SequenceError, UnknownEventKind};
pub use events::{EventKind, MacroState, MicroState, ProgramEvent};
pub use program::{load_program, parse_program, Command, Program};
pub use state_machine::{DeviceRequest, ProgramStateMachine, TickContext, TickOutput};

/// Program counter value while no program is executing
pub const IDLE_CURSOR: i64 = -1;

/// Device protocol parameters
pub mod protocol {
    /// Tick period of the sequencer driver in milliseconds
    pub const TICK_PERIOD_MS: u64 = 200;

    /// Device property holding the execution status
    pub const STATUS_PROPERTY: &str = "status";

    /// Status reported when the device waits for a new command
    pub const STATUS_STOPPED: &str = "stopped";

    /// Status reported while the device executes a long command
    pub const STATUS_WORKING: &str = "working";

    /// Status reported while a long command is suspended
    pub const STATUS_PAUSED: &str = "paused";

    /// Reply sent by a device that cannot accept a command yet
    pub const REPLY_BUSY: &str = "busy";

    /// Reply sent by a device for an accepted command
    pub const REPLY_OK: &str = "ok";

    /// Device control commands issued by stop/pause/resume
    pub const CMD_STOP: &str = "stop";
    pub const CMD_PAUSE: &str = "pause";
    pub const CMD_RESUME: &str = "resume";
}
