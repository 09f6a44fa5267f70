//! Execution states and the events emitted when they change

use std::fmt;
use std::str::FromStr;

use crate::{Program, SequenceError, UnknownEventKind};

/// Coarse lifecycle phase of a program
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MacroState {
    #[default]
    Stopped,
    Running,
    Paused,
    /// Halted by a terminal error; only run or stop leave this state
    Error(SequenceError),
}

impl MacroState {
    /// External name of the state
    pub fn name(&self) -> &'static str {
        match self {
            MacroState::Stopped => "stopped",
            MacroState::Running => "running",
            MacroState::Paused => "paused",
            MacroState::Error(_) => "error",
        }
    }

    /// The error carried by the error state
    pub fn error(&self) -> Option<&SequenceError> {
        match self {
            MacroState::Error(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for MacroState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fine-grained phase of the exchange for the current command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MicroState {
    #[default]
    Stopped,
    NextCmd,
    NextCmdWaitReply,
    NextCmdReplyError,
    GetStatus,
    GetStatusWaitReply,
    GetStatusError,
    CheckStatusProp,
    CheckStatusPropError,
}

impl MicroState {
    /// External name of the micro-state
    pub fn name(&self) -> &'static str {
        match self {
            MicroState::Stopped => "stopped",
            MicroState::NextCmd => "next_cmd",
            MicroState::NextCmdWaitReply => "next_cmd_wait_reply",
            MicroState::NextCmdReplyError => "next_cmd_reply_error",
            MicroState::GetStatus => "get_status",
            MicroState::GetStatusWaitReply => "get_status_wait_reply",
            MicroState::GetStatusError => "get_status_error",
            MicroState::CheckStatusProp => "check_status_prop",
            MicroState::CheckStatusPropError => "check_status_prop_error",
        }
    }

    /// States that belong to a running (or paused) program
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            MicroState::NextCmd
                | MicroState::NextCmdWaitReply
                | MicroState::GetStatus
                | MicroState::GetStatusWaitReply
                | MicroState::CheckStatusProp
        )
    }

    /// Terminal error states
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            MicroState::NextCmdReplyError
                | MicroState::GetStatusError
                | MicroState::CheckStatusPropError
        )
    }

    /// States with a device request in flight
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            MicroState::NextCmdWaitReply | MicroState::GetStatusWaitReply
        )
    }
}

impl fmt::Display for MicroState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Notifications published by the sequencer
#[derive(Debug, Clone, PartialEq)]
pub enum ProgramEvent {
    /// The stored program was replaced
    Program(Program),
    /// The program counter was assigned
    ProgramCounter(i64),
    /// The macro-state changed
    State {
        state: MacroState,
        error: Option<SequenceError>,
    },
    /// The micro-state was assigned
    MicroState {
        state: MicroState,
        error: Option<SequenceError>,
    },
}

impl ProgramEvent {
    /// Kind of this event, used for subscription filtering
    pub fn kind(&self) -> EventKind {
        match self {
            ProgramEvent::Program(_) => EventKind::Program,
            ProgramEvent::ProgramCounter(_) => EventKind::ProgramCounter,
            ProgramEvent::State { .. } => EventKind::State,
            ProgramEvent::MicroState { .. } => EventKind::MicroState,
        }
    }
}

/// Independently subscribable event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Program,
    ProgramCounter,
    State,
    MicroState,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Program,
        EventKind::ProgramCounter,
        EventKind::State,
        EventKind::MicroState,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Program => "program",
            EventKind::ProgramCounter => "program_counter",
            EventKind::State => "state",
            EventKind::MicroState => "micro_state",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LinkError;

    #[test]
    fn test_state_names() {
        assert_eq!(MacroState::Running.to_string(), "running");
        assert_eq!(
            MacroState::Error(SequenceError::StatusQuery(LinkError::Dropped)).name(),
            "error"
        );
        assert_eq!(MicroState::GetStatusWaitReply.to_string(), "get_status_wait_reply");
        assert_eq!(MicroState::CheckStatusPropError.name(), "check_status_prop_error");
    }

    #[test]
    fn test_micro_state_classes() {
        assert!(MicroState::NextCmd.is_active());
        assert!(MicroState::CheckStatusProp.is_active());
        assert!(!MicroState::Stopped.is_active());
        assert!(MicroState::GetStatusError.is_error());
        assert!(!MicroState::GetStatus.is_error());
        assert!(MicroState::NextCmdWaitReply.is_waiting());
        assert!(!MicroState::GetStatus.is_waiting());
    }

    #[test]
    fn test_event_kind_parse() {
        for kind in EventKind::ALL {
            assert_eq!(kind.name().parse::<EventKind>(), Ok(kind));
        }
        let err = "cursor".parse::<EventKind>().unwrap_err();
        assert_eq!(err, UnknownEventKind("cursor".into()));
        assert_eq!(err.to_string(), "Unknown event kind 'cursor'");
    }

    #[test]
    fn test_event_kind_of_event() {
        let event = ProgramEvent::MicroState {
            state: MicroState::NextCmd,
            error: None,
        };
        assert_eq!(event.kind(), EventKind::MicroState);
        assert_eq!(ProgramEvent::ProgramCounter(-1).kind(), EventKind::ProgramCounter);
    }
}
