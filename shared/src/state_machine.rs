//! Program Execution State Machine
//!
//! Advances a program counter through a program, one micro-step per tick.
//! The machine performs no I/O: a tick reads the device through a
//! [`TickContext`] and returns the request to issue and the events to publish.
//! Replies to issued requests are handed back through the context on a later
//! tick, never applied from the completion itself.

use crate::protocol::{REPLY_BUSY, STATUS_STOPPED};
use crate::{
    Command, LinkError, MacroState, MicroState, Program, ProgramEvent, SequenceError, IDLE_CURSOR,
};

/// Device access available to a single tick
pub trait TickContext {
    /// Last known value of the device status property
    fn cached_status(&self) -> Result<String, LinkError>;

    /// Take the buffered outcome of the outstanding request, if it arrived
    fn take_reply(&mut self) -> Option<Result<String, LinkError>>;
}

/// Request the runtime must issue on behalf of the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRequest {
    /// Dispatch a program command
    Command(Command),
    /// Force one fresh read of the status property
    RefreshStatus,
}

/// Result of a single tick
#[derive(Debug, Default)]
pub struct TickOutput {
    /// Events to publish, in emission order
    pub events: Vec<ProgramEvent>,
    /// Request to issue; its outcome is expected back through the context
    pub request: Option<DeviceRequest>,
    /// The tick driver must be cancelled
    pub halt: bool,
}

/// The program execution state machine
#[derive(Debug)]
pub struct ProgramStateMachine {
    program: Program,
    cursor: i64,
    state: MacroState,
    micro_state: MicroState,
    pending_events: Vec<ProgramEvent>,
}

impl Default for ProgramStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramStateMachine {
    /// Create a stopped machine with an empty program
    pub fn new() -> Self {
        Self {
            program: Program::default(),
            cursor: IDLE_CURSOR,
            state: MacroState::Stopped,
            micro_state: MicroState::Stopped,
            pending_events: Vec::new(),
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn state(&self) -> &MacroState {
        &self.state
    }

    pub fn micro_state(&self) -> MicroState {
        self.micro_state
    }

    /// Index of the executing command, -1 when idle
    pub fn program_counter(&self) -> i64 {
        self.cursor
    }

    /// Command the program counter points at
    pub fn current_command(&self) -> Option<&Command> {
        self.program.get(self.cursor)
    }

    /// Replace the stored program, or clear it with `None`
    ///
    /// Execution state is left alone, even while running.
    pub fn set_program(&mut self, program: Option<Program>) -> Vec<ProgramEvent> {
        self.store_program(program.unwrap_or_default());
        self.take_events()
    }

    /// Start executing from the first command
    pub fn run(&mut self, program: Option<Program>) -> Vec<ProgramEvent> {
        if let Some(program) = program {
            self.store_program(program);
        }
        self.set_cursor(0);
        self.set_micro_state(MicroState::NextCmd, None);
        self.set_state(MacroState::Running);
        self.take_events()
    }

    /// Reset to the idle program counter and the stopped state
    pub fn stop(&mut self) -> Vec<ProgramEvent> {
        self.set_cursor(IDLE_CURSOR);
        self.set_micro_state(MicroState::Stopped, None);
        self.set_state(MacroState::Stopped);
        self.take_events()
    }

    /// Suspend a running program; the micro-state and counter are kept
    pub fn pause(&mut self) -> Vec<ProgramEvent> {
        if self.state == MacroState::Running {
            self.set_state(MacroState::Paused);
        }
        self.take_events()
    }

    /// Continue a paused program from its current micro-state
    pub fn resume(&mut self) -> Vec<ProgramEvent> {
        if self.state == MacroState::Paused {
            self.set_state(MacroState::Running);
        }
        self.take_events()
    }

    /// Perform one micro-step
    pub fn tick(&mut self, ctx: &mut impl TickContext) -> TickOutput {
        let mut output = TickOutput::default();

        if self.state != MacroState::Running {
            return output;
        }

        match self.micro_state {
            MicroState::NextCmd => {
                if self.cursor >= self.program.len() as i64 {
                    // Program exhausted
                    output.halt = true;
                    self.set_cursor(IDLE_CURSOR);
                    self.set_micro_state(MicroState::Stopped, None);
                    self.set_state(MacroState::Stopped);
                } else if is_stopped(&ctx.cached_status()) {
                    if let Some(command) = self.current_command().cloned() {
                        self.set_micro_state(MicroState::NextCmdWaitReply, None);
                        self.set_state(MacroState::Running);
                        output.request = Some(DeviceRequest::Command(command));
                    }
                }
                // Otherwise the device is busy with something else; retry next tick
            }
            MicroState::NextCmdWaitReply => match ctx.take_reply() {
                None => {}
                Some(Err(err)) => {
                    let command = self
                        .current_command()
                        .map(|c| c.name.clone())
                        .unwrap_or_default();
                    output.halt = true;
                    self.fail(
                        MicroState::NextCmdReplyError,
                        SequenceError::Command {
                            command,
                            source: err,
                        },
                    );
                }
                Some(Ok(reply)) if reply == REPLY_BUSY => {
                    // Same command again, counter untouched
                    self.set_micro_state(MicroState::NextCmd, None);
                }
                Some(Ok(_)) => {
                    self.set_micro_state(MicroState::GetStatus, None);
                }
            },
            MicroState::GetStatus => {
                // The cached status may predate the command, so read it once directly
                self.set_micro_state(MicroState::GetStatusWaitReply, None);
                output.request = Some(DeviceRequest::RefreshStatus);
            }
            MicroState::GetStatusWaitReply => match ctx.take_reply() {
                None => {}
                Some(Err(err)) => {
                    output.halt = true;
                    self.fail(MicroState::GetStatusError, SequenceError::StatusQuery(err));
                }
                Some(Ok(status)) if status == STATUS_STOPPED => {
                    self.advance();
                }
                Some(Ok(_)) => {
                    // Working or paused: watch the cached property until it settles
                    self.set_micro_state(MicroState::CheckStatusProp, None);
                }
            },
            MicroState::CheckStatusProp => match ctx.cached_status() {
                Err(err) => {
                    output.halt = true;
                    self.fail(
                        MicroState::CheckStatusPropError,
                        SequenceError::CachedStatus(err),
                    );
                }
                Ok(status) if status == STATUS_STOPPED => {
                    self.advance();
                }
                Ok(_) => {}
            },
            MicroState::Stopped
            | MicroState::NextCmdReplyError
            | MicroState::GetStatusError
            | MicroState::CheckStatusPropError => {}
        }

        output.events = self.take_events();
        output
    }

    fn store_program(&mut self, program: Program) {
        self.program = program;
        self.pending_events
            .push(ProgramEvent::Program(self.program.clone()));
    }

    /// Move past a command the device confirmed as finished
    ///
    /// Stepping past the last command is not announced: the end of the
    /// program is announced as the idle counter on the next tick.
    fn advance(&mut self) {
        self.cursor += 1;
        // Counter events for N commands read 0..N-1 then -1, never N
        if self.cursor < self.program.len() as i64 {
            self.pending_events
                .push(ProgramEvent::ProgramCounter(self.cursor));
        }
        self.set_micro_state(MicroState::NextCmd, None);
    }

    fn fail(&mut self, micro_state: MicroState, err: SequenceError) {
        self.set_micro_state(micro_state, Some(err.clone()));
        self.set_state(MacroState::Error(err));
    }

    fn set_cursor(&mut self, cursor: i64) {
        self.cursor = cursor;
        self.pending_events.push(ProgramEvent::ProgramCounter(cursor));
    }

    fn set_micro_state(&mut self, micro_state: MicroState, error: Option<SequenceError>) {
        self.micro_state = micro_state;
        self.pending_events.push(ProgramEvent::MicroState {
            state: micro_state,
            error,
        });
    }

    fn set_state(&mut self, state: MacroState) {
        if self.state != state {
            self.state = state;
            self.pending_events.push(ProgramEvent::State {
                error: self.state.error().cloned(),
                state: self.state.clone(),
            });
        }
    }

    fn take_events(&mut self) -> Vec<ProgramEvent> {
        self.debug_check_states();
        std::mem::take(&mut self.pending_events)
    }

    /// The macro-state and micro-state must agree after every operation
    fn debug_check_states(&self) {
        let micro = self.micro_state;
        match &self.state {
            MacroState::Stopped => debug_assert_eq!(micro, MicroState::Stopped),
            MacroState::Running | MacroState::Paused => debug_assert!(
                micro.is_active(),
                "{} with inactive micro-state {}",
                self.state,
                micro
            ),
            MacroState::Error(_) => debug_assert!(
                micro.is_error(),
                "error state with micro-state {}",
                micro
            ),
        }
    }
}

fn is_stopped(status: &Result<String, LinkError>) -> bool {
    matches!(status, Ok(s) if s == STATUS_STOPPED)
}
