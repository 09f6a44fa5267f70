//! Program sequencer - drives a device through a program
//!
//! Owns the execution state machine and a periodic tick driver. Control calls
//! and ticks run under one lock, so state changes never interleave. Device
//! requests run as detached tasks whose outcomes go through the reply slot.

use std::sync::{Arc, Weak};

use stepwise_shared::protocol::{CMD_PAUSE, CMD_RESUME, CMD_STOP, STATUS_PROPERTY, TICK_PERIOD_MS};
use stepwise_shared::{
    DeviceRequest, EventKind, LinkError, MacroState, MicroState, Program, ProgramEvent,
    ProgramStateMachine, TickContext,
};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::notifier::EventNotifier;
use super::reply::{ReplySender, ReplySlot};
use crate::link::DeviceLink;

/// Configuration for the program sequencer
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Fixed period of the tick driver
    pub tick_period: Duration,
    /// Device property that reports execution status
    pub status_property: String,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(TICK_PERIOD_MS),
            status_property: STATUS_PROPERTY.into(),
        }
    }
}

/// Consistent view of the execution state
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub program_len: usize,
    pub program_counter: i64,
    pub state: MacroState,
    pub micro_state: MicroState,
}

/// Runs programs against a device, one command at a time
#[derive(Clone)]
pub struct ProgramSequencer {
    inner: Arc<Inner>,
}

struct Inner {
    link: Arc<dyn DeviceLink>,
    config: SequencerConfig,
    notifier: EventNotifier,
    core: Mutex<Core>,
}

struct Core {
    machine: ProgramStateMachine,
    replies: ReplySlot,
    /// Bumped by run and stop; replies from older sessions are dropped
    session: u64,
    /// Bumped whenever the driver starts or stops; stale ticks are ignored
    generation: u64,
    driver: Option<JoinHandle<()>>,
}

/// Tick access to the link and the reply slot
struct LinkContext<'a> {
    link: &'a dyn DeviceLink,
    status_property: &'a str,
    replies: &'a mut ReplySlot,
    session: u64,
}

impl TickContext for LinkContext<'_> {
    fn cached_status(&self) -> Result<String, LinkError> {
        self.link.cached_property(self.status_property)
    }

    fn take_reply(&mut self) -> Option<Result<String, LinkError>> {
        self.replies.take(self.session)
    }
}

impl ProgramSequencer {
    /// Create a sequencer with its own event notifier
    pub fn new(link: Arc<dyn DeviceLink>, config: SequencerConfig) -> Self {
        Self::with_notifier(link, config, EventNotifier::new())
    }

    /// Create a sequencer publishing through the given notifier
    pub fn with_notifier(
        link: Arc<dyn DeviceLink>,
        config: SequencerConfig,
        notifier: EventNotifier,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                link,
                config,
                notifier,
                core: Mutex::new(Core {
                    machine: ProgramStateMachine::new(),
                    replies: ReplySlot::new(),
                    session: 0,
                    generation: 0,
                    driver: None,
                }),
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &SequencerConfig {
        &self.inner.config
    }

    pub fn notifier(&self) -> &EventNotifier {
        &self.inner.notifier
    }

    /// Receive events of a single kind
    pub fn subscribe(&self, kind: EventKind) -> mpsc::UnboundedReceiver<ProgramEvent> {
        self.inner.notifier.subscribe(kind)
    }

    /// Receive events of every kind
    pub fn subscribe_all(&self) -> mpsc::UnboundedReceiver<ProgramEvent> {
        self.inner.notifier.subscribe_all()
    }

    /// Replace the stored program without touching execution state
    pub async fn set_program(&self, program: Option<Program>) {
        let mut core = self.inner.core.lock().await;
        if core.machine.state() == &MacroState::Running {
            warn!("[SEQ] Program replaced while running");
        }
        let events = core.machine.set_program(program);
        self.inner.publish(events);
    }

    /// Start the program from its first command, replacing it first if given
    pub async fn run(&self, program: Option<Program>) {
        let mut core = self.inner.core.lock().await;
        if core.machine.state() == &MacroState::Running {
            warn!("[SEQ] Run requested while running, restarting from the first command");
        }

        self.inner.cancel_driver(&mut core);
        core.session += 1;
        core.replies.clear();

        let events = core.machine.run(program);
        info!(
            "[SEQ] Running program of {} commands ({} subscribers)",
            core.machine.program().len(),
            self.inner.notifier.subscriber_count()
        );
        self.inner.publish(events);
        self.inner.start_driver(&mut core);
    }

    /// Stop the device and reset to the idle state
    pub async fn stop(&self) {
        self.inner.send_detached(CMD_STOP);

        let mut core = self.inner.core.lock().await;
        self.inner.cancel_driver(&mut core);
        core.session += 1;
        core.replies.clear();

        let events = core.machine.stop();
        self.inner.publish(events);
    }

    /// Pause the device and stop ticking; position is kept
    pub async fn pause(&self) {
        self.inner.send_detached(CMD_PAUSE);

        let mut core = self.inner.core.lock().await;
        self.inner.cancel_driver(&mut core);

        let events = core.machine.pause();
        if core.machine.state() != &MacroState::Paused {
            debug!("[SEQ] Pause ignored in state {}", core.machine.state());
        } else if core.machine.micro_state().is_waiting() {
            debug!(
                "[SEQ] Paused in {}, the outstanding reply is kept",
                core.machine.micro_state()
            );
        }
        self.inner.publish(events);
    }

    /// Resume the device and continue from the paused micro-state
    pub async fn resume(&self) {
        self.inner.send_detached(CMD_RESUME);

        let mut core = self.inner.core.lock().await;
        let events = core.machine.resume();
        if core.machine.state() == &MacroState::Running {
            if core.driver.is_none() {
                self.inner.start_driver(&mut core);
            }
        } else {
            debug!("[SEQ] Resume ignored in state {}", core.machine.state());
        }
        self.inner.publish(events);
    }

    /// The stored program
    pub async fn program(&self) -> Program {
        self.inner.core.lock().await.machine.program().clone()
    }

    /// Current macro-state
    pub async fn state(&self) -> MacroState {
        self.inner.core.lock().await.machine.state().clone()
    }

    /// Current micro-state
    pub async fn micro_state(&self) -> MicroState {
        self.inner.core.lock().await.machine.micro_state()
    }

    /// Index of the executing command, -1 when idle
    pub async fn program_counter(&self) -> i64 {
        self.inner.core.lock().await.machine.program_counter()
    }

    /// Read all execution state at once
    pub async fn snapshot(&self) -> Snapshot {
        let core = self.inner.core.lock().await;
        Snapshot {
            program_len: core.machine.program().len(),
            program_counter: core.machine.program_counter(),
            state: core.machine.state().clone(),
            micro_state: core.machine.micro_state(),
        }
    }

    /// Whether the tick driver is active
    pub async fn is_ticking(&self) -> bool {
        self.inner.core.lock().await.driver.is_some()
    }
}

impl Inner {
    fn start_driver(self: &Arc<Self>, core: &mut Core) {
        core.generation += 1;
        let generation = core.generation;
        let period = self.config.tick_period;
        let weak: Weak<Inner> = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if !inner.tick(generation).await {
                    break;
                }
            }
        });

        debug!("[SEQ] Tick driver {} started ({:?})", generation, period);
        core.driver = Some(task);
    }

    fn cancel_driver(&self, core: &mut Core) {
        if let Some(task) = core.driver.take() {
            task.abort();
            debug!("[SEQ] Tick driver {} cancelled", core.generation);
        }
        core.generation += 1;
    }

    /// One scheduled step; returns false once the driver must stop
    async fn tick(&self, generation: u64) -> bool {
        let mut guard = self.core.lock().await;
        let core = &mut *guard;

        if core.generation != generation {
            return false;
        }

        let session = core.session;
        let mut ctx = LinkContext {
            link: self.link.as_ref(),
            status_property: &self.config.status_property,
            replies: &mut core.replies,
            session,
        };
        let output = core.machine.tick(&mut ctx);

        if let Some(request) = output.request {
            self.dispatch(request, core.replies.sender(session));
        }
        self.publish(output.events);

        if output.halt {
            // Running inside the driver task: detach instead of aborting
            core.driver = None;
            core.generation += 1;
            debug!("[SEQ] Tick driver halted");
            return false;
        }
        true
    }

    fn dispatch(&self, request: DeviceRequest, sender: ReplySender) {
        let link = self.link.clone();
        match request {
            DeviceRequest::Command(command) => {
                debug!("[SEQ] Sending {} {:?}", command.name, command.params);
                tokio::spawn(async move {
                    let reply = link.send_command(&command.name, &command.params).await;
                    sender.deliver(reply).await;
                });
            }
            DeviceRequest::RefreshStatus => {
                let property = self.config.status_property.clone();
                debug!("[SEQ] Requesting {}", property);
                tokio::spawn(async move {
                    let reply = link.request_property(&property).await;
                    sender.deliver(reply).await;
                });
            }
        }
    }

    /// Send a control command whose outcome is not observed
    fn send_detached(&self, name: &'static str) {
        let link = self.link.clone();
        tokio::spawn(async move {
            match link.send_command(name, &[]).await {
                Ok(reply) => debug!("[SEQ] '{}' -> {}", name, reply),
                Err(e) => debug!("[SEQ] '{}' failed (ignored): {}", name, e),
            }
        });
    }

    fn publish(&self, events: Vec<ProgramEvent>) {
        for event in events {
            match &event {
                ProgramEvent::State {
                    state: MacroState::Error(_),
                    error: Some(err),
                } => error!("[SEQ] Program halted: {}", err),
                ProgramEvent::State { state, .. } => info!("[SEQ] State -> {}", state),
                ProgramEvent::ProgramCounter(pc) => debug!("[SEQ] Program counter -> {}", pc),
                ProgramEvent::MicroState { state, .. } => debug!("[SEQ] Micro-state -> {}", state),
                ProgramEvent::Program(program) => {
                    debug!("[SEQ] Program set ({} commands)", program.len())
                }
            }
            self.notifier.emit(event);
        }
    }
}

impl std::fmt::Debug for ProgramSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramSequencer")
            .field("config", &self.inner.config)
            .field("notifier", &self.inner.notifier)
            .finish()
    }
}
