//! Simulated Device
//!
//! An in-process device that executes long-running commands one at a time and
//! exposes its execution status as a property. A background poller keeps the
//! cached `status` property fresh, the way a real link refreshes sticky
//! properties. Replies arrive after a configurable delay.
//!
//! Supported commands:
//! - `ping` → `ok`
//! - `help` → list of commands
//! - `name`, `manufacturer`, `status` → property values
//! - `delay [ms]` → `ok` after `ms` (default 6000)
//! - `work [ms]` → `busy` while a job is active, otherwise starts a job of
//!   `ms` (default 500) and replies `ok`
//! - `stop`, `pause`, `resume` → control the active job, reply `ok`
//! - anything else → `dontunderstand`

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use stepwise_shared::protocol::{
    CMD_PAUSE, CMD_RESUME, CMD_STOP, REPLY_BUSY, REPLY_OK, STATUS_PAUSED, STATUS_PROPERTY,
    STATUS_STOPPED, STATUS_WORKING,
};
use stepwise_shared::{Command, LinkError};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, Instant};
use tracing::{debug, info};

use super::DeviceLink;

const DEFAULT_WORK_MS: u64 = 500;
const DEFAULT_DELAY_MS: u64 = 6000;
const REPLY_UNKNOWN: &str = "dontunderstand";
const HELP_TEXT: &str = "ping help delay name manufacturer status work stop pause resume";

/// Execution status of the simulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceStatus {
    #[default]
    Stopped,
    Working,
    Paused,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Stopped => STATUS_STOPPED,
            DeviceStatus::Working => STATUS_WORKING,
            DeviceStatus::Paused => STATUS_PAUSED,
        }
    }
}

/// Configuration for the simulated device
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Value of the `name` property
    pub name: String,
    /// Value of the `manufacturer` property
    pub manufacturer: String,
    /// Time between receiving a command and sending its reply
    pub reply_delay: Duration,
    /// Refresh period of the cached status property
    pub status_poll_period: Duration,
    /// Execution status at startup
    pub initial_status: DeviceStatus,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            name: "Stepwise simulated device".into(),
            manufacturer: "stepwise".into(),
            reply_delay: Duration::from_millis(100),
            status_poll_period: Duration::from_millis(500),
            initial_status: DeviceStatus::Stopped,
        }
    }
}

/// In-process device implementing [`DeviceLink`]
pub struct SimulatedDevice {
    config: SimConfig,
    inner: Arc<SimInner>,
    poller: JoinHandle<()>,
}

struct SimInner {
    name: String,
    manufacturer: String,
    work: Mutex<WorkState>,
    cache: Mutex<HashMap<String, String>>,
    connected: AtomicBool,
    faults: Mutex<Faults>,
    received: Mutex<Vec<Command>>,
    next_job_id: AtomicU64,
}

#[derive(Default)]
struct WorkState {
    status: DeviceStatus,
    job: Option<WorkJob>,
}

/// An active `work` job
struct WorkJob {
    id: u64,
    remaining: Duration,
    started: Instant,
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Faults {
    command: Option<LinkError>,
    status_request: Option<LinkError>,
}

impl SimulatedDevice {
    /// Create the device and start its status poller
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: SimConfig) -> Self {
        let inner = Arc::new(SimInner {
            name: config.name.clone(),
            manufacturer: config.manufacturer.clone(),
            work: Mutex::new(WorkState {
                status: config.initial_status,
                job: None,
            }),
            cache: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(true),
            faults: Mutex::new(Faults::default()),
            received: Mutex::new(Vec::new()),
            next_job_id: AtomicU64::new(1),
        });

        let poller_inner = inner.clone();
        let period = config.status_poll_period;
        let poller = tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                poller_inner.refresh_cache(STATUS_PROPERTY);
            }
        });

        info!("[SIM] Device '{}' ready", config.name);

        Self {
            config,
            inner,
            poller,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Current execution status, bypassing the cache
    pub fn status(&self) -> DeviceStatus {
        self.inner.work.lock().status
    }

    /// Force the execution status, discarding any active job
    pub fn set_status(&self, status: DeviceStatus) {
        let mut work = self.inner.work.lock();
        if let Some(job) = work.job.take() {
            job.cancel();
        }
        work.status = status;
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Drop the link: requests fail and the property cache is invalidated
    pub fn disconnect(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
        self.inner.cache.lock().clear();
        info!("[SIM] Disconnected");
    }

    /// Restore the link; the cache fills again on the next poll
    pub fn reconnect(&self) {
        self.inner.connected.store(true, Ordering::SeqCst);
        info!("[SIM] Reconnected");
    }

    /// Fail the next command with the given error
    pub fn fail_next_command(&self, err: LinkError) {
        self.inner.faults.lock().command = Some(err);
    }

    /// Fail the next forced property read with the given error
    pub fn fail_next_status_request(&self, err: LinkError) {
        self.inner.faults.lock().status_request = Some(err);
    }

    /// Commands received so far, in arrival order
    pub fn received_commands(&self) -> Vec<Command> {
        self.inner.received.lock().clone()
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.poller.abort();
        if let Some(job) = self.inner.work.lock().job.take() {
            job.cancel();
        }
    }
}

#[async_trait]
impl DeviceLink for SimulatedDevice {
    async fn send_command(&self, name: &str, params: &[String]) -> Result<String, LinkError> {
        if !self.inner.is_connected() {
            return Err(LinkError::NotConnected);
        }

        let fault = self.inner.faults.lock().command.take();
        if let Some(err) = fault {
            sleep(self.config.reply_delay).await;
            return Err(err);
        }

        self.inner
            .received
            .lock()
            .push(Command::new(name, params.iter().cloned()));

        let (reply, delay) = self.inner.execute(name, params);
        sleep(delay.unwrap_or(self.config.reply_delay)).await;

        if !self.inner.is_connected() {
            return Err(LinkError::Dropped);
        }

        debug!("[SIM] {} {:?} -> {}", name, params, reply);
        Ok(reply)
    }

    fn cached_property(&self, name: &str) -> Result<String, LinkError> {
        if !self.inner.is_connected() {
            return Err(LinkError::NoCachedValue(name.to_string()));
        }
        self.inner
            .cache
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| LinkError::NoCachedValue(name.to_string()))
    }

    async fn request_property(&self, name: &str) -> Result<String, LinkError> {
        if !self.inner.is_connected() {
            return Err(LinkError::NotConnected);
        }

        let fault = self.inner.faults.lock().status_request.take();
        sleep(self.config.reply_delay).await;
        if let Some(err) = fault {
            return Err(err);
        }

        if !self.inner.is_connected() {
            return Err(LinkError::Dropped);
        }

        let value = self
            .inner
            .property_value(name)
            .ok_or_else(|| LinkError::Device(format!("Unknown property '{}'", name)))?;
        self.inner.cache.lock().insert(name.to_string(), value.clone());
        Ok(value)
    }
}

impl SimInner {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn property_value(&self, name: &str) -> Option<String> {
        match name {
            STATUS_PROPERTY => Some(self.work.lock().status.as_str().to_string()),
            "name" => Some(self.name.clone()),
            "manufacturer" => Some(self.manufacturer.clone()),
            _ => None,
        }
    }

    fn refresh_cache(&self, name: &str) {
        if !self.is_connected() {
            return;
        }
        if let Some(value) = self.property_value(name) {
            self.cache.lock().insert(name.to_string(), value);
        }
    }

    /// Apply a command; returns the reply and an optional reply delay override
    fn execute(self: &Arc<Self>, name: &str, params: &[String]) -> (String, Option<Duration>) {
        match name {
            "ping" => (REPLY_OK.into(), None),
            "help" => (HELP_TEXT.into(), None),
            "name" | "manufacturer" | STATUS_PROPERTY => {
                (self.property_value(name).unwrap_or_default(), None)
            }
            "delay" => (
                REPLY_OK.into(),
                Some(duration_param(params, DEFAULT_DELAY_MS)),
            ),
            "work" => (
                self.start_work(duration_param(params, DEFAULT_WORK_MS)).into(),
                None,
            ),
            CMD_STOP => {
                self.stop_work();
                (REPLY_OK.into(), None)
            }
            CMD_PAUSE => {
                self.pause_work();
                (REPLY_OK.into(), None)
            }
            CMD_RESUME => {
                self.resume_work();
                (REPLY_OK.into(), None)
            }
            _ => (REPLY_UNKNOWN.into(), None),
        }
    }

    fn start_work(self: &Arc<Self>, duration: Duration) -> &'static str {
        let mut work = self.work.lock();
        if work.status != DeviceStatus::Stopped {
            return REPLY_BUSY;
        }

        let id = self.next_job_id.fetch_add(1, Ordering::SeqCst);
        work.status = DeviceStatus::Working;
        work.job = Some(WorkJob {
            id,
            remaining: duration,
            started: Instant::now(),
            timer: Some(self.spawn_job_timer(id, duration)),
        });
        debug!("[SIM] Job {} started for {:?}", id, duration);
        REPLY_OK
    }

    fn stop_work(&self) {
        let mut work = self.work.lock();
        if let Some(job) = work.job.take() {
            debug!("[SIM] Job {} stopped", job.id);
            job.cancel();
        }
        work.status = DeviceStatus::Stopped;
    }

    fn pause_work(&self) {
        let mut work = self.work.lock();
        if work.status != DeviceStatus::Working {
            return;
        }
        if let Some(job) = work.job.as_mut() {
            if let Some(timer) = job.timer.take() {
                timer.abort();
            }
            job.remaining = job.remaining.saturating_sub(job.started.elapsed());
            debug!("[SIM] Job {} paused, {:?} left", job.id, job.remaining);
        }
        work.status = DeviceStatus::Paused;
    }

    fn resume_work(self: &Arc<Self>) {
        let mut work = self.work.lock();
        if work.status != DeviceStatus::Paused {
            return;
        }
        if let Some(job) = work.job.as_mut() {
            job.started = Instant::now();
            job.timer = Some(self.spawn_job_timer(job.id, job.remaining));
            debug!("[SIM] Job {} resumed", job.id);
        }
        work.status = DeviceStatus::Working;
    }

    fn spawn_job_timer(self: &Arc<Self>, id: u64, duration: Duration) -> JoinHandle<()> {
        let inner = self.clone();
        tokio::spawn(async move {
            sleep(duration).await;
            inner.finish_work(id);
        })
    }

    fn finish_work(&self, id: u64) {
        let mut work = self.work.lock();
        let current = work.job.as_ref().map(|job| job.id);
        if current == Some(id) && work.status == DeviceStatus::Working {
            work.job = None;
            work.status = DeviceStatus::Stopped;
            debug!("[SIM] Job {} finished", id);
        }
    }
}

impl WorkJob {
    fn cancel(self) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
    }
}

fn duration_param(params: &[String], default_ms: u64) -> Duration {
    let ms = params
        .first()
        .and_then(|p| p.parse::<u64>().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}
