//! ---
//! pldm_section: "02-bus-boundary"
//! pldm_subsection: "module"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Object-server and service-manager boundaries."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
use std::collections::BTreeSet;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{BusError, Result};

/// Bus name of the service manager.
pub const SYSTEMD_SERVICE: &str = "org.freedesktop.systemd1";
/// Root object of the service manager.
pub const SYSTEMD_ROOT: &str = "/org/freedesktop/systemd1";
/// Manager interface carrying `StartUnit` and `JobRemoved`.
pub const SYSTEMD_INTERFACE: &str = "org.freedesktop.systemd1.Manager";
/// Member name of the job completion broadcast.
pub const JOB_REMOVED_MEMBER: &str = "JobRemoved";

const SIGNAL_CAPACITY: usize = 64;

/// Single value carried in a signal body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `u` typed value.
    U32(u32),
    /// `s` typed value.
    Str(String),
    /// `o` typed value.
    ObjectPath(String),
}

impl Value {
    fn signature(&self) -> char {
        match self {
            Value::U32(_) => 'u',
            Value::Str(_) => 's',
            Value::ObjectPath(_) => 'o',
        }
    }
}

/// Raw broadcast signal as delivered by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMessage {
    /// Object path the signal was emitted from.
    pub path: String,
    /// Interface of the signal.
    pub interface: String,
    /// Member name of the signal.
    pub member: String,
    /// Signal arguments in order.
    pub body: Vec<Value>,
}

/// Decoded `JobRemoved` broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRemoved {
    /// Numeric job id.
    pub id: u32,
    /// Job object path, the correlation token returned by `StartUnit`.
    pub job: String,
    /// Unit the job belonged to.
    pub unit: String,
    /// Job result (`done`, `failed`, ...).
    pub result: String,
}

impl SignalMessage {
    /// Build a well-formed `JobRemoved` broadcast.
    pub fn job_removed(id: u32, job: &str, unit: &str, result: &str) -> Self {
        Self {
            path: SYSTEMD_ROOT.to_owned(),
            interface: SYSTEMD_INTERFACE.to_owned(),
            member: JOB_REMOVED_MEMBER.to_owned(),
            body: vec![
                Value::U32(id),
                Value::ObjectPath(job.to_owned()),
                Value::Str(unit.to_owned()),
                Value::Str(result.to_owned()),
            ],
        }
    }

    /// Signature string of the body, e.g. `uoss`.
    pub fn signature(&self) -> String {
        self.body.iter().map(Value::signature).collect()
    }

    /// True when the message is a `JobRemoved` broadcast from the manager.
    pub fn is_job_removed(&self) -> bool {
        self.path == SYSTEMD_ROOT
            && self.interface == SYSTEMD_INTERFACE
            && self.member == JOB_REMOVED_MEMBER
    }

    /// Read the `(jobId, jobPath)` prefix of the body, plus unit and result
    /// when present.
    pub fn read_job_removed(&self) -> Result<JobRemoved> {
        let malformed = || BusError::Signature {
            expected: "uo",
            found: self.signature(),
        };
        let (id, job) = match self.body.as_slice() {
            [Value::U32(id), Value::ObjectPath(job), ..] => (*id, job.clone()),
            _ => return Err(malformed()),
        };
        let text = |index: usize| match self.body.get(index) {
            Some(Value::Str(value)) => value.clone(),
            _ => String::new(),
        };
        Ok(JobRemoved {
            id,
            job,
            unit: text(2),
            result: text(3),
        })
    }
}

/// External service manager driving unit jobs.
pub trait ServiceManager: Send + Sync {
    /// Start `unit` with the given job `mode` and return the job path.
    ///
    /// This is a synchronous round-trip; completion of the job itself is
    /// reported later through [`ServiceManager::subscribe_job_removed`].
    fn start_unit(&self, unit: &str, mode: &str) -> Result<String>;
    /// Subscribe to `JobRemoved` broadcasts.
    fn subscribe_job_removed(&self) -> broadcast::Receiver<SignalMessage>;
}

/// Unit start request recorded by [`InMemoryServiceManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedUnit {
    /// Unit name.
    pub unit: String,
    /// Job mode.
    pub mode: String,
    /// Job path handed back to the caller.
    pub job: String,
    /// Numeric job id.
    pub id: u32,
}

#[derive(Debug, Default)]
struct ManagerState {
    next_job_id: u32,
    started: Vec<StartedUnit>,
    failing: BTreeSet<String>,
}

/// In-memory service manager that hands out job paths and lets callers
/// complete them explicitly.
#[derive(Debug)]
pub struct InMemoryServiceManager {
    state: Mutex<ManagerState>,
    signals: broadcast::Sender<SignalMessage>,
}

impl Default for InMemoryServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryServiceManager {
    /// Create a manager with no jobs.
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            state: Mutex::new(ManagerState {
                next_job_id: 1,
                ..ManagerState::default()
            }),
            signals,
        }
    }

    /// Make subsequent starts of `unit` fail.
    pub fn fail_unit(&self, unit: impl Into<String>) {
        self.state.lock().failing.insert(unit.into());
    }

    /// Every start request accepted so far, in order.
    pub fn started_units(&self) -> Vec<StartedUnit> {
        self.state.lock().started.clone()
    }

    /// Number of start requests accepted so far.
    pub fn start_count(&self) -> usize {
        self.state.lock().started.len()
    }

    /// Broadcast completion of the job at `job` with `result`.
    ///
    /// Returns the number of subscribers that received the broadcast.
    pub fn complete(&self, job: &str, result: &str) -> usize {
        let started = {
            let state = self.state.lock();
            state.started.iter().find(|s| s.job == job).cloned()
        };
        let message = match started {
            Some(started) => SignalMessage::job_removed(started.id, job, &started.unit, result),
            None => {
                warn!(job, "completing a job that was never started");
                SignalMessage::job_removed(0, job, "", result)
            }
        };
        self.emit(message)
    }

    /// Broadcast an arbitrary signal to every subscriber.
    pub fn emit(&self, message: SignalMessage) -> usize {
        self.signals.send(message).unwrap_or(0)
    }
}

impl ServiceManager for InMemoryServiceManager {
    fn start_unit(&self, unit: &str, mode: &str) -> Result<String> {
        let mut state = self.state.lock();
        if state.failing.contains(unit) {
            return Err(BusError::UnitStart {
                unit: unit.to_owned(),
                reason: "unit refused to start".into(),
            });
        }
        let id = state.next_job_id;
        state.next_job_id = state.next_job_id.wrapping_add(1).max(1);
        let job = format!("{}/job/{}", SYSTEMD_ROOT, id);
        state.started.push(StartedUnit {
            unit: unit.to_owned(),
            mode: mode.to_owned(),
            job: job.clone(),
            id,
        });
        debug!(unit, mode, job = %job, "unit start queued");
        Ok(job)
    }

    fn subscribe_job_removed(&self) -> broadcast::Receiver<SignalMessage> {
        self.signals.subscribe()
    }
}
