//! ---
//! pldm_section: "03-firmware-update"
//! pldm_subsection: "module"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Firmware-update dispatch, inventory and condition gating."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
//! Gating of update steps on external service unit jobs.
//!
//! A [`ServiceCondition`] starts one unit, remembers the job path handed back
//! by the service manager, and fires its post routine once a `JobRemoved`
//! broadcast for that exact job arrives.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pldm_bus::{ServiceManager, SignalMessage};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::condition_config::ConditionConfig;
use crate::error::ConditionError;

const START_MODE: &str = "replace";
const UNIT_SUFFIX: &str = ".service";

/// Callback run around a service job.
pub type Routine = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionState {
    #[default]
    Idle,
    Starting,
    AwaitingCompletion,
}

#[derive(Default)]
struct ConditionInner {
    arg: String,
    job: Option<String>,
    state: ConditionState,
    before: Option<Routine>,
    after: Option<Routine>,
}

/// One external service action with optional pre and post routines.
pub struct ServiceCondition {
    service: String,
    manager: Arc<dyn ServiceManager>,
    inner: Mutex<ConditionInner>,
}

impl ServiceCondition {
    pub fn new(service: impl Into<String>, manager: Arc<dyn ServiceManager>) -> Self {
        Self {
            service: service.into(),
            manager,
            inner: Mutex::new(ConditionInner::default()),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn state(&self) -> ConditionState {
        self.inner.lock().state
    }

    /// Job path of the outstanding start request, if any.
    pub fn job_path(&self) -> Option<String> {
        self.inner.lock().job.clone()
    }

    /// Set the argument used to instantiate a template unit.
    pub fn assign_arg(&self, arg: impl Into<String>) {
        self.inner.lock().arg = arg.into();
    }

    /// Install routines. A `None` slot keeps the routine already installed.
    pub fn assign_routine(&self, before: Option<Routine>, after: Option<Routine>) {
        let mut inner = self.inner.lock();
        if before.is_some() {
            inner.before = before;
        }
        if after.is_some() {
            inner.after = after;
        }
    }

    /// Instantiated unit name, `{service}[@{arg}].service`.
    ///
    /// Only the last path element of the argument is used; an argument
    /// ending in `/` is rejected.
    pub fn unit_name(&self) -> Result<String, ConditionError> {
        let arg = self.inner.lock().arg.clone();
        instantiate(&self.service, &arg)
    }

    /// Run the pre routine and start the unit. Completion is reported later
    /// through [`ServiceCondition::on_job_removed`].
    ///
    /// An empty service name makes this a no-op. Calling it again before the
    /// previous job completed fails with [`ConditionError::JobInFlight`].
    pub fn execute(&self) -> Result<(), ConditionError> {
        if self.service.is_empty() {
            info!("executed an empty condition, ignored");
            return Ok(());
        }

        let (unit, before) = {
            let mut inner = self.inner.lock();
            if inner.state != ConditionState::Idle {
                return Err(ConditionError::JobInFlight {
                    service: self.service.clone(),
                    job: inner.job.clone().unwrap_or_default(),
                });
            }
            let unit = instantiate(&self.service, &inner.arg)?;
            inner.state = ConditionState::Starting;
            (unit, inner.before.clone())
        };

        if let Some(before) = before {
            before();
        }

        match self.manager.start_unit(&unit, START_MODE) {
            Ok(job) => {
                info!(service = %unit, job = %job, "started service");
                let mut inner = self.inner.lock();
                inner.job = Some(job);
                inner.state = ConditionState::AwaitingCompletion;
                Ok(())
            }
            Err(err) => {
                error!(service = %unit, error = %err, "failed to start service");
                self.inner.lock().state = ConditionState::Idle;
                Err(err.into())
            }
        }
    }

    /// Handle one broadcast from the service manager. Returns true when it
    /// completed the outstanding job.
    pub fn on_job_removed(&self, message: &SignalMessage) -> bool {
        if !message.is_job_removed() {
            return false;
        }
        let removed = match message.read_job_removed() {
            Ok(removed) => removed,
            Err(err) => {
                error!(error = %err, "error reading job removed message");
                return false;
            }
        };

        let after = {
            let mut inner = self.inner.lock();
            if inner.job.as_deref() != Some(removed.job.as_str()) {
                debug!(job = %removed.job, service = %self.service, "unrelated job removed");
                return false;
            }
            inner.job = None;
            inner.state = ConditionState::Idle;
            inner.after.clone()
        };

        info!(job = %removed.job, unit = %removed.unit, result = %removed.result, "service job completed");
        if let Some(after) = after {
            after();
        }
        true
    }

    /// Keep feeding job broadcasts into this condition until it is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(self: &Arc<Self>) -> JoinHandle<()> {
        let mut signals = self.manager.subscribe_job_removed();
        let condition: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match signals.recv().await {
                    Ok(message) => {
                        let Some(condition) = condition.upgrade() else {
                            break;
                        };
                        condition.on_job_removed(&message);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "job removed subscription lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

impl fmt::Debug for ServiceCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ServiceCondition")
            .field("service", &self.service)
            .field("arg", &inner.arg)
            .field("state", &inner.state)
            .field("job", &inner.job)
            .finish()
    }
}

fn instantiate(service: &str, arg: &str) -> Result<String, ConditionError> {
    let mut unit = service.to_owned();
    if !arg.is_empty() {
        let pruned = match arg.rsplit_once('/') {
            Some((_, "")) => {
                error!(arg, "bad argument to a service unit");
                return Err(ConditionError::BadArgument(arg.to_owned()));
            }
            Some((_, leaf)) => leaf,
            None => arg,
        };
        unit.push('@');
        unit.push_str(pruned);
    }
    unit.push_str(UNIT_SUFFIX);
    Ok(unit)
}

/// Pre and post conditions bound to one component.
#[derive(Debug, Clone)]
pub struct ComponentConditions {
    pub pre: Arc<ServiceCondition>,
    pub post: Arc<ServiceCondition>,
}

impl ComponentConditions {
    /// Conditions for `component` from the loaded bindings. Unbound
    /// components get empty, no-op conditions.
    pub fn from_bindings(
        bindings: &ConditionConfig,
        component: &str,
        manager: Arc<dyn ServiceManager>,
    ) -> Self {
        Self {
            pre: Arc::new(ServiceCondition::new(
                bindings.pre_service_for(component),
                Arc::clone(&manager),
            )),
            post: Arc::new(ServiceCondition::new(
                bindings.post_service_for(component),
                manager,
            )),
        }
    }

    /// Subscribe both conditions to job broadcasts.
    pub fn subscribe(&self) -> [JoinHandle<()>; 2] {
        [self.pre.subscribe(), self.post.subscribe()]
    }
}
