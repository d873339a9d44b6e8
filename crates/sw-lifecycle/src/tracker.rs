use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use swtk_core_types::{RegistrationId, RunningStatus, TargetId, VersionId, VersionStatus};
use swtk_deadline::Completion;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::LifecycleConfig;
use crate::control::{WorkerControl, WorkerSession};
use crate::error::LifecycleError;
use crate::identity::VersionIdentity;
use crate::snapshot::{RegistrationSnapshot, VersionSnapshot, WorkerErrorReport};

/// Completion handle for a lifecycle wait.
pub type VersionWait = Completion<VersionSnapshot>;

pub type ErrorCallback = Arc<dyn Fn(&WorkerErrorReport) + Send + Sync>;

struct Listener {
    id: u64,
    tx: oneshot::Sender<VersionSnapshot>,
}

#[derive(Default)]
struct TrackerState {
    versions: HashMap<VersionId, VersionSnapshot>,
    history: HashMap<VersionIdentity, VersionSnapshot>,
    latest_by_status: HashMap<(VersionStatus, RunningStatus), VersionSnapshot>,
    registrations: HashMap<RegistrationId, RegistrationSnapshot>,
    listeners: HashMap<VersionIdentity, Vec<Listener>>,
    active: Option<VersionSnapshot>,
    last_installed: Option<VersionSnapshot>,
    known_targets: HashSet<TargetId>,
    errors: Vec<WorkerErrorReport>,
    error_callbacks: Vec<ErrorCallback>,
}

impl TrackerState {
    fn lookup(&self, key: &VersionIdentity) -> Option<VersionSnapshot> {
        if key.is_wildcard() {
            self.latest_by_status
                .get(&(key.status, key.running_or_default()))
                .cloned()
        } else {
            self.history.get(key).cloned()
        }
    }

    fn take_listeners(&mut self, key: &VersionIdentity) -> Vec<Listener> {
        self.listeners.remove(key).unwrap_or_default()
    }
}

fn remove_listener(state: &Weak<Mutex<TrackerState>>, key: &VersionIdentity, id: u64) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let mut guard = state.lock();
    if let Some(listeners) = guard.listeners.get_mut(key) {
        listeners.retain(|listener| listener.id != id);
        if listeners.is_empty() {
            guard.listeners.remove(key);
        }
    }
}

/// Passive recorder of service worker version snapshots.
///
/// Every snapshot is written to the history before any waiter is woken, and waiters are
/// woken only after the tracker's lock is released, so a waiter always observes the
/// snapshot it was notified about.
pub struct WorkerTracker {
    config: LifecycleConfig,
    control: Arc<dyn WorkerControl>,
    state: Arc<Mutex<TrackerState>>,
    sessions: Arc<DashMap<TargetId, WorkerSession>>,
    next_listener: AtomicU64,
}

impl WorkerTracker {
    pub fn new(control: Arc<dyn WorkerControl>) -> Self {
        Self::with_config(LifecycleConfig::default(), control)
    }

    pub fn with_config(config: LifecycleConfig, control: Arc<dyn WorkerControl>) -> Self {
        Self {
            config,
            control,
            state: Arc::new(Mutex::new(TrackerState::default())),
            sessions: Arc::new(DashMap::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Record every snapshot of a `workerVersionUpdated` batch, in order.
    pub fn record_versions(&self, versions: impl IntoIterator<Item = VersionSnapshot>) {
        for version in versions {
            self.record_version(version);
        }
    }

    pub fn record_version(&self, snapshot: VersionSnapshot) {
        if self.config.log_versions {
            info!(
                target: "sw-lifecycle",
                version = %snapshot.version_id,
                status = %snapshot.status,
                running = %snapshot.running_status,
                script = %snapshot.script_url,
                "service worker version"
            );
        } else {
            debug!(
                target: "sw-lifecycle",
                version = %snapshot.version_id,
                status = %snapshot.status,
                running = %snapshot.running_status,
                "service worker version"
            );
        }

        let exact = VersionIdentity::of(&snapshot);
        let wildcard = exact.as_wildcard();

        let (listeners, new_target) = {
            let mut state = self.state.lock();
            state
                .versions
                .insert(snapshot.version_id.clone(), snapshot.clone());
            state.history.insert(exact.clone(), snapshot.clone());
            state.latest_by_status.insert(
                (snapshot.status, snapshot.running_status),
                snapshot.clone(),
            );

            let new_target = snapshot
                .target_id
                .clone()
                .filter(|target| state.known_targets.insert(target.clone()));

            if snapshot.is_running_in(VersionStatus::Activated) {
                state.active = Some(snapshot.clone());
            } else if snapshot.is_running_in(VersionStatus::Installed) {
                state.last_installed = Some(snapshot.clone());
            }

            let mut listeners = state.take_listeners(&exact);
            listeners.extend(state.take_listeners(&wildcard));
            (listeners, new_target)
        };

        if let Some(target) = new_target {
            self.attach_worker(target);
        }

        for listener in listeners {
            // A waiter that already timed out has dropped its receiver.
            let _ = listener.tx.send(snapshot.clone());
        }
    }

    pub fn record_registration(&self, registration: RegistrationSnapshot) {
        debug!(
            target: "sw-lifecycle",
            registration = %registration.registration_id,
            scope = %registration.scope_url,
            deleted = registration.is_deleted,
            "service worker registration"
        );
        let mut state = self.state.lock();
        if registration.is_deleted {
            state.registrations.remove(&registration.registration_id);
        } else {
            state
                .registrations
                .insert(registration.registration_id.clone(), registration);
        }
    }

    pub fn record_error(&self, report: WorkerErrorReport) {
        error!(
            target: "sw-lifecycle",
            version = ?report.version_id,
            source = %report.source_url,
            line = report.line_number,
            "Service worker error: {}",
            report.error_message
        );
        self.state.lock().errors.push(report);
    }

    /// Resolve with the snapshot matching `identity`, immediately when the history already
    /// holds one, otherwise when it arrives or fails after the configured wait timeout.
    pub fn wait_for_state(&self, identity: VersionIdentity) -> VersionWait {
        let key = identity.wait_key();
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        let rx = {
            let mut state = self.state.lock();
            if let Some(found) = state.lookup(&key) {
                return Completion::ready(found);
            }
            let (tx, rx) = oneshot::channel();
            state
                .listeners
                .entry(key.clone())
                .or_default()
                .push(Listener { id, tx });
            rx
        };

        let what = format!("waiting for service worker {key}");
        let weak = Arc::downgrade(&self.state);
        Completion::pending(rx, self.config.wait_timeout(), what)
            .on_abandon(move || remove_listener(&weak, &key, id))
    }

    pub fn wait_for_installed(&self, version: Option<&str>) -> VersionWait {
        self.wait_for_status(version, VersionStatus::Installed)
    }

    pub fn wait_for_activated(&self, version: Option<&str>) -> VersionWait {
        self.wait_for_status(version, VersionStatus::Activated)
    }

    fn wait_for_status(&self, version: Option<&str>, status: VersionStatus) -> VersionWait {
        match version {
            Some(version) => self.wait_for_state(VersionIdentity::of_version(version, status)),
            None => {
                let cached = {
                    let state = self.state.lock();
                    match status {
                        VersionStatus::Activated => state.active.clone(),
                        VersionStatus::Installed => state.last_installed.clone(),
                        _ => None,
                    }
                };
                match cached {
                    Some(snapshot) => Completion::ready(snapshot),
                    None => self.wait_for_state(VersionIdentity::any(status)),
                }
            }
        }
    }

    pub fn get_active(&self) -> Result<VersionSnapshot, LifecycleError> {
        self.state
            .lock()
            .active
            .clone()
            .ok_or(LifecycleError::NoActiveWorker)
    }

    pub fn get_last_installed(&self) -> Option<VersionSnapshot> {
        self.state.lock().last_installed.clone()
    }

    /// Ask the waiting worker to activate. The resulting lifecycle change arrives later as an
    /// ordinary version update.
    pub async fn skip_waiting(&self) -> Result<(), LifecycleError> {
        let scope = self.skip_waiting_scope();
        debug!(target: "sw-lifecycle", scope = %scope, "skipWaiting");
        self.control.skip_waiting(&scope).await?;
        Ok(())
    }

    fn skip_waiting_scope(&self) -> String {
        let state = self.state.lock();
        state
            .last_installed
            .as_ref()
            .and_then(|installed| state.registrations.get(&installed.registration_id))
            .map(|registration| registration.scope_url.clone())
            .unwrap_or_else(|| self.config.default_scope_url.clone())
    }

    /// Route queued worker errors to `callback` instead of failing [`Self::ensure_no_errors`].
    pub fn catch_errors(&self, callback: impl Fn(&WorkerErrorReport) + Send + Sync + 'static) {
        self.state.lock().error_callbacks.push(Arc::new(callback));
    }

    /// Drain the error queue.
    ///
    /// With at least one callback registered every queued error is delivered to every callback
    /// and the call succeeds. Otherwise the first queued error fails the call.
    pub fn ensure_no_errors(&self) -> Result<(), LifecycleError> {
        let (errors, callbacks) = {
            let mut state = self.state.lock();
            (
                std::mem::take(&mut state.errors),
                state.error_callbacks.clone(),
            )
        };

        if !callbacks.is_empty() {
            for report in &errors {
                for callback in &callbacks {
                    callback(report);
                }
            }
            return Ok(());
        }

        match errors.first() {
            Some(first) => Err(LifecycleError::WorkerErrors {
                message: first.error_message.clone(),
                count: errors.len(),
            }),
            None => Ok(()),
        }
    }

    pub fn version(&self, version: &VersionId) -> Option<VersionSnapshot> {
        self.state.lock().versions.get(version).cloned()
    }

    pub fn versions(&self) -> Vec<VersionSnapshot> {
        self.state.lock().versions.values().cloned().collect()
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.values().map(Vec::len).sum()
    }

    pub fn pending_errors(&self) -> usize {
        self.state.lock().errors.len()
    }

    pub fn worker_sessions(&self) -> Vec<WorkerSession> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Attach a session to `target`. A failed attempt forgets the target so the next snapshot
    /// naming it tries again.
    fn attach_worker(&self, target: TargetId) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(target: "sw-lifecycle", target_id = %target, "no runtime to attach worker session");
            self.state.lock().known_targets.remove(&target);
            return;
        };
        let control = Arc::clone(&self.control);
        let sessions = Arc::clone(&self.sessions);
        let state = Arc::downgrade(&self.state);
        runtime.spawn(async move {
            match control.attach_worker(&target).await {
                Ok(session) => {
                    debug!(
                        target: "sw-lifecycle",
                        target_id = %target,
                        session = %session.session_id,
                        "worker session attached"
                    );
                    sessions.insert(target, session);
                }
                Err(err) => {
                    warn!(target: "sw-lifecycle", target_id = %target, %err, "worker attach failed");
                    if let Some(state) = state.upgrade() {
                        state.lock().known_targets.remove(&target);
                    }
                }
            }
        });
    }
}
