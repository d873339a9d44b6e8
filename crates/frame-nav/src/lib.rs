//! Navigation correlator.
//!
//! Keeps one current [`PendingNavigation`] per frame and folds `requestWillBeSent`,
//! `responseReceived`, `frameNavigated` and load notifications into a single completion per
//! navigation attempt. Two policies decide when that completion fires:
//!
//! * [`NavPolicy::CommitOnly`] settles as soon as the frame commits to the new document.
//! * [`NavPolicy::FullLoad`] settles once the frame's load event has fired and every request
//!   seen through `requestWillBeSent` has been answered.
//!
//! Every completion is guarded by [`NavConfig::response_timeout_ms`].

pub mod config;
mod record;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use swtk_core_types::{FrameId, RequestId};
use swtk_deadline::Completion;
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub use config::NavConfig;
pub use record::{ResponseMeta, ResponseRecord};

/// Completion handle for a single navigation attempt.
pub type NavigationHandle = Completion<Vec<ResponseRecord>>;

/// When a navigation counts as complete.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NavPolicy {
    CommitOnly,
    FullLoad,
}

impl NavPolicy {
    pub fn from_wait_for_load(wait_for_load: bool) -> Self {
        if wait_for_load {
            NavPolicy::FullLoad
        } else {
            NavPolicy::CommitOnly
        }
    }

    pub fn waits_for_load(&self) -> bool {
        matches!(self, NavPolicy::FullLoad)
    }
}

struct NavState {
    responses: Vec<ResponseRecord>,
    outstanding: HashSet<RequestId>,
    load_fired: bool,
    completion: Option<oneshot::Sender<Vec<ResponseRecord>>>,
}

impl NavState {
    fn settled(&self) -> bool {
        self.completion.is_none()
    }
}

/// Aggregation record for one navigation attempt of one frame.
pub struct PendingNavigation {
    frame: FrameId,
    policy: NavPolicy,
    started_at: Instant,
    state: Mutex<NavState>,
}

impl PendingNavigation {
    fn new(frame: FrameId, policy: NavPolicy) -> (Self, oneshot::Receiver<Vec<ResponseRecord>>) {
        let (tx, rx) = oneshot::channel();
        let nav = Self {
            frame,
            policy,
            started_at: Instant::now(),
            state: Mutex::new(NavState {
                responses: Vec::new(),
                outstanding: HashSet::new(),
                load_fired: false,
                completion: Some(tx),
            }),
        };
        (nav, rx)
    }

    pub fn frame(&self) -> &FrameId {
        &self.frame
    }

    pub fn policy(&self) -> NavPolicy {
        self.policy
    }

    pub fn is_settled(&self) -> bool {
        self.state.lock().settled()
    }

    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding.len()
    }

    fn on_request_will_be_sent(&self, request: RequestId) {
        let mut state = self.state.lock();
        if state.settled() {
            return;
        }
        state.outstanding.insert(request);
    }

    fn on_network_response(&self, record: ResponseRecord) {
        let mut state = self.state.lock();
        if state.settled() {
            return;
        }
        state.outstanding.remove(&record.request_id);
        state.responses.push(record);
        self.settle_if_loaded(&mut state);
    }

    /// Answer a request whose response is not kept.
    fn on_discarded_response(&self, request: &RequestId) {
        let mut state = self.state.lock();
        if state.settled() {
            return;
        }
        state.outstanding.remove(request);
        self.settle_if_loaded(&mut state);
    }

    fn on_navigation_complete(&self) {
        let mut state = self.state.lock();
        if state.settled() || self.policy.waits_for_load() {
            return;
        }
        self.settle(&mut state);
    }

    fn on_load_event(&self) {
        let mut state = self.state.lock();
        if state.settled() {
            return;
        }
        state.load_fired = true;
        self.settle_if_loaded(&mut state);
    }

    fn settle_if_loaded(&self, state: &mut NavState) {
        if state.load_fired && state.outstanding.is_empty() {
            self.settle(state);
        }
    }

    fn settle(&self, state: &mut NavState) {
        if let Some(tx) = state.completion.take() {
            let responses = std::mem::take(&mut state.responses);
            debug!(
                target: "frame-nav",
                frame = %self.frame,
                policy = ?self.policy,
                responses = responses.len(),
                elapsed_ms = self.started_at.elapsed().as_millis() as u64,
                "navigation settled"
            );
            // The receiver may already have timed out and gone away.
            let _ = tx.send(responses);
        }
    }
}

/// Registry of in-flight navigations keyed by frame.
pub struct FrameStore {
    config: NavConfig,
    frames: DashMap<FrameId, Arc<PendingNavigation>>,
    latest: Mutex<Option<FrameId>>,
    dropped: AtomicU64,
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStore {
    pub fn new() -> Self {
        Self::with_config(NavConfig::default())
    }

    pub fn with_config(config: NavConfig) -> Self {
        Self {
            config,
            frames: DashMap::new(),
            latest: Mutex::new(None),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    /// Register a new navigation for `frame`, replacing any current one.
    ///
    /// A replaced navigation is orphaned rather than cancelled: its handle still times out on
    /// its own deadline.
    pub fn start(&self, frame: FrameId, policy: NavPolicy) -> NavigationHandle {
        let (nav, rx) = PendingNavigation::new(frame.clone(), policy);
        if let Some(previous) = self.frames.insert(frame.clone(), Arc::new(nav)) {
            if !previous.is_settled() {
                debug!(target: "frame-nav", frame = %frame, "replacing unsettled navigation");
            }
        }
        *self.latest.lock() = Some(frame.clone());

        let what = format!("response timeout for frame {frame}");
        Completion::pending(rx, self.config.response_timeout(), what).on_abandon(move || {
            warn!(target: "frame-nav", frame = %frame, "navigation abandoned before it settled");
        })
    }

    fn current(&self, frame: &FrameId) -> Option<Arc<PendingNavigation>> {
        self.frames.get(frame).map(|entry| Arc::clone(entry.value()))
    }

    pub fn on_request_will_be_sent(&self, request: RequestId, frame: &FrameId) {
        if let Some(nav) = self.current(frame) {
            nav.on_request_will_be_sent(request);
        }
    }

    pub fn on_network_response(&self, record: ResponseRecord) {
        if self.config.filter_fractional_request_ids && record.request_id.looks_fractional() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(
                target: "frame-nav",
                request = %record.request_id,
                url = %record.url,
                "dropping response with fractional request id"
            );
            if let Some(nav) = self.current(&record.frame_id) {
                nav.on_discarded_response(&record.request_id);
            }
            return;
        }
        if let Some(nav) = self.current(&record.frame_id) {
            nav.on_network_response(record);
        }
    }

    pub fn on_navigation_complete(&self, frame: &FrameId) {
        if let Some(nav) = self.current(frame) {
            nav.on_navigation_complete();
        }
    }

    pub fn on_load_event(&self, frame: &FrameId) {
        if let Some(nav) = self.current(frame) {
            nav.on_load_event();
        }
    }

    /// Apply a load signal that carries no frame to the most recently started navigation.
    pub fn on_unscoped_load_event(&self) {
        let latest = self.latest.lock().clone();
        if let Some(frame) = latest {
            self.on_load_event(&frame);
        }
    }

    pub fn is_pending(&self, frame: &FrameId) -> bool {
        self.current(frame)
            .map(|nav| !nav.is_settled())
            .unwrap_or(false)
    }

    pub fn outstanding(&self, frame: &FrameId) -> Option<usize> {
        self.current(frame).map(|nav| nav.outstanding())
    }

    pub fn tracked_frames(&self) -> Vec<FrameId> {
        self.frames.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn dropped_responses(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
