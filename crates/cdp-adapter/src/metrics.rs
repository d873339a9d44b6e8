use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{
    core::Collector, histogram_opts, HistogramVec, IntCounter, IntCounterVec, Registry,
};
use tracing::error;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdapterMetricsSnapshot {
    pub commands: u64,
    pub command_failures: u64,
    pub events: u64,
    pub navigations: u64,
    pub navigation_timeouts: u64,
    pub lifecycle_timeouts: u64,
}

static COMMANDS: AtomicU64 = AtomicU64::new(0);
static COMMAND_FAILURES: AtomicU64 = AtomicU64::new(0);
static EVENTS: AtomicU64 = AtomicU64::new(0);
static NAVIGATIONS: AtomicU64 = AtomicU64::new(0);
static NAVIGATION_TIMEOUTS: AtomicU64 = AtomicU64::new(0);
static LIFECYCLE_TIMEOUTS: AtomicU64 = AtomicU64::new(0);

lazy_static! {
    static ref CDP_COMMANDS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("swtk_cdp_commands_total", "Total CDP commands issued"),
        &["method"]
    )
    .expect("metric definition");
    static ref CDP_COMMAND_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("swtk_cdp_command_failures_total", "Total CDP command failures"),
        &["method"]
    )
    .expect("metric definition");
    static ref CDP_COMMAND_DURATION: HistogramVec = HistogramVec::new(
        histogram_opts!(
            "swtk_cdp_command_duration_seconds",
            "CDP command latency",
            vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]
        ),
        &["method"]
    )
    .expect("metric definition");
    static ref CDP_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("swtk_cdp_events_total", "Protocol notifications routed"),
        &["method"]
    )
    .expect("metric definition");
    static ref NAVIGATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("swtk_navigations_total", "Navigations settled"),
        &["policy"]
    )
    .expect("metric definition");
    static ref NAVIGATION_TIMEOUTS_TOTAL: IntCounter = IntCounter::new(
        "swtk_navigation_timeouts_total",
        "Navigations that hit their response deadline"
    )
    .expect("metric definition");
    static ref LIFECYCLE_TIMEOUTS_TOTAL: IntCounter = IntCounter::new(
        "swtk_lifecycle_wait_timeouts_total",
        "Service worker lifecycle waits that hit their deadline"
    )
    .expect("metric definition");
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(target: "cdp-adapter", %err, "failed to register metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, CDP_COMMANDS_TOTAL.clone());
    register(registry, CDP_COMMAND_FAILURES_TOTAL.clone());
    register(registry, CDP_COMMAND_DURATION.clone());
    register(registry, CDP_EVENTS_TOTAL.clone());
    register(registry, NAVIGATIONS_TOTAL.clone());
    register(registry, NAVIGATION_TIMEOUTS_TOTAL.clone());
    register(registry, LIFECYCLE_TIMEOUTS_TOTAL.clone());
}

pub fn record_command(method: &str) {
    COMMANDS.fetch_add(1, Ordering::Relaxed);
    CDP_COMMANDS_TOTAL.with_label_values(&[method]).inc();
}

pub fn record_command_success(method: &str, duration: Duration) {
    CDP_COMMAND_DURATION
        .with_label_values(&[method])
        .observe(duration.as_secs_f64());
}

pub fn record_command_failure(method: &str) {
    COMMAND_FAILURES.fetch_add(1, Ordering::Relaxed);
    CDP_COMMAND_FAILURES_TOTAL.with_label_values(&[method]).inc();
}

pub fn record_event(method: &str) {
    EVENTS.fetch_add(1, Ordering::Relaxed);
    CDP_EVENTS_TOTAL.with_label_values(&[method]).inc();
}

pub fn record_navigation(policy: &str) {
    NAVIGATIONS.fetch_add(1, Ordering::Relaxed);
    NAVIGATIONS_TOTAL.with_label_values(&[policy]).inc();
}

pub fn record_navigation_timeout() {
    NAVIGATION_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
    NAVIGATION_TIMEOUTS_TOTAL.inc();
}

pub fn record_lifecycle_timeout() {
    LIFECYCLE_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
    LIFECYCLE_TIMEOUTS_TOTAL.inc();
}

pub fn snapshot() -> AdapterMetricsSnapshot {
    AdapterMetricsSnapshot {
        commands: COMMANDS.load(Ordering::Relaxed),
        command_failures: COMMAND_FAILURES.load(Ordering::Relaxed),
        events: EVENTS.load(Ordering::Relaxed),
        navigations: NAVIGATIONS.load(Ordering::Relaxed),
        navigation_timeouts: NAVIGATION_TIMEOUTS.load(Ordering::Relaxed),
        lifecycle_timeouts: LIFECYCLE_TIMEOUTS.load(Ordering::Relaxed),
    }
}
