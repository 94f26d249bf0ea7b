//! Structured logging and the typed telemetry event taxonomy emitted by the
//! safety and governance core.
//!
//! Telemetry is strictly observability: a dropped or sampled event never
//! changes what the core decided. The durable compliance trail lives in
//! `audit-log`. Every decision-making component is handed an `Arc<dyn
//! Emitter>` at construction time — there is no process-global emitter here,
//! unlike the reference implementation's singleton `EventEmitter`.

#![deny(unsafe_code)]

use risk_classifier::RiskLevel;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Errors raised while initializing the logging backend.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The global tracing subscriber was already installed by someone else.
    #[error("tracing subscriber already installed")]
    AlreadyInitialized,
}

/// Initialize structured JSON logging with an env filter.
///
/// Honors `RUST_LOG` (e.g. `"info,security_controller=debug"`), defaulting to
/// `"info"`.
///
/// # Errors
/// Returns an error if a global subscriber is already installed.
pub fn init_json_logging() -> Result<(), TelemetryError> {
    let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).map_err(|_| TelemetryError::AlreadyInitialized)
}

/// A typed telemetry event emitted by the command-gating or robot-safety
/// decision paths.
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// A command was run through the risk classifier.
    CommandClassified { command: String, level: RiskLevel, reasons: Vec<String> },
    /// The security controller reached a terminal decision.
    SecurityDecisionMade { command: String, level: RiskLevel, outcome: String, approver: Option<String> },
    /// An approval request was dispatched to a provider.
    ApprovalRequested { command: String, level: RiskLevel },
    /// An approval request was resolved.
    ApprovalResolved { result: String, approver: Option<String>, timestamp_ms: u64 },
    /// The robot safety FSM changed lifecycle state.
    RobotStateTransition { old: String, new: String },
    /// A motion command was blocked or required approval.
    RobotMotionBlocked { command: String, reasons: Vec<String> },
    /// The robot's emergency stop was engaged.
    RobotEstopEngaged { reason: String },
    /// The robot's emergency stop was released.
    RobotEstopReleased,
}

impl TelemetryEvent {
    /// Coarse, low-cardinality component tag used for metrics keys.
    #[must_use]
    pub fn component(&self) -> &'static str {
        match self {
            Self::CommandClassified { .. } => "classifier",
            Self::SecurityDecisionMade { .. } => "security_controller",
            Self::ApprovalRequested { .. } | Self::ApprovalResolved { .. } => "approval_flow",
            Self::RobotStateTransition { .. }
            | Self::RobotMotionBlocked { .. }
            | Self::RobotEstopEngaged { .. }
            | Self::RobotEstopReleased => "robot_safety",
        }
    }

    /// Coarse outcome tag used for metrics keys.
    #[must_use]
    pub fn outcome(&self) -> String {
        match self {
            Self::CommandClassified { level, .. } => format!("{level:?}"),
            Self::SecurityDecisionMade { outcome, .. } => outcome.clone(),
            Self::ApprovalRequested { .. } => "requested".to_string(),
            Self::ApprovalResolved { result, .. } => result.clone(),
            Self::RobotStateTransition { .. } => "transition".to_string(),
            Self::RobotMotionBlocked { .. } => "blocked".to_string(),
            Self::RobotEstopEngaged { .. } => "engaged".to_string(),
            Self::RobotEstopReleased => "released".to_string(),
        }
    }
}

/// A sink for telemetry events. Implementations must be cheap: this is
/// called on every decision, including hot paths.
pub trait Emitter: Send + Sync {
    /// Handle one event. Must not block on I/O.
    fn emit(&self, event: &TelemetryEvent);
}

/// Default emitter: renders each event as a `tracing` event at `info` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEmitter;

impl Emitter for TracingEmitter {
    fn emit(&self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::CommandClassified { command, level, reasons } => {
                tracing::info!(target: "security", command, ?level, ?reasons, "command classified");
            }
            TelemetryEvent::SecurityDecisionMade { command, level, outcome, approver } => {
                tracing::info!(target: "security", command, ?level, outcome, ?approver, "security decision");
            }
            TelemetryEvent::ApprovalRequested { command, level } => {
                tracing::info!(target: "security", command, ?level, "approval requested");
            }
            TelemetryEvent::ApprovalResolved { result, approver, timestamp_ms } => {
                tracing::info!(target: "security", result, ?approver, timestamp_ms, "approval resolved");
            }
            TelemetryEvent::RobotStateTransition { old, new } => {
                tracing::info!(target: "robot_safety", old, new, "robot state transition");
            }
            TelemetryEvent::RobotMotionBlocked { command, reasons } => {
                tracing::warn!(target: "robot_safety", command, ?reasons, "robot motion blocked");
            }
            TelemetryEvent::RobotEstopEngaged { reason } => {
                tracing::warn!(target: "robot_safety", reason, "estop engaged");
            }
            TelemetryEvent::RobotEstopReleased => {
                tracing::info!(target: "robot_safety", "estop released");
            }
        }
    }
}

/// In-memory emitter for tests: records every event it sees, in order.
#[derive(Debug, Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingEmitter {
    /// Construct an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every event recorded so far, in emission order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TelemetryEvent> {
        self.events.lock().expect("emitter lock poisoned").clone()
    }
}

impl Clone for TelemetryEvent {
    fn clone(&self) -> Self {
        match self {
            Self::CommandClassified { command, level, reasons } => {
                Self::CommandClassified { command: command.clone(), level: *level, reasons: reasons.clone() }
            }
            Self::SecurityDecisionMade { command, level, outcome, approver } => Self::SecurityDecisionMade {
                command: command.clone(),
                level: *level,
                outcome: outcome.clone(),
                approver: approver.clone(),
            },
            Self::ApprovalRequested { command, level } => {
                Self::ApprovalRequested { command: command.clone(), level: *level }
            }
            Self::ApprovalResolved { result, approver, timestamp_ms } => Self::ApprovalResolved {
                result: result.clone(),
                approver: approver.clone(),
                timestamp_ms: *timestamp_ms,
            },
            Self::RobotStateTransition { old, new } => {
                Self::RobotStateTransition { old: old.clone(), new: new.clone() }
            }
            Self::RobotMotionBlocked { command, reasons } => {
                Self::RobotMotionBlocked { command: command.clone(), reasons: reasons.clone() }
            }
            Self::RobotEstopEngaged { reason } => Self::RobotEstopEngaged { reason: reason.clone() },
            Self::RobotEstopReleased => Self::RobotEstopReleased,
        }
    }
}

impl Emitter for RecordingEmitter {
    fn emit(&self, event: &TelemetryEvent) {
        self.events.lock().expect("emitter lock poisoned").push(event.clone());
    }
}

/// In-process counters for telemetry events, keyed by `{component, outcome}`.
/// Low-cardinality by construction; meant for cheap assertions and local
/// dashboards, not for external export.
#[derive(Debug, Default)]
pub struct TelemetryMetrics {
    counts: Mutex<HashMap<String, u64>>,
}

impl TelemetryMetrics {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of `event`.
    pub fn observe(&self, event: &TelemetryEvent) {
        let key = format!("{}:{}", event.component(), event.outcome());
        *self.counts.lock().expect("metrics lock poisoned").entry(key).or_insert(0) += 1;
    }

    /// Current count for a `{component, outcome}` pair.
    #[must_use]
    pub fn count(&self, component: &str, outcome: &str) -> u64 {
        let key = format!("{component}:{outcome}");
        self.counts.lock().expect("metrics lock poisoned").get(&key).copied().unwrap_or(0)
    }
}

/// An emitter that both logs via `tracing` and feeds an in-process metrics
/// registry. This is the composition most callers want; the two halves
/// (`TracingEmitter`, `TelemetryMetrics`) remain independently usable for
/// tests that only need one.
#[derive(Debug, Default)]
pub struct StandardEmitter {
    tracing: TracingEmitter,
    metrics: TelemetryMetrics,
}

impl StandardEmitter {
    /// Construct a standard emitter with fresh metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Access the metrics registry fed by this emitter.
    #[must_use]
    pub fn metrics(&self) -> &TelemetryMetrics {
        &self.metrics
    }
}

impl Emitter for StandardEmitter {
    fn emit(&self, event: &TelemetryEvent) {
        self.tracing.emit(event);
        self.metrics.observe(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_emitter_preserves_order() {
        let emitter = RecordingEmitter::new();
        emitter.emit(&TelemetryEvent::RobotEstopReleased);
        emitter.emit(&TelemetryEvent::RobotEstopEngaged { reason: "test".to_string() });
        let snap = emitter.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(matches!(snap[0], TelemetryEvent::RobotEstopReleased));
    }

    #[test]
    fn standard_emitter_feeds_metrics() {
        let emitter = StandardEmitter::new();
        emitter.emit(&TelemetryEvent::SecurityDecisionMade {
            command: "ls".to_string(),
            level: RiskLevel::Safe,
            outcome: "allowed".to_string(),
            approver: None,
        });
        assert_eq!(emitter.metrics().count("security_controller", "allowed"), 1);
    }

    fn risk_level_strategy() -> impl proptest::strategy::Strategy<Value = RiskLevel> {
        proptest::prop_oneof![
            proptest::strategy::Just(RiskLevel::Safe),
            proptest::strategy::Just(RiskLevel::Low),
            proptest::strategy::Just(RiskLevel::Medium),
            proptest::strategy::Just(RiskLevel::High),
            proptest::strategy::Just(RiskLevel::Critical),
        ]
    }

    proptest::proptest! {
        #[test]
        fn each_emitted_event_increments_exactly_one_counter(
            command in "\\PC{0,40}",
            level in risk_level_strategy(),
        ) {
            let emitter = StandardEmitter::new();
            let event = TelemetryEvent::CommandClassified { command, level, reasons: vec![] };
            let before: u64 = emitter.metrics().count(event.component(), &event.outcome());
            emitter.emit(&event);
            let after = emitter.metrics().count(event.component(), &event.outcome());
            proptest::prop_assert_eq!(after, before + 1);
        }
    }
}
