//! Robot lifecycle state machine with a latching emergency stop, plus a
//! multi-check motion command validator.
//!
//! The lifecycle half and the motion-validation half are independent: a
//! caller can transition states without ever calling `validate_motion`, and
//! vice versa. They share one controller because both gate on the same
//! latched E-Stop flag, which must be observable from either path the
//! instant it is engaged.

#![deny(unsafe_code)]

use risk_classifier::RiskLevel;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use telemetry::{Emitter, TelemetryEvent};

/// Lifecycle state of the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RobotSafetyState {
    /// Powered but not accepting motion commands.
    Idle,
    /// Accepting motion commands with a human supervising.
    Supervised,
    /// Accepting motion commands without direct supervision.
    Autonomous,
    /// Out of service for maintenance.
    Maintenance,
    /// Emergency stop latched; no motion permitted.
    Estop,
}

impl std::fmt::Display for RobotSafetyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A linear/angular velocity pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct Velocity {
    /// Linear speed, meters/second.
    pub linear: f64,
    /// Angular speed, radians/second.
    pub angular: f64,
}

/// What kind of motion a [`MotionCommand`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionKind {
    /// A raw velocity command.
    Velocity,
    /// Move to a single target position.
    Position,
    /// Follow a sequence of waypoints.
    Trajectory,
}

/// A candidate motion command.
#[derive(Debug, Clone, Default)]
pub struct MotionCommand {
    /// What kind of command this is.
    pub kind: Option<MotionKind>,
    /// Requested velocity, if any.
    pub velocity: Option<Velocity>,
    /// Requested acceleration, if any.
    pub acceleration: Option<f64>,
    /// Target position for `MotionKind::Position`, `[x, y, z]`.
    pub position: Option<[f64; 3]>,
    /// Waypoints for `MotionKind::Trajectory`, each `[x, y, z]`.
    pub waypoints: Option<Vec<[f64; 3]>>,
}

/// A snapshot of robot state fed into [`RobotSafetyController::validate_motion`].
#[derive(Debug, Clone)]
pub struct RobotStatus {
    /// Identifier of the reporting robot.
    pub robot_id: String,
    /// The lifecycle state the robot believes it is in.
    pub state: RobotSafetyState,
    /// Battery charge, 0-100.
    pub battery_level: f64,
    /// Whether the robot's own hardware E-Stop is engaged.
    pub estop_engaged: bool,
    /// Active fault codes, if any.
    pub errors: Vec<String>,
    /// Whether a human has been detected nearby.
    pub human_detected: bool,
    /// Distance to the nearest detected human, meters, if known.
    pub human_distance: Option<f64>,
}

impl Default for RobotStatus {
    fn default() -> Self {
        Self {
            robot_id: String::new(),
            state: RobotSafetyState::Idle,
            battery_level: 100.0,
            estop_engaged: false,
            errors: Vec::new(),
            human_detected: false,
            human_distance: None,
        }
    }
}

/// Tunable safety limits enforced by [`RobotSafetyController::validate_motion`].
#[derive(Debug, Clone)]
pub struct SafetyConstraints {
    /// Maximum linear velocity, meters/second.
    pub max_linear_velocity: f64,
    /// Maximum angular velocity, radians/second.
    pub max_angular_velocity: f64,
    /// Maximum acceleration, meters/second^2.
    pub max_acceleration: f64,
    /// Minimum battery percentage to permit motion without approval.
    pub min_battery_level: f64,
    /// Whether to run the human-proximity check at all.
    pub require_human_proximity_check: bool,
    /// Distance below which a detected human blocks motion outright.
    pub human_safe_distance: f64,
    /// Distance below which (but above `human_safe_distance`) a detected
    /// human requires approval.
    pub human_warn_distance: f64,
    /// Workspace bounds as `[x_min, x_max, y_min, y_max, z_min, z_max]`.
    pub workspace_bounds: [f64; 6],
    /// States in which motion commands are evaluated at all; any other
    /// state is an automatic block.
    pub allowed_states: HashSet<RobotSafetyState>,
}

impl Default for SafetyConstraints {
    fn default() -> Self {
        Self {
            max_linear_velocity: 1.0,
            max_angular_velocity: 1.0,
            max_acceleration: 2.0,
            min_battery_level: 10.0,
            require_human_proximity_check: true,
            human_safe_distance: 0.5,
            human_warn_distance: 1.0,
            workspace_bounds: [-10.0, 10.0, -10.0, 10.0, 0.0, 5.0],
            allowed_states: [RobotSafetyState::Supervised, RobotSafetyState::Autonomous].into_iter().collect(),
        }
    }
}

/// The disposition of a motion command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionResult {
    /// The command may execute.
    Approved,
    /// The command requires human sign-off before executing.
    NeedsApproval,
    /// The command must not execute.
    Blocked,
    /// An emergency stop is latched; no command may execute.
    EstopActive,
}

/// Outcome of validating one [`MotionCommand`] against a [`RobotStatus`].
#[derive(Debug, Clone)]
pub struct MotionValidation {
    /// The disposition.
    pub result: MotionResult,
    /// Risk band of the would-be motion; never `RiskLevel::Safe` (the floor
    /// for an approved motion command is `Low`).
    pub risk: RiskLevel,
    /// True iff `result == Approved`.
    pub allowed: bool,
    /// True iff `result == NeedsApproval`.
    pub requires_approval: bool,
    /// Reasons backing the disposition.
    pub reasons: Vec<String>,
}

impl MotionValidation {
    fn new(result: MotionResult, risk: RiskLevel, reasons: Vec<String>) -> Self {
        Self {
            result,
            risk,
            allowed: result == MotionResult::Approved,
            requires_approval: result == MotionResult::NeedsApproval,
            reasons,
        }
    }
}

type StateChangeHook = Box<dyn Fn(RobotSafetyState, RobotSafetyState) + Send + Sync>;
type MotionBlockedHook = Box<dyn Fn(&MotionCommand, &[String]) + Send + Sync>;

/// Owns the robot's lifecycle state and E-Stop latch, and validates motion
/// commands against a fixed set of [`SafetyConstraints`].
///
/// `engage_estop` is safe to call from any thread, including an interrupt
/// handler: the latch is an atomic flag, so an in-flight `validate_motion`
/// on another thread observes it on its very next check.
pub struct RobotSafetyController {
    state: Mutex<RobotSafetyState>,
    estop_engaged: AtomicBool,
    constraints: SafetyConstraints,
    emitter: Option<std::sync::Arc<dyn Emitter>>,
    on_state_change: Mutex<Vec<StateChangeHook>>,
    on_motion_blocked: Mutex<Vec<MotionBlockedHook>>,
}

impl RobotSafetyController {
    /// Construct a controller in `Idle` with the given constraints and no
    /// telemetry emitter.
    #[must_use]
    pub fn new(constraints: SafetyConstraints) -> Self {
        Self {
            state: Mutex::new(RobotSafetyState::Idle),
            estop_engaged: AtomicBool::new(false),
            constraints,
            emitter: None,
            on_state_change: Mutex::new(Vec::new()),
            on_motion_blocked: Mutex::new(Vec::new()),
        }
    }

    /// Attach a telemetry emitter; state transitions, E-Stop events, and
    /// motion blocks are reported through it.
    #[must_use]
    pub fn with_emitter(mut self, emitter: std::sync::Arc<dyn Emitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    fn emit(&self, event: TelemetryEvent) {
        if let Some(e) = &self.emitter {
            e.emit(&event);
        }
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RobotSafetyState {
        *self.state.lock().expect("robot state lock poisoned")
    }

    /// Whether the E-Stop is currently latched.
    #[must_use]
    pub fn estop_engaged(&self) -> bool {
        self.estop_engaged.load(Ordering::SeqCst)
    }

    /// Register a callback fired on every successful state transition,
    /// including into and out of `Estop`.
    pub fn on_state_change(
        &self,
        callback: impl Fn(RobotSafetyState, RobotSafetyState) + Send + Sync + 'static,
    ) {
        self.on_state_change.lock().expect("hook lock poisoned").push(Box::new(callback));
    }

    /// Register a callback fired whenever `validate_motion` returns
    /// `Blocked`, `NeedsApproval`, or `EstopActive`. Never fired on
    /// `Approved`.
    pub fn on_motion_blocked(&self, callback: impl Fn(&MotionCommand, &[String]) + Send + Sync + 'static) {
        self.on_motion_blocked.lock().expect("hook lock poisoned").push(Box::new(callback));
    }

    fn fire_state_change(&self, old: RobotSafetyState, new: RobotSafetyState) {
        for hook in self.on_state_change.lock().expect("hook lock poisoned").iter() {
            hook(old, new);
        }
        self.emit(TelemetryEvent::RobotStateTransition { old: old.to_string(), new: new.to_string() });
    }

    fn fire_motion_blocked(&self, command: &MotionCommand, reasons: &[String]) {
        for hook in self.on_motion_blocked.lock().expect("hook lock poisoned").iter() {
            hook(command, reasons);
        }
        self.emit(TelemetryEvent::RobotMotionBlocked {
            command: format!("{command:?}"),
            reasons: reasons.to_vec(),
        });
    }

    /// Attempt a lifecycle transition. Returns `false` (and leaves the state
    /// unchanged) if the transition is not in the admissible graph, if the
    /// E-Stop is latched, or if `target == Estop` (use [`Self::engage_estop`]
    /// instead).
    pub fn transition_state(&self, target: RobotSafetyState) -> bool {
        if self.estop_engaged() || target == RobotSafetyState::Estop {
            return false;
        }
        let mut state = self.state.lock().expect("robot state lock poisoned");
        let admissible = matches!(
            (*state, target),
            (RobotSafetyState::Idle, RobotSafetyState::Supervised)
                | (RobotSafetyState::Idle, RobotSafetyState::Maintenance)
                | (RobotSafetyState::Supervised, RobotSafetyState::Idle)
                | (RobotSafetyState::Supervised, RobotSafetyState::Autonomous)
                | (RobotSafetyState::Autonomous, RobotSafetyState::Supervised)
                | (RobotSafetyState::Autonomous, RobotSafetyState::Idle)
                | (RobotSafetyState::Maintenance, RobotSafetyState::Idle)
        );
        if !admissible {
            return false;
        }
        let old = *state;
        *state = target;
        drop(state);
        self.fire_state_change(old, target);
        true
    }

    /// Engage the emergency stop. Always succeeds, from any state
    /// (including while already engaged, which is a no-op transition-wise).
    pub fn engage_estop(&self, reason: &str) {
        self.estop_engaged.store(true, Ordering::SeqCst);
        let mut state = self.state.lock().expect("robot state lock poisoned");
        if *state != RobotSafetyState::Estop {
            let old = *state;
            *state = RobotSafetyState::Estop;
            drop(state);
            self.fire_state_change(old, RobotSafetyState::Estop);
        }
        self.emit(TelemetryEvent::RobotEstopEngaged { reason: reason.to_string() });
    }

    /// Release the emergency stop, transitioning to `Idle`. Returns `false`
    /// (a no-op) if the E-Stop was not engaged.
    pub fn release_estop(&self) -> bool {
        if !self.estop_engaged.swap(false, Ordering::SeqCst) {
            return false;
        }
        let mut state = self.state.lock().expect("robot state lock poisoned");
        let old = *state;
        *state = RobotSafetyState::Idle;
        drop(state);
        self.fire_state_change(old, RobotSafetyState::Idle);
        self.emit(TelemetryEvent::RobotEstopReleased);
        true
    }

    /// Validate a motion command against the current state snapshot and the
    /// controller's constraints. Pure with respect to `status` (a value
    /// input); only the E-Stop flag and lifecycle state are read from the
    /// controller itself.
    #[must_use]
    pub fn validate_motion(&self, command: &MotionCommand, status: &RobotStatus) -> MotionValidation {
        let result = self.check_estop(status)
            .or_else(|| self.check_state(status))
            .or_else(|| self.check_human_proximity(status))
            .or_else(|| self.check_battery(status))
            .or_else(|| self.check_velocity(command))
            .or_else(|| self.check_acceleration(command))
            .or_else(|| self.check_workspace_bounds(command))
            .or_else(|| self.check_health(status))
            .unwrap_or_else(|| MotionValidation::new(MotionResult::Approved, RiskLevel::Low, vec!["Motion approved".to_string()]));

        if result.result != MotionResult::Approved {
            self.fire_motion_blocked(command, &result.reasons);
        }
        result
    }

    fn check_estop(&self, status: &RobotStatus) -> Option<MotionValidation> {
        if self.estop_engaged() || status.estop_engaged {
            return Some(MotionValidation::new(
                MotionResult::EstopActive,
                RiskLevel::Critical,
                vec!["Emergency stop is active".to_string()],
            ));
        }
        None
    }

    fn check_state(&self, status: &RobotStatus) -> Option<MotionValidation> {
        if !self.constraints.allowed_states.contains(&status.state) {
            return Some(MotionValidation::new(
                MotionResult::Blocked,
                RiskLevel::High,
                vec![format!("Motion not allowed in state {:?}", status.state)],
            ));
        }
        None
    }

    fn check_human_proximity(&self, status: &RobotStatus) -> Option<MotionValidation> {
        if !self.constraints.require_human_proximity_check || !status.human_detected {
            return None;
        }
        let distance = status.human_distance?;
        if distance < self.constraints.human_safe_distance {
            return Some(MotionValidation::new(
                MotionResult::Blocked,
                RiskLevel::High,
                vec!["Human detected within safe distance".to_string()],
            ));
        }
        if distance < self.constraints.human_warn_distance {
            return Some(MotionValidation::new(
                MotionResult::NeedsApproval,
                RiskLevel::Medium,
                vec!["Human nearby".to_string()],
            ));
        }
        None
    }

    fn check_battery(&self, status: &RobotStatus) -> Option<MotionValidation> {
        if status.battery_level < self.constraints.min_battery_level {
            return Some(MotionValidation::new(
                MotionResult::NeedsApproval,
                RiskLevel::Medium,
                vec![format!("Low battery ({:.1}%)", status.battery_level)],
            ));
        }
        None
    }

    fn check_velocity(&self, command: &MotionCommand) -> Option<MotionValidation> {
        let v = command.velocity?;
        if v.linear.abs() > self.constraints.max_linear_velocity
            || v.angular.abs() > self.constraints.max_angular_velocity
        {
            return Some(MotionValidation::new(
                MotionResult::NeedsApproval,
                RiskLevel::Medium,
                vec!["Velocity exceeds limit".to_string()],
            ));
        }
        None
    }

    fn check_acceleration(&self, command: &MotionCommand) -> Option<MotionValidation> {
        let a = command.acceleration?;
        if a.abs() > self.constraints.max_acceleration {
            return Some(MotionValidation::new(
                MotionResult::NeedsApproval,
                RiskLevel::Medium,
                vec!["Acceleration exceeds limit".to_string()],
            ));
        }
        None
    }

    fn check_workspace_bounds(&self, command: &MotionCommand) -> Option<MotionValidation> {
        let [x_min, x_max, y_min, y_max, z_min, z_max] = self.constraints.workspace_bounds;
        let axis_label = |i: usize| match i {
            0 => "X",
            1 => "Y",
            _ => "Z",
        };
        let out_of_bounds = |p: &[f64; 3]| -> Option<&'static str> {
            let bounds = [(p[0], x_min, x_max), (p[1], y_min, y_max), (p[2], z_min, z_max)];
            for (i, (v, lo, hi)) in bounds.into_iter().enumerate() {
                if v < lo || v > hi {
                    return Some(axis_label(i));
                }
            }
            None
        };

        match command.kind {
            Some(MotionKind::Position) => {
                let p = command.position?;
                let axis = out_of_bounds(&p)?;
                Some(MotionValidation::new(
                    MotionResult::NeedsApproval,
                    RiskLevel::Medium,
                    vec![format!("{axis} position out of bounds")],
                ))
            }
            Some(MotionKind::Trajectory) => {
                let waypoints = command.waypoints.as_ref()?;
                for p in waypoints {
                    if let Some(axis) = out_of_bounds(p) {
                        return Some(MotionValidation::new(
                            MotionResult::NeedsApproval,
                            RiskLevel::Medium,
                            vec![format!("{axis} position out of bounds")],
                        ));
                    }
                }
                None
            }
            _ => None,
        }
    }

    fn check_health(&self, status: &RobotStatus) -> Option<MotionValidation> {
        if !status.errors.is_empty() {
            return Some(MotionValidation::new(
                MotionResult::NeedsApproval,
                RiskLevel::Medium,
                vec!["Robot has active errors".to_string()],
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_to_supervised_to_autonomous() {
        let c = RobotSafetyController::new(SafetyConstraints::default());
        assert!(c.transition_state(RobotSafetyState::Supervised));
        assert!(c.transition_state(RobotSafetyState::Autonomous));
        assert_eq!(c.state(), RobotSafetyState::Autonomous);
    }

    #[test]
    fn idle_to_autonomous_directly_is_rejected() {
        let c = RobotSafetyController::new(SafetyConstraints::default());
        assert!(!c.transition_state(RobotSafetyState::Autonomous));
        assert_eq!(c.state(), RobotSafetyState::Idle);
    }

    #[test]
    fn maintenance_to_supervised_is_rejected() {
        let c = RobotSafetyController::new(SafetyConstraints::default());
        assert!(c.transition_state(RobotSafetyState::Maintenance));
        assert!(!c.transition_state(RobotSafetyState::Supervised));
        assert_eq!(c.state(), RobotSafetyState::Maintenance);
    }

    #[test]
    fn estop_latches_and_blocks_all_transitions() {
        let c = RobotSafetyController::new(SafetyConstraints::default());
        c.transition_state(RobotSafetyState::Supervised);
        c.engage_estop("test");
        assert_eq!(c.state(), RobotSafetyState::Estop);
        assert!(!c.transition_state(RobotSafetyState::Supervised));
        assert!(c.release_estop());
        assert_eq!(c.state(), RobotSafetyState::Idle);
    }

    #[test]
    fn release_estop_when_not_engaged_is_a_no_op() {
        let c = RobotSafetyController::new(SafetyConstraints::default());
        assert!(!c.release_estop());
    }

    #[test]
    fn motion_in_idle_is_blocked() {
        let c = RobotSafetyController::new(SafetyConstraints::default());
        let status = RobotStatus::default();
        let v = c.validate_motion(&MotionCommand::default(), &status);
        assert_eq!(v.result, MotionResult::Blocked);
    }

    #[test]
    fn estop_active_outranks_every_other_check() {
        let c = RobotSafetyController::new(SafetyConstraints::default());
        c.transition_state(RobotSafetyState::Supervised);
        c.engage_estop("test");
        let status = RobotStatus { state: RobotSafetyState::Supervised, ..RobotStatus::default() };
        let v = c.validate_motion(&MotionCommand::default(), &status);
        assert_eq!(v.result, MotionResult::EstopActive);
        assert_eq!(v.risk, RiskLevel::Critical);
    }

    #[test]
    fn status_reported_estop_blocks_even_without_controller_flag() {
        let c = RobotSafetyController::new(SafetyConstraints::default());
        let status = RobotStatus { state: RobotSafetyState::Supervised, estop_engaged: true, ..RobotStatus::default() };
        let v = c.validate_motion(&MotionCommand::default(), &status);
        assert_eq!(v.result, MotionResult::EstopActive);
    }

    #[test]
    fn human_too_close_blocks() {
        let c = RobotSafetyController::new(SafetyConstraints::default());
        let status = RobotStatus {
            state: RobotSafetyState::Supervised,
            human_detected: true,
            human_distance: Some(0.3),
            ..RobotStatus::default()
        };
        let v = c.validate_motion(&MotionCommand::default(), &status);
        assert_eq!(v.result, MotionResult::Blocked);
        assert!(v.reasons[0].contains("within safe distance"));
    }

    #[test]
    fn human_nearby_requires_approval() {
        let c = RobotSafetyController::new(SafetyConstraints::default());
        let status = RobotStatus {
            state: RobotSafetyState::Supervised,
            human_detected: true,
            human_distance: Some(0.8),
            ..RobotStatus::default()
        };
        let v = c.validate_motion(&MotionCommand::default(), &status);
        assert_eq!(v.result, MotionResult::NeedsApproval);
        assert!(v.reasons[0].contains("Human nearby"));
    }

    #[test]
    fn low_battery_requires_approval() {
        let c = RobotSafetyController::new(SafetyConstraints::default());
        let status = RobotStatus { state: RobotSafetyState::Supervised, battery_level: 5.0, ..RobotStatus::default() };
        let v = c.validate_motion(&MotionCommand::default(), &status);
        assert_eq!(v.result, MotionResult::NeedsApproval);
        assert!(v.reasons[0].contains("Low battery"));
    }

    #[test]
    fn excess_velocity_requires_approval() {
        let c = RobotSafetyController::new(SafetyConstraints::default());
        let status = RobotStatus { state: RobotSafetyState::Supervised, ..RobotStatus::default() };
        let cmd = MotionCommand {
            kind: Some(MotionKind::Velocity),
            velocity: Some(Velocity { linear: 2.0, angular: 0.0 }),
            ..MotionCommand::default()
        };
        let v = c.validate_motion(&cmd, &status);
        assert_eq!(v.result, MotionResult::NeedsApproval);
        assert!(v.reasons[0].contains("Velocity"));
    }

    #[test]
    fn position_outside_workspace_requires_approval() {
        let mut constraints = SafetyConstraints::default();
        constraints.workspace_bounds = [-1.0, 1.0, -1.0, 1.0, 0.0, 1.0];
        let c = RobotSafetyController::new(constraints);
        let status = RobotStatus { state: RobotSafetyState::Supervised, ..RobotStatus::default() };
        let cmd = MotionCommand {
            kind: Some(MotionKind::Position),
            position: Some([2.0, 0.0, 0.5]),
            ..MotionCommand::default()
        };
        let v = c.validate_motion(&cmd, &status);
        assert_eq!(v.result, MotionResult::NeedsApproval);
        assert!(v.reasons[0].contains('X'));
    }

    #[test]
    fn trajectory_waypoint_outside_workspace_requires_approval() {
        let mut constraints = SafetyConstraints::default();
        constraints.workspace_bounds = [-1.0, 1.0, -1.0, 1.0, 0.0, 1.0];
        let c = RobotSafetyController::new(constraints);
        let status = RobotStatus { state: RobotSafetyState::Supervised, ..RobotStatus::default() };
        let cmd = MotionCommand {
            kind: Some(MotionKind::Trajectory),
            waypoints: Some(vec![[0.0, 0.0, 0.5], [0.0, 5.0, 0.5]]),
            ..MotionCommand::default()
        };
        let v = c.validate_motion(&cmd, &status);
        assert_eq!(v.result, MotionResult::NeedsApproval);
        assert!(v.reasons[0].contains('Y'));
    }

    #[test]
    fn active_errors_require_approval() {
        let c = RobotSafetyController::new(SafetyConstraints::default());
        let status = RobotStatus {
            state: RobotSafetyState::Supervised,
            errors: vec!["Motor driver fault".to_string()],
            ..RobotStatus::default()
        };
        let v = c.validate_motion(&MotionCommand::default(), &status);
        assert_eq!(v.result, MotionResult::NeedsApproval);
        assert!(v.reasons[0].contains("active errors"));
    }

    #[test]
    fn safe_motion_in_supervised_is_approved() {
        let c = RobotSafetyController::new(SafetyConstraints::default());
        let status = RobotStatus { state: RobotSafetyState::Supervised, ..RobotStatus::default() };
        let v = c.validate_motion(&MotionCommand::default(), &status);
        assert_eq!(v.result, MotionResult::Approved);
        assert!(v.allowed);
    }

    #[test]
    fn state_change_callback_fires_on_transition() {
        let c = RobotSafetyController::new(SafetyConstraints::default());
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        c.on_state_change(move |old, new| seen2.lock().unwrap().push((old, new)));
        c.transition_state(RobotSafetyState::Supervised);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn motion_blocked_callback_fires_on_needs_approval_not_on_approved() {
        let c = RobotSafetyController::new(SafetyConstraints::default());
        let count = std::sync::Arc::new(Mutex::new(0));
        let count2 = count.clone();
        c.on_motion_blocked(move |_, _| *count2.lock().unwrap() += 1);

        // Approved case: no callback.
        let ok_status = RobotStatus { state: RobotSafetyState::Supervised, ..RobotStatus::default() };
        c.validate_motion(&MotionCommand::default(), &ok_status);
        assert_eq!(*count.lock().unwrap(), 0);

        // NeedsApproval case: callback fires even though it's not a hard block.
        let low_battery = RobotStatus { state: RobotSafetyState::Supervised, battery_level: 5.0, ..RobotStatus::default() };
        c.validate_motion(&MotionCommand::default(), &low_battery);
        assert_eq!(*count.lock().unwrap(), 1);
    }
}
