//! Composition root for command gating.
//!
//! [`SecurityController`] owns a [`RiskClassifier`], a [`PolicyManager`], an
//! [`Rbac`], an [`ApprovalProvider`], and an [`AuditSink`], and wires them
//! into the single decision pipeline described by `check`/
//! `validate_and_approve`. Every terminal decision writes exactly one
//! [`AuditRecord`] and emits exactly one [`TelemetryEvent`]; nothing else in
//! the workspace is allowed to write to the audit trail.

#![deny(unsafe_code)]

use approval_flow::{ApprovalProvider, ApprovalRequest, ApprovalResult};
use audit_log::{AuditOutcome, AuditRecord, AuditSink};
use risk_classifier::{CommandRiskAssessment, RiskClassifier, RiskLevel};
use security_policy::rbac::{Rbac, User};
use security_policy::PolicyManager;
use std::sync::Arc;
use telemetry::{Emitter, TelemetryEvent};

/// Input bundle for one gating decision.
#[derive(Debug, Clone)]
pub struct SecurityContext {
    /// The acting principal.
    pub user: User,
    /// Device the command targets, if any; selects a [`PolicyManager`] override.
    pub device_id: Option<String>,
    /// Working directory of the caller, surfaced in approval prompts.
    pub cwd: Option<String>,
    /// Whether an approval prompt may be shown. When `false`,
    /// `validate_and_approve` treats anything needing approval as blocked.
    pub interactive: bool,
}

impl SecurityContext {
    /// Construct a context for `user`, interactive by default.
    #[must_use]
    pub fn new(user: User) -> Self {
        Self { user, device_id: None, cwd: None, interactive: true }
    }
}

/// Terminal disposition of a gating decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionResult {
    /// The command may run.
    Allow,
    /// A human must decide; only returned by [`SecurityController::check`].
    NeedApproval,
    /// The command must not run.
    Blocked,
}

/// The outcome of a gating decision.
#[derive(Debug, Clone)]
pub struct SecurityDecision {
    /// The disposition.
    pub result: DecisionResult,
    /// Final command text: the original, or the edited replacement if an
    /// `EDITED` approval response was accepted.
    pub command: String,
    /// The risk assessment that drove the decision.
    pub assessment: CommandRiskAssessment,
    /// Human-readable explanation.
    pub reason: String,
    /// Identity of the human who approved the command, if any.
    pub approved_by: Option<String>,
}

/// Wires the classifier, policy engine, RBAC, approval flow, and audit sink
/// into one decision pipeline.
pub struct SecurityController {
    classifier: RiskClassifier,
    policy: PolicyManager,
    rbac: Rbac,
    approval: Box<dyn ApprovalProvider>,
    audit: Box<dyn AuditSink>,
    emitter: Option<Arc<dyn Emitter>>,
}

impl SecurityController {
    /// Construct a controller from its four owned collaborators.
    #[must_use]
    pub fn new(
        classifier: RiskClassifier,
        policy: PolicyManager,
        approval: Box<dyn ApprovalProvider>,
        audit: Box<dyn AuditSink>,
    ) -> Self {
        Self { classifier, policy, rbac: Rbac, approval, audit, emitter: None }
    }

    /// Attach a telemetry emitter.
    #[must_use]
    pub fn with_emitter(mut self, emitter: Arc<dyn Emitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    fn emit(&self, event: TelemetryEvent) {
        if let Some(e) = &self.emitter {
            e.emit(&event);
        }
    }

    fn record_and_return(
        &self,
        context: &SecurityContext,
        command: String,
        assessment: CommandRiskAssessment,
        result: DecisionResult,
        outcome: AuditOutcome,
        reason: String,
        approved_by: Option<String>,
    ) -> SecurityDecision {
        let level = assessment.level;
        let _ = self.audit.record(AuditRecord::new(
            context.user.id.clone(),
            command.clone(),
            level,
            outcome,
            reason.clone(),
        ));
        self.emit(TelemetryEvent::SecurityDecisionMade {
            command: command.clone(),
            level,
            outcome: format!("{outcome:?}"),
            approver: approved_by.clone(),
        });
        SecurityDecision { result, command, assessment, reason, approved_by }
    }

    /// Evaluate `command` against the classifier, policy, and RBAC, but
    /// never prompt: a command needing a human decision comes back as
    /// `NeedApproval` rather than being resolved.
    #[must_use]
    pub fn check(&self, command: &str, context: &SecurityContext) -> SecurityDecision {
        self.decide(command, context, false)
    }

    /// Evaluate `command`, resolving any needed approval through the
    /// attached [`ApprovalProvider`]. An `EDITED` response re-enters the
    /// pipeline from the top with the replacement text, so the edited
    /// command is itself fully reclassified and re-gated rather than
    /// assumed safe.
    #[must_use]
    pub fn validate_and_approve(&self, command: &str, context: &SecurityContext) -> SecurityDecision {
        self.decide(command, context, true)
    }

    fn decide(&self, command: &str, context: &SecurityContext, resolve_approval: bool) -> SecurityDecision {
        let assessment = self.classifier.classify(command);
        self.emit(TelemetryEvent::CommandClassified {
            command: command.to_string(),
            level: assessment.level,
            reasons: assessment.reasons.clone(),
        });

        if assessment.is_blocked {
            return self.record_and_return(
                context,
                command.to_string(),
                assessment,
                DecisionResult::Blocked,
                AuditOutcome::Blocked,
                "Blocked by risk classifier".to_string(),
                None,
            );
        }

        let policy = self.policy.get_policy(context.device_id.as_deref());
        if policy.is_blocked_by_mode(assessment.level) {
            return self.record_and_return(
                context,
                command.to_string(),
                assessment,
                DecisionResult::Blocked,
                AuditOutcome::Blocked,
                "Blocked by security policy".to_string(),
                None,
            );
        }

        let (allowed, mut needs_approval, rbac_reason) =
            self.rbac.check_access(&context.user, assessment.level, context.device_id.as_deref());
        if !allowed && !needs_approval {
            return self.record_and_return(
                context,
                command.to_string(),
                assessment,
                DecisionResult::Blocked,
                AuditOutcome::Blocked,
                rbac_reason,
                None,
            );
        }

        if policy.requires_approval(assessment.level) {
            needs_approval = true;
        }

        if needs_approval {
            if !resolve_approval {
                return SecurityDecision {
                    result: DecisionResult::NeedApproval,
                    command: command.to_string(),
                    assessment,
                    reason: "Approval required".to_string(),
                    approved_by: None,
                };
            }

            if !context.interactive {
                return self.record_and_return(
                    context,
                    command.to_string(),
                    assessment,
                    DecisionResult::Blocked,
                    AuditOutcome::Denied,
                    "Non-interactive mode, approval required".to_string(),
                    None,
                );
            }

            let mut request = ApprovalRequest::new(command, assessment.level, assessment.reasons.clone(), context.user.id.clone());
            request.cwd = context.cwd.clone();
            request.device_id = context.device_id.clone();
            self.emit(TelemetryEvent::ApprovalRequested { command: command.to_string(), level: assessment.level });

            let response = self.approval.request_approval(&request);
            self.emit(TelemetryEvent::ApprovalResolved {
                result: format!("{:?}", response.result),
                approver: response.approver.clone(),
                timestamp_ms: response.timestamp_ms,
            });

            return match response.result {
                ApprovalResult::Approved => self.record_and_return(
                    context,
                    command.to_string(),
                    assessment,
                    DecisionResult::Allow,
                    AuditOutcome::Approved,
                    "Approved by user".to_string(),
                    response.approver,
                ),
                ApprovalResult::Edited => {
                    let mut decision = self.decide(&response.command, context, true);
                    if decision.approved_by.is_none() {
                        decision.approved_by = response.approver;
                    }
                    decision
                }
                ApprovalResult::Skipped => self.record_and_return(
                    context,
                    command.to_string(),
                    assessment,
                    DecisionResult::Blocked,
                    AuditOutcome::Denied,
                    "Approval skipped".to_string(),
                    None,
                ),
                ApprovalResult::Denied | ApprovalResult::Timeout => self.record_and_return(
                    context,
                    command.to_string(),
                    assessment,
                    DecisionResult::Blocked,
                    AuditOutcome::Denied,
                    response.reason.unwrap_or_else(|| "Denied".to_string()),
                    None,
                ),
            };
        }

        self.record_and_return(
            context,
            command.to_string(),
            assessment,
            DecisionResult::Allow,
            AuditOutcome::Allowed,
            "Allowed by policy".to_string(),
            None,
        )
    }
}
