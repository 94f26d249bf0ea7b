//! Human-in-the-loop and automatic approval gates.
//!
//! Both implementations share one interface, [`ApprovalProvider`], in place
//! of the inheritance hierarchy the reference implementation used: an
//! [`InteractiveApproval`] that prompts a terminal, and an
//! [`AutomaticApproval`] that decides from a fixed set of auto-approved risk
//! levels. The [`crate::SecurityController`]-equivalent caller (in the
//! `security-controller` crate) is generic over this trait.

#![deny(unsafe_code)]

use risk_classifier::RiskLevel;
use sh_core::ids::now_ms;
use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::time::Duration;

/// A command awaiting human sign-off.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    /// The command being gated.
    pub command: String,
    /// The classifier's risk level for this command.
    pub risk_level: RiskLevel,
    /// Reasons surfaced by the classifier and policy layers.
    pub reasons: Vec<String>,
    /// Calling user's display name.
    pub user: String,
    /// Working directory of the caller, if known.
    pub cwd: Option<String>,
    /// Device the command targets, if any.
    pub device_id: Option<String>,
    /// How long to wait for a response before treating the request as timed out.
    pub timeout: Duration,
}

impl ApprovalRequest {
    /// Construct a request with the default 30-second timeout.
    #[must_use]
    pub fn new(command: impl Into<String>, risk_level: RiskLevel, reasons: Vec<String>, user: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            risk_level,
            reasons,
            user: user.into(),
            cwd: None,
            device_id: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// The disposition of an [`ApprovalRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalResult {
    /// The command may run as originally proposed.
    Approved,
    /// The command must not run.
    Denied,
    /// The approver supplied a replacement command; it must be reclassified
    /// and re-gated from scratch.
    Edited,
    /// The approver explicitly skipped the decision.
    Skipped,
    /// No response arrived within the request's timeout.
    Timeout,
}

/// The approver's reply.
#[derive(Debug, Clone)]
pub struct ApprovalResponse {
    /// The disposition.
    pub result: ApprovalResult,
    /// The command to run if `result == Approved` or `Edited` (the edited
    /// text in the latter case; the original text otherwise).
    pub command: String,
    /// Identity of the approver, when known.
    pub approver: Option<String>,
    /// Milliseconds since the epoch at which the response was produced.
    pub timestamp_ms: u64,
    /// Free-text reason, populated for every non-`Approved` result.
    pub reason: Option<String>,
}

/// Shared interface implemented by both approval strategies.
pub trait ApprovalProvider: Send + Sync {
    /// Present `request` and return the approver's disposition.
    fn request_approval(&self, request: &ApprovalRequest) -> ApprovalResponse;
}

fn risk_color(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Safe => "\x1b[32m",     // green
        RiskLevel::Low => "\x1b[36m",      // cyan
        RiskLevel::Medium => "\x1b[33m",   // yellow
        RiskLevel::High => "\x1b[31m",     // red
        RiskLevel::Critical => "\x1b[1;31m", // bold red
    }
}

const COLOR_RESET: &str = "\x1b[0m";

/// Terminal-driven approval: prints the request, reads a one-letter
/// response, and supports an inline edit-and-reconfirm loop.
pub struct InteractiveApproval {
    use_color: bool,
}

impl Default for InteractiveApproval {
    fn default() -> Self {
        Self { use_color: true }
    }
}

impl InteractiveApproval {
    /// Construct with color output enabled (the default).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct with color output disabled, e.g. for non-TTY capture.
    #[must_use]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }

    fn render(&self, request: &ApprovalRequest) -> String {
        let (color, reset) = if self.use_color { (risk_color(request.risk_level), COLOR_RESET) } else { ("", "") };
        let mut out = String::new();
        out.push_str(&format!("{color}=== APPROVAL REQUIRED ==={reset}\n"));
        out.push_str(&format!("Risk level: {color}{:?}{reset}\n", request.risk_level));
        out.push_str(&format!("Command: {}\n", request.command));
        if let Some(cwd) = &request.cwd {
            out.push_str(&format!("cwd: {cwd}\n"));
        }
        if !request.reasons.is_empty() {
            out.push_str("Reasons:\n");
            for r in &request.reasons {
                out.push_str(&format!("  - {r}\n"));
            }
        }
        out.push_str("[y]es / [n]o / [s]kip / [e]dit: ");
        out
    }

    fn read_line_with_timeout(timeout: Duration) -> Option<String> {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut line = String::new();
            let read = io::stdin().lock().read_line(&mut line);
            let _ = tx.send(read.map(|_| line));
        });
        rx.recv_timeout(timeout).ok().and_then(Result::ok)
    }
}

impl ApprovalProvider for InteractiveApproval {
    fn request_approval(&self, request: &ApprovalRequest) -> ApprovalResponse {
        print!("{}", self.render(request));
        let _ = io::stdout().flush();

        let reply = match Self::read_line_with_timeout(request.timeout) {
            Some(line) => line,
            None => {
                return ApprovalResponse {
                    result: ApprovalResult::Timeout,
                    command: request.command.clone(),
                    approver: None,
                    timestamp_ms: now_ms(),
                    reason: Some("No response within timeout".to_string()),
                };
            }
        };

        match reply.trim().to_lowercase().as_str() {
            "y" | "yes" => ApprovalResponse {
                result: ApprovalResult::Approved,
                command: request.command.clone(),
                approver: Some(request.user.clone()),
                timestamp_ms: now_ms(),
                reason: None,
            },
            "n" | "no" => ApprovalResponse {
                result: ApprovalResult::Denied,
                command: request.command.clone(),
                approver: Some(request.user.clone()),
                timestamp_ms: now_ms(),
                reason: Some("Denied by user".to_string()),
            },
            "s" | "skip" => ApprovalResponse {
                result: ApprovalResult::Skipped,
                command: request.command.clone(),
                approver: Some(request.user.clone()),
                timestamp_ms: now_ms(),
                reason: Some("Skipped by user".to_string()),
            },
            "e" | "edit" => self.handle_edit(request),
            "" => ApprovalResponse {
                result: ApprovalResult::Denied,
                command: request.command.clone(),
                approver: None,
                timestamp_ms: now_ms(),
                reason: Some("Cancelled by user".to_string()),
            },
            _ => ApprovalResponse {
                result: ApprovalResult::Denied,
                command: request.command.clone(),
                approver: Some(request.user.clone()),
                timestamp_ms: now_ms(),
                reason: Some("Invalid response".to_string()),
            },
        }
    }
}

impl InteractiveApproval {
    fn handle_edit(&self, request: &ApprovalRequest) -> ApprovalResponse {
        print!("Replacement command (blank to keep original): ");
        let _ = io::stdout().flush();
        let edited = match Self::read_line_with_timeout(request.timeout) {
            Some(line) => line,
            None => {
                return ApprovalResponse {
                    result: ApprovalResult::Timeout,
                    command: request.command.clone(),
                    approver: None,
                    timestamp_ms: now_ms(),
                    reason: Some("No response within timeout".to_string()),
                };
            }
        };
        let edited = edited.trim();
        let new_command = if edited.is_empty() { request.command.clone() } else { edited.to_string() };

        print!("Confirm edited command \"{new_command}\"? [y/n]: ");
        let _ = io::stdout().flush();
        let confirm = Self::read_line_with_timeout(request.timeout).unwrap_or_default();

        match confirm.trim().to_lowercase().as_str() {
            "y" | "yes" => ApprovalResponse {
                result: ApprovalResult::Edited,
                command: new_command,
                approver: Some(request.user.clone()),
                timestamp_ms: now_ms(),
                reason: None,
            },
            _ => ApprovalResponse {
                result: ApprovalResult::Denied,
                command: request.command.clone(),
                approver: None,
                timestamp_ms: now_ms(),
                reason: Some("Edit cancelled".to_string()),
            },
        }
    }
}

/// Non-interactive approval: decides purely from a fixed auto-approve set,
/// never blocks.
pub struct AutomaticApproval {
    auto_approve_levels: HashSet<RiskLevel>,
    auto_deny: bool,
}

impl Default for AutomaticApproval {
    fn default() -> Self {
        Self { auto_approve_levels: [RiskLevel::Safe, RiskLevel::Low].into_iter().collect(), auto_deny: false }
    }
}

impl AutomaticApproval {
    /// Construct with the default auto-approve set: SAFE and LOW.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct with an explicit auto-approve set.
    #[must_use]
    pub fn with_levels(levels: impl IntoIterator<Item = RiskLevel>) -> Self {
        Self { auto_approve_levels: levels.into_iter().collect(), auto_deny: false }
    }

    /// Construct a variant that denies everything, regardless of level.
    #[must_use]
    pub fn deny_all() -> Self {
        Self { auto_approve_levels: HashSet::new(), auto_deny: true }
    }

    fn approver() -> String {
        let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
        format!("auto:{user}")
    }
}

impl ApprovalProvider for AutomaticApproval {
    fn request_approval(&self, request: &ApprovalRequest) -> ApprovalResponse {
        if self.auto_deny {
            return ApprovalResponse {
                result: ApprovalResult::Denied,
                command: request.command.clone(),
                approver: Some(Self::approver()),
                timestamp_ms: now_ms(),
                reason: Some("Auto-deny enabled".to_string()),
            };
        }
        if self.auto_approve_levels.contains(&request.risk_level) {
            ApprovalResponse {
                result: ApprovalResult::Approved,
                command: request.command.clone(),
                approver: Some(Self::approver()),
                timestamp_ms: now_ms(),
                reason: Some("Auto-approved".to_string()),
            }
        } else {
            ApprovalResponse {
                result: ApprovalResult::Denied,
                command: request.command.clone(),
                approver: Some(Self::approver()),
                timestamp_ms: now_ms(),
                reason: Some(format!("{:?} not in auto-approve list", request.risk_level)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn automatic_approves_safe_and_low() {
        let a = AutomaticApproval::new();
        let req = ApprovalRequest::new("ls", RiskLevel::Safe, vec![], "alice");
        assert_eq!(a.request_approval(&req).result, ApprovalResult::Approved);
        let req = ApprovalRequest::new("mkdir x", RiskLevel::Low, vec![], "alice");
        assert_eq!(a.request_approval(&req).result, ApprovalResult::Approved);
    }

    #[test]
    fn automatic_denies_high_by_default() {
        let a = AutomaticApproval::new();
        let req = ApprovalRequest::new("sudo reboot", RiskLevel::High, vec![], "alice");
        let resp = a.request_approval(&req);
        assert_eq!(resp.result, ApprovalResult::Denied);
        assert!(resp.reason.unwrap().contains("not in auto-approve list"));
    }

    #[test]
    fn automatic_deny_all_overrides_everything() {
        let a = AutomaticApproval::deny_all();
        let req = ApprovalRequest::new("ls", RiskLevel::Safe, vec![], "alice");
        let resp = a.request_approval(&req);
        assert_eq!(resp.result, ApprovalResult::Denied);
        assert_eq!(resp.reason.as_deref(), Some("Auto-deny enabled"));
    }

    #[test]
    fn automatic_approver_uses_os_user_prefix() {
        let a = AutomaticApproval::new();
        let req = ApprovalRequest::new("ls", RiskLevel::Safe, vec![], "alice");
        let resp = a.request_approval(&req);
        assert!(resp.approver.unwrap().starts_with("auto:"));
    }

    #[test]
    fn interactive_render_contains_required_markers() {
        let flow = InteractiveApproval::without_color();
        let req = ApprovalRequest::new("sudo reboot", RiskLevel::High, vec!["Host power state change".into()], "alice");
        let rendered = flow.render(&req);
        assert!(rendered.contains("APPROVAL REQUIRED"));
        assert!(rendered.contains("High"));
        assert!(rendered.contains("sudo reboot"));
    }
}
