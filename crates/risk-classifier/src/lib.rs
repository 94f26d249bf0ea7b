//! Pattern-driven static risk classification for shell command strings.
//!
//! The classifier holds an ordered set of [`RiskPattern`]s, compiled once at
//! construction time, and assigns a [`RiskLevel`] to a command by walking the
//! set from most to least severe. It has no side effects and never fails at
//! classification time; a malformed caller-supplied pattern is rejected when
//! the classifier is built, not when it is used.

#![deny(unsafe_code)]

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Errors raised while constructing a [`RiskClassifier`] with custom patterns.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// A caller-supplied regex pattern failed to compile.
    #[error("invalid pattern regex `{pattern}`: {source}")]
    InvalidPattern {
        /// The offending pattern text.
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Totally ordered risk band assigned to a command.
///
/// Ordering is load-bearing: policy and RBAC decisions compare levels with
/// `>=`/`max`, never by casting to an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Read-only or fully reversible.
    Safe,
    /// Local, reversible mutation.
    Low,
    /// Mutation with a meaningful blast radius, usually network- or
    /// package-manager-involving.
    Medium,
    /// Privileged, destructive, or hard to reverse.
    High,
    /// Irreversible system damage; always blocked.
    Critical,
}

enum Matcher {
    Regex(Regex),
    Substring(String),
}

impl Matcher {
    fn matches(&self, command: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(command),
            Self::Substring(needle) => command.to_lowercase().contains(needle.as_str()),
        }
    }
}

/// A single risk matcher: a pattern, the level it carries, and the reason
/// text surfaced to the caller and written to the audit trail.
pub struct RiskPattern {
    matcher: Matcher,
    level: RiskLevel,
    description: String,
    source: String,
}

impl RiskPattern {
    /// Build a pattern from a case-insensitive regular expression.
    pub fn regex(
        pattern: &str,
        level: RiskLevel,
        description: impl Into<String>,
    ) -> Result<Self, ClassifierError> {
        let compiled = Regex::new(&format!("(?i){pattern}")).map_err(|source| {
            ClassifierError::InvalidPattern { pattern: pattern.to_string(), source }
        })?;
        Ok(Self {
            matcher: Matcher::Regex(compiled),
            level,
            description: description.into(),
            source: pattern.to_string(),
        })
    }

    /// Build a pattern from a literal, case-insensitive substring.
    pub fn substring(literal: &str, level: RiskLevel, description: impl Into<String>) -> Self {
        Self {
            matcher: Matcher::Substring(literal.to_lowercase()),
            level,
            description: description.into(),
            source: literal.to_string(),
        }
    }

    fn matches(&self, command: &str) -> bool {
        self.matcher.matches(command)
    }
}

/// Outcome of classifying one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRiskAssessment {
    /// The command that was classified (post-trim).
    pub command: String,
    /// The highest risk level among all matched patterns.
    pub level: RiskLevel,
    /// Human-readable reasons, one per matched pattern (or a single
    /// explanatory entry when nothing matched).
    pub reasons: Vec<String>,
    /// Source text of every pattern that matched, for the audit trail.
    pub matched_patterns: Vec<String>,
    /// True iff `level >= CRITICAL` or the command is on the explicit
    /// blocklist; an unconditional stop regardless of policy or role.
    pub is_blocked: bool,
    /// True iff `level >= HIGH`.
    pub requires_approval: bool,
}

impl CommandRiskAssessment {
    /// `level <= LOW` and not blocked: eligible to run without any gate.
    #[must_use]
    pub fn is_safe(&self) -> bool {
        self.level <= RiskLevel::Low && !self.is_blocked
    }
}

/// Builds [`CommandRiskAssessment`]s from an ordered pattern library plus an
/// explicit blocklist.
pub struct RiskClassifier {
    patterns: Vec<RiskPattern>,
    blocked_commands: HashSet<String>,
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskClassifier {
    /// Construct a classifier with the built-in pattern library and an empty
    /// blocklist.
    #[must_use]
    pub fn new() -> Self {
        Self { patterns: builtin_patterns(), blocked_commands: HashSet::new() }
    }

    /// Append a caller-supplied pattern, checked after the built-in library.
    pub fn add_pattern(&mut self, pattern: RiskPattern) {
        self.patterns.push(pattern);
    }

    /// Add an exact-match command to the unconditional blocklist.
    pub fn block_command(&mut self, command: impl Into<String>) {
        self.blocked_commands.insert(command.into());
    }

    /// Classify a command string. Pure and infallible.
    #[must_use]
    pub fn classify(&self, command: &str) -> CommandRiskAssessment {
        let trimmed = command.trim();

        if trimmed.is_empty() {
            return CommandRiskAssessment {
                command: trimmed.to_string(),
                level: RiskLevel::Safe,
                reasons: vec!["Empty command".to_string()],
                matched_patterns: Vec::new(),
                is_blocked: false,
                requires_approval: false,
            };
        }

        if self.blocked_commands.contains(trimmed) {
            return CommandRiskAssessment {
                command: trimmed.to_string(),
                level: RiskLevel::Critical,
                reasons: vec!["Command is explicitly blocked".to_string()],
                matched_patterns: Vec::new(),
                is_blocked: true,
                requires_approval: true,
            };
        }

        let mut level = RiskLevel::Safe;
        let mut reasons = Vec::new();
        let mut matched_patterns = Vec::new();

        for pattern in &self.patterns {
            if pattern.matches(trimmed) {
                reasons.push(pattern.description.clone());
                matched_patterns.push(pattern.source.clone());
                if pattern.level > level {
                    level = pattern.level;
                }
                if level == RiskLevel::Critical {
                    break;
                }
            }
        }

        if reasons.is_empty() {
            reasons.push("No known risk patterns".to_string());
        }

        let is_blocked = level >= RiskLevel::Critical;
        let requires_approval = level >= RiskLevel::High;

        CommandRiskAssessment {
            command: trimmed.to_string(),
            level,
            reasons,
            matched_patterns,
            is_blocked,
            requires_approval,
        }
    }

    /// Convenience wrapper: `classify(command).is_safe()`.
    #[must_use]
    pub fn is_safe(&self, command: &str) -> bool {
        self.classify(command).is_safe()
    }
}

fn builtin_patterns() -> Vec<RiskPattern> {
    let mut p = Vec::new();

    // CRITICAL — irreversible system damage, always blocked.
    p.push(
        RiskPattern::regex(
            r#"rm\s+(-[rfRF]+\s+)*(/|/\*|"\s*/\s*"|'\s*/\s*')(\s|$)"#,
            RiskLevel::Critical,
            "Recursive delete of root filesystem",
        )
        .unwrap(),
    );
    p.push(
        RiskPattern::regex(
            r"rm\s+(-[rfRF]+\s+)*~(\s|$|/)",
            RiskLevel::Critical,
            "Recursive delete of home directory",
        )
        .unwrap(),
    );
    p.push(RiskPattern::regex(r"mkfs\.", RiskLevel::Critical, "Filesystem format command").unwrap());
    p.push(
        RiskPattern::regex(
            r"dd\s+.*of=/dev/(sd|hd|nvme|vd)[a-z]",
            RiskLevel::Critical,
            "Direct disk write",
        )
        .unwrap(),
    );
    // Matches the `:(){ :|:& };:` fork-bomb shape with tolerance for
    // surrounding whitespace around each token.
    p.push(
        RiskPattern::regex(
            r":\s*\(\s*\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;",
            RiskLevel::Critical,
            "Fork bomb pattern",
        )
        .unwrap(),
    );
    p.push(
        RiskPattern::regex(
            r">\s*/dev/(sd|hd|nvme|vd)[a-z]",
            RiskLevel::Critical,
            "Redirect to disk device",
        )
        .unwrap(),
    );
    p.push(
        RiskPattern::regex(
            r"chmod\s+(-[rR]+\s+)*777\s+/(\s|$)",
            RiskLevel::Critical,
            "Set world-writable permissions on root",
        )
        .unwrap(),
    );
    p.push(
        RiskPattern::regex(
            r"chown\s+(-[rR]+\s+)*\S+:\S+\s+/(\s|$)",
            RiskLevel::Critical,
            "Change ownership of root filesystem",
        )
        .unwrap(),
    );

    // HIGH — privileged, destructive, or hard to reverse.
    p.push(
        RiskPattern::regex(r"rm\s+(-[rfRF]+)", RiskLevel::High, "Recursive or force delete").unwrap(),
    );
    p.push(RiskPattern::regex(r"^sudo\s+", RiskLevel::High, "Privilege escalation via sudo").unwrap());
    p.push(
        RiskPattern::regex(
            r"(useradd|userdel|usermod)\s+",
            RiskLevel::High,
            "User account modification",
        )
        .unwrap(),
    );
    p.push(
        RiskPattern::regex(r"(groupadd|groupdel|groupmod)\s+", RiskLevel::High, "Group modification")
            .unwrap(),
    );
    p.push(
        RiskPattern::regex(
            r"systemctl\s+(stop|disable|mask)\s+",
            RiskLevel::High,
            "Service stop or disable",
        )
        .unwrap(),
    );
    p.push(
        RiskPattern::regex(
            r"service\s+\S+\s+(stop|restart)",
            RiskLevel::High,
            "Service stop or restart",
        )
        .unwrap(),
    );
    p.push(RiskPattern::regex(r"iptables\s+", RiskLevel::High, "Firewall rule modification").unwrap());
    p.push(
        RiskPattern::regex(
            r"ufw\s+(disable|delete|reset)",
            RiskLevel::High,
            "Firewall disable or reset",
        )
        .unwrap(),
    );
    p.push(
        RiskPattern::regex(
            r"chmod\s+(-[rR]+\s+)*777\s+",
            RiskLevel::High,
            "World-writable permissions",
        )
        .unwrap(),
    );
    p.push(RiskPattern::regex(r">\s*/etc/", RiskLevel::High, "Write redirected into /etc").unwrap());
    p.push(RiskPattern::regex(r"kill\s+-9\s+", RiskLevel::High, "Force kill process").unwrap());
    p.push(RiskPattern::regex(r"pkill\s+-9\s+", RiskLevel::High, "Force kill process by name").unwrap());
    p.push(
        RiskPattern::regex(
            r"(shutdown|reboot|poweroff|halt)(\s|$)",
            RiskLevel::High,
            "Host power state change",
        )
        .unwrap(),
    );
    p.push(
        RiskPattern::regex(
            r"git\s+push\s+.*--force",
            RiskLevel::High,
            "Force push to repository",
        )
        .unwrap(),
    );

    // MEDIUM — meaningful blast radius.
    p.push(
        RiskPattern::regex(
            r"(apt|apt-get|yum|dnf|pacman|brew)\s+(install|remove|purge)\s+",
            RiskLevel::Medium,
            "Package management operation",
        )
        .unwrap(),
    );
    p.push(RiskPattern::regex(r"pip\s+install\s+", RiskLevel::Medium, "Package installation via pip").unwrap());
    p.push(
        RiskPattern::regex(
            r"npm\s+(install|uninstall)\s+.*(-g\b|--global\b)",
            RiskLevel::Medium,
            "Global npm package change",
        )
        .unwrap(),
    );
    p.push(
        RiskPattern::regex(r"\|\s*(sh|bash|zsh|python|perl|ruby)\b", RiskLevel::Medium, "Pipe into a shell interpreter")
            .unwrap(),
    );
    p.push(
        RiskPattern::regex(
            r"curl\s+.*\|\s*(sh|bash)",
            RiskLevel::Medium,
            "Download and execute via curl",
        )
        .unwrap(),
    );
    p.push(
        RiskPattern::regex(
            r"wget\s+.*\|\s*(sh|bash)",
            RiskLevel::Medium,
            "Download and execute via wget",
        )
        .unwrap(),
    );
    p.push(RiskPattern::regex(r"\beval\s+", RiskLevel::Medium, "Dynamic code execution via eval").unwrap());
    p.push(RiskPattern::regex(r"crontab\s+", RiskLevel::Medium, "Crontab modification").unwrap());
    p.push(RiskPattern::regex(r"^ssh\s+", RiskLevel::Medium, "Remote shell session").unwrap());
    p.push(RiskPattern::regex(r"^scp\s+", RiskLevel::Medium, "Remote file copy").unwrap());
    p.push(RiskPattern::regex(r"rsync\s+.*:\S+", RiskLevel::Medium, "Remote sync operation").unwrap());
    p.push(RiskPattern::regex(r"git\s+push\b", RiskLevel::Medium, "Push to remote repository").unwrap());
    p.push(RiskPattern::regex(r"docker\s+rm\s+", RiskLevel::Medium, "Remove docker container").unwrap());
    p.push(
        RiskPattern::regex(r"docker\s+system\s+prune", RiskLevel::Medium, "Docker system prune").unwrap(),
    );

    // LOW — local, reversible mutation.
    p.push(
        RiskPattern::regex(
            r"^(touch|mkdir|cp|mv)\s+",
            RiskLevel::Low,
            "Local file or directory operation",
        )
        .unwrap(),
    );
    p.push(
        RiskPattern::regex(
            r"^git\s+(add|commit|checkout|branch|merge)\b",
            RiskLevel::Low,
            "Local git operation",
        )
        .unwrap(),
    );
    p.push(RiskPattern::regex(r"^npm\s+install\s+", RiskLevel::Low, "Local npm install").unwrap());
    p.push(
        RiskPattern::regex(r"pip\s+install\s+-e\s+", RiskLevel::Low, "Editable local pip install")
            .unwrap(),
    );
    p.push(
        RiskPattern::regex(r"^echo\s+.*>", RiskLevel::Low, "Write output to file via redirect").unwrap(),
    );

    // SAFE — read-only or fully reversible.
    p.push(
        RiskPattern::regex(
            r"^(ls|dir|pwd|whoami|hostname|date|cal|uptime)\b",
            RiskLevel::Safe,
            "Read-only system information",
        )
        .unwrap(),
    );
    p.push(
        RiskPattern::regex(
            r"^(cat|head|tail|less|more|bat)\s+",
            RiskLevel::Safe,
            "Read-only file viewing",
        )
        .unwrap(),
    );
    p.push(
        RiskPattern::regex(
            r"^(grep|rg|ag|ack|find|fd|locate)\b",
            RiskLevel::Safe,
            "Search operation",
        )
        .unwrap(),
    );
    p.push(
        RiskPattern::regex(r"^(wc|sort|uniq|diff|comm)\b", RiskLevel::Safe, "Text processing").unwrap(),
    );
    p.push(
        RiskPattern::regex(
            r"^(ps|top|htop|pgrep|lsof)\b",
            RiskLevel::Safe,
            "Process or handle listing",
        )
        .unwrap(),
    );
    p.push(
        RiskPattern::regex(
            r"^(df|du|free|vmstat|iostat)\b",
            RiskLevel::Safe,
            "System resource monitoring",
        )
        .unwrap(),
    );
    p.push(
        RiskPattern::regex(
            r"^git\s+(status|log|diff|show|branch)\b",
            RiskLevel::Safe,
            "Read-only git operation",
        )
        .unwrap(),
    );
    p.push(
        RiskPattern::regex(
            r"^docker\s+(ps|images|logs)\b",
            RiskLevel::Safe,
            "Read-only docker operation",
        )
        .unwrap(),
    );
    p.push(RiskPattern::regex(r"--version\b", RiskLevel::Safe, "Version check").unwrap());
    p.push(RiskPattern::regex(r"^echo\s+[^>]*$", RiskLevel::Safe, "Echo without redirection").unwrap());
    p.push(
        RiskPattern::regex(
            r"^(which|whereis|type|file)\s+",
            RiskLevel::Safe,
            "Command lookup",
        )
        .unwrap(),
    );
    p.push(RiskPattern::regex(r"^man\s+", RiskLevel::Safe, "Manual page lookup").unwrap());
    p.push(
        RiskPattern::regex(r"^(env|printenv|set)\b", RiskLevel::Safe, "Environment listing").unwrap(),
    );

    p
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> RiskClassifier {
        RiskClassifier::new()
    }

    #[test]
    fn empty_command_is_safe() {
        let a = classifier().classify("   ");
        assert_eq!(a.level, RiskLevel::Safe);
        assert_eq!(a.reasons, vec!["Empty command".to_string()]);
        assert!(!a.is_blocked);
    }

    #[test]
    fn rm_root_is_critical_and_blocked() {
        let a = classifier().classify("rm -rf /");
        assert_eq!(a.level, RiskLevel::Critical);
        assert!(a.is_blocked);
        assert!(a.reasons.iter().any(|r| r.contains("root filesystem")));
    }

    #[test]
    fn fork_bomb_is_critical() {
        let a = classifier().classify(":(){ :|:& };:");
        assert_eq!(a.level, RiskLevel::Critical);
        assert!(a.is_blocked);
    }

    #[test]
    fn fork_bomb_regex_does_not_match_unrelated_colon_text() {
        // A bare pair of colons and braces with no pipe-fork shape must not
        // be mistaken for a fork bomb.
        let a = classifier().classify("echo a: { b: c }; d");
        assert!(a.level < RiskLevel::Critical);
    }

    #[test]
    fn sudo_requires_approval() {
        let a = classifier().classify("sudo apt install nginx");
        assert_eq!(a.level, RiskLevel::High);
        assert!(a.requires_approval);
        assert!(!a.is_blocked);
    }

    #[test]
    fn git_push_force_outranks_plain_push() {
        let a = classifier().classify("git push origin main --force");
        assert_eq!(a.level, RiskLevel::High);
    }

    #[test]
    fn read_only_ls_is_safe() {
        let a = classifier().classify("ls -la");
        assert!(a.is_safe());
    }

    #[test]
    fn pipe_to_script_interpreter_is_medium() {
        for interpreter in ["sh", "bash", "zsh", "python", "perl", "ruby"] {
            let a = classifier().classify(&format!("generate_script | {interpreter}"));
            assert_eq!(a.level, RiskLevel::Medium, "interpreter: {interpreter}");
        }
    }

    #[test]
    fn local_mkdir_is_low() {
        let a = classifier().classify("mkdir data");
        assert_eq!(a.level, RiskLevel::Low);
        assert!(!a.requires_approval);
    }

    #[test]
    fn classification_is_idempotent() {
        let c = classifier();
        let cmd = "rm -rf ./build";
        assert_eq!(c.classify(cmd), c.classify(cmd));
    }

    #[test]
    fn blocklist_overrides_everything() {
        let mut c = classifier();
        c.block_command("ls -la");
        let a = c.classify("ls -la");
        assert!(a.is_blocked);
        assert_eq!(a.level, RiskLevel::Critical);
    }

    #[test]
    fn critical_short_circuits_further_pattern_scanning() {
        let a = classifier().classify("rm -rf / ; sudo reboot");
        assert_eq!(a.level, RiskLevel::Critical);
        assert_eq!(a.matched_patterns.len(), 1);
    }

    proptest::proptest! {
        #[test]
        fn is_blocked_implies_critical(s in "\\PC{0,40}") {
            let a = classifier().classify(&s);
            if a.is_blocked {
                proptest::prop_assert!(a.level >= RiskLevel::Critical);
            }
        }

        #[test]
        fn is_safe_implies_low_and_unblocked(s in "\\PC{0,40}") {
            let a = classifier().classify(&s);
            if a.is_safe() {
                proptest::prop_assert!(a.level <= RiskLevel::Low);
                proptest::prop_assert!(!a.is_blocked);
            }
        }
    }
}
