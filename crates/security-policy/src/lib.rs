//! Security mode, per-device policy overrides, and role-based access control.
//!
//! A [`SecurityPolicy`] fixes the approval and blocking floors for a
//! [`RiskLevel`], loaded once from a YAML document (or a built-in factory)
//! and immutable thereafter. [`PolicyManager`] resolves the effective policy
//! for an optional device, falling back to a safe default whenever the
//! configuration document is missing or malformed — policy loading never
//! fails the caller, it degrades to [`SecurityPolicy::default`] and logs the
//! reason. [`rbac`] maps a user's [`Role`] to the risk levels it may act on
//! without a human in the loop.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use regex::Regex;
use risk_classifier::RiskLevel;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Operating posture that sets the default approval and blocking floors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// Nothing requires approval; only CRITICAL is blocked.
    Permissive,
    /// HIGH and above require approval; only CRITICAL is blocked.
    Standard,
    /// MEDIUM and above require approval; HIGH and above are blocked.
    Strict,
    /// LOW and above require approval; MEDIUM and above are blocked.
    Paranoid,
}

impl SecurityMode {
    fn approval_floor(self) -> RiskLevel {
        match self {
            Self::Permissive => RiskLevel::Critical, // one above High: nothing at/below qualifies
            Self::Standard => RiskLevel::High,
            Self::Strict => RiskLevel::Medium,
            Self::Paranoid => RiskLevel::Low,
        }
    }

    fn block_floor(self) -> RiskLevel {
        match self {
            Self::Permissive | Self::Standard => RiskLevel::Critical,
            Self::Strict => RiskLevel::High,
            Self::Paranoid => RiskLevel::Medium,
        }
    }
}

/// A named, immutable security policy.
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    /// Display name (e.g. "standard", "paranoid", or a custom config name).
    pub name: String,
    /// Operating posture.
    pub mode: SecurityMode,
    /// Maximum accepted command length in bytes.
    pub max_command_length: usize,
    /// Whether `sudo` is permitted at all under this policy.
    pub allow_sudo: bool,
    /// Whether network-touching commands are permitted under this policy.
    pub allow_network: bool,
    /// Explicit set of levels that require approval; when empty, the mode's
    /// default floor applies instead.
    pub require_approval_levels: HashSet<RiskLevel>,
    /// Extra deny patterns beyond the risk classifier's own library.
    pub blocked_patterns: Vec<Regex>,
    /// Extra allow patterns that exempt a command from the above.
    pub allowed_patterns: Vec<Regex>,
    /// Path globs a command may not touch.
    pub blocked_paths: Vec<String>,
    /// Path globs a command is explicitly permitted to touch.
    pub allowed_paths: Vec<String>,
    /// Per-command execution timeout, in seconds.
    pub timeout: f64,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            mode: SecurityMode::Standard,
            max_command_length: 10_000,
            allow_sudo: false,
            allow_network: true,
            require_approval_levels: HashSet::new(),
            blocked_patterns: Vec::new(),
            allowed_patterns: Vec::new(),
            blocked_paths: vec!["/etc/*".to_string(), "/usr/*".to_string(), "/bin/*".to_string()],
            allowed_paths: Vec::new(),
            timeout: 30.0,
        }
    }
}

impl SecurityPolicy {
    /// Lenient posture: sudo allowed, nothing requires approval.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            name: "permissive".to_string(),
            mode: SecurityMode::Permissive,
            allow_sudo: true,
            require_approval_levels: HashSet::new(),
            ..Self::default()
        }
    }

    /// The default posture: sudo denied, HIGH and above require approval.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            name: "standard".to_string(),
            mode: SecurityMode::Standard,
            allow_sudo: false,
            require_approval_levels: [RiskLevel::High].into_iter().collect(),
            ..Self::default()
        }
    }

    /// Tighter posture: sudo and network denied, MEDIUM and above require
    /// approval.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            name: "strict".to_string(),
            mode: SecurityMode::Strict,
            allow_sudo: false,
            allow_network: false,
            require_approval_levels: [RiskLevel::Medium, RiskLevel::High].into_iter().collect(),
            ..Self::default()
        }
    }

    /// Tightest posture: sudo and network denied, LOW and above require
    /// approval, and `/tmp` and `/var` are blocked in addition to the
    /// default system paths.
    #[must_use]
    pub fn paranoid() -> Self {
        let mut blocked_paths = Self::default().blocked_paths;
        blocked_paths.push("/tmp/*".to_string());
        blocked_paths.push("/var/*".to_string());
        Self {
            name: "paranoid".to_string(),
            mode: SecurityMode::Paranoid,
            allow_sudo: false,
            allow_network: false,
            require_approval_levels: [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High]
                .into_iter()
                .collect(),
            blocked_paths,
            ..Self::default()
        }
    }

    /// Whether a command at this risk level must be routed through approval.
    #[must_use]
    pub fn requires_approval(&self, level: RiskLevel) -> bool {
        if !self.require_approval_levels.is_empty() {
            return self.require_approval_levels.contains(&level);
        }
        level >= self.mode.approval_floor()
    }

    /// Whether a command at this risk level is blocked outright by the mode,
    /// independent of RBAC or the classifier's own blocklist.
    #[must_use]
    pub fn is_blocked_by_mode(&self, level: RiskLevel) -> bool {
        level >= RiskLevel::Critical || level >= self.mode.block_floor()
    }
}

/// Per-device policy override plus device-local command allow/deny lists.
#[derive(Debug, Clone)]
pub struct DevicePolicy {
    /// Identifier matching [`crate::PolicyManager::get_policy`]'s `device_id`.
    pub device_id: String,
    /// The policy in effect for this device.
    pub policy: SecurityPolicy,
    /// Commands always permitted on this device, bypassing risk gating.
    pub allowed_commands: Vec<String>,
    /// Commands always refused on this device.
    pub blocked_commands: Vec<String>,
}

/// Resolves the effective [`SecurityPolicy`] for an optional device,
/// loaded once from configuration and shared read-only thereafter.
#[derive(Debug, Clone)]
pub struct PolicyManager {
    default_policy: SecurityPolicy,
    devices: HashMap<String, DevicePolicy>,
}

impl Default for PolicyManager {
    fn default() -> Self {
        Self::new(SecurityPolicy::default())
    }
}

#[derive(Debug, Deserialize)]
struct PolicyDoc {
    #[serde(default)]
    default_policy: Option<RawPolicy>,
    #[serde(default)]
    devices: Vec<RawDevice>,
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    id: String,
    #[serde(default)]
    policy: Option<RawPolicy>,
    #[serde(default)]
    allowed_commands: Vec<String>,
    #[serde(default)]
    blocked_commands: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPolicy {
    name: Option<String>,
    mode: Option<SecurityMode>,
    allow_sudo: Option<bool>,
    allow_network: Option<bool>,
    max_command_length: Option<usize>,
    require_approval_levels: Option<Vec<RiskLevel>>,
    blocked_patterns: Option<Vec<String>>,
    allowed_patterns: Option<Vec<String>>,
    blocked_paths: Option<Vec<String>>,
    allowed_paths: Option<Vec<String>>,
    timeout: Option<f64>,
}

impl RawPolicy {
    fn into_policy(self) -> SecurityPolicy {
        let base = self.mode.map_or_else(SecurityPolicy::default, |m| match m {
            SecurityMode::Permissive => SecurityPolicy::permissive(),
            SecurityMode::Standard => SecurityPolicy::standard(),
            SecurityMode::Strict => SecurityPolicy::strict(),
            SecurityMode::Paranoid => SecurityPolicy::paranoid(),
        });
        SecurityPolicy {
            name: self.name.unwrap_or(base.name),
            mode: self.mode.unwrap_or(base.mode),
            allow_sudo: self.allow_sudo.unwrap_or(base.allow_sudo),
            allow_network: self.allow_network.unwrap_or(base.allow_network),
            max_command_length: self.max_command_length.unwrap_or(base.max_command_length),
            require_approval_levels: self
                .require_approval_levels
                .map(|v| v.into_iter().collect())
                .unwrap_or(base.require_approval_levels),
            blocked_patterns: self
                .blocked_patterns
                .map(|v| compile_patterns(&v))
                .unwrap_or(base.blocked_patterns),
            allowed_patterns: self
                .allowed_patterns
                .map(|v| compile_patterns(&v))
                .unwrap_or(base.allowed_patterns),
            blocked_paths: self.blocked_paths.unwrap_or(base.blocked_paths),
            allowed_paths: self.allowed_paths.unwrap_or(base.allowed_paths),
            timeout: self.timeout.unwrap_or(base.timeout),
        }
    }
}

fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::warn!(pattern = %p, error = %err, "skipping invalid policy pattern");
                None
            }
        })
        .collect()
}

impl PolicyManager {
    /// Construct a manager with an explicit default policy and no device
    /// overrides.
    #[must_use]
    pub fn new(default_policy: SecurityPolicy) -> Self {
        Self { default_policy, devices: HashMap::new() }
    }

    /// Load policy configuration from a YAML document. A missing or
    /// malformed document falls back to [`SecurityPolicy::default`] and logs
    /// a warning; this function never fails.
    #[must_use]
    pub fn load_from_yaml_str(yaml: &str) -> Self {
        let doc: PolicyDoc = match serde_yaml::from_str(yaml) {
            Ok(doc) => doc,
            Err(err) => {
                tracing::warn!(error = %err, "malformed policy document, falling back to standard default");
                return Self::default();
            }
        };

        let default_policy =
            doc.default_policy.map(RawPolicy::into_policy).unwrap_or_else(SecurityPolicy::standard);
        let mut manager = Self::new(default_policy);
        for dev in doc.devices {
            let policy = dev.policy.map(RawPolicy::into_policy).unwrap_or_else(|| manager.default_policy.clone());
            manager.add_device_policy(DevicePolicy {
                device_id: dev.id,
                policy,
                allowed_commands: dev.allowed_commands,
                blocked_commands: dev.blocked_commands,
            });
        }
        manager
    }

    /// Load policy configuration from a YAML file on disk. A missing file or
    /// malformed content falls back to [`SecurityPolicy::default`]; this
    /// function never fails.
    #[must_use]
    pub fn load_from_yaml_path(path: impl AsRef<Path>) -> Self {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(contents) => Self::load_from_yaml_str(&contents),
            Err(err) => {
                tracing::warn!(
                    path = %path.as_ref().display(),
                    error = %err,
                    "policy file unreadable, falling back to standard default"
                );
                Self::default()
            }
        }
    }

    /// Replace the default policy.
    pub fn set_default_policy(&mut self, policy: SecurityPolicy) {
        self.default_policy = policy;
    }

    /// Insert or replace a device's policy (last write wins).
    pub fn add_device_policy(&mut self, device_policy: DevicePolicy) {
        self.devices.insert(device_policy.device_id.clone(), device_policy);
    }

    /// Look up a device's override, if one is registered.
    #[must_use]
    pub fn get_device_policy(&self, device_id: &str) -> Option<&DevicePolicy> {
        self.devices.get(device_id)
    }

    /// The effective policy for a device, or the default policy when
    /// `device_id` is `None` or unregistered.
    #[must_use]
    pub fn get_policy(&self, device_id: Option<&str>) -> &SecurityPolicy {
        device_id
            .and_then(|id| self.devices.get(id))
            .map_or(&self.default_policy, |dp| &dp.policy)
    }
}

/// Role-based access control: maps users to the risk levels they may act on.
pub mod rbac {
    use risk_classifier::RiskLevel;
    use std::collections::HashSet;

    /// A capability a [`Role`] may hold.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Permission {
        /// Read-only access (SAFE commands).
        Read,
        /// Run LOW-risk commands.
        RunSafe,
        /// Run MEDIUM-risk commands.
        RunMedium,
        /// Run HIGH-risk commands (still subject to approval).
        RunHigh,
        /// Run CRITICAL-risk commands (still subject to the unconditional block).
        RunCritical,
        /// Act as a human approver for someone else's request.
        Approve,
        /// Modify security configuration.
        Configure,
    }

    /// A fixed role in the access model.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Role {
        /// Read-only plus SAFE/LOW-risk commands; nothing above RUN_SAFE.
        Viewer,
        /// Can run up to HIGH risk, subject to approval gating.
        Operator,
        /// Can run any level, can approve others' requests.
        Admin,
        /// Unrestricted, including configuration changes.
        Root,
    }

    impl Role {
        /// The fixed permission set this role is granted.
        #[must_use]
        pub fn permissions(self) -> HashSet<Permission> {
            use Permission::{Approve, Configure, Read, RunCritical, RunHigh, RunMedium, RunSafe};
            match self {
                Self::Viewer => [Read, RunSafe].into_iter().collect(),
                Self::Operator => [Read, RunSafe, RunMedium, RunHigh].into_iter().collect(),
                Self::Admin => [Read, RunSafe, RunMedium, RunHigh, RunCritical, Approve].into_iter().collect(),
                Self::Root => {
                    [Read, RunSafe, RunMedium, RunHigh, RunCritical, Approve, Configure].into_iter().collect()
                }
            }
        }
    }

    /// A principal subject to access control.
    #[derive(Debug, Clone)]
    pub struct User {
        /// Stable identifier (e.g. a username).
        pub id: String,
        /// Name surfaced in prompts and audit records.
        pub display_name: String,
        /// The user's fixed role.
        pub role: Role,
    }

    /// The minimum permission required to act on a command at `level`.
    #[must_use]
    pub fn required_permission(level: RiskLevel) -> Permission {
        match level {
            RiskLevel::Safe => Permission::Read,
            RiskLevel::Low => Permission::RunSafe,
            RiskLevel::Medium => Permission::RunMedium,
            RiskLevel::High => Permission::RunHigh,
            RiskLevel::Critical => Permission::RunCritical,
        }
    }

    /// Stateless RBAC check: does `user` hold the permission required for
    /// `level`, and does holding it still require human approval?
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Rbac;

    impl Rbac {
        /// Check access for `user` at `level`. Returns `(allowed,
        /// needs_approval, reason)`. `device_id` is accepted for interface
        /// symmetry with the policy engine; this implementation's role
        /// model does not vary by device.
        #[must_use]
        pub fn check_access(
            &self,
            user: &User,
            level: RiskLevel,
            _device_id: Option<&str>,
        ) -> (bool, bool, String) {
            let required = required_permission(level);
            let perms = user.role.permissions();
            if !perms.contains(&required) {
                return (
                    false,
                    false,
                    format!("role {:?} lacks permission for {:?}-risk commands", user.role, level),
                );
            }
            // Holding RUN_HIGH authorizes requesting a HIGH-risk action, not
            // bypassing the human gate: Operator still needs approval for it.
            let needs_approval = matches!((user.role, level), (Role::Operator, RiskLevel::High));
            (true, needs_approval, "RBAC check passed".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbac::{Rbac, Role, User};

    #[test]
    fn standard_requires_approval_at_high() {
        let p = SecurityPolicy::standard();
        assert!(p.requires_approval(RiskLevel::High));
        assert!(!p.requires_approval(RiskLevel::Medium));
    }

    #[test]
    fn paranoid_requires_approval_at_low() {
        let p = SecurityPolicy::paranoid();
        assert!(p.requires_approval(RiskLevel::Low));
    }

    #[test]
    fn critical_always_blocked_regardless_of_mode() {
        for p in [
            SecurityPolicy::permissive(),
            SecurityPolicy::standard(),
            SecurityPolicy::strict(),
            SecurityPolicy::paranoid(),
        ] {
            assert!(p.is_blocked_by_mode(RiskLevel::Critical));
        }
    }

    #[test]
    fn strict_blocks_high() {
        assert!(SecurityPolicy::strict().is_blocked_by_mode(RiskLevel::High));
        assert!(!SecurityPolicy::standard().is_blocked_by_mode(RiskLevel::High));
    }

    #[test]
    fn malformed_yaml_falls_back_to_default() {
        let manager = PolicyManager::load_from_yaml_str("not: [valid, yaml: :::");
        assert_eq!(manager.get_policy(None).name, "default");
    }

    #[test]
    fn empty_yaml_falls_back_to_default() {
        let manager = PolicyManager::load_from_yaml_str("");
        assert_eq!(manager.get_policy(None).name, "default");
    }

    #[test]
    fn device_override_resolves_by_id() {
        let mut manager = PolicyManager::default();
        manager.add_device_policy(DevicePolicy {
            device_id: "robot-1".to_string(),
            policy: SecurityPolicy::paranoid(),
            allowed_commands: vec![],
            blocked_commands: vec![],
        });
        assert_eq!(manager.get_policy(Some("robot-1")).name, "paranoid");
        assert_eq!(manager.get_policy(Some("unknown-device")).name, "default");
        assert_eq!(manager.get_policy(None).name, "default");
    }

    #[test]
    fn yaml_round_trip_loads_mode_and_devices() {
        let yaml = r#"
default_policy:
  name: custom
  mode: strict
devices:
  - id: robot-1
    policy:
      mode: paranoid
    blocked_commands: ["format_disk"]
"#;
        let manager = PolicyManager::load_from_yaml_str(yaml);
        assert_eq!(manager.get_policy(None).name, "custom");
        assert!(matches!(manager.get_policy(None).mode, SecurityMode::Strict));
        let dev = manager.get_device_policy("robot-1").unwrap();
        assert!(matches!(dev.policy.mode, SecurityMode::Paranoid));
        assert_eq!(dev.blocked_commands, vec!["format_disk".to_string()]);
    }

    #[test]
    fn viewer_allowed_at_run_safe_denied_above() {
        let rbac = Rbac;
        let user = User { id: "v".into(), display_name: "Viewer".into(), role: Role::Viewer };
        let (allowed, needs_approval, _) = rbac.check_access(&user, RiskLevel::Low, None);
        assert!(allowed);
        assert!(!needs_approval);

        let (allowed, needs_approval, _) = rbac.check_access(&user, RiskLevel::Medium, None);
        assert!(!allowed);
        assert!(!needs_approval);
    }

    #[test]
    fn operator_high_risk_requires_approval() {
        let rbac = Rbac;
        let user = User { id: "o".into(), display_name: "Operator".into(), role: Role::Operator };
        let (allowed, needs_approval, _) = rbac.check_access(&user, RiskLevel::High, None);
        assert!(allowed);
        assert!(needs_approval);
    }

    #[test]
    fn admin_critical_permission_granted_but_policy_still_blocks_separately() {
        let rbac = Rbac;
        let user = User { id: "a".into(), display_name: "Admin".into(), role: Role::Admin };
        let (allowed, needs_approval, _) = rbac.check_access(&user, RiskLevel::Critical, None);
        assert!(allowed);
        assert!(!needs_approval);
    }
}
