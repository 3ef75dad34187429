use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::model::Role;

/// Which roles may approve or reject bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApprovalPolicy {
    AdminOnly,
    #[default]
    ApproverOrAdmin,
}

impl ApprovalPolicy {
    pub fn permits(self, role: Role) -> bool {
        match self {
            ApprovalPolicy::AdminOnly => role == Role::Admin,
            ApprovalPolicy::ApproverOrAdmin => matches!(role, Role::Admin | Role::Approver),
        }
    }
}

impl FromStr for ApprovalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin-only" => Ok(ApprovalPolicy::AdminOnly),
            "approver-or-admin" => Ok(ApprovalPolicy::ApproverOrAdmin),
            other => Err(format!(
                "unknown approval policy {other:?} (expected admin-only or approver-or-admin)"
            )),
        }
    }
}

/// Admin registered on first start when the directory has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub sweep_interval: Duration,
    pub approval_policy: ApprovalPolicy,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Malformed numbers fall back to
    /// their defaults; a malformed approval policy is an error.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let approval_policy = match get("FLEETBOOK_APPROVAL_POLICY") {
            Some(raw) => raw.parse()?,
            None => ApprovalPolicy::default(),
        };

        let bootstrap_admin = get("FLEETBOOK_BOOTSTRAP_ADMIN").and_then(|raw| {
            match raw.split_once(':') {
                Some((name, email)) if !name.trim().is_empty() && !email.trim().is_empty() => {
                    Some(BootstrapAdmin {
                        name: name.trim().to_string(),
                        email: email.trim().to_string(),
                    })
                }
                _ => {
                    tracing::warn!("FLEETBOOK_BOOTSTRAP_ADMIN must be name:email, ignoring {raw:?}");
                    None
                }
            }
        });

        Ok(Self {
            bind: get("FLEETBOOK_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "FLEETBOOK_PORT", 8080),
            data_dir: PathBuf::from(get("FLEETBOOK_DATA_DIR").unwrap_or_else(|| "./data".into())),
            metrics_port: get("FLEETBOOK_METRICS_PORT").and_then(|s| s.parse().ok()),
            compact_threshold: parse_or(&get, "FLEETBOOK_COMPACT_THRESHOLD", 1000),
            sweep_interval: Duration::from_secs(parse_or(&get, "FLEETBOOK_SWEEP_INTERVAL_SECS", 60)),
            approval_policy,
            bootstrap_admin,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("fleetbook.wal")
    }
}

fn parse_or<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match get(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("{key}={raw:?} is not valid, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.bind, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.data_dir, PathBuf::from("./data"));
        assert_eq!(cfg.metrics_port, None);
        assert_eq!(cfg.compact_threshold, 1000);
        assert_eq!(cfg.sweep_interval, Duration::from_secs(60));
        assert_eq!(cfg.approval_policy, ApprovalPolicy::ApproverOrAdmin);
        assert!(cfg.bootstrap_admin.is_none());
    }

    #[test]
    fn malformed_numbers_fall_back() {
        let cfg = Config::from_lookup(lookup(&[
            ("FLEETBOOK_PORT", "eighty"),
            ("FLEETBOOK_SWEEP_INTERVAL_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.sweep_interval, Duration::from_secs(5));
    }

    #[test]
    fn approval_policy_parsing() {
        let cfg = Config::from_lookup(lookup(&[("FLEETBOOK_APPROVAL_POLICY", "Admin-Only")])).unwrap();
        assert_eq!(cfg.approval_policy, ApprovalPolicy::AdminOnly);
        assert!(Config::from_lookup(lookup(&[("FLEETBOOK_APPROVAL_POLICY", "anyone")])).is_err());
    }

    #[test]
    fn policy_permits_roles() {
        assert!(ApprovalPolicy::AdminOnly.permits(Role::Admin));
        assert!(!ApprovalPolicy::AdminOnly.permits(Role::Approver));
        assert!(ApprovalPolicy::ApproverOrAdmin.permits(Role::Approver));
        assert!(!ApprovalPolicy::ApproverOrAdmin.permits(Role::Employee));
        assert!(!ApprovalPolicy::ApproverOrAdmin.permits(Role::Driver));
    }

    #[test]
    fn bootstrap_admin_parsing() {
        let cfg = Config::from_lookup(lookup(&[(
            "FLEETBOOK_BOOTSTRAP_ADMIN",
            "Ops Admin:ops@example.com",
        )]))
        .unwrap();
        assert_eq!(
            cfg.bootstrap_admin,
            Some(BootstrapAdmin {
                name: "Ops Admin".into(),
                email: "ops@example.com".into()
            })
        );

        let cfg = Config::from_lookup(lookup(&[("FLEETBOOK_BOOTSTRAP_ADMIN", "nobody")])).unwrap();
        assert!(cfg.bootstrap_admin.is_none());
    }
}
