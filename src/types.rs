//! Core types for IIS website state management.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Desired or observed lifecycle state for a website.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    /// Site exists; run state is not constrained
    Present,
    /// Site does not exist
    Absent,
    /// Site exists and is started
    Started,
    /// Site exists and is stopped
    Stopped,
}

impl Ensure {
    /// Parse an ensure state from text (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            "started" => Some(Self::Started),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    /// Whether this state implies the site exists.
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Absent)
    }
}

impl std::fmt::Display for Ensure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Started => "started",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Coerce boolean-like text from the management surface into a boolean.
///
/// `true`/`t`/`yes`/`y`/`1` in any case are true; `false`/`f`/`no`/`n`/`0`
/// are false. Anything else fails with [`Error::BooleanParse`]. Empty
/// strings are the caller's concern: an empty field means "not reported"
/// and must stay unset rather than collapse to false.
pub fn parse_bool(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "0" => Ok(false),
        _ => Err(Error::BooleanParse {
            value: value.to_string(),
        }),
    }
}

/// Declared desired state for one website.
///
/// Supplied by the host engine and immutable for the duration of a
/// reconciliation pass (the driver only updates `ensure` to reflect a
/// start/stop it performed). Optional fields that are `None` are simply
/// not managed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSpec {
    /// Site name, the unique key used for matching and lookups
    pub name: String,
    /// Desired lifecycle state
    pub ensure: Ensure,
    /// Filesystem path backing the site
    pub physical_path: Option<String>,
    /// Application pool the site runs in
    pub application_pool: Option<String>,
    /// Enabled protocols, e.g. `["http", "https"]`
    pub enabled_protocols: Vec<String>,
    /// Whether the site starts with the server
    pub server_autostart: Option<bool>,
    /// Directory log files are written to
    pub log_path: Option<String>,
    /// Log rollover period (Hourly, Daily, Weekly, Monthly, MaxSize)
    pub log_period: Option<String>,
    /// Log size at which to truncate, in bytes
    pub log_truncate_size: Option<u64>,
    /// Roll logs over on local time boundaries rather than UTC
    pub log_local_time_rollover: Option<bool>,
    /// Log format (W3C, IIS, NCSA, Custom)
    pub log_format: Option<String>,
    /// W3C extended logging fields
    pub log_flags: Vec<String>,
}

impl SiteSpec {
    /// Create a spec with the given name and ensure state.
    ///
    /// Rejects empty names at construction: every lookup and mutation is
    /// scoped by name, so a nameless spec could never be reconciled.
    pub fn new(name: impl Into<String>, ensure: Ensure) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidSpec {
                message: "site name must not be empty".to_string(),
            });
        }
        Ok(Self {
            name,
            ensure,
            physical_path: None,
            application_pool: None,
            enabled_protocols: Vec::new(),
            server_autostart: None,
            log_path: None,
            log_period: None,
            log_truncate_size: None,
            log_local_time_rollover: None,
            log_format: None,
            log_flags: Vec::new(),
        })
    }

    /// Set the physical path.
    pub fn with_physical_path(mut self, path: impl Into<String>) -> Self {
        self.physical_path = Some(path.into());
        self
    }

    /// Set the application pool.
    pub fn with_application_pool(mut self, pool: impl Into<String>) -> Self {
        self.application_pool = Some(pool.into());
        self
    }
}

/// Observed state of one website, produced by bulk discovery.
///
/// Fields mirror [`SiteSpec`] as text the management surface reported.
/// Boolean fields the surface reported as empty strings stay `None`:
/// "not reported" is not the same thing as "false". Records live for one
/// reconciliation pass and are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteRecord {
    /// Site name
    pub name: String,
    /// Observed run state (started or stopped)
    pub ensure: Ensure,
    /// Filesystem path backing the site
    pub physical_path: Option<String>,
    /// Application pool the site runs in
    pub application_pool: Option<String>,
    /// Enabled protocols as reported, comma-separated
    pub enabled_protocols: Option<String>,
    /// Whether the site starts with the server
    pub server_autostart: Option<bool>,
    /// Directory log files are written to
    pub log_path: Option<String>,
    /// Log rollover period
    pub log_period: Option<String>,
    /// Log truncate size as reported
    pub log_truncate_size: Option<String>,
    /// Roll logs over on local time boundaries
    pub log_local_time_rollover: Option<bool>,
    /// Log format
    pub log_format: Option<String>,
    /// W3C extended logging fields as reported
    pub log_flags: Option<String>,
}

/// Outcome of one command executed on a channel.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Captured stdout; `None` when the command produced no output
    pub stdout: Option<String>,
    /// Captured stderr, one entry per line
    pub stderr: Vec<String>,
    /// Exit code reported by the interpreter
    pub exit_code: i32,
    /// Terminating error message, if the command raised one
    pub error_message: Option<String>,
}

impl ExecutionResult {
    /// A command succeeded only when it exited zero without raising.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && self.error_message.is_none()
    }
}

/// Result of reconciling one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    /// Current state already matched the desired state
    NoChange,
    /// Site was created
    Created,
    /// Site was removed
    Removed,
    /// Site was started (created first if absent)
    Started,
    /// Site was stopped (created first if absent)
    Stopped,
    /// The corrective operation ran but observed state still diverges
    Failed {
        /// What diverged
        error: String,
    },
}

impl ApplyResult {
    /// Check if the result represents success (no failure).
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change.
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Removed | Self::Started | Self::Stopped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_truthy() {
        for value in ["true", "TRUE", "t", "yes", "y", "1", "Y", "Yes"] {
            assert!(parse_bool(value).unwrap(), "value: {value}");
        }
    }

    #[test]
    fn test_parse_bool_falsy() {
        for value in ["false", "FALSE", "f", "no", "n", "0", "N", "No"] {
            assert!(!parse_bool(value).unwrap(), "value: {value}");
        }
    }

    #[test]
    fn test_parse_bool_invalid() {
        for value in ["maybe", "2", "tru", "on"] {
            assert!(
                matches!(parse_bool(value), Err(Error::BooleanParse { .. })),
                "value: {value}"
            );
        }
    }

    #[test]
    fn test_ensure_parse() {
        assert_eq!(Ensure::parse("Started"), Some(Ensure::Started));
        assert_eq!(Ensure::parse("STOPPED"), Some(Ensure::Stopped));
        assert_eq!(Ensure::parse("present"), Some(Ensure::Present));
        assert_eq!(Ensure::parse("absent"), Some(Ensure::Absent));
        assert_eq!(Ensure::parse("paused"), None);
    }

    #[test]
    fn test_ensure_is_present() {
        assert!(Ensure::Started.is_present());
        assert!(Ensure::Stopped.is_present());
        assert!(Ensure::Present.is_present());
        assert!(!Ensure::Absent.is_present());
    }

    #[test]
    fn test_spec_rejects_empty_name() {
        assert!(matches!(
            SiteSpec::new("", Ensure::Present),
            Err(Error::InvalidSpec { .. })
        ));
        assert!(matches!(
            SiteSpec::new("   ", Ensure::Present),
            Err(Error::InvalidSpec { .. })
        ));
    }

    #[test]
    fn test_spec_builders() {
        let spec = SiteSpec::new("Default Web Site", Ensure::Started)
            .unwrap()
            .with_physical_path(r"C:\inetpub\wwwroot")
            .with_application_pool("DefaultAppPool");

        assert_eq!(spec.physical_path.as_deref(), Some(r"C:\inetpub\wwwroot"));
        assert_eq!(spec.application_pool.as_deref(), Some("DefaultAppPool"));
        assert!(spec.log_path.is_none());
    }

    #[test]
    fn test_execution_result_succeeded() {
        let ok = ExecutionResult::default();
        assert!(ok.succeeded());

        let nonzero = ExecutionResult {
            exit_code: 1,
            ..Default::default()
        };
        assert!(!nonzero.succeeded());

        let raised = ExecutionResult {
            error_message: Some("boom".to_string()),
            ..Default::default()
        };
        assert!(!raised.succeeded());
    }

    #[test]
    fn test_apply_result_flags() {
        assert!(ApplyResult::NoChange.is_success());
        assert!(!ApplyResult::NoChange.is_change());
        assert!(ApplyResult::Created.is_change());
        assert!(!ApplyResult::Failed {
            error: "x".to_string()
        }
        .is_success());
    }
}
