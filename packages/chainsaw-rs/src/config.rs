//! Engine configuration.
//!
//! Two behaviours are left open by the execution model and are chosen here:
//! how far `down` looks for traps, and what a `skip` before the first call
//! does. Both default to the conservative choice.

use std::env;
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};

use crate::error::ChainsawError;

/// Where `down(name)` looks for a trap before scanning the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrapScope {
    /// Only the active frame.
    #[default]
    Frame,
    /// The active frame, then each enclosing frame outward.
    Enclosing,
}

impl FromStr for TrapScope {
    type Err = ChainsawError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "frame" => Ok(TrapScope::Frame),
            "enclosing" => Ok(TrapScope::Enclosing),
            _ => Err(ChainsawError::InvalidConfig {
                key: "CHAINSAW_TRAP_SCOPE",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for TrapScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrapScope::Frame => write!(f, "frame"),
            TrapScope::Enclosing => write!(f, "enclosing"),
        }
    }
}

/// What `skip` does when the cursor would become negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorUnderflow {
    /// Fail with `ChainsawError::CursorUnderflow`, leaving the cursor alone.
    #[default]
    Reject,
    /// Restart from the first call.
    Clamp,
}

impl FromStr for CursorUnderflow {
    type Err = ChainsawError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(CursorUnderflow::Reject),
            "clamp" => Ok(CursorUnderflow::Clamp),
            _ => Err(ChainsawError::InvalidConfig {
                key: "CHAINSAW_CURSOR_UNDERFLOW",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for CursorUnderflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorUnderflow::Reject => write!(f, "reject"),
            CursorUnderflow::Clamp => write!(f, "clamp"),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainsawConfig {
    pub trap_scope: TrapScope,
    pub cursor_underflow: CursorUnderflow,
}

impl ChainsawConfig {
    /// Load configuration from environment variables
    ///
    /// Reads `CHAINSAW_TRAP_SCOPE` (`frame` | `enclosing`) and
    /// `CHAINSAW_CURSOR_UNDERFLOW` (`reject` | `clamp`); unset variables keep
    /// their defaults.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup("CHAINSAW_TRAP_SCOPE") {
            config.trap_scope = raw.parse()?;
        }
        if let Some(raw) = lookup("CHAINSAW_CURSOR_UNDERFLOW") {
            config.cursor_underflow = raw.parse()?;
        }
        Ok(config)
    }

    pub fn with_trap_scope(mut self, scope: TrapScope) -> Self {
        self.trap_scope = scope;
        self
    }

    pub fn with_cursor_underflow(mut self, policy: CursorUnderflow) -> Self {
        self.cursor_underflow = policy;
        self
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
    fn test_defaults_are_conservative() {
        let config = ChainsawConfig::default();
        assert_eq!(config.trap_scope, TrapScope::Frame);
        assert_eq!(config.cursor_underflow, CursorUnderflow::Reject);
    }

    #[test]
    fn test_from_lookup_reads_both_keys() {
        let config = ChainsawConfig::from_lookup(lookup(&[
            ("CHAINSAW_TRAP_SCOPE", "Enclosing"),
            ("CHAINSAW_CURSOR_UNDERFLOW", " clamp "),
        ]))
        .unwrap();
        assert_eq!(config.trap_scope, TrapScope::Enclosing);
        assert_eq!(config.cursor_underflow, CursorUnderflow::Clamp);
    }

    #[test]
    fn test_from_lookup_missing_keys_keep_defaults() {
        let config = ChainsawConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ChainsawConfig::default());
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let err = ChainsawConfig::from_lookup(lookup(&[("CHAINSAW_TRAP_SCOPE", "global")]))
            .unwrap_err();
        match err.downcast_ref::<ChainsawError>() {
            Some(ChainsawError::InvalidConfig { key, value }) => {
                assert_eq!(*key, "CHAINSAW_TRAP_SCOPE");
                assert_eq!(value, "global");
            }
            other => panic!("Expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_config_serde_uses_lowercase_names() {
        let config = ChainsawConfig::default().with_trap_scope(TrapScope::Enclosing);
        let json = serde_json::to_value(config).unwrap();
        assert_eq!(json["trap_scope"], "enclosing");
        assert_eq!(json["cursor_underflow"], "reject");

        let back: ChainsawConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
