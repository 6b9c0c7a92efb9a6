//! # Orchestrator Configuration
//!
//! Environment-based configuration for the orchestration layer.

use std::env;
use std::fmt;
use std::str::FromStr;

use skyfleet_domain::DEFAULT_PRIORITY;

/// How an execution run is put on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// One execution command carrying every vehicle
    #[default]
    Aggregated,
    /// One execution command per vehicle, fanned out concurrently
    PerVehicle,
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "aggregated" => Ok(Self::Aggregated),
            "per_vehicle" => Ok(Self::PerVehicle),
            other => Err(format!("unknown dispatch mode {other:?}")),
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Aggregated => "aggregated",
            Self::PerVehicle => "per_vehicle",
        })
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Execution publishing mode
    pub dispatch_mode: DispatchMode,

    /// Priority given to missions created without one
    pub default_priority: i32,

    /// Upper bound on concurrently running background provisioning tasks
    pub provisioning_concurrency: usize,

    /// Open an automatic mission for vehicles reporting outside any active mission
    pub auto_missions: bool,

    /// In-process bus buffer size
    pub bus_capacity: usize,

    /// Logging level
    pub log_level: String,
}

impl OrchestratorConfig {
    /// Load configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup; unparseable values
    /// fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            dispatch_mode: lookup("SKYFLEET_DISPATCH_MODE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.dispatch_mode),

            default_priority: lookup("SKYFLEET_EXECUTION_PRIORITY")
                .and_then(|v| v.parse().ok())
                .filter(|p: &i32| *p >= 0)
                .unwrap_or(defaults.default_priority),

            provisioning_concurrency: lookup("SKYFLEET_PROVISIONING_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.provisioning_concurrency),

            auto_missions: lookup("SKYFLEET_AUTO_MISSIONS")
                .map_or(defaults.auto_missions, |v| v == "true" || v == "1"),

            bus_capacity: lookup("SKYFLEET_BUS_CAPACITY")
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.bus_capacity),

            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dispatch_mode: DispatchMode::Aggregated,
            default_priority: DEFAULT_PRIORITY,
            provisioning_concurrency: 64,
            auto_missions: true,
            bus_capacity: 1024,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = OrchestratorConfig::from_lookup(|_| None);
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = OrchestratorConfig::from_lookup(lookup_from(&[
            ("SKYFLEET_DISPATCH_MODE", "per-vehicle"),
            ("SKYFLEET_EXECUTION_PRIORITY", "9"),
            ("SKYFLEET_PROVISIONING_CONCURRENCY", "4"),
            ("SKYFLEET_AUTO_MISSIONS", "false"),
            ("LOG_LEVEL", "debug"),
        ]));
        assert_eq!(config.dispatch_mode, DispatchMode::PerVehicle);
        assert_eq!(config.default_priority, 9);
        assert_eq!(config.provisioning_concurrency, 4);
        assert!(!config.auto_missions);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = OrchestratorConfig::from_lookup(lookup_from(&[
            ("SKYFLEET_DISPATCH_MODE", "broadcast"),
            ("SKYFLEET_EXECUTION_PRIORITY", "-3"),
            ("SKYFLEET_PROVISIONING_CONCURRENCY", "0"),
            ("SKYFLEET_BUS_CAPACITY", "lots"),
        ]));
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn test_dispatch_mode_roundtrip() {
        for mode in [DispatchMode::Aggregated, DispatchMode::PerVehicle] {
            assert_eq!(mode.to_string().parse::<DispatchMode>(), Ok(mode));
        }
    }
}
