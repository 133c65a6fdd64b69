//! Settings file combining the bus, blackboard and orchestrator sections.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::Path;

use concord_blackboard::BlackboardConfig;
use concord_core::parse::{from_toml_str, read_toml_file};
use concord_events::{BusConfig, MessageBus};
use orchestrator::{Orchestrator, OrchestratorConfig, Toolkit};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Every configurable section. Missing sections fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub blackboard: BlackboardConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl Settings {
    /// Read settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `FileReadFailed` or `TomlParseFailed`.
    pub fn load(path: &Path) -> concord_core::Result<Self> {
        let settings: Self = read_toml_file(path)?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Parse settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `TomlParseFailed`.
    pub fn from_toml_str(input: &str) -> concord_core::Result<Self> {
        from_toml_str(input)
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns the first section's `InvalidConfig`.
    pub fn validate(&self) -> concord_core::Result<()> {
        self.bus.validate()?;
        self.blackboard.validate()?;
        self.orchestrator.validate()
    }

    /// Orchestrator with the default experts wired to these settings.
    ///
    /// # Errors
    ///
    /// Returns an error if any section is invalid.
    pub fn build_orchestrator(&self) -> orchestrator::Result<Orchestrator> {
        let bus = MessageBus::new(self.bus.clone())?;
        Orchestrator::builder()
            .config(self.orchestrator.clone())
            .blackboard_config(self.blackboard.clone())
            .bus(bus)
            .default_experts(&Toolkit::default())
            .build()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Write;
    use std::time::Duration;

    use concord_blackboard::EqualClockPolicy;
    use concord_core::{AgentId, Error};

    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let settings = Settings::from_toml_str("");
        assert_eq!(settings.ok(), Some(Settings::default()));
    }

    #[test]
    fn test_sections_override_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [bus]
            failure_threshold = 3

            [blackboard]
            equal_clock_policy = "conflict"

            [orchestrator]
            dispatch_deadline_ms = 500

            [orchestrator.agent_weights]
            io_expert = 7
            "#,
        )
        .unwrap();

        assert_eq!(settings.bus.failure_threshold, 3);
        assert_eq!(settings.blackboard.equal_clock_policy, EqualClockPolicy::Conflict);
        assert_eq!(
            settings.orchestrator.dispatch_deadline(),
            Duration::from_millis(500)
        );
        assert_eq!(settings.orchestrator.weight_of(&AgentId::from("io_expert")), 7);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[orchestrator]\ndispatch_deadline_ms = 250").unwrap();

        let settings = Settings::load(file.path());
        assert_eq!(
            settings.map(|s| s.orchestrator.dispatch_deadline_ms).ok(),
            Some(250)
        );
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Settings::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(Error::FileReadFailed { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_deadline() {
        let settings = Settings::from_toml_str("[orchestrator]\ndispatch_deadline_ms = 0");
        assert!(matches!(
            settings.map(|s| s.validate()),
            Ok(Err(Error::InvalidConfig { .. }))
        ));
    }

    #[test]
    fn test_malformed_toml_fails() {
        assert!(matches!(
            Settings::from_toml_str("[bus\nfailure_threshold = "),
            Err(Error::TomlParseFailed { .. })
        ));
    }

    #[test]
    fn test_build_orchestrator_rejects_invalid_sections() {
        let no_raw = Settings::from_toml_str("[blackboard]\nknowledge_spaces = [\"processed\"]").unwrap();
        assert!(no_raw.validate().is_err());
        assert!(no_raw.build_orchestrator().is_err());

        let zero_threshold = Settings::from_toml_str("[bus]\nfailure_threshold = 0").unwrap();
        assert!(zero_threshold.build_orchestrator().is_err());
    }

    #[test]
    fn test_build_orchestrator_registers_default_experts() {
        let orchestrator = Settings::default().build_orchestrator();
        let ids: Vec<String> = orchestrator
            .map(|o| o.agents().into_iter().map(|a| a.id.to_string()).collect())
            .unwrap_or_default();
        assert_eq!(ids, vec!["io_expert", "system_expert", "communication_expert"]);
    }
}
