//! CLI command handlers.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use orchestrator::SessionStatus;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::settings::Settings;

/// Exit code for a session that ended `Failed`.
pub const EXIT_SESSION_FAILED: u8 = 2;

/// Route a parsed command line to its handler.
///
/// # Errors
///
/// Returns an error for unreadable or invalid settings.
pub async fn execute(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Process { text, deadline_ms } => {
            let settings = settings_from(cli.config.as_deref())?;
            cmd_process(settings, &text, deadline_ms).await
        }
        Commands::CheckConfig { file } => cmd_check_config(&file),
        Commands::Agents => cmd_agents(settings_from(cli.config.as_deref())?),
    }
}

fn settings_from(path: Option<&Path>) -> Result<Settings> {
    path.map_or_else(
        || Ok(Settings::default()),
        |path| {
            Settings::load(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))
        },
    )
}

async fn cmd_process(settings: Settings, text: &str, deadline_ms: Option<u64>) -> Result<ExitCode> {
    let settings = apply_deadline(settings, deadline_ms);
    let orchestrator = settings
        .build_orchestrator()
        .context("Invalid settings")?;

    let outcome = orchestrator.process(text).await?;
    orchestrator.bus().quiesce().await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(ExitCode::from(exit_code(outcome.status)))
}

fn cmd_check_config(file: &Path) -> Result<ExitCode> {
    let settings = Settings::load(file)
        .with_context(|| format!("Failed to load settings from {}", file.display()))?;
    settings
        .validate()
        .with_context(|| format!("Invalid settings in {}", file.display()))?;

    info!(path = %file.display(), "Settings are valid");
    println!("{}: ok", file.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_agents(settings: Settings) -> Result<ExitCode> {
    let orchestrator = settings
        .build_orchestrator()
        .context("Invalid settings")?;
    println!("{}", serde_json::to_string_pretty(&orchestrator.agents())?);
    Ok(ExitCode::SUCCESS)
}

fn apply_deadline(settings: Settings, deadline_ms: Option<u64>) -> Settings {
    match deadline_ms {
        Some(ms) => Settings {
            orchestrator: settings
                .orchestrator
                .with_dispatch_deadline(Duration::from_millis(ms)),
            ..settings
        },
        None => settings,
    }
}

/// Process exit code for a session status.
#[must_use]
pub const fn exit_code(status: SessionStatus) -> u8 {
    match status {
        SessionStatus::Completed => 0,
        SessionStatus::Failed => EXIT_SESSION_FAILED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(SessionStatus::Completed), 0);
        assert_eq!(exit_code(SessionStatus::Failed), 2);
    }

    #[test]
    fn test_deadline_override() {
        let settings = apply_deadline(Settings::default(), Some(75));
        assert_eq!(settings.orchestrator.dispatch_deadline(), Duration::from_millis(75));

        let untouched = apply_deadline(Settings::default(), None);
        assert_eq!(untouched, Settings::default());
    }

    #[test]
    fn test_zero_deadline_is_rejected_at_build() {
        let settings = apply_deadline(Settings::default(), Some(0));
        assert!(settings.build_orchestrator().is_err());
    }
}
