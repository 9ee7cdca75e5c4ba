//! Config show/validate command.

use std::path::Path;

use anyhow::Result;
use evently_core::Config;

use crate::ui;

/// Config actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration, secrets masked.
    Show,
    /// Check the configuration and report problems.
    Validate,
    /// Print the config file location.
    Path,
}

/// Run the config command.
///
/// `loaded` is the result of loading the file, so a broken file can still
/// be reported by `validate`.
pub fn run_config(
    loaded: Result<Config>,
    path: Option<&Path>,
    action: ConfigAction,
) -> Result<()> {
    let path = path.map_or_else(Config::default_path, Path::to_path_buf);

    match action {
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = loaded?;
            if !path.exists() {
                ui::warning(&format!(
                    "Config file not found: {}, showing defaults",
                    path.display()
                ));
            }
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            Ok(())
        }
        ConfigAction::Validate => match loaded.and_then(|c| Ok(c.validate()?)) {
            Ok(()) => {
                ui::success(&format!("Configuration is valid ({})", path.display()));
                Ok(())
            }
            Err(e) => {
                ui::error(&format!("Configuration is invalid: {e}"));
                Err(e)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_reports_errors() {
        let mut config = Config::default();
        config.gateway.port = 0;

        let result = run_config(Ok(config), None, ConfigAction::Validate);
        assert!(result.is_err());
    }

    #[test]
    fn test_show_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(run_config(Ok(Config::default()), Some(&path), ConfigAction::Show).is_ok());
    }
}
