//! Loading of the client configuration and the local file locations.
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use ::config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const APP_NAME: &str = "authui";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const ENV_PREFIX: &str = "AUTHUI";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to find the {0} directory")]
    MissingDirectory(&'static str),
    #[error(transparent)]
    Load(#[from] ::config::ConfigError),
}

/// Settings read once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub base_url: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    /// Loads settings from the defaults, the optional config file and the
    /// `AUTHUI_*` environment, in that order of precedence.
    pub fn load(config_file: &Path) -> Result<Self, ConfigError> {
        debug!("loading config from {:?}", config_file);

        let settings = Config::builder()
            .set_default("base_url", DEFAULT_BASE_URL)?
            .add_source(
                File::from(config_file)
                    .required(false)
                    .format(FileFormat::Toml),
            )
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    /// Applies a base URL given on the command line, which wins over every
    /// other source.
    pub fn override_base_url(&mut self, base_url: Option<String>) {
        if let Some(base_url) = base_url {
            self.base_url = base_url;
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Finds the location for local configuration.
pub fn config_base_path() -> Result<PathBuf, ConfigError> {
    base_path("XDG_CONFIG_HOME", ".config", "config")
}

/// Finds the location for local data.
pub fn data_base_path() -> Result<PathBuf, ConfigError> {
    base_path("XDG_DATA_HOME", ".local/share", "data")
}

/// `<config base>/authui/config.toml`
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_base_path()?.join(APP_NAME).join("config.toml"))
}

/// `<data base>/authui/token`
pub fn token_file_path() -> Result<PathBuf, ConfigError> {
    Ok(data_base_path()?.join(APP_NAME).join("token"))
}

fn base_path(
    env_var: &str,
    home_relative: &str,
    kind: &'static str,
) -> Result<PathBuf, ConfigError> {
    match std::env::var_os(env_var) {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => dirs::home_dir()
            .map(|home| home.join(home_relative))
            .ok_or(ConfigError::MissingDirectory(kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const ENV_VARS: [&str; 3] = ["AUTHUI_BASE_URL", "AUTHUI_TIMEOUT_SECS", "AUTHUI_LOG_DIR"];

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        fs::write(&path, contents).unwrap();

        (dir, path)
    }

    #[test]
    fn file_values_override_defaults() {
        let (_dir, path) =
            write_config("base_url = \"https://auth.example.com/\"\ntimeout_secs = 10\n");

        temp_env::with_vars_unset(ENV_VARS, || {
            let settings = Settings::load(&path).unwrap();

            assert_eq!(settings.base_url, "https://auth.example.com/");
            assert_eq!(settings.timeout(), Some(Duration::from_secs(10)));
            assert_eq!(settings.log_dir, None);
        });
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();

        temp_env::with_vars_unset(ENV_VARS, || {
            let settings = Settings::load(&dir.path().join("absent.toml")).unwrap();

            assert_eq!(settings.base_url, DEFAULT_BASE_URL);
            assert_eq!(settings.timeout(), None);
        });
    }

    #[test]
    fn malformed_file_is_reported() {
        let (_dir, path) = write_config("base_url = [");

        temp_env::with_vars_unset(ENV_VARS, || {
            assert!(matches!(Settings::load(&path), Err(ConfigError::Load(_))));
        });
    }

    #[test]
    fn environment_overrides_file() {
        let (_dir, path) =
            write_config("base_url = \"https://file.example.com\"\ntimeout_secs = 10\n");

        temp_env::with_vars(
            [
                ("AUTHUI_BASE_URL", Some("https://env.example.com")),
                ("AUTHUI_TIMEOUT_SECS", Some("30")),
                ("AUTHUI_LOG_DIR", Some("/tmp/authui-logs")),
            ],
            || {
                let settings = Settings::load(&path).unwrap();

                assert_eq!(settings.base_url, "https://env.example.com");
                assert_eq!(settings.timeout(), Some(Duration::from_secs(30)));
                assert_eq!(settings.log_dir, Some(PathBuf::from("/tmp/authui-logs")));
            },
        );
    }

    #[test]
    fn command_line_base_url_wins() {
        let (_dir, path) = write_config("base_url = \"https://file.example.com\"\n");

        temp_env::with_vars(
            [("AUTHUI_BASE_URL", Some("https://env.example.com"))],
            || {
                let mut settings = Settings::load(&path).unwrap();

                settings.override_base_url(None);
                assert_eq!(settings.base_url, "https://env.example.com");

                settings.override_base_url(Some("https://flag.example.com".to_string()));
                assert_eq!(settings.base_url, "https://flag.example.com");
            },
        );
    }
}
