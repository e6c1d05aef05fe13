//! Layered settings for the CLI.
//!
//! Sources, lowest precedence first: built-in defaults, the TOML config file,
//! the `.env` file, the bare `DOCUMENT_ID` variable, `GDOCS_*` environment
//! variables, command-line flags. Environment values stay strings.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment, File, FileFormat, Map, Source, Value};
use directories::ProjectDirs;
use gdocs_client::ClientConfig;
use gdocs_core::ExportConfig;
use serde::Deserialize;

pub const ENV_PREFIX: &str = "GDOCS";
pub const DOCUMENT_ID_VAR: &str = "DOCUMENT_ID";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub document_id: Option<String>,
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    pub api_base_url: String,
    pub timeout_secs: u64,
}

impl Settings {
    pub fn export_config(&self) -> ExportConfig {
        ExportConfig {
            credentials_path: self.credentials_path.clone(),
            token_path: self.token_path.clone(),
            client: ClientConfig {
                base_url: self.api_base_url.clone(),
                timeout: Duration::from_secs(self.timeout_secs),
            },
        }
    }
}

/// Where settings are read from.
#[derive(Debug, Clone)]
pub struct SettingsSources {
    /// Explicit config file; must exist when given.
    pub config_file: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub env_prefix: String,
    /// Unprefixed variable that also supplies the document id.
    pub document_id_var: Option<String>,
}

impl Default for SettingsSources {
    fn default() -> Self {
        Self {
            config_file: None,
            env_file: Some(PathBuf::from(".env")),
            env_prefix: ENV_PREFIX.to_string(),
            document_id_var: Some(DOCUMENT_ID_VAR.to_string()),
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub document_id: Option<String>,
    pub credentials_path: Option<PathBuf>,
    pub token_path: Option<PathBuf>,
}

pub fn default_config_file() -> Option<PathBuf> {
    ProjectDirs::from("com", "gdocs", "gdocs").map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn load(sources: &SettingsSources, overrides: &Overrides) -> Result<Settings> {
    let defaults = ExportConfig::default();
    let mut builder = Config::builder()
        .set_default("credentials_path", path_value(&defaults.credentials_path))?
        .set_default("token_path", path_value(&defaults.token_path))?
        .set_default("api_base_url", defaults.client.base_url.clone())?
        .set_default(
            "timeout_secs",
            i64::try_from(defaults.client.timeout.as_secs()).unwrap_or(i64::MAX),
        )?;

    builder = match &sources.config_file {
        Some(path) => builder.add_source(File::from(path.as_path()).format(FileFormat::Toml)),
        None => match default_config_file() {
            Some(path) => builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            ),
            None => builder,
        },
    };

    if let Some(path) = &sources.env_file {
        builder = builder.add_source(DotEnvFile::new(path));
    }
    if let Some(var) = &sources.document_id_var {
        builder = builder.add_source(BareVariable::new(var, "document_id"));
    }

    let settings = builder
        .add_source(Environment::with_prefix(&sources.env_prefix))
        .set_override_option("document_id", overrides.document_id.clone())?
        .set_override_option(
            "credentials_path",
            overrides.credentials_path.as_deref().map(path_value),
        )?
        .set_override_option("token_path", overrides.token_path.as_deref().map(path_value))?
        .build()
        .context("failed to load settings")?
        .try_deserialize::<Settings>()
        .context("invalid settings")?;

    Ok(Settings {
        document_id: settings
            .document_id
            .filter(|id| !id.trim().is_empty()),
        ..settings
    })
}

fn path_value(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// `KEY=VALUE` file, read through the INI parser with keys folded to lower case
/// so `DOCUMENT_ID` maps to the same field as `GDOCS_DOCUMENT_ID`.
#[derive(Debug, Clone)]
struct DotEnvFile {
    path: PathBuf,
}

impl DotEnvFile {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl Source for DotEnvFile {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ConfigError> {
        let entries = File::from(self.path.as_path())
            .format(FileFormat::Ini)
            .required(false)
            .collect()?;
        Ok(entries
            .into_iter()
            .map(|(key, value)| (key.to_lowercase(), value))
            .collect())
    }
}

/// A single unprefixed process environment variable mapped onto one key.
#[derive(Debug, Clone)]
struct BareVariable {
    var: String,
    key: &'static str,
}

impl BareVariable {
    fn new(var: &str, key: &'static str) -> Self {
        Self {
            var: var.to_string(),
            key,
        }
    }
}

impl Source for BareVariable {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ConfigError> {
        let mut entries = Map::new();
        if let Ok(value) = std::env::var(&self.var) {
            let origin = format!("environment variable `{}`", self.var);
            entries.insert(self.key.to_string(), Value::new(Some(&origin), value));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn isolated(prefix: &str, dir: &Path) -> SettingsSources {
        let config_file = dir.join("config.toml");
        if !config_file.exists() {
            std::fs::write(&config_file, "").unwrap();
        }
        SettingsSources {
            config_file: Some(config_file),
            env_file: Some(dir.join(".env")),
            env_prefix: prefix.to_string(),
            document_id_var: None,
        }
    }

    #[test]
    fn defaults_apply_without_sources() {
        let dir = tempdir().unwrap();
        let settings = load(&isolated("GDOCS_TEST_DEFAULTS", dir.path()), &Overrides::default())
            .unwrap();

        assert_eq!(settings.document_id, None);
        assert_eq!(settings.credentials_path, PathBuf::from("credentials.json"));
        assert_eq!(settings.token_path, PathBuf::from("token.json"));
        assert_eq!(settings.api_base_url, "https://docs.googleapis.com/v1");
        assert_eq!(settings.timeout_secs, 30);
    }

    #[test]
    fn config_file_then_dotenv_then_environment_then_flags() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "document_id = \"from-config\"\ntoken_path = \"config-token.json\"\ntimeout_secs = 5\ncredentials_path = \"config-creds.json\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "DOCUMENT_ID=from-dotenv\nTOKEN_PATH=dotenv-token.json\n",
        )
        .unwrap();
        std::env::set_var("GDOCS_TEST_LAYERS_TOKEN_PATH", "env-token.json");

        let sources = isolated("GDOCS_TEST_LAYERS", dir.path());
        let settings = load(&sources, &Overrides::default()).unwrap();
        assert_eq!(settings.document_id.as_deref(), Some("from-dotenv"));
        assert_eq!(settings.token_path, PathBuf::from("env-token.json"));
        assert_eq!(settings.credentials_path, PathBuf::from("config-creds.json"));
        assert_eq!(settings.timeout_secs, 5);

        let overrides = Overrides {
            document_id: Some("from-flag".to_string()),
            credentials_path: Some(PathBuf::from("flag-creds.json")),
            token_path: None,
        };
        let settings = load(&sources, &overrides).unwrap();
        assert_eq!(settings.document_id.as_deref(), Some("from-flag"));
        assert_eq!(settings.credentials_path, PathBuf::from("flag-creds.json"));
        assert_eq!(settings.token_path, PathBuf::from("env-token.json"));

        std::env::remove_var("GDOCS_TEST_LAYERS_TOKEN_PATH");
    }

    #[test]
    fn blank_document_id_is_treated_as_missing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "DOCUMENT_ID=\n").unwrap();
        let settings =
            load(&isolated("GDOCS_TEST_BLANK", dir.path()), &Overrides::default()).unwrap();
        assert_eq!(settings.document_id, None);
    }

    #[test]
    fn bare_document_id_variable_sits_between_dotenv_and_prefixed_env() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "DOCUMENT_ID=from-dotenv\n").unwrap();
        std::env::set_var("GDOCS_TEST_BARE_DOCUMENT_ID_VAR", "from-bare-env");

        let sources = SettingsSources {
            document_id_var: Some("GDOCS_TEST_BARE_DOCUMENT_ID_VAR".to_string()),
            ..isolated("GDOCS_TEST_BARE", dir.path())
        };
        let settings = load(&sources, &Overrides::default()).unwrap();
        assert_eq!(settings.document_id.as_deref(), Some("from-bare-env"));

        std::env::set_var("GDOCS_TEST_BARE_DOCUMENT_ID", "from-prefixed-env");
        let settings = load(&sources, &Overrides::default()).unwrap();
        assert_eq!(settings.document_id.as_deref(), Some("from-prefixed-env"));

        std::env::remove_var("GDOCS_TEST_BARE_DOCUMENT_ID");
        std::env::remove_var("GDOCS_TEST_BARE_DOCUMENT_ID_VAR");
    }

    #[test]
    fn environment_values_are_not_parsed_as_numbers() {
        let dir = tempdir().unwrap();
        std::env::set_var("GDOCS_TEST_NUMERIC_DOCUMENT_ID", "0123");
        std::env::set_var("GDOCS_TEST_NUMERIC_TIMEOUT_SECS", "7");

        let settings =
            load(&isolated("GDOCS_TEST_NUMERIC", dir.path()), &Overrides::default()).unwrap();
        assert_eq!(settings.document_id.as_deref(), Some("0123"));
        assert_eq!(settings.timeout_secs, 7);

        std::env::remove_var("GDOCS_TEST_NUMERIC_DOCUMENT_ID");
        std::env::remove_var("GDOCS_TEST_NUMERIC_TIMEOUT_SECS");
    }

    #[test]
    fn explicit_config_file_must_exist() {
        let dir = tempdir().unwrap();
        let sources = SettingsSources {
            config_file: Some(dir.path().join("missing.toml")),
            env_file: None,
            env_prefix: "GDOCS_TEST_MISSING".to_string(),
            document_id_var: None,
        };
        assert!(load(&sources, &Overrides::default()).is_err());
    }

    #[test]
    fn export_config_carries_client_settings() {
        let settings = Settings {
            document_id: None,
            credentials_path: PathBuf::from("c.json"),
            token_path: PathBuf::from("t.json"),
            api_base_url: "http://localhost:9000/v1".to_string(),
            timeout_secs: 12,
        };
        let config = settings.export_config();
        assert_eq!(config.client.base_url, "http://localhost:9000/v1");
        assert_eq!(config.client.timeout, Duration::from_secs(12));
        assert_eq!(config.token_path, PathBuf::from("t.json"));
    }
}
