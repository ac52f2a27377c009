use log::{info, warn};
use serde::Deserialize;
use std::{env::VarError, fs, path::Path, path::PathBuf};

use crate::error::Error;
use crate::target::{CheckMode, Target};

const APP_DIR: &str = "updot";
const CONFIG_FILE: &str = "config.toml";

const URL_VAR: &str = "UPDOT_URL";
const PRODUCT_NAME_VAR: &str = "UPDOT_PRODUCT_NAME";
const MODE_VAR: &str = "UPDOT_MODE";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub target: TargetOptions,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TargetOptions {
    pub url: String,
    pub product_name: String,
    pub mode: CheckMode,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self {
            url: "https://example.com/".to_string(),
            product_name: "UpDot".to_string(),
            mode: CheckMode::default(),
        }
    }
}

impl Config {
    /// `<config dir>/updot/config.toml`, if the platform has a config dir.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Loads the config file from [`Config::default_path`] and applies the
    /// `UPDOT_*` environment overrides (a `.env` file is honored too).
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Errors
    ///
    /// Fails on unreadable or malformed files and invalid overrides.
    pub fn load() -> Result<Config, Error> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            Some(path) => {
                info!("No config file at {}, using defaults", path.display());
                Config::default()
            }
            None => {
                warn!("No config directory on this platform, using defaults");
                Config::default()
            }
        };

        config.apply_overrides(env_var)?;
        Ok(config)
    }

    /// Parses a TOML config file. Keys left out keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::TomlParse`].
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Replaces settings with values from `lookup`, keyed by variable name.
    ///
    /// # Errors
    ///
    /// Propagates lookup errors and rejects unknown check modes.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Result<Option<String>, Error>,
    {
        if let Some(url) = lookup(URL_VAR)? {
            self.target.url = url;
        }
        if let Some(product_name) = lookup(PRODUCT_NAME_VAR)? {
            self.target.product_name = product_name;
        }
        if let Some(mode) = lookup(MODE_VAR)? {
            self.target.mode = mode.parse()?;
        }
        Ok(())
    }

    /// Builds the monitored [`Target`].
    ///
    /// # Errors
    ///
    /// Fails if the URL is malformed or not http(s), or the product name is empty.
    pub fn target(&self) -> Result<Target, Error> {
        let product_name = self.target.product_name.trim();
        if product_name.is_empty() {
            return Err(Error::Config("product_name must not be empty".to_string()));
        }
        Target::parse(&self.target.url, product_name, self.target.mode)
    }
}

fn env_var(key: &str) -> Result<Option<String>, Error> {
    match dotenvy::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(dotenvy::Error::EnvVar(VarError::NotPresent)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        write!(temp_file, "{content}").expect("Failed to write to temp file");
        temp_file
    }

    #[test]
    fn test_load_config_from_toml() {
        let temp_file = write_config(
            r#"
            [target]
            url = "https://jaredcurrie.com"
            product_name = "BlogStat"
            mode = "get-only"
        "#,
        );

        let config = Config::load_from(temp_file.path()).expect("Failed to parse config");

        assert_eq!(config.target.url, "https://jaredcurrie.com");
        assert_eq!(config.target.product_name, "BlogStat");
        assert_eq!(config.target.mode, CheckMode::GetOnly);

        let target = config.target().unwrap();
        assert_eq!(target.user_agent(), "BlogStat/1.0 (+macOS)");
        assert_eq!(target.site_name(), "jaredcurrie.com");
        assert!(target.alternate().is_some());
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let temp_file = write_config("[target]\nurl = \"https://www.example.org/\"\n");
        let config = Config::load_from(temp_file.path()).unwrap();

        assert_eq!(config.target.url, "https://www.example.org/");
        assert_eq!(config.target.product_name, "UpDot");
        assert_eq!(config.target.mode, CheckMode::HeadWithFallback);

        let empty = write_config("");
        let config = Config::load_from(empty.path()).unwrap();
        assert_eq!(config.target.url, "https://example.com/");
    }

    #[test]
    fn test_unknown_mode_is_a_parse_error() {
        let temp_file = write_config("[target]\nmode = \"ping\"\n");
        let err = Config::load_from(temp_file.path()).unwrap_err();
        assert!(matches!(err, Error::TomlParse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Config::load_from("/nonexistent/updot/config.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("UPDOT_URL", "https://status.example.net/health"),
            ("UPDOT_MODE", "get-only"),
        ]);
        let mut config = Config::default();
        config
            .apply_overrides(|key| Ok(vars.get(key).map(ToString::to_string)))
            .unwrap();

        assert_eq!(config.target.url, "https://status.example.net/health");
        assert_eq!(config.target.product_name, "UpDot");
        assert_eq!(config.target.mode, CheckMode::GetOnly);
    }

    #[test]
    fn test_invalid_mode_override_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|key| Ok((key == "UPDOT_MODE").then(|| "often".to_string())))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_target_rejects_bad_values() {
        let mut config = Config::default();
        config.target.url = "example.com".to_string();
        assert!(matches!(config.target(), Err(Error::UrlParse(_))));

        let mut config = Config::default();
        config.target.product_name = "  ".to_string();
        assert!(matches!(config.target(), Err(Error::Config(_))));
    }
}
