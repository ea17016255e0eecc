use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BINARY: &str = "clang-format";
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

/// Output protocol requested from the formatter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `-output-replacements-xml`
    #[default]
    Xml,
    /// JSON cursor header followed by the whole formatted file
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Formatter binary name or path
    pub binary: String,
    /// PATH override used to find and launch the formatter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// In auto mode, only format regions changed since the last commit
    pub only_changed_regions: bool,
    pub output: OutputFormat,
    /// Send `-offset=0 -length=<len>` for whole-file runs
    pub whole_file_offsets: bool,
    pub write_timeout_ms: u64,
    pub exit_timeout_ms: u64,
    pub extra_args: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            path: None,
            only_changed_regions: false,
            output: OutputFormat::default(),
            whole_file_offsets: false,
            write_timeout_ms: DEFAULT_TIMEOUT_MS,
            exit_timeout_ms: DEFAULT_TIMEOUT_MS,
            extra_args: Vec::new(),
        }
    }
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        Ok(Some(config.normalized()))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        self.save_to_path(&config_path)
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/format-bridge");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    /// Apply the empty-value rules: a blank binary means the default, a
    /// blank path means none, and `~`/`$VAR` in the path are expanded
    pub fn normalized(mut self) -> Self {
        if self.binary.trim().is_empty() {
            self.binary = DEFAULT_BINARY.to_string();
        }
        self.path = self
            .path
            .filter(|p| !p.trim().is_empty())
            .map(|p| Self::expand(&p).unwrap_or(p));
        self
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn exit_timeout(&self) -> Duration {
        Duration::from_millis(self.exit_timeout_ms)
    }

    fn expand(value: &str) -> Option<String> {
        match shellexpand::full(value) {
            Ok(expanded) => Some(expanded.into_owned()),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_config_path() {
        let config_path = Config::config_path();
        let path_str = config_path.to_string_lossy();

        // Should not contain tilde anymore
        assert!(!path_str.starts_with('~'));
        assert!(path_str.ends_with(".config/format-bridge/config.toml"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.binary, "clang-format");
        assert_eq!(config.path, None);
        assert!(!config.only_changed_regions);
        assert_eq!(config.output, OutputFormat::Xml);
        assert!(!config.whole_file_offsets);
        assert_eq!(config.write_timeout(), Duration::from_secs(5));
        assert_eq!(config.exit_timeout(), Duration::from_secs(5));
        assert!(config.extra_args.is_empty());
    }

    #[test]
    fn test_missing_keys_take_defaults_and_unknown_keys_are_ignored() {
        let config_content = r#"
only_changed_regions = true
colour = "blue"
"#;

        let config: Config = toml::from_str(config_content).unwrap();

        assert!(config.only_changed_regions);
        assert_eq!(config.binary, DEFAULT_BINARY);
        assert_eq!(config.exit_timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_full_config_parses() {
        let config_content = r#"
binary = "clang-format-18"
path = "/opt/llvm/bin:/usr/bin"
output = "text"
whole_file_offsets = true
write_timeout_ms = 250
exit_timeout_ms = 10000
extra_args = ["--fallback-style=LLVM"]
"#;

        let config: Config = toml::from_str(config_content).unwrap();

        assert_eq!(
            config,
            Config {
                binary: "clang-format-18".to_string(),
                path: Some("/opt/llvm/bin:/usr/bin".to_string()),
                only_changed_regions: false,
                output: OutputFormat::Text,
                whole_file_offsets: true,
                write_timeout_ms: 250,
                exit_timeout_ms: 10000,
                extra_args: vec!["--fallback-style=LLVM".to_string()],
            }
        );
    }

    #[rstest]
    #[case::empty("")]
    #[case::blank("   ")]
    fn test_blank_binary_normalizes_to_default(#[case] binary: &str) {
        let config = Config {
            binary: binary.to_string(),
            ..Default::default()
        }
        .normalized();

        assert_eq!(config.binary, DEFAULT_BINARY);
    }

    #[test]
    fn test_blank_path_normalizes_to_none() {
        let config = Config {
            path: Some(String::new()),
            ..Default::default()
        }
        .normalized();

        assert_eq!(config.path, None);
    }

    #[test]
    fn test_path_with_env_var_is_expanded() {
        unsafe {
            env::set_var("FB_TEST_LLVM", "/custom/llvm");
        }

        let config = Config {
            path: Some("$FB_TEST_LLVM/bin".to_string()),
            ..Default::default()
        }
        .normalized();

        assert_eq!(config.path, Some("/custom/llvm/bin".to_string()));

        unsafe {
            env::remove_var("FB_TEST_LLVM");
        }
    }

    #[test]
    fn test_path_with_tilde_is_expanded() {
        let config = Config {
            path: Some("~/llvm/bin".to_string()),
            ..Default::default()
        }
        .normalized();

        let path = config.path.unwrap();
        assert!(!path.starts_with('~'));
        assert!(path.ends_with("llvm/bin"));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let non_existent_config = temp_dir.path().join("nonexistent.toml");

        let result = Config::load_from_path(&non_existent_config).unwrap();

        assert!(result.is_none());
    }

    #[test]
    fn test_load_invalid_toml_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        std::fs::write(&config_file, "binary = [unterminated").unwrap();

        let err = Config::load_from_path(&config_file).unwrap_err();

        assert!(matches!(err, ConfigError::ConfigParseError { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_load_normalizes_values() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        std::fs::write(&config_file, "binary = \"\"\npath = \"\"\n").unwrap();

        let config = Config::load_from_path(&config_file).unwrap().unwrap();

        assert_eq!(config.binary, DEFAULT_BINARY);
        assert_eq!(config.path, None);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("nested").join("config.toml");
        let test_config = Config {
            binary: "/usr/bin/clang-format-17".to_string(),
            only_changed_regions: true,
            extra_args: vec!["--verbose".to_string()],
            ..Default::default()
        };

        test_config.save_to_path(&config_file).unwrap();

        assert!(config_file.exists(), "Config file should exist");
        let loaded_config = Config::load_from_path(&config_file).unwrap().unwrap();
        assert_eq!(loaded_config, test_config);
    }
}
