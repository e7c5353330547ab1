//! Uploader configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/leaddocs/uploader.toml`
//! - Windows: `%APPDATA%/leaddocs/uploader.toml`

use std::path::{Path, PathBuf};

use leaddocs_upload::PipelineConfig;
use serde::{Deserialize, Serialize};

/// Environment variable that overrides the stored API token.
pub const TOKEN_ENV: &str = "LEADDOCS_API_TOKEN";

/// Uploader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// Base URL of the document API.
    #[serde(default = "default_base_url")]
    pub api_base_url: String,

    /// Bearer token for the document API.
    #[serde(default)]
    pub api_token: String,

    /// Upload pipeline tunables.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_base_url() -> String {
    "http://localhost:8080/api".into()
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_base_url(),
            api_token: String::new(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl UploaderConfig {
    /// Loads configuration from `path` (or the default location), creating
    /// a default file if none exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: UploaderConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = UploaderConfig::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix (holds the API token).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Replaces the token with `token` when it is set and non-empty.
    pub fn with_token_override(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.api_token = token;
        }
        self
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("leaddocs").join("uploader.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        Ok(unix_config_path(
            std::env::var_os("XDG_CONFIG_HOME"),
            std::env::var_os("HOME"),
        ))
    }
}

/// `$XDG_CONFIG_HOME/leaddocs/uploader.toml`, falling back to
/// `$HOME/.config` when the variable is unset, empty or relative.
#[cfg(not(target_os = "windows"))]
fn unix_config_path(
    xdg_config_home: Option<std::ffi::OsString>,
    home: Option<std::ffi::OsString>,
) -> PathBuf {
    let base = xdg_config_home
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .unwrap_or_else(|| {
            home.map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".config")
        });
    base.join("leaddocs").join("uploader.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = UploaderConfig::default();
        assert!(config.api_token.is_empty());
        assert_eq!(config.pipeline.max_documents_per_lead, 7);
    }

    #[test]
    fn config_partial_toml() {
        let toml_str = r#"
api_base_url = "https://crm.example/api"

[pipeline]
max_retry_attempts = 4
"#;
        let config: UploaderConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_base_url, "https://crm.example/api");
        assert!(config.api_token.is_empty());
        assert_eq!(config.pipeline.max_retry_attempts, 4);
        assert_eq!(config.pipeline.upload_timeout_ms, 30_000);
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("uploader.toml");

        let config = UploaderConfig::load(Some(&path)).unwrap();
        assert_eq!(config, UploaderConfig::default());
        assert!(path.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploader.toml");
        let config = UploaderConfig {
            api_token: "tok".into(),
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(UploaderConfig::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn token_override() {
        let config = UploaderConfig {
            api_token: "file".into(),
            ..Default::default()
        };
        assert_eq!(config.clone().with_token_override(None).api_token, "file");
        assert_eq!(
            config.clone().with_token_override(Some("  ".into())).api_token,
            "file"
        );
        assert_eq!(config.with_token_override(Some("env".into())).api_token, "env");
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn xdg_config_home_takes_precedence() {
        let path = unix_config_path(Some("/xdg".into()), Some("/home/u".into()));
        assert_eq!(path, PathBuf::from("/xdg/leaddocs/uploader.toml"));

        let path = unix_config_path(None, Some("/home/u".into()));
        assert_eq!(path, PathBuf::from("/home/u/.config/leaddocs/uploader.toml"));

        let path = unix_config_path(Some("".into()), Some("/home/u".into()));
        assert_eq!(path, PathBuf::from("/home/u/.config/leaddocs/uploader.toml"));
    }

    #[test]
    fn config_path_not_empty() {
        let path = config_path().unwrap();
        assert!(path.ends_with("uploader.toml"));
    }
}
