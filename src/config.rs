use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const APP_NAME: &str = "debrel";
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Immutable runtime settings, built once at startup and passed by reference.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the releases API.
    pub api_url: String,
    /// Repository in `owner/name` form.
    pub repo: String,
    /// Release asset to download; also the local file name.
    pub asset_name: String,
    /// Package name as known to the local package database.
    pub package_name: String,
    /// Prefer the API asset URL over the browser download URL.
    pub download_via_api: bool,
    pub per_page: u32,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub query_timeout_secs: u64,
    pub install_timeout_secs: u64,
    pub query_tool: String,
    pub install_tool: String,
    /// Prefix for the installer when not running as root; empty disables it.
    pub escalation_tool: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            repo: "atom/atom".to_string(),
            asset_name: "atom-amd64.deb".to_string(),
            package_name: "atom".to_string(),
            download_via_api: false,
            per_page: 100,
            user_agent: format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION")),
            http_timeout_secs: 60,
            query_timeout_secs: 30,
            install_timeout_secs: 600,
            query_tool: "dpkg-query".to_string(),
            install_tool: "dpkg".to_string(),
            escalation_tool: "sudo".to_string(),
        }
    }
}

impl Settings {
    pub fn releases_url(&self) -> String {
        format!(
            "{}/repos/{}/releases",
            self.api_url.trim_end_matches('/'),
            self.repo
        )
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    /// Applies `DEBREL_*` overrides obtained through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let strings = [
            ("DEBREL_API_URL", &mut self.api_url),
            ("DEBREL_REPO", &mut self.repo),
            ("DEBREL_ASSET", &mut self.asset_name),
            ("DEBREL_PACKAGE", &mut self.package_name),
            ("DEBREL_QUERY_TOOL", &mut self.query_tool),
            ("DEBREL_INSTALL_TOOL", &mut self.install_tool),
            ("DEBREL_ESCALATION_TOOL", &mut self.escalation_tool),
        ];
        for (key, field) in strings {
            if let Some(value) = lookup(key) {
                *field = value;
            }
        }

        if let Some(value) = lookup("DEBREL_VIA_API") {
            self.download_via_api = value.to_lowercase() == "true" || value == "1";
        }

        let timeouts = [
            ("DEBREL_HTTP_TIMEOUT", &mut self.http_timeout_secs),
            ("DEBREL_QUERY_TIMEOUT", &mut self.query_timeout_secs),
            ("DEBREL_INSTALL_TIMEOUT", &mut self.install_timeout_secs),
        ];
        for (key, field) in timeouts {
            if let Some(value) = lookup(key) {
                *field = value
                    .parse()
                    .with_context(|| format!("Invalid value for {}: '{}'", key, value))?;
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("api_url", &self.api_url),
            ("repo", &self.repo),
            ("asset_name", &self.asset_name),
            ("package_name", &self.package_name),
            ("query_tool", &self.query_tool),
            ("install_tool", &self.install_tool),
        ] {
            if value.trim().is_empty() {
                bail!("Setting '{}' must not be empty", field);
            }
        }

        if self.repo.split('/').count() != 2 {
            bail!("Setting 'repo' must be in owner/name form, got '{}'", self.repo);
        }

        for (field, secs) in [
            ("http_timeout_secs", self.http_timeout_secs),
            ("query_timeout_secs", self.query_timeout_secs),
            ("install_timeout_secs", self.install_timeout_secs),
        ] {
            if secs == 0 {
                bail!("Setting '{}' must be greater than zero", field);
            }
        }

        Ok(())
    }
}

pub fn get_config_file_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("DEBREL_CONFIG") {
        return Ok(PathBuf::from(path));
    }

    let path = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join(APP_NAME)
        .join(CONFIG_FILE_NAME);
    tracing::debug!("Config file path: {}", path.display());
    Ok(path)
}

/// Loads settings from the config file (if any), then environment overrides.
pub fn load_settings() -> Result<Settings> {
    let config_path = get_config_file_path()?;

    let mut settings = if config_path.exists() {
        let content = fs::read_to_string(&config_path).with_context(|| {
            format!("Could not read config file at {}", config_path.display())
        })?;
        serde_json::from_str(&content).with_context(|| {
            format!("Could not parse config file {} as JSON", config_path.display())
        })?
    } else {
        Settings::default()
    };

    settings.apply_overrides(|key| std::env::var(key).ok())?;
    settings.validate()?;

    Ok(settings)
}
