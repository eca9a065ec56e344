//! Configuration for the CropManage agent and the chat-fix bot
//!
//! The agent reads optional settings from ~/.config/cropmanage-agent/config.json,
//! then lets environment variables override them. The bot is configured purely
//! from the CI environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://api.cropmanage.ucanr.edu";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Listings and the token exchange
const LISTING_TIMEOUT_SECS: u64 = 20;
/// Plantings and recommendation calls
const REQUEST_TIMEOUT_SECS: u64 = 25;

// ============================================================================
// Settings file
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Override for the CropManage base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// CropManage account name; the password lives in the keychain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Speak answers aloud when a speech program is installed
    #[serde(default = "default_announce")]
    pub announce: bool,
}

fn default_announce() -> bool {
    true
}

impl Settings {
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cropmanage-agent"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load settings from disk, or return defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::defaults(),
        }
    }

    fn defaults() -> Self {
        Self {
            announce: true,
            ..Default::default()
        }
    }

    pub(crate) fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::defaults();
        };
        match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                tracing::warn!(
                    "Settings file was corrupted ({}). A backup was saved and defaults were loaded.",
                    err
                );
                Self::defaults()
            }
        }
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir().context("Could not determine config directory")?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;
        self.save_to(&dir.join("config.json"))
    }

    pub(crate) fn save_to(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        write_config_atomic(path, &content).context("Failed to write settings")
    }

    /// Get the settings file location for display
    pub fn location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/cropmanage-agent/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
            tracing::warn!("Failed to set settings file permissions: {}", e);
        }
    }

    file.write_all(content.as_bytes())?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

// ============================================================================
// CropManage endpoints
// ============================================================================

/// Immutable endpoint configuration handed to the API client at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    base: Url,
    pub listing_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE).expect("default API base is a valid URL")
    }
}

impl ApiConfig {
    pub fn new(base: &str) -> Result<Self> {
        let base = Url::parse(base.trim())
            .with_context(|| format!("Invalid CropManage base URL '{}'", base))?;
        if !matches!(base.scheme(), "http" | "https") {
            anyhow::bail!("CropManage base URL must be http(s), got '{}'", base);
        }
        Ok(Self {
            base,
            listing_timeout: Duration::from_secs(LISTING_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        })
    }

    /// `CROPMANAGE_API_BASE` beats the settings file, which beats the default.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base = std::env::var("CROPMANAGE_API_BASE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| settings.api_base.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Self::new(&base)
    }

    fn endpoint(&self, segments: &[&str]) -> String {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.to_string()
    }

    pub fn token_url(&self) -> String {
        self.endpoint(&["Token"])
    }

    pub fn ranches_url(&self) -> String {
        self.endpoint(&["v2", "ranches.json"])
    }

    pub fn crop_types_url(&self) -> String {
        self.endpoint(&["v2", "crop-types.json"])
    }

    pub fn plantings_by_ranch_guid_url(&self, ranch_guid: &str) -> String {
        self.endpoint(&["v2", "ranches", ranch_guid, "plantings.json"])
    }

    pub fn plantings_by_ranch_id_url(&self) -> String {
        self.endpoint(&["v2", "plantings", "list-by-ranch.json"])
    }

    pub fn weather_stations_url(&self) -> String {
        self.endpoint(&["v2", "weather", "stations.json"])
    }

    pub fn irrigation_url(&self) -> String {
        self.endpoint(&["v2", "irrigation-recommendation.json"])
    }

    pub fn fertilizer_url(&self) -> String {
        self.endpoint(&["v2", "fertilizer-recommendation.json"])
    }
}

// ============================================================================
// chat-fix bot
// ============================================================================

/// Everything the CI bot reads from its environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotConfig {
    pub openai_api_key: Option<String>,
    pub github_token: Option<String>,
    /// `owner/repo`
    pub repo: Option<String>,
    pub pr_number: Option<u64>,
    pub event_name: Option<String>,
    pub model: String,
    /// Free-text instruction from whoever triggered the run
    pub hint: Option<String>,
    pub push_enabled: bool,
}

impl BotConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            openai_api_key: get("OPENAI_API_KEY"),
            github_token: get("GITHUB_TOKEN"),
            repo: get("REPO"),
            pr_number: get("PR_NUMBER").and_then(|v| v.trim().parse().ok()),
            event_name: get("EVENT_NAME"),
            model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            hint: get("CHAT_FIX_HINT"),
            push_enabled: !get("CHAT_FIX_DISABLE_PUSH")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false),
        }
    }

    /// Names of required variables that are not set.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.openai_api_key.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if self.github_token.is_none() {
            missing.push("GITHUB_TOKEN");
        }
        if self.repo.is_none() {
            missing.push("REPO");
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_endpoints_follow_base() {
        let config = ApiConfig::new("https://example.test/").unwrap();
        assert_eq!(config.ranches_url(), "https://example.test/v2/ranches.json");
        assert_eq!(config.token_url(), "https://example.test/Token");
        assert_eq!(
            config.plantings_by_ranch_id_url(),
            "https://example.test/v2/plantings/list-by-ranch.json"
        );
    }

    #[test]
    fn test_guid_path_segment_is_escaped() {
        let config = ApiConfig::new("https://example.test").unwrap();
        assert_eq!(
            config.plantings_by_ranch_guid_url("g-99"),
            "https://example.test/v2/ranches/g-99/plantings.json"
        );
        assert_eq!(
            config.plantings_by_ranch_guid_url("a/b"),
            "https://example.test/v2/ranches/a%2Fb/plantings.json"
        );
    }

    #[test]
    fn test_base_with_path_prefix() {
        let config = ApiConfig::new("http://localhost:8080/proxy").unwrap();
        assert_eq!(
            config.weather_stations_url(),
            "http://localhost:8080/proxy/v2/weather/stations.json"
        );
    }

    #[test]
    fn test_rejects_non_http_base() {
        assert!(ApiConfig::new("ftp://example.test").is_err());
        assert!(ApiConfig::new("not a url").is_err());
    }

    #[test]
    fn test_settings_roundtrip_and_corrupt_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let settings = Settings {
            api_base: Some("https://example.test".into()),
            username: Some("grower".into()),
            announce: false,
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), settings);

        fs::write(&path, "{not json").unwrap();
        let loaded = Settings::load_from(&path);
        assert!(loaded.announce);
        assert!(loaded.username.is_none());
        assert!(dir.path().join("config.json.corrupt").exists());
    }

    #[test]
    fn test_bot_config_from_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-test"),
            ("GITHUB_TOKEN", "ghs_x"),
            ("REPO", "owner/repo"),
            ("PR_NUMBER", "42"),
            ("CHAT_FIX_DISABLE_PUSH", "true"),
        ]);
        let config = BotConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.pr_number, Some(42));
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(!config.push_enabled);
        assert!(config.missing_required().is_empty());
    }

    #[test]
    fn test_bot_config_reports_missing() {
        let config = BotConfig::from_lookup(|k| (k == "REPO").then(|| "o/r".to_string()));
        assert_eq!(config.missing_required(), vec!["OPENAI_API_KEY", "GITHUB_TOKEN"]);
        assert!(config.push_enabled);
        assert_eq!(config.pr_number, None);
    }
}
