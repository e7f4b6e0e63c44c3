use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::chat::ChatProviderId;

/// Credentials for a single chat provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,

    /// Overrides the provider's default model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Where climate numbers come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Serve the bundled fixture instead of calling NASA POWER.
    pub demo_mode: bool,
    pub power_base_url: String,
    pub start_year: i32,
    pub end_year: i32,
    /// Days on each side of the requested date that count as "the same date".
    pub window_days: u32,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            demo_mode: false,
            power_base_url: "https://power.larc.nasa.gov".to_string(),
            start_year: 2001,
            end_year: 2023,
            window_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    pub base_url: String,
    /// Nominatim rejects requests without an identifying agent.
    pub user_agent: String,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: concat!("WeatherWise-Planner/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Optional default chat provider id, e.g. "groq" or "together".
    pub default_provider: Option<String>,

    /// Example TOML:
    /// [providers.groq]
    /// api_key = "..."
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub geocoding: GeocodingConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Return the default provider as a strongly-typed ChatProviderId.
    pub fn default_provider_id(&self) -> Result<ChatProviderId> {
        let s = self.default_provider.as_ref().ok_or_else(|| {
            anyhow!(
                "No default chat provider configured.\n\
                 Hint: run `weatherwise configure <provider>` (e.g. `weatherwise configure groq`) \
                 or set GROQ_API_KEY."
            )
        })?;

        ChatProviderId::try_from(s.as_str())
    }

    pub fn provider_config(&self, id: ChatProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    pub fn set_default_provider(&mut self, id: ChatProviderId) {
        self.default_provider = Some(id.as_str().to_string());
    }

    /// Load config from disk (or defaults), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        let mut cfg = Self::load_from(&path)?;
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Load a specific file, or return an empty default if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Environment wins over the file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(flag) = lookup("WEATHERWISE_DEMO_MODE") {
            self.data.demo_mode = flag.trim().eq_ignore_ascii_case("true");
        }

        for id in ChatProviderId::all() {
            let prefix = id.env_prefix();
            if let Some(key) = lookup(&format!("{prefix}_API_KEY")).filter(|k| !k.is_empty()) {
                self.upsert_provider_api_key(*id, key);
            }
            if let Some(model) = lookup(&format!("{prefix}_MODEL")).filter(|m| !m.is_empty()) {
                if let Some(provider) = self.providers.get_mut(id.as_str()) {
                    provider.model = Some(model);
                }
            }
        }
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weatherwise", "weatherwise")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Set/replace a provider API key; the first configured provider becomes the default.
    pub fn upsert_provider_api_key(&mut self, provider_id: ChatProviderId, api_key: String) {
        match self.providers.get_mut(provider_id.as_str()) {
            Some(existing) => existing.api_key = api_key,
            None => {
                let entry = ProviderConfig {
                    api_key,
                    model: None,
                };
                self.providers.insert(provider_id.as_str().to_string(), entry);
            }
        }

        if self.default_provider.is_none() {
            self.default_provider = Some(provider_id.to_string());
        }
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ChatProviderId) -> Option<&str> {
        self.providers.get(provider_id.as_str()).map(|cfg| cfg.api_key.as_str())
    }

    pub fn is_provider_configured(&self, provider_id: ChatProviderId) -> bool {
        self.provider_api_key(provider_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn default_provider_id_errors_when_not_set() {
        let cfg = Config::default();
        let err = cfg.default_provider_id().unwrap_err();

        assert!(err.to_string().contains("No default chat provider configured"));
    }

    #[test]
    fn upsert_does_not_override_existing_default() {
        let mut cfg = Config::default();

        cfg.upsert_provider_api_key(ChatProviderId::Groq, "GROQ_KEY".into());
        cfg.upsert_provider_api_key(ChatProviderId::Together, "TOGETHER_KEY".into());

        let default = cfg.default_provider_id().expect("default provider must exist");
        assert_eq!(default, ChatProviderId::Groq);
        assert!(cfg.is_provider_configured(ChatProviderId::Together));

        cfg.set_default_provider(ChatProviderId::Together);
        assert_eq!(cfg.default_provider_id().unwrap(), ChatProviderId::Together);
    }

    #[test]
    fn upsert_keeps_model_override() {
        let mut cfg = Config::default();
        cfg.providers.insert(
            "groq".into(),
            ProviderConfig {
                api_key: "old".into(),
                model: Some("custom".into()),
            },
        );

        cfg.upsert_provider_api_key(ChatProviderId::Groq, "new".into());

        let provider = cfg.provider_config(ChatProviderId::Groq).unwrap();
        assert_eq!(provider.api_key, "new");
        assert_eq!(provider.model.as_deref(), Some("custom"));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg: Config = toml::from_str(
            r#"
            [data]
            demo_mode = true
            start_year = 2010
            "#,
        )
        .unwrap();
        assert_eq!(cfg.data.start_year, 2010);
        assert_eq!(cfg.data.end_year, 2023);

        cfg.apply_env(env(&[
            ("WEATHERWISE_DEMO_MODE", "false"),
            ("GROQ_API_KEY", "from-env"),
            ("GROQ_MODEL", "llama-small"),
        ]));

        assert!(!cfg.data.demo_mode);
        assert_eq!(cfg.provider_api_key(ChatProviderId::Groq), Some("from-env"));
        assert_eq!(
            cfg.provider_config(ChatProviderId::Groq).unwrap().model.as_deref(),
            Some("llama-small")
        );
        assert_eq!(cfg.default_provider_id().unwrap(), ChatProviderId::Groq);
    }

    #[test]
    fn save_and_load_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ChatProviderId::Together, "KEY".into());
        cfg.data.demo_mode = true;
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.provider_api_key(ChatProviderId::Together), Some("KEY"));
        assert!(loaded.data.demo_mode);
        assert_eq!(loaded.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert!(cfg.providers.is_empty());
        assert!(!cfg.data.demo_mode);
    }
}
