use crate::error::AppError;
use crate::gateway::events::IdentifyProperties;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.json";

/// Settings read from `config.json`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    pub tokens: Vec<String>,
    #[serde(default)]
    pub webhook: Option<String>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_api_version", deserialize_with = "string_or_number")]
    pub api_version: String,
    #[serde(default)]
    pub rotate_guilds: bool,
    #[serde(default)]
    pub ignore_configured_guilds: bool,
    /// Milliseconds a destination rests after receiving a code
    #[serde(default)]
    pub same_guild_timeout: u64,
    pub guilds: Vec<String>,
    #[serde(default)]
    pub properties: ClientProperties,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
}

/// Client description sent when identifying and claiming
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
    #[serde(rename = "browser_user_agent")]
    pub user_agent: String,
}

impl Default for ClientProperties {
    fn default() -> Self {
        Self {
            os: "Linux".into(),
            browser: "Firefox".into(),
            device: String::new(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0"
                .into(),
        }
    }
}

impl ClientProperties {
    pub fn identify(&self) -> IdentifyProperties {
        IdentifyProperties {
            os: self.os.clone(),
            browser: self.browser.clone(),
            device: self.device.clone(),
        }
    }
}

fn default_api_version() -> String {
    "9".into()
}

fn default_api_base() -> String {
    "https://discord.com".into()
}

fn default_gateway_url() -> String {
    "wss://gateway.discord.gg".into()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Version {
        Text(String),
        Number(u64),
    }

    Ok(match Version::deserialize(deserializer)? {
        Version::Text(text) => text,
        Version::Number(n) => n.to_string(),
    })
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            return Err(AppError::Config(format!(
                "configuration file {} does not exist",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("failed to decode {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.active_tokens().next().is_none() {
            return Err(AppError::Config("no tokens configured".into()));
        }
        if self.guilds.iter().all(|g| g.trim().is_empty()) {
            return Err(AppError::Config("no destination guilds configured".into()));
        }
        if self.api_version.trim().is_empty() {
            return Err(AppError::Config("apiVersion must not be empty".into()));
        }

        url::Url::parse(&self.api_base)
            .map_err(|e| AppError::Config(format!("invalid apiBase {}: {e}", self.api_base)))?;
        url::Url::parse(&self.gateway_url).map_err(|e| {
            AppError::Config(format!("invalid gatewayUrl {}: {e}", self.gateway_url))
        })?;
        if let Some(webhook) = self.webhook_url() {
            url::Url::parse(webhook)
                .map_err(|e| AppError::Config(format!("invalid webhook {webhook}: {e}")))?;
        }

        Ok(())
    }

    /// Non-blank tokens, one per session
    pub fn active_tokens(&self) -> impl Iterator<Item = &str> {
        self.tokens
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
    }

    pub fn destinations(&self) -> Vec<String> {
        self.guilds
            .iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect()
    }

    pub fn webhook_url(&self) -> Option<&str> {
        self.webhook.as_deref().filter(|w| !w.trim().is_empty())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.same_guild_timeout)
    }
}

/// Pick the configuration file: an explicit path wins, then `config.json`
/// next to the executable, then the user config directory, then the
/// working directory.
pub fn locate(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }

    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(CONFIG_FILE)));
    let user_config =
        dirs::config_dir().map(|dir| dir.join("vanity-sniper").join(CONFIG_FILE));

    beside_exe
        .into_iter()
        .chain(user_config)
        .find(|path| path.exists())
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}
