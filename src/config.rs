use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Serve the webhook and admin pages over HTTP.
    #[default]
    Webhook,
    /// Long-poll Telegram for updates; no HTTP server.
    Polling,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Webhook => write!(f, "webhook"),
            RunMode::Polling => write!(f, "polling"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Token of the bot that delivers audit records. Falls back to `bot_token`.
    #[serde(default)]
    pub log_bot_token: Option<String>,
    /// Chats that receive audit records.
    #[serde(default)]
    pub admin_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default)]
    pub mode: RunMode,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Public host name Telegram reaches us at, without scheme.
    #[serde(default)]
    pub public_host: Option<String>,
    /// Secret path segment of the webhook route.
    pub webhook_token: String,
    /// When unset the admin pages only admit requests without a password.
    #[serde(default)]
    pub admin_password: Option<String>,
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_utc_offset_hours() -> i32 {
    3
}

impl TelegramConfig {
    pub fn audit_bot_token(&self) -> &str {
        self.log_bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.bot_token)
    }
}

impl ServerConfig {
    /// URL registered with Telegram by `/set_webhook`.
    pub fn webhook_url(&self) -> Option<String> {
        self.public_host
            .as_deref()
            .map(|host| format!("https://{}/{}", host.trim_end_matches('/'), self.webhook_token))
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read the deployment environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key).with_context(|| format!("Missing environment variable {}", key))
        };

        let admin_ids = match lookup("ADMIN_ID") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<i64>().with_context(|| format!("Invalid ADMIN_ID entry: {}", s)))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let bind_address = match (lookup("BIND_ADDRESS"), lookup("PORT")) {
            (Some(addr), _) => addr,
            (None, Some(port)) => format!("0.0.0.0:{}", port),
            (None, None) => default_bind_address(),
        };

        let utc_offset_hours = match lookup("UTC_OFFSET_HOURS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("Invalid UTC_OFFSET_HOURS: {}", raw))?,
            None => default_utc_offset_hours(),
        };

        let mode = if lookup("IS_PRODUCTION").is_some() {
            RunMode::Webhook
        } else {
            RunMode::Polling
        };

        let config = Config {
            telegram: TelegramConfig {
                bot_token: required("BOT_TOKEN")?,
                log_bot_token: lookup("LOG_BOT_TOKEN"),
                admin_ids,
            },
            server: ServerConfig {
                mode,
                bind_address,
                public_host: lookup("HOST"),
                webhook_token: required("WEBHOOK_TOKEN")?,
                admin_password: lookup("ADMIN_PASSWORD"),
                utc_offset_hours,
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.is_empty() {
            bail!("telegram.bot_token must not be empty");
        }
        if self.server.webhook_token.is_empty() {
            bail!("server.webhook_token must not be empty");
        }
        if !self
            .server
            .webhook_token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            bail!("server.webhook_token may only contain ASCII letters, digits, '_' and '-'");
        }
        if self.server.mode == RunMode::Webhook && self.server.public_host.is_none() {
            bail!("server.public_host is required in webhook mode");
        }
        if !(-12..=14).contains(&self.server.utc_offset_hours) {
            bail!(
                "server.utc_offset_hours out of range: {}",
                self.server.utc_offset_hours
            );
        }
        Ok(())
    }
}
