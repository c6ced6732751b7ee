use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

/// How messages from group chats are admitted
#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(from = "String")]
pub enum GroupPolicy {
    /// Every group message is admitted
    Open,
    /// Only messages that @mention the bot or reply to it
    #[default]
    Mention,
    /// Any other configured value. Group messages are dropped.
    Unrecognized(String),
}

impl From<String> for GroupPolicy {
    fn from(value: String) -> Self {
        GroupPolicy::parse(&value)
    }
}

impl GroupPolicy {
    pub fn parse(value: &str) -> Self {
        match value {
            "open" => GroupPolicy::Open,
            "mention" => GroupPolicy::Mention,
            other => GroupPolicy::Unrecognized(other.to_string()),
        }
    }
}

impl std::fmt::Display for GroupPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupPolicy::Open => write!(f, "open"),
            GroupPolicy::Mention => write!(f, "mention"),
            GroupPolicy::Unrecognized(value) => write!(f, "{} (unrecognized)", value),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub bus: BusConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub group_policy: GroupPolicy,
    /// Senders allowed to reach the bot. Empty means everyone.
    #[serde(default)]
    pub allowed_user_ids: Vec<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusConfig {
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
        }
    }
}

fn default_bus_capacity() -> usize {
    256
}

impl TelegramConfig {
    /// Whether a sender passes the allowlist
    pub fn is_allowed(&self, user_id: u64) -> bool {
        self.allowed_user_ids.is_empty() || self.allowed_user_ids.contains(&user_id)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply TELEGRAM_BOT_TOKEN and TELEGRAM_GROUP_POLICY overrides.
    /// `lookup` resolves a variable name to its value, if set.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN").filter(|t| !t.is_empty()) {
            self.telegram.bot_token = token;
        }
        if let Some(policy) = lookup("TELEGRAM_GROUP_POLICY") {
            self.telegram.group_policy = GroupPolicy::parse(policy.trim());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("telegram.bot_token is empty (set it in the config file or TELEGRAM_BOT_TOKEN)");
        }
        if self.bus.capacity == 0 {
            anyhow::bail!("bus.capacity must be greater than zero");
        }
        if let GroupPolicy::Unrecognized(value) = &self.telegram.group_policy {
            warn!(
                "Unrecognized telegram.group_policy '{}' (expected \"open\" or \"mention\"); group messages will be dropped",
                value
            );
        }
        Ok(())
    }
}
