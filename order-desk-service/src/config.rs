use anyhow::{Context, Result};
use order_flow::EngineSettings;

pub const DEFAULT_PLACEHOLDER_PHOTO: &str = "assets/placeholder.png";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Process configuration, read once at start-up.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bot_token: String,
    pub database_url: Option<String>,
    pub orders_chat_id: Option<String>,
    pub manager_username: Option<String>,
    pub placeholder_photo_path: String,
    pub admin_panel_password: String,
    pub secret_key: String,
    pub bind_addr: String,
    pub telegram_api_url: String,
    /// Expected `secret_token` of the registered Telegram webhook.
    pub webhook_secret: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            bot_token: get("BOT_TOKEN").context("BOT_TOKEN not set")?,
            database_url: get("DATABASE_URL"),
            orders_chat_id: get("ORDERS_CHAT_ID"),
            manager_username: get("MANAGER_USERNAME"),
            placeholder_photo_path: or("PLACEHOLDER_PHOTO_PATH", DEFAULT_PLACEHOLDER_PHOTO),
            admin_panel_password: or("ADMIN_PANEL_PASSWORD", "admin123"),
            secret_key: or("SECRET_KEY", "change-me"),
            bind_addr: or("BIND_ADDR", DEFAULT_BIND_ADDR),
            telegram_api_url: or("TELEGRAM_API_URL", DEFAULT_TELEGRAM_API_URL),
            webhook_secret: get("WEBHOOK_SECRET"),
        })
    }

    pub fn engine(&self) -> EngineSettings {
        EngineSettings {
            placeholder_photo: self.placeholder_photo_path.clone(),
            orders_chat_id: self.orders_chat_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let s = settings(&[("BOT_TOKEN", "123:abc"), ("DATABASE_URL", "  ")]).unwrap();
        assert_eq!(s.database_url, None);
        assert_eq!(s.placeholder_photo_path, DEFAULT_PLACEHOLDER_PHOTO);
        assert_eq!(s.admin_panel_password, "admin123");
        assert_eq!(s.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(s.engine().orders_chat_id, None);
        assert_eq!(s.webhook_secret, None);
    }

    #[test]
    fn webhook_secret_is_read() {
        let s = settings(&[("BOT_TOKEN", "123:abc"), ("WEBHOOK_SECRET", " abc-123 ")]).unwrap();
        assert_eq!(s.webhook_secret.as_deref(), Some("abc-123"));
    }

    #[test]
    fn token_is_required() {
        let err = settings(&[("ORDERS_CHAT_ID", "-100")]).unwrap_err();
        assert!(err.to_string().contains("BOT_TOKEN"));
    }
}
