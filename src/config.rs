use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub session_ttl_hours: i64,
    pub notification_service_url: String,
    pub default_phone_country_code: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let session_ttl_hours = env::var("SESSION_TTL_HOURS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(24);
        let notification_service_url = env::var("NOTIFICATION_SERVICE_URL")
            .unwrap_or_else(|_| "http://localhost:3001".to_string());
        let default_phone_country_code = env::var("DEFAULT_PHONE_COUNTRY_CODE")
            .ok()
            .map(|s| s.trim().trim_start_matches('+').to_string())
            .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or_else(|| "57".to_string());

        Ok(Self {
            database_url,
            bind_addr,
            session_ttl_hours,
            notification_service_url,
            default_phone_country_code,
        })
    }
}

/// Per-channel switches for the notification dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelFlags {
    pub email: bool,
    pub whatsapp: bool,
    pub realtime: bool,
}

pub trait ChannelSettings: Send + Sync {
    fn current(&self) -> ChannelFlags;
}

/// Reads `NOTIFICATIONS_*_ENABLED` on every call so flips apply without a restart.
pub struct EnvChannelSettings;

impl ChannelSettings for EnvChannelSettings {
    fn current(&self) -> ChannelFlags {
        ChannelFlags {
            email: flag(env::var("NOTIFICATIONS_EMAIL_ENABLED").ok()),
            whatsapp: flag(env::var("NOTIFICATIONS_WHATSAPP_ENABLED").ok()),
            realtime: flag(env::var("NOTIFICATIONS_REALTIME_ENABLED").ok()),
        }
    }
}

// unset => enabled
fn flag(value: Option<String>) -> bool {
    match value {
        None => true,
        Some(v) => !matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
    }
}
