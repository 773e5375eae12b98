use std::{
    env,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

pub use reqwest::Url;

use crate::{domain::ChatTarget, errors::Error, Result};

/// How updates reach the bot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateMode {
    /// Telegram pushes updates to `url`; we serve HTTP on `Config::listen_addr`
    /// and accept them on the URL's path.
    Webhook { url: Url },
    /// Long polling via `getUpdates`.
    Polling,
}

/// Typed configuration for the relay.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub bot_token: String,
    pub channel: ChatTarget,

    // Service shell
    pub mode: UpdateMode,
    pub webhook_secret: Option<String>,
    pub listen_addr: SocketAddr,

    // Storage
    pub mapping_file: PathBuf,

    // Outbound calls
    pub send_timeout: Duration,
}

impl Config {
    /// Load from the process environment, after merging an optional `.env`.
    pub fn load() -> Result<Self> {
        // Existing variables win over `.env` entries.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| get(key).and_then(non_empty);

        // Required env vars
        let bot_token = get("BOT_TOKEN")
            .ok_or_else(|| Error::Config("BOT_TOKEN environment variable is required".to_string()))?;
        let channel_raw = get("CHANNEL_ID")
            .ok_or_else(|| Error::Config("CHANNEL_ID environment variable is required".to_string()))?;
        let channel = ChatTarget::parse(&channel_raw).ok_or_else(|| {
            Error::Config(format!(
                "CHANNEL_ID must be a channel @username or a numeric id (e.g. -100...), got {channel_raw:?}"
            ))
        })?;

        // Update delivery
        let use_webhook = get("USE_WEBHOOK").map(|s| parse_bool(&s)).unwrap_or(true);
        let mode = if use_webhook {
            let raw = get("WEBHOOK_URL").ok_or_else(|| {
                Error::Config("WEBHOOK_URL is required when USE_WEBHOOK=true".to_string())
            })?;
            let url = Url::parse(&raw)
                .map_err(|e| Error::Config(format!("WEBHOOK_URL is not a valid URL: {e}")))?;
            if url.scheme() != "https" {
                return Err(Error::Config(
                    "WEBHOOK_URL must start with https://".to_string(),
                ));
            }
            UpdateMode::Webhook { url }
        } else {
            UpdateMode::Polling
        };

        let webhook_secret = get("WEBHOOK_SECRET");

        let host = get("LISTEN_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let host: IpAddr = host
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("LISTEN_HOST is not an IP address: {host:?}")))?;
        let port = parse_num::<u16>(&get, "LISTEN_PORT")?.unwrap_or(8000);

        let mapping_file = PathBuf::from(
            get("MAPPING_FILE").unwrap_or_else(|| "message_mapping.csv".to_string()),
        );

        let send_timeout = Duration::from_secs(parse_num::<u64>(&get, "SEND_TIMEOUT_SECS")?.unwrap_or(30));

        Ok(Self {
            bot_token,
            channel,
            mode,
            webhook_secret,
            listen_addr: SocketAddr::new(host, port),
            mapping_file,
            send_timeout,
        })
    }

    pub fn uses_webhook(&self) -> bool {
        matches!(self.mode, UpdateMode::Webhook { .. })
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_num<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = get(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} is not a valid number: {raw:?}")))
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::domain::ChatId;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn polling_config_uses_defaults() {
        let cfg = load(&[
            ("BOT_TOKEN", "123:abc"),
            ("CHANNEL_ID", "-1001"),
            ("USE_WEBHOOK", "false"),
        ])
        .unwrap();

        assert_eq!(cfg.mode, UpdateMode::Polling);
        assert_eq!(cfg.channel, ChatTarget::Id(ChatId(-1001)));
        assert_eq!(cfg.listen_addr, "0.0.0.0:8000".parse().unwrap());
        assert_eq!(cfg.mapping_file, PathBuf::from("message_mapping.csv"));
        assert_eq!(cfg.send_timeout, Duration::from_secs(30));
        assert!(!cfg.uses_webhook());
    }

    #[test]
    fn webhook_mode_is_default_and_requires_url() {
        let err = load(&[("BOT_TOKEN", "t"), ("CHANNEL_ID", "@news")]).unwrap_err();
        assert!(err.to_string().contains("WEBHOOK_URL"));

        let cfg = load(&[
            ("BOT_TOKEN", "t"),
            ("CHANNEL_ID", "@news"),
            ("WEBHOOK_URL", "https://bot.example.com/webhook"),
            ("LISTEN_PORT", "9000"),
        ])
        .unwrap();
        assert!(cfg.uses_webhook());
        assert_eq!(cfg.listen_addr.port(), 9000);
        let UpdateMode::Webhook { url } = &cfg.mode else {
            panic!("expected webhook mode");
        };
        assert_eq!(url.path(), "/webhook");
    }

    #[test]
    fn rejects_plain_http_webhook() {
        let err = load(&[
            ("BOT_TOKEN", "t"),
            ("CHANNEL_ID", "@news"),
            ("WEBHOOK_URL", "http://bot.example.com/webhook"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("https"));
    }

    #[test]
    fn missing_token_or_bad_channel_is_an_error() {
        assert!(load(&[("CHANNEL_ID", "@news"), ("USE_WEBHOOK", "0")]).is_err());
        assert!(load(&[("BOT_TOKEN", "  "), ("CHANNEL_ID", "@news"), ("USE_WEBHOOK", "0")]).is_err());

        let err = load(&[("BOT_TOKEN", "t"), ("CHANNEL_ID", "news"), ("USE_WEBHOOK", "0")])
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = load(&[
            ("BOT_TOKEN", "t"),
            ("CHANNEL_ID", "@news"),
            ("USE_WEBHOOK", "no"),
            ("LISTEN_PORT", "99999"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("LISTEN_PORT"));
    }
}
