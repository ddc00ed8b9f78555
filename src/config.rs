//! Configuration types.
//!
//! Everything is read from the process environment (after an optional `.env`
//! file has been loaded by `main`). Provider credentials are kept optional here
//! and checked lazily by each provider on first use, so a half-configured
//! deployment still serves leads and simply records failed notifications.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Origins always accepted for local frontend development.
pub const DEFAULT_LOCAL_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://localhost:3000",
    "http://127.0.0.1:5173",
    "http://127.0.0.1:3000",
];

/// Twilio's shared WhatsApp sandbox sender.
pub const DEFAULT_WHATSAPP_FROM: &str = "whatsapp:+14155238886";

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Allowed CORS origins (normalized, deduplicated).
    pub allowed_origins: Vec<String>,
    /// Where notifications go. A `None` destination disables that channel.
    pub targets: NotifyTargets,
    pub twilio: TwilioConfig,
    pub email: EmailProviderConfig,
    pub rate_limit: RateLimitConfig,
}

/// Notification destinations.
#[derive(Debug, Clone, Default)]
pub struct NotifyTargets {
    pub sms_to: Option<String>,
    pub whatsapp_to: Option<String>,
    pub email_to: Option<String>,
}

/// Twilio REST credentials and senders.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<SecretString>,
    /// Sender number for SMS.
    pub from: Option<String>,
    /// Sender for WhatsApp (with or without the `whatsapp:` prefix).
    pub whatsapp_from: String,
    pub api_base: String,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from: None,
            whatsapp_from: DEFAULT_WHATSAPP_FROM.to_string(),
            api_base: "https://api.twilio.com".to_string(),
        }
    }
}

/// Which email backend delivers lead emails.
#[derive(Debug, Clone)]
pub enum EmailProviderConfig {
    Smtp(SmtpConfig),
    SendGrid(SendGridConfig),
}

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    /// Implicit TLS (port 465 style) when true, STARTTLS otherwise.
    pub secure: bool,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from_address: Option<String>,
    pub allow_self_signed: bool,
    pub timeout: Duration,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            secure: false,
            username: None,
            password: None,
            from_address: None,
            allow_self_signed: false,
            timeout: Duration::from_secs(30),
        }
    }
}

/// SendGrid v3 API settings.
#[derive(Debug, Clone)]
pub struct SendGridConfig {
    pub api_key: Option<SecretString>,
    pub from_address: Option<String>,
    pub api_base: String,
}

/// Fixed-window rate limit applied per client address.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 6,
            window: Duration::from_secs(60),
        }
    }
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Build config from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = parse_or(&get, "PORT", 5000u16)?;
        let db_path = get("LEAD_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/leads.db"));

        let raw_origins = get("FRONTEND_URLS")
            .or_else(|| get("FRONTEND_URL"))
            .unwrap_or_default();
        let allowed_origins = merge_origins(&raw_origins);

        let targets = NotifyTargets {
            sms_to: get("CONTACT_PHONE"),
            whatsapp_to: get("WHATSAPP_TO"),
            email_to: get("EMAIL_TO"),
        };

        let twilio_defaults = TwilioConfig::default();
        let twilio = TwilioConfig {
            account_sid: get("TWILIO_ACCOUNT_SID"),
            auth_token: get("TWILIO_AUTH_TOKEN").map(SecretString::from),
            from: get("TWILIO_FROM"),
            whatsapp_from: get("TWILIO_WHATSAPP_FROM").unwrap_or(twilio_defaults.whatsapp_from),
            api_base: get("TWILIO_API_BASE").unwrap_or(twilio_defaults.api_base),
        };

        let email = match get("EMAIL_PROVIDER").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("smtp") => {
                let username = get("SMTP_USER");
                EmailProviderConfig::Smtp(SmtpConfig {
                    host: get("SMTP_HOST"),
                    port: parse_or(&get, "SMTP_PORT", 587u16)?,
                    secure: get("SMTP_SECURE").as_deref() == Some("true"),
                    from_address: get("SMTP_FROM").or_else(|| username.clone()),
                    username,
                    password: get("SMTP_PASS").map(SecretString::from),
                    allow_self_signed: get("SMTP_ALLOW_SELF_SIGNED").as_deref() == Some("true"),
                    ..SmtpConfig::default()
                })
            }
            Some("sendgrid") => EmailProviderConfig::SendGrid(SendGridConfig {
                api_key: get("SENDGRID_API_KEY").map(SecretString::from),
                from_address: get("SENDGRID_FROM"),
                api_base: get("SENDGRID_API_BASE")
                    .unwrap_or_else(|| "https://api.sendgrid.com".to_string()),
            }),
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "EMAIL_PROVIDER".into(),
                    message: format!("expected 'smtp' or 'sendgrid', got '{other}'"),
                });
            }
        };

        let rate_limit = RateLimitConfig {
            max_requests: parse_or(&get, "RATE_LIMIT_MAX", 6u32)?,
            window: Duration::from_secs(parse_or(&get, "RATE_LIMIT_WINDOW_SECS", 60u64)?),
        };

        Ok(Self {
            port,
            db_path,
            allowed_origins,
            targets,
            twilio,
            email,
            rate_limit,
        })
    }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Normalize a configured origin: trim, and default the scheme to https.
pub fn normalize_origin(origin: &str) -> Option<String> {
    let s = origin.trim();
    if s.is_empty() {
        return None;
    }
    if s.starts_with("http://") || s.starts_with("https://") {
        Some(s.to_string())
    } else {
        Some(format!("https://{s}"))
    }
}

/// Merge the local development origins with a comma-separated list.
fn merge_origins(raw: &str) -> Vec<String> {
    let mut origins: Vec<String> = DEFAULT_LOCAL_ORIGINS.iter().map(|s| s.to_string()).collect();
    for origin in raw.split(',').filter_map(normalize_origin) {
        if !origins.contains(&origin) {
            origins.push(origin);
        }
    }
    origins
}
