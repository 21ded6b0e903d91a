use anyhow::{bail, Result};

/// Runtime configuration, read once from the environment at startup and
/// injected into the services that need it. Request handlers never touch
/// ambient process state.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_address: String,
    pub bind_port: u16,
    pub razorpay: RazorpayConfig,
    pub openai: OpenAiConfig,
    /// Free-tier AI chat requests per user per UTC day.
    pub free_daily_limit: i32,
    /// key: payments-reconciliation -> sweep cadence
    pub reconciliation_interval_secs: u64,
    pub allow_migration_failure: bool,
}

/// Payment provider credentials. The key secret doubles as the HMAC secret
/// for checkout signature verification and must never reach a client.
#[derive(Clone, Debug)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub api_base: String,
}

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
}

impl AppConfig {
    /// Fail fast when a provider secret is missing; everything else has a
    /// working default.
    pub fn from_env() -> Result<Self> {
        let razorpay = RazorpayConfig {
            key_id: require_env("RAZORPAY_KEY_ID")?,
            key_secret: require_env("RAZORPAY_KEY_SECRET")?,
            api_base: read_optional_env("RAZORPAY_API_BASE")
                .unwrap_or_else(|| "https://api.razorpay.com".to_string()),
        };
        let openai = OpenAiConfig {
            api_key: require_env("OPENAI_API_KEY")?,
            api_base: read_optional_env("OPENAI_API_BASE")
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            model: read_optional_env("OPENAI_MODEL")
                .unwrap_or_else(|| "gpt-3.5-turbo".to_string()),
        };

        Ok(Self {
            bind_address: read_optional_env("BIND_ADDRESS")
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            bind_port: read_optional_env("BIND_PORT")
                .and_then(|value| value.parse::<u16>().ok())
                .unwrap_or(3000),
            razorpay,
            openai,
            free_daily_limit: read_optional_env("AI_FREE_DAILY_LIMIT")
                .and_then(|value| value.parse::<i32>().ok())
                .filter(|value| *value >= 0)
                .unwrap_or(3),
            reconciliation_interval_secs: read_optional_env("PAYMENTS_RECONCILIATION_INTERVAL_SECS")
                .and_then(|value| value.parse::<u64>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(300),
            allow_migration_failure: read_optional_env("ALLOW_MIGRATION_FAILURE")
                .map(|value| {
                    let normalized = value.trim().to_ascii_lowercase();
                    matches!(normalized.as_str(), "1" | "true" | "yes")
                })
                .unwrap_or(false),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    match read_optional_env(key) {
        Some(value) => Ok(value),
        None => bail!("{key} must be set"),
    }
}

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
