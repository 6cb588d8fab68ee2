use std::{env, fs, net::SocketAddr, path::Path, time::Duration};

use crate::{domain::Snowflake, errors::Error, Result};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v8";
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=8&encoding=json";

/// Typed configuration for the client.
#[derive(Clone, Debug)]
pub struct Config {
    // Credentials
    pub token: String,
    pub application_id: Option<Snowflake>,

    // Endpoints
    pub api_base: String,
    pub gateway_url: String,

    // Gateway
    pub intents: u64,
    pub reconnect_backoff: Backoff,

    // Interactions
    pub response_deadline: Duration,

    // REST
    pub http_timeout: Duration,

    // Webhook
    pub webhook_addr: Option<SocketAddr>,
    /// Hex-encoded ed25519 application public key.
    pub public_key: Option<String>,
}

/// Reconnect delay policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every reconnect.
    Fixed(Duration),
    /// `base * 2^attempt`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { base, max } => {
                let multiplier = 1_u32 << attempt.min(20);
                base.saturating_mul(multiplier).min(max)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed(Duration::from_millis(5000))
    }
}

/// Settings consumed by the interaction dispatcher.
#[derive(Clone, Copy, Debug)]
pub struct InteractionConfig {
    /// Time the application has to settle an interaction before the
    /// fallback acknowledgment is sent on its behalf.
    pub response_deadline: Duration,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            response_deadline: Duration::from_millis(250),
        }
    }
}

/// Settings consumed by the gateway session.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub url: String,
    pub token: String,
    pub intents: u64,
    pub backoff: Backoff,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let token = normalize_token(&env_str("KETTU_TOKEN").unwrap_or_default());
        if token.is_empty() {
            return Err(Error::Config(
                "KETTU_TOKEN environment variable is required".to_string(),
            ));
        }

        let application_id = env_str("KETTU_APPLICATION_ID")
            .and_then(non_empty)
            .map(|s| Snowflake(s.trim().to_string()));

        let api_base = env_str("KETTU_API_BASE")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        let gateway_url = env_str("KETTU_GATEWAY_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());

        let intents = env_u64("KETTU_INTENTS").unwrap_or(1);

        let reconnect_delay =
            Duration::from_millis(env_u64("KETTU_RECONNECT_DELAY_MS").unwrap_or(5000));
        let reconnect_max =
            Duration::from_millis(env_u64("KETTU_RECONNECT_MAX_DELAY_MS").unwrap_or(60_000));
        let reconnect_backoff = parse_backoff(
            env_str("KETTU_RECONNECT_BACKOFF").as_deref(),
            reconnect_delay,
            reconnect_max,
        )?;

        let response_deadline =
            Duration::from_millis(env_u64("KETTU_RESPONSE_DEADLINE_MS").unwrap_or(250));
        let http_timeout =
            Duration::from_millis(env_u64("KETTU_HTTP_TIMEOUT_MS").unwrap_or(15_000));

        let webhook_addr = match env_str("KETTU_WEBHOOK_ADDR").and_then(non_empty) {
            Some(raw) => Some(raw.trim().parse::<SocketAddr>().map_err(|e| {
                Error::Config(format!("KETTU_WEBHOOK_ADDR is not a socket address: {e}"))
            })?),
            None => None,
        };
        let public_key = env_str("KETTU_PUBLIC_KEY")
            .and_then(non_empty)
            .map(|s| s.trim().to_string());
        if webhook_addr.is_some() && public_key.is_none() {
            return Err(Error::Config("KETTU_WEBHOOK_ADDR requires KETTU_PUBLIC_KEY".to_string()));
        }

        Ok(Self {
            token,
            application_id,
            api_base,
            gateway_url,
            intents,
            reconnect_backoff,
            response_deadline,
            http_timeout,
            webhook_addr,
            public_key,
        })
    }

    pub fn interactions(&self) -> InteractionConfig {
        InteractionConfig {
            response_deadline: self.response_deadline,
        }
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            url: self.gateway_url.clone(),
            token: self.token.clone(),
            intents: self.intents,
            backoff: self.reconnect_backoff,
        }
    }
}

/// Strip an optional `Bot ` / `Bearer ` scheme prefix (case-insensitive).
pub fn normalize_token(raw: &str) -> String {
    let t = raw.trim();
    for prefix in ["bot", "bearer"] {
        let (Some(head), Some(rest)) = (t.get(..prefix.len()), t.get(prefix.len()..)) else {
            continue;
        };
        if head.eq_ignore_ascii_case(prefix) && rest.starts_with(char::is_whitespace) {
            return rest.trim_start().to_string();
        }
    }
    t.to_string()
}

fn parse_backoff(raw: Option<&str>, delay: Duration, max: Duration) -> Result<Backoff> {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        None | Some("") | Some("fixed") => Ok(Backoff::Fixed(delay)),
        Some("exponential") => Ok(Backoff::Exponential { base: delay, max }),
        Some(other) => Err(Error::Config(format!(
            "KETTU_RECONNECT_BACKOFF must be `fixed` or `exponential`, got `{other}`"
        ))),
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
