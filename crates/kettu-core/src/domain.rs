use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds between the unix epoch and the platform epoch (2015-01-01).
pub const PLATFORM_EPOCH_MS: i64 = 1_420_070_400_000;

/// Platform id (64-bit snowflake, carried as a decimal string on the wire).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snowflake(pub String);

impl Snowflake {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creation time encoded in the id, in unix milliseconds.
    pub fn timestamp_ms(&self) -> Option<i64> {
        let raw: u64 = self.0.parse().ok()?;
        Some((raw >> 22) as i64 + PLATFORM_EPOCH_MS)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp_ms()?).single()
    }
}

impl std::fmt::Display for Snowflake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Snowflake {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Continuation token of one interaction. Keys the follow-up endpoint.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionToken(pub String);

impl InteractionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens grant write access to the interaction; keep them out of logs.
impl std::fmt::Debug for InteractionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("InteractionToken(..)")
    }
}

/// Gateway session id (used for resume).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);
