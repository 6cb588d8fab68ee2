/// Core error type for the kettu client.
///
/// Adapter crates map their specific errors into this type so the client core
/// can tell per-interaction failures apart from session-level ones.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unrecognized envelope kind (or a command envelope without command data).
    /// Fatal for that single interaction only.
    #[error("unsupported interaction: {0}")]
    UnsupportedInteraction(String),

    #[error("message is too long: {len} characters (max {max})")]
    MessageTooLong { len: usize, max: usize },

    /// The out-of-band follow-up for a late reply failed.
    #[error("follow-up delivery failed: {source}")]
    DeliveryFailed {
        #[source]
        source: Box<Error>,
    },

    /// 4xx response from the REST API.
    #[error("api error: {method} {path} ({status}): {message}")]
    Api {
        method: String,
        path: String,
        status: u16,
        code: Option<i64>,
        message: String,
    },

    /// 5xx response or a request that never got a response.
    #[error("http error: {method} {path} ({}): {message}", .status.map(|s| s.to_string()).unwrap_or_else(|| "no status".to_string()))]
    Http {
        method: String,
        path: String,
        status: Option<u16>,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    /// Unrecoverable gateway close. Dependent resources must be torn down.
    #[error("session closed with unrecoverable code {code}: {reason}")]
    SessionFatal { code: u16, reason: String },

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn delivery_failed(source: Error) -> Self {
        Error::DeliveryFailed {
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
