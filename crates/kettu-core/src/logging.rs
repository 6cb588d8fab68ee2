use crate::Result;

/// Initialize logging/tracing for the client.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    // Default: info for our crates, warn for everything else.
    // Can be overridden with `RUST_LOG`.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,kettu=info,kettu_core=info,kettu_rest=info,kettu_gateway=info,kettu_webhook=info,{}=info",
            service_name.replace('-', "_")
        ))
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init();

    Ok(())
}

/// Mask a token for log output: the first two dot-separated segments stay
/// readable, everything after them is replaced with `*`.
pub fn mask_token(token: &str) -> String {
    token
        .split('.')
        .enumerate()
        .map(|(i, part)| {
            if i > 1 {
                "*".repeat(part.chars().count())
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}
