//! Tracing subscriber setup.

/// Overrides the `--log-level` filter when set.
pub const LOG_ENV: &str = "PAPERTRADER_LOG";

pub fn init_tracing(log_level: &str, log_format: &str) -> Result<(), String> {
    let filter = std::env::var(LOG_ENV).unwrap_or_else(|_| log_level.to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .map_err(|err| format!("invalid log filter: {err}"))?;

    // stdout is reserved for command output
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    // a subscriber installed earlier in the process stays in place
    let _ = match log_format.trim().to_lowercase().as_str() {
        "json" => builder.json().try_init(),
        "text" | "" => builder.try_init(),
        other => return Err(format!("unknown log format '{other}' (expected text or json)")),
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_format() {
        assert!(init_tracing("info", "yaml").is_err());
    }

    #[test]
    fn repeated_init_is_harmless() {
        assert!(init_tracing("warn", "text").is_ok());
        assert!(init_tracing("warn", "json").is_ok());
    }
}
