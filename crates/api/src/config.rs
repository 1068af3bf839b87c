/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. In production,
/// override via environment variables.
#[derive(Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `300`). Single-image
    /// processing runs inside the request, so this must cover a generation
    /// call.
    pub request_timeout_secs: u64,
    /// How long to wait for the dispatcher to drain on shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Shared secret for webhook signatures. `None` accepts unsigned calls.
    pub webhook_secret: Option<String>,
    /// PostgreSQL URL. `None` keeps jobs in memory.
    pub database_url: Option<String>,
    /// Run the background dispatcher for queued jobs (default: `true`).
    pub dispatcher_enabled: bool,
    /// Dispatcher poll interval in seconds (default: `5`).
    pub dispatcher_poll_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                    |
    /// |---------------------------|----------------------------|
    /// | `HOST`                    | `0.0.0.0`                  |
    /// | `PORT`                    | `3000`                     |
    /// | `CORS_ORIGINS`            | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`    | `300`                      |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `30`                       |
    /// | `AIRTABLE_WEBHOOK_SECRET` | unset (permissive)         |
    /// | `DATABASE_URL`            | unset (in-memory jobs)     |
    /// | `DISPATCHER_ENABLED`      | `true`                     |
    /// | `DISPATCHER_POLL_SECS`    | `5`                        |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let webhook_secret = non_empty_var("AIRTABLE_WEBHOOK_SECRET");
        let database_url = non_empty_var("DATABASE_URL");

        let dispatcher_enabled = std::env::var("DISPATCHER_ENABLED")
            .map(|v| parse_flag(&v))
            .unwrap_or(true);

        let dispatcher_poll_secs: u64 = std::env::var("DISPATCHER_POLL_SECS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("DISPATCHER_POLL_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            webhook_secret,
            database_url,
            dispatcher_enabled,
            dispatcher_poll_secs,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("cors_origins", &self.cors_origins)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("shutdown_timeout_secs", &self.shutdown_timeout_secs)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "<redacted>"),
            )
            .field("dispatcher_enabled", &self.dispatcher_enabled)
            .field("dispatcher_poll_secs", &self.dispatcher_poll_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_default_to_on() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(parse_flag("yes"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(" OFF "));
        assert!(!parse_flag("0"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: vec![],
            request_timeout_secs: 30,
            shutdown_timeout_secs: 30,
            webhook_secret: Some("whsec_very_secret".into()),
            database_url: Some("postgres://user:pw@db/heirloom".into()),
            dispatcher_enabled: false,
            dispatcher_poll_secs: 5,
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("whsec_very_secret"));
        assert!(!debug.contains("user:pw"));
        assert!(debug.contains("<redacted>"));
    }
}
