use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::TeleflowError;

/// Environment variable that overrides the configured log filter.
pub const LOG_ENV: &str = "TELEFLOW_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Install the global tracing subscriber. `level` applies to every teleflow
/// crate unless `TELEFLOW_LOG` is set.
pub fn init(level: &str, format: LogFormat) -> Result<(), TeleflowError> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(default_directives(level)))
        .map_err(|e| TeleflowError::Logging(e.to_string()))?;
    let directives = filter.to_string();

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|e| TeleflowError::Logging(e.to_string()))?;
    debug!(filter = %directives, ?format, "logging initialised");
    Ok(())
}

fn default_directives(level: &str) -> String {
    ["teleflow_core", "teleflow_config", "teleflow_normalize", "teleflow_cli"]
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_format() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn directives_cover_every_crate() {
        let d = default_directives("debug");
        assert!(d.contains("teleflow_config=debug"));
        assert!(d.contains("teleflow_cli=debug"));
    }

    #[test]
    fn init_installs_subscriber_once() {
        init("debug", LogFormat::Json).unwrap();
        tracing::info!("subscriber installed");
        let err = init("info", LogFormat::Pretty).unwrap_err();
        assert!(matches!(err, TeleflowError::Logging(_)));
    }
}
