//! Log output for the command line tool
//!
//! The library only emits `tracing` spans and events, plus `log` records from
//! the inference backends. The binary installs one subscriber at startup.
//! Logs always go to stderr so `-o -` can stream the image on stdout.

use std::io::IsTerminal;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// How log lines are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Colored compact lines for an interactive terminal
    Console,
    /// Uncolored lines for redirected stderr
    Plain,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl TracingFormat {
    fn for_stderr() -> Self {
        if std::io::stderr().is_terminal() {
            Self::Console
        } else {
            Self::Plain
        }
    }
}

/// Filter directives and output format of the CLI subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    directives: String,
    format: TracingFormat,
}

impl TracingConfig {
    /// `-v` count to level: none is info, one is debug, more is trace
    #[must_use]
    pub fn from_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        Self {
            directives: level.to_string(),
            format: TracingFormat::for_stderr(),
        }
    }

    /// Replace the level with `RUST_LOG`-style directives, unless blank
    #[must_use]
    pub fn with_directives_override(mut self, directives: Option<String>) -> Self {
        if let Some(directives) = directives.filter(|d| !d.trim().is_empty()) {
            self.directives = directives;
        }
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn directives(&self) -> &str {
        &self.directives
    }

    #[must_use]
    pub fn format(&self) -> TracingFormat {
        self.format
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directives
    /// - A global subscriber is already installed
    pub fn init(self) -> anyhow::Result<()> {
        let registry = Registry::default().with(EnvFilter::try_new(&self.directives)?);
        let layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

        match self.format {
            TracingFormat::Console => registry.with(layer.compact().with_ansi(true)).try_init()?,
            TracingFormat::Plain => registry.with(layer.compact().with_ansi(false)).try_init()?,
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => registry
                .with(layer.json().with_current_span(true).with_span_list(true))
                .try_init()?,
        }
        Ok(())
    }
}

/// Install the CLI subscriber: `-v` count, then `RUST_LOG` on top
///
/// # Errors
/// - See [`TracingConfig::init`]
pub fn init_cli_tracing(verbosity: u8, format: Option<TracingFormat>) -> anyhow::Result<()> {
    let config = TracingConfig::from_verbosity(verbosity)
        .with_directives_override(std::env::var(EnvFilter::DEFAULT_ENV).ok());
    match format {
        Some(format) => config.with_format(format),
        None => config,
    }
    .init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        let levels: Vec<_> = [0, 1, 2, 9]
            .into_iter()
            .map(|v| TracingConfig::from_verbosity(v).directives().to_string())
            .collect();
        assert_eq!(levels, ["info", "debug", "trace", "trace"]);
    }

    #[test]
    fn test_directives_override() {
        let config = TracingConfig::from_verbosity(0)
            .with_directives_override(Some("bgremoval=debug,ort=warn".to_string()));
        assert_eq!(config.directives(), "bgremoval=debug,ort=warn");

        for blank in [None, Some(String::new()), Some("  ".to_string())] {
            let config = TracingConfig::from_verbosity(1).with_directives_override(blank);
            assert_eq!(config.directives(), "debug");
        }
    }

    #[test]
    fn test_explicit_format_wins() {
        let config = TracingConfig::from_verbosity(0).with_format(TracingFormat::Plain);
        assert_eq!(config.format(), TracingFormat::Plain);
    }

    #[test]
    fn test_invalid_directives_are_rejected() {
        let result = TracingConfig::from_verbosity(0)
            .with_directives_override(Some("bgremoval=loudest".to_string()))
            .init();
        assert!(result.is_err());
    }
}
