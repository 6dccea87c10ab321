//! Diagnostics for khem.
//!
//! Log lines go to stderr so they never mix with names and notifications
//! printed on stdout. The filter comes from, in order of precedence:
//!
//! 1. `KHEM_LOG`
//! 2. `RUST_LOG`
//! 3. the `-v`/`-q` flags, applied to the `khem` target only
//!
//! Controller phase changes are logged at `trace`, so `-vv` shows a session
//! move through loading and saving.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable that overrides every other filter source.
pub const LOG_ENV: &str = "KHEM_LOG";

/// How much khem reports about itself, from least to most detailed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Opened stores and saved names.
    #[default]
    Normal,
    /// Loads, rejected names and skipped saves.
    Verbose,
    /// Every store call and phase change.
    Trace,
}

impl Verbosity {
    /// Map the `-q` flag and the number of `-v` flags to a verbosity.
    ///
    /// `-q` wins over any number of `-v`.
    #[must_use]
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, 0) => Self::Normal,
            (false, 1) => Self::Verbose,
            (false, _) => Self::Trace,
        }
    }

    /// Most detailed level shown at this verbosity.
    #[must_use]
    pub fn level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Filter directive used when no environment override is set.
    #[must_use]
    pub fn directive(self) -> String {
        format!("khem={}", self.level())
    }
}

/// Install the global subscriber.
///
/// Only the first call in a process has any effect.
pub fn init_logging(verbosity: Verbosity) {
    let filter = env_filter(LOG_ENV)
        .or_else(|| env_filter(EnvFilter::DEFAULT_ENV))
        .unwrap_or_else(|| EnvFilter::new(verbosity.directive()));

    // Timestamps and thread ids only add noise to a short interactive session
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(verbosity >= Verbosity::Verbose);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}

fn env_filter(var: &str) -> Option<EnvFilter> {
    EnvFilter::try_from_env(var).ok()
}

/// Route logs from unit tests through the test harness capture.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("khem=trace")
        .with_test_writer()
        .try_init();
}
