use std::time::Duration;

use snafu::Snafu;

/// A generic error.
///
/// Probes report failures with this type, which allows returning any error that implements `std::error::Error`, or
/// constructing ad-hoc errors with [`generic_error!`][crate::generic_error].
pub type GenericError = anyhow::Error;

/// Macro for constructing a generic error.
///
/// The resulting value evaluates to [`GenericError`], and can be constructed from a string literal, a format string
/// (with arguments accepted, in the same order as `std::format!`), or an existing error value.
#[macro_export]
macro_rules! generic_error {
    ($msg:literal $(,)?) => { $crate::_anyhow!($msg) };
    ($err:expr $(,)?) => { $crate::_anyhow!($err) };
    ($fmt:expr, $($arg:tt)*) => { $crate::_anyhow!($fmt, $($arg)*) };
}

/// Configuration errors.
///
/// These are reported when building a [`Checker`][crate::Checker], and never deferred to the first query.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// A check was registered without a name.
    #[snafu(display("Check names must not be empty."))]
    EmptyCheckName,

    /// A timeout of zero was configured.
    #[snafu(display("Timeout for {} must be greater than zero.", target))]
    ZeroTimeout {
        /// What the timeout was configured for: either a check name or the checker default.
        target: String,
    },

    /// A periodic check was registered with an update interval of zero.
    #[snafu(display(
        "Periodic check '{}' must have an update interval greater than zero (got {:?}).",
        check_name,
        interval
    ))]
    InvalidInterval {
        /// Name of the check.
        check_name: String,

        /// The configured interval.
        interval: Duration,
    },

    /// The checker was configured to start immediately, but no Tokio runtime was available to spawn onto.
    #[snafu(display("Checker must be built within a Tokio runtime when autostart is enabled."))]
    MissingRuntime,

    /// The configuration could not be deserialized.
    #[snafu(display("Failed to load checker configuration: {}", source))]
    Deserialization {
        /// Error source.
        source: Box<figment::Error>,
    },
}

impl From<figment::Error> for ConfigurationError {
    fn from(e: figment::Error) -> Self {
        Self::Deserialization { source: Box::new(e) }
    }
}
