use std::{collections::BTreeMap, sync::Arc, time::Duration};

use figment::{providers::Env, Figment};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::{
    check::Check,
    checker::{Checker, CheckerResult, Settings, StatusListener},
    error::ConfigurationError,
    interceptor::Interceptor,
    runner::CheckRunner,
};

const DEFAULT_CACHE_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const fn default_cache_duration() -> Duration {
    DEFAULT_CACHE_DURATION
}

const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

const fn default_true() -> bool {
    true
}

/// Checker configuration.
///
/// This covers the settings of a checker that can be sourced from configuration data, such as environment variables.
/// Checks, listeners, and interceptors are code, and are registered directly on the [`CheckerBuilder`].
#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CheckerConfiguration {
    /// How long an aggregate result is served from cache before being recomputed.
    ///
    /// A value of zero disables caching. Defaults to 1 second.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "cache_duration_ms", default = "default_cache_duration")]
    pub cache_duration: Duration,

    /// Default timeout for a single check invocation.
    ///
    /// Defaults to 10 seconds.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "timeout_ms", default = "default_timeout")]
    pub timeout: Duration,

    /// Whether to omit per-check details from results.
    ///
    /// Defaults to `false`.
    #[serde(default)]
    pub details_disabled: bool,

    /// Whether to start periodic checks as soon as the checker is built.
    ///
    /// Defaults to `true`.
    #[serde(default = "default_true")]
    pub autostart: bool,
}

impl Default for CheckerConfiguration {
    fn default() -> Self {
        Self {
            cache_duration: DEFAULT_CACHE_DURATION,
            timeout: DEFAULT_TIMEOUT,
            details_disabled: false,
            autostart: true,
        }
    }
}

impl CheckerConfiguration {
    /// Extracts the configuration from the given `Figment`.
    ///
    /// # Errors
    ///
    /// If the configuration data cannot be deserialized, an error is returned.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigurationError> {
        Ok(figment.extract()?)
    }

    /// Loads the configuration from environment variables with the given prefix.
    ///
    /// For example, with a prefix of `HEALTH_`, the timeout is read from `HEALTH_TIMEOUT_MS`.
    ///
    /// # Errors
    ///
    /// If the environment variables cannot be deserialized, an error is returned.
    pub fn from_environment(prefix: &str) -> Result<Self, ConfigurationError> {
        Self::from_figment(&Figment::from(Env::prefixed(prefix)))
    }
}

/// Builder for a [`Checker`].
///
/// Options are applied in the order they are called. Registering a check with the same name as an existing one
/// replaces it.
pub struct CheckerBuilder {
    checks: IndexMap<Arc<str>, Check>,
    cache_duration: Duration,
    timeout: Duration,
    details_disabled: bool,
    autostart: bool,
    interceptors: Vec<Interceptor>,
    listener: Option<StatusListener>,
    info: BTreeMap<String, Value>,
    invalid: IndexMap<Arc<str>, ConfigurationError>,
}

impl CheckerBuilder {
    /// Creates a new `CheckerBuilder` with default settings and no checks.
    pub fn new() -> Self {
        Self::from_configuration(&CheckerConfiguration::default())
    }

    /// Creates a new `CheckerBuilder` from the given configuration.
    pub fn from_configuration(config: &CheckerConfiguration) -> Self {
        Self {
            checks: IndexMap::new(),
            cache_duration: config.cache_duration,
            timeout: config.timeout,
            details_disabled: config.details_disabled,
            autostart: config.autostart,
            interceptors: Vec::new(),
            listener: None,
            info: BTreeMap::new(),
            invalid: IndexMap::new(),
        }
    }

    /// Adds a check that runs in the foreground, whenever the aggregate result is recomputed.
    pub fn with_check(mut self, check: Check) -> Self {
        self.register(check.schedule(Duration::ZERO, Duration::ZERO));
        self
    }

    /// Adds multiple foreground checks.
    pub fn with_checks<I>(self, checks: I) -> Self
    where
        I: IntoIterator<Item = Check>,
    {
        checks.into_iter().fold(self, Self::with_check)
    }

    /// Adds a check that runs periodically in the background.
    ///
    /// The check first runs after `initial_delay`, and then every `update_interval`.
    pub fn with_periodic_check(mut self, update_interval: Duration, initial_delay: Duration, check: Check) -> Self {
        let name = Arc::clone(&check.name);
        self.register(check.schedule(update_interval, initial_delay));

        if update_interval.is_zero() {
            let error = ConfigurationError::InvalidInterval {
                check_name: name.to_string(),
                interval: update_interval,
            };
            self.invalid.insert(name, error);
        }

        self
    }

    /// Sets how long an aggregate result is served from cache.
    ///
    /// A duration of zero disables caching. Defaults to 1 second.
    pub fn with_cache_duration(mut self, cache_duration: Duration) -> Self {
        self.cache_duration = cache_duration;
        self
    }

    /// Disables caching, so that every query recomputes the aggregate result.
    pub fn with_disabled_cache(self) -> Self {
        self.with_cache_duration(Duration::ZERO)
    }

    /// Sets the default timeout for a single check invocation.
    ///
    /// Checks can override this with [`Check::with_timeout`]. Defaults to 10 seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Omits per-check details from query results.
    ///
    /// Check states are still tracked and used to compute the aggregate status.
    pub fn with_disabled_details(mut self) -> Self {
        self.details_disabled = true;
        self
    }

    /// Adds interceptors that wrap every check invocation.
    ///
    /// The first interceptor added is the outermost one.
    pub fn with_interceptors<I>(mut self, interceptors: I) -> Self
    where
        I: IntoIterator<Item = Interceptor>,
    {
        self.interceptors.extend(interceptors);
        self
    }

    /// Sets the listener invoked whenever the aggregate status changes.
    pub fn with_status_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&CheckerResult) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Disables starting periodic checks when the checker is built.
    ///
    /// [`Checker::start`] must then be called explicitly.
    pub fn with_disabled_autostart(mut self) -> Self {
        self.autostart = false;
        self
    }

    /// Adds a static value to the `info` map of every result.
    pub fn with_info<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.info.insert(key.into(), value.into());
        self
    }

    fn register(&mut self, check: Check) {
        // Errors belong to the registration they came from, so a replacement starts clean.
        self.invalid.shift_remove(&check.name);
        if let Some(previous) = self.checks.insert(Arc::clone(&check.name), check) {
            debug!(check_name = previous.name(), "Replacing previously registered health check.");
        }
    }

    /// Builds the checker, starting it unless autostart was disabled.
    ///
    /// # Errors
    ///
    /// If any check or setting is invalid, or if the checker needs to spawn periodic checks and is not being built
    /// within a Tokio runtime, an error is returned.
    pub fn build(self) -> Result<Checker, ConfigurationError> {
        if let Some((_, e)) = self.invalid.into_iter().next() {
            return Err(e);
        }

        if self.timeout.is_zero() {
            return Err(ConfigurationError::ZeroTimeout {
                target: "checker".to_string(),
            });
        }

        let mut runners = Vec::with_capacity(self.checks.len());
        for check in self.checks.into_values() {
            if check.name().is_empty() {
                return Err(ConfigurationError::EmptyCheckName);
            }

            if check.timeout.is_some_and(|timeout| timeout.is_zero()) {
                return Err(ConfigurationError::ZeroTimeout {
                    target: format!("check '{}'", check.name()),
                });
            }

            runners.push(CheckRunner::new(check, self.timeout, &self.interceptors));
        }

        let settings = Settings {
            cache_ttl: self.cache_duration,
            details_disabled: self.details_disabled,
            info: self.info,
        };
        let checker = Checker::from_parts(settings, runners, self.listener);

        if self.autostart {
            checker.start()?;
        }

        Ok(checker)
    }
}
