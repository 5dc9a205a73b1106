//! Credentials and instrumentation behaviors
//!
//! This module provides the inputs of an [`AlgorithmBuilder`](crate::algorithm::AlgorithmBuilder)
//! besides the three functions themselves.
//!
//! Both types can be created programmatically or by reading environment variables, using
//! [`Credentials::from_env()`] and [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! All values are optional. Flags are case-insensitive; set them to `"true"` to enable them.
//!
//! - `ALGOBENCH_API_KEY`: API key sent to the benchmarking server (default: empty)
//! - `ALGOBENCH_ENV_NAME`: Name of the environment the algorithm registers as (default: empty)
//! - `ALGOBENCH_LOG`: Enable logging to a file (default: `false`)
//! - `ALGOBENCH_MINIMIZE`: Lower scores are better (default: `false`)
//! - `ALGOBENCH_IMPROVE_SOLUTION`: Ask the server for a better solution after each call (default: `false`)
//! - `ALGOBENCH_IMPROVEMENT_WAIT_SECS`: Seconds to wait before asking for that solution (default: `0`)

use std::{fmt, time::Duration};

/// API key and environment name of one registration.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub(crate) api_key: String,
    pub(crate) env_name: String,
}

impl Credentials {
    /// Create credentials for the environment `env_name`.
    pub fn new(api_key: impl Into<String>, env_name: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            env_name: env_name.into(),
        }
    }

    /// Read `ALGOBENCH_API_KEY` and `ALGOBENCH_ENV_NAME`. Unset variables are empty.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("ALGOBENCH_API_KEY").unwrap_or_default(),
            env_name: std::env::var("ALGOBENCH_ENV_NAME").unwrap_or_default(),
        }
    }

    /// The API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// The environment name.
    pub fn env_name(&self) -> &str {
        &self.env_name
    }
}

// keeps the key out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"***")
            .field("env_name", &self.env_name)
            .finish()
    }
}

/// Configuration of the instrumentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    pub(crate) log: bool,
    pub(crate) is_minimization: bool,
    pub(crate) improve_solution: bool,
    pub(crate) improvement_wait: Duration,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Logging to file is disabled.
    /// - Higher scores are better.
    /// - Server-side solutions are never pulled.
    /// - No wait before pulling a solution.
    pub fn new() -> Self {
        Self {
            log: false,
            is_minimization: false,
            improve_solution: false,
            improvement_wait: Duration::ZERO,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// The following environment variables are recognized:
    /// - `ALGOBENCH_LOG`: if set to `"true"`, enables logging to file (default: `false`)
    /// - `ALGOBENCH_MINIMIZE`: if set to `"true"`, lower scores are better (default: `false`)
    /// - `ALGOBENCH_IMPROVE_SOLUTION`: if set to `"true"`, enables the improvement step (default: `false`)
    /// - `ALGOBENCH_IMPROVEMENT_WAIT_SECS`: whole seconds to wait before the improvement step (default: `0`)
    ///
    /// Any other value (including unset) will result in using the default value for each field.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn get_env_secs(var: &str) -> Option<Duration> {
            std::env::var(var)
                .ok()?
                .parse::<u64>()
                .ok()
                .map(Duration::from_secs)
        }

        Self {
            log: get_env_flag("ALGOBENCH_LOG", false),
            is_minimization: get_env_flag("ALGOBENCH_MINIMIZE", false),
            improve_solution: get_env_flag("ALGOBENCH_IMPROVE_SOLUTION", false),
            improvement_wait: get_env_secs("ALGOBENCH_IMPROVEMENT_WAIT_SECS")
                .unwrap_or(Duration::ZERO),
        }
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Declare whether lower scores are better.
    pub fn with_minimization(mut self, value: bool) -> Self {
        self.is_minimization = value;
        self
    }

    /// Enable or disable the improvement step.
    ///
    /// When enabled, every call asks the server for the best known solution of the uploaded
    /// instance and returns it instead of the local one if it is feasible and strictly better.
    /// The environment is also registered as active, so the server evaluates its uploads.
    pub fn with_improve_solution(mut self, value: bool) -> Self {
        self.improve_solution = value;
        self
    }

    /// Time given to the server to work on an upload before its best solution is requested.
    pub fn with_improvement_wait(mut self, wait: Duration) -> Self {
        self.improvement_wait = wait;
        self
    }

    /// True when lower scores are better.
    pub fn is_minimization(&self) -> bool {
        self.is_minimization
    }

    /// True when the improvement step runs after each call.
    pub fn improve_solution(&self) -> bool {
        self.improve_solution
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod configuration_tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = Configuration::new()
            .with_minimization(true)
            .with_improve_solution(true)
            .with_improvement_wait(Duration::from_secs(3));

        assert!(config.is_minimization());
        assert!(config.improve_solution());
        assert!(!config.log);
        assert_eq!(config.improvement_wait, Duration::from_secs(3));
        assert_eq!(Configuration::default(), Configuration::new());
    }

    #[test]
    fn credentials_hide_the_key() {
        let credentials = Credentials::new("secret-key", "tsp");
        let printed = format!("{credentials:?}");
        assert!(!printed.contains("secret-key"));
        assert!(printed.contains("tsp"));
    }
}
