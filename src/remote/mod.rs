//! Boundary with the benchmarking server.
//!
//! The instrumentation only talks to the server through [`RemoteService`]. Two
//! implementations are provided:
//!
//! - [`InMemoryService`](memory::InMemoryService): keeps everything in process, for tests and
//!   offline runs
//! - `HttpService` (feature `http`): the REST client of the hosted service
//!
//! Implementations decide their own timeout policy. A call that hangs blocks the
//! instrumented algorithm call that issued it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{configuration::Credentials, environment::Environment, serializer::SerializedPayload};

#[cfg(feature = "http")]
pub mod http;
pub mod memory;

macro_rules! server_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    };
}

server_id!(
    /// Server identifier of an [`Environment`].
    EnvironmentId
);
server_id!(
    /// Server identifier of an uploaded instance.
    InstanceId
);
server_id!(
    /// Server identifier of an uploaded solution.
    SolutionId
);

/// Operations the instrumentation needs from the benchmarking server.
///
/// Errors are transport failures. The instrumentation logs them and carries on without the
/// side effect; none of them reach the caller of the instrumented algorithm.
pub trait RemoteService: Send + Sync {
    /// True when the server accepts `credentials`.
    fn authenticate(&self, credentials: &Credentials) -> anyhow::Result<bool>;

    /// Creates the environment, or updates the one already registered under the same name.
    fn register_environment(&self, environment: &Environment) -> anyhow::Result<EnvironmentId>;

    /// Stores an instance. `Ok(None)` when the server refuses it.
    fn upload_instance(
        &self,
        payload: &SerializedPayload,
        environment: Option<&EnvironmentId>,
    ) -> anyhow::Result<Option<InstanceId>>;

    /// Stores a solution of an uploaded instance. `Ok(None)` when the server refuses it.
    fn upload_solution(
        &self,
        payload: &SerializedPayload,
        instance: &InstanceId,
    ) -> anyhow::Result<Option<SolutionId>>;

    /// Best solution known for `instance`, if any.
    fn fetch_best_solution(&self, instance: &InstanceId)
        -> anyhow::Result<Option<SerializedPayload>>;
}
