//! Registration record of an algorithm and the producer of its build information.

use serde::Serialize;

use crate::signature::Signature;

/// rustc version the crate was built with.
pub const RUSTC_VERSION: &str = env!("ALGOBENCH_RUSTC_VERSION");

/// Provides what the server needs to rebuild the algorithm: runtime version, dependency
/// manifest and source code.
///
/// A compiled program cannot read its own source back, so the text is supplied by the
/// integrator, usually embedded at build time with `include_str!`.
pub trait EnvironmentDescriptor: Send + Sync {
    /// Language and toolchain version.
    fn runtime_version(&self) -> String;

    /// Dependency manifest, e.g. a `Cargo.lock`.
    fn dependency_manifest(&self) -> String;

    /// Source text defining the registered functions.
    fn source_code(&self) -> String;
}

/// An [`EnvironmentDescriptor`] made of fixed strings.
///
/// ```
/// use algobench::environment::{EnvironmentDescriptor, StaticDescriptor};
///
/// let descriptor = StaticDescriptor::new("fn solve() {}").with_dependency_manifest("[[package]]");
/// assert_eq!(descriptor.source_code(), "fn solve() {}");
/// assert!(descriptor.runtime_version().starts_with("rustc"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticDescriptor {
    runtime_version: String,
    dependency_manifest: String,
    source_code: String,
}

impl StaticDescriptor {
    /// Descriptor of `source_code`, with the toolchain that built this crate and an empty manifest.
    pub fn new(source_code: impl Into<String>) -> Self {
        Self {
            runtime_version: RUSTC_VERSION.to_owned(),
            dependency_manifest: String::new(),
            source_code: source_code.into(),
        }
    }

    /// Replace the runtime version.
    pub fn with_runtime_version(self, version: impl Into<String>) -> Self {
        Self {
            runtime_version: version.into(),
            ..self
        }
    }

    /// Set the dependency manifest.
    pub fn with_dependency_manifest(self, manifest: impl Into<String>) -> Self {
        Self {
            dependency_manifest: manifest.into(),
            ..self
        }
    }
}

impl Default for StaticDescriptor {
    fn default() -> Self {
        Self::new("")
    }
}

impl EnvironmentDescriptor for StaticDescriptor {
    fn runtime_version(&self) -> String {
        self.runtime_version.clone()
    }

    fn dependency_manifest(&self) -> String {
        self.dependency_manifest.clone()
    }

    fn source_code(&self) -> String {
        self.source_code.clone()
    }
}

/// Server-side registration of an algorithm, unique per name and API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    /// Registration key.
    pub name: String,
    /// Source text of the registered functions.
    pub source_code: String,
    /// Toolchain version.
    pub runtime_version: String,
    /// Dependency manifest.
    pub dependency_manifest: String,
    /// Name of the compute function.
    pub algorithm_function_name: String,
    /// Name of the feasibility function.
    pub feasibility_function_name: String,
    /// Name of the scoring function.
    pub score_function_name: String,
    /// Lower scores are better.
    pub is_minimization: bool,
    /// The server only evaluates uploads of active environments.
    pub active: bool,
}

impl Environment {
    pub(crate) fn describe(
        name: &str,
        descriptor: &dyn EnvironmentDescriptor,
        signatures: [&Signature; 3],
        is_minimization: bool,
        active: bool,
    ) -> Self {
        let [compute, feasibility, scoring] = signatures;
        Self {
            name: name.to_owned(),
            source_code: descriptor.source_code(),
            runtime_version: descriptor.runtime_version(),
            dependency_manifest: descriptor.dependency_manifest(),
            algorithm_function_name: compute.name().to_owned(),
            feasibility_function_name: feasibility.name().to_owned(),
            score_function_name: scoring.name().to_owned(),
            is_minimization,
            active,
        }
    }
}
