//! # Algobench
//!
//! Client-side instrumentation for an optimization benchmarking service.
//!
//! A user registers three functions over an instance type `I` and a solution type `S`:
//!
//! - a compute function `(I) -> S` producing a solution
//! - a feasibility function `(I, S) -> bool`
//! - a scoring function `(I, S) -> number`
//!
//! The crate wraps the compute function into an [`Algorithm`](crate::algorithm::Algorithm)
//! that behaves exactly like it while, on every call, uploading the instance and the
//! solution to the server. Optionally the server's best known solution for the instance is
//! pulled back and returned when it is feasible and strictly better.
//!
//! The instrumentation is fail-open: an invalid key, incompatible signatures or any network
//! failure is logged and the plain compute result is returned. Only the compute function's
//! own panics reach the caller.
//!
//! # Documentation Overview
//!
//! - Registration and calls: [`algorithm`]
//! - Value encoding on the wire: [`serializer`]
//! - Compatibility of the three functions: [`signature`]
//! - What is sent at registration: [`environment`]
//! - The server boundary and its in-memory implementation: [`remote`]
//! - Replacement by the server's solution: [`improvement`]
//! - Credentials and behaviors, from code or environment variables: [`configuration`]
//!
//! # Usage Example
//!
//! ```
//! use algobench::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Bag {
//!     weights: Vec<u32>,
//!     capacity: u32,
//! }
//!
//! impl Serializable for Bag {
//!     const JSON_MODEL: bool = true;
//! }
//!
//! fn fill(bag: &Bag) -> Vec<usize> {
//!     let mut load = 0;
//!     (0..bag.weights.len())
//!         .filter(|&i| {
//!             let fits = load + bag.weights[i] <= bag.capacity;
//!             if fits {
//!                 load += bag.weights[i];
//!             }
//!             fits
//!         })
//!         .collect()
//! }
//!
//! fn fits(bag: &Bag, picked: &Vec<usize>) -> bool {
//!     picked.iter().map(|&i| bag.weights[i]).sum::<u32>() <= bag.capacity
//! }
//!
//! fn load(bag: &Bag, picked: &Vec<usize>) -> u32 {
//!     picked.iter().map(|&i| bag.weights[i]).sum()
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     // swap for `HttpService::from_env()?` with the `http` feature
//!     let service = InMemoryService::new().with_api_key("my-key");
//!
//!     let algorithm = AlgorithmBuilder::new(fill, fits, load)
//!         .with_credentials(Credentials::new("my-key", "greedy-knapsack"))
//!         .with_configuration(Configuration::new().with_improve_solution(true))
//!         .build(service.clone());
//!
//!     let picked = algorithm.call(&Bag { weights: vec![4, 3, 2], capacity: 6 });
//!     assert_eq!(picked, vec![0, 2]);
//!     assert_eq!(service.solutions().len(), 1);
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]

pub use anyhow;
pub mod algorithm;
pub mod configuration;
pub mod environment;
pub mod improvement;
mod logger;
pub mod remote;
pub mod serializer;
pub mod signature;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use algobench::prelude::*;
/// ```
///
/// Includes:
/// - [`AlgorithmBuilder`](crate::algorithm::AlgorithmBuilder) and [`wrap`](crate::algorithm::wrap)
/// - [`Configuration`](crate::configuration::Configuration) and [`Credentials`](crate::configuration::Credentials)
/// - [`Serializable`](crate::serializer::Serializable)
/// - [`RemoteService`](crate::remote::RemoteService) and its implementations
pub mod prelude {
    pub use crate::algorithm::{wrap, Algorithm, AlgorithmBuilder, ArityError};
    pub use crate::configuration::{Configuration, Credentials};
    pub use crate::environment::StaticDescriptor;
    #[cfg(feature = "http")]
    pub use crate::remote::http::HttpService;
    pub use crate::remote::memory::InMemoryService;
    pub use crate::remote::RemoteService;
    pub use crate::serializer::Serializable;
}
