//! Instrumentation of a compute function.
//!
//! This module defines [`Algorithm`], the instrumented form of a user compute function, and
//! [`AlgorithmBuilder`], which registers it with the benchmarking server.
//!
//! # Construction
//!
//! [`AlgorithmBuilder::build`] checks, in order:
//!
//! 1. the environment name is not empty
//! 2. the three signatures are compatible (see [`signature`](crate::signature))
//! 3. the server accepts the credentials
//!
//! If any check fails the returned [`Algorithm`] is a plain pass-through to the compute
//! function: no network call is ever made on its behalf. Otherwise the environment is
//! registered (or updated), and a registration failure is logged without disabling the
//! instrumentation.
//!
//! # Calls
//!
//! Each [`Algorithm::call`] uploads the instance, runs the compute function, uploads the
//! solution and, when enabled, runs the [improvement protocol](crate::improvement). Upload
//! failures are logged and skipped. The compute function itself is never guarded: its
//! panics reach the caller untouched.

use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use thiserror::Error;
use tracing::{info, instrument, trace, warn};

use crate::{
    configuration::{Configuration, Credentials},
    environment::{Environment, EnvironmentDescriptor, StaticDescriptor},
    improvement::{improve, Objective},
    logger::init_logger,
    remote::{EnvironmentId, InstanceId, RemoteService},
    serializer::{self, Serializable},
    signature::{validate, Signature},
};

type ComputeFn<I, S> = dyn Fn(&I) -> S + Send + Sync;
type FeasibilityFn<I, S> = dyn Fn(&I, &S) -> bool + Send + Sync;
type ScoringFn<I, S, Sc> = dyn Fn(&I, &S) -> Sc + Send + Sync;

/// A call received a number of positional arguments other than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("algorithm must take exactly one argument, got {found}")]
pub struct ArityError {
    /// Number of arguments supplied.
    pub found: usize,
}

/// Builder registering a compute function together with its feasibility and scoring
/// functions.
///
/// # Example
///
/// ```
/// use algobench::prelude::*;
///
/// let service = InMemoryService::new().with_api_key("key");
/// let algorithm = AlgorithmBuilder::new(
///     |x: &u32| x * 2,
///     |_: &u32, _: &u32| true,
///     |_: &u32, y: &u32| *y,
/// )
/// .with_credentials(Credentials::new("key", "doubling"))
/// .build(service);
///
/// assert!(algorithm.is_instrumented());
/// assert_eq!(algorithm.call(&5), 10);
/// ```
pub struct AlgorithmBuilder<I, S, Sc> {
    compute: Box<ComputeFn<I, S>>,
    feasibility: Box<FeasibilityFn<I, S>>,
    scoring: Box<ScoringFn<I, S, Sc>>,
    signatures: [Signature; 3],
    credentials: Option<Credentials>,
    config: Configuration,
    descriptor: Box<dyn EnvironmentDescriptor>,
}

impl<I, S, Sc> AlgorithmBuilder<I, S, Sc>
where
    I: Serializable + 'static,
    S: Serializable + 'static,
    Sc: PartialOrd + fmt::Debug + 'static,
{
    /// Start a registration. Signatures are derived from the three functions' types.
    pub fn new<C, F, Sf>(compute: C, feasibility: F, scoring: Sf) -> Self
    where
        C: Fn(&I) -> S + Send + Sync + 'static,
        F: Fn(&I, &S) -> bool + Send + Sync + 'static,
        Sf: Fn(&I, &S) -> Sc + Send + Sync + 'static,
    {
        let signatures = [
            Signature::compute::<C, I, S>(),
            Signature::feasibility::<F, I, S>(),
            Signature::scoring::<Sf, I, S, Sc>(),
        ];
        Self {
            compute: Box::new(compute),
            feasibility: Box::new(feasibility),
            scoring: Box::new(scoring),
            signatures,
            credentials: None,
            config: Configuration::new(),
            descriptor: Box::new(StaticDescriptor::default()),
        }
    }

    /// Credentials to register with. Read from the environment when not set
    /// (see [`Credentials::from_env`]).
    pub fn with_credentials(self, credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
            ..self
        }
    }

    /// Instrumentation behaviors. Defaults to [`Configuration::new`].
    pub fn with_configuration(self, config: Configuration) -> Self {
        Self { config, ..self }
    }

    /// Source of the runtime version, dependency manifest and source code sent at
    /// registration. Defaults to an empty [`StaticDescriptor`].
    pub fn with_descriptor(self, descriptor: impl EnvironmentDescriptor + 'static) -> Self {
        Self {
            descriptor: Box::new(descriptor),
            ..self
        }
    }

    /// Replace the derived signatures with declared ones.
    pub fn with_signatures(
        self,
        compute: Signature,
        feasibility: Signature,
        scoring: Signature,
    ) -> Self {
        Self {
            signatures: [compute, feasibility, scoring],
            ..self
        }
    }

    /// Registers with `service` and returns the instrumented algorithm, or a pass-through
    /// if registration is not possible (see the [module documentation](self)).
    #[instrument(skip_all)]
    pub fn build(self, service: impl RemoteService + 'static) -> Algorithm<I, S, Sc> {
        if self.config.log {
            if let Err(e) = init_logger() {
                warn!("file logging disabled: {e:#}");
            }
        }
        trace!(config = ?self.config);

        let credentials = self.credentials.unwrap_or_else(Credentials::from_env);
        let passthrough = |compute: Box<ComputeFn<I, S>>| Algorithm {
            compute,
            instrumentation: None,
        };

        if credentials.env_name().is_empty() {
            warn!("Environment name cannot be empty. Falling back to normal algorithm execution");
            return passthrough(self.compute);
        }

        let [compute_sig, feasibility_sig, scoring_sig] = &self.signatures;
        if let Err(e) = validate(compute_sig, feasibility_sig, scoring_sig) {
            warn!("{e}. Falling back to normal algorithm execution");
            return passthrough(self.compute);
        }

        match service.authenticate(&credentials) {
            Ok(true) => {}
            Ok(false) => {
                warn!("API Key not valid. Falling back to normal algorithm execution");
                return passthrough(self.compute);
            }
            Err(e) => {
                warn!("authentication failed ({e:#}). Falling back to normal algorithm execution");
                return passthrough(self.compute);
            }
        }

        let environment = Environment::describe(
            credentials.env_name(),
            &*self.descriptor,
            [compute_sig, feasibility_sig, scoring_sig],
            self.config.is_minimization,
            self.config.improve_solution,
        );
        let environment_id = match service.register_environment(&environment) {
            Ok(id) => {
                info!(%id, name = credentials.env_name(), "environment registered");
                Some(id)
            }
            Err(e) => {
                warn!("Environment Upload failed: {e:#}");
                None
            }
        };

        Algorithm {
            compute: self.compute,
            instrumentation: Some(Instrumentation {
                feasibility: self.feasibility,
                scoring: self.scoring,
                service: Box::new(service),
                state: RegistrationState {
                    environment_id,
                    invocations: AtomicUsize::new(0),
                },
                objective: Objective::from_minimization(self.config.is_minimization),
                improve_solution: self.config.improve_solution,
                improvement_wait: self.config.improvement_wait,
            }),
        }
    }
}

/// Bookkeeping of one registration, shared by all calls of an [`Algorithm`].
#[derive(Debug)]
struct RegistrationState {
    environment_id: Option<EnvironmentId>,
    invocations: AtomicUsize,
}

struct Instrumentation<I, S, Sc> {
    feasibility: Box<FeasibilityFn<I, S>>,
    scoring: Box<ScoringFn<I, S, Sc>>,
    service: Box<dyn RemoteService>,
    state: RegistrationState,
    objective: Objective,
    improve_solution: bool,
    improvement_wait: Duration,
}

/// A compute function, instrumented or passed through.
///
/// Calls from several threads are independent; each issues its own uploads.
pub struct Algorithm<I, S, Sc> {
    compute: Box<ComputeFn<I, S>>,
    instrumentation: Option<Instrumentation<I, S, Sc>>,
}

impl<I, S, Sc> Algorithm<I, S, Sc>
where
    I: Serializable,
    S: Serializable,
    Sc: PartialOrd + fmt::Debug,
{
    /// False when construction fell back to the bare compute function.
    pub fn is_instrumented(&self) -> bool {
        self.instrumentation.is_some()
    }

    /// Server id of the registered environment, if registration succeeded.
    pub fn environment_id(&self) -> Option<&EnvironmentId> {
        self.instrumentation
            .as_ref()
            .and_then(|i| i.state.environment_id.as_ref())
    }

    /// Runs the compute function on `instance`, with uploads when instrumented.
    pub fn call(&self, instance: &I) -> S {
        match &self.instrumentation {
            Some(instrumentation) => instrumentation.run(&*self.compute, instance),
            None => (self.compute)(instance),
        }
    }

    /// [`call`](Self::call) for arguments collected at runtime.
    ///
    /// # Errors
    /// [`ArityError`] unless exactly one argument is given. Nothing is uploaded or computed
    /// in that case.
    pub fn call_args(&self, args: Vec<I>) -> Result<S, ArityError> {
        let [instance]: [I; 1] = args
            .try_into()
            .map_err(|args: Vec<I>| ArityError { found: args.len() })?;
        Ok(self.call(&instance))
    }
}

impl<I, S, Sc> Instrumentation<I, S, Sc>
where
    I: Serializable,
    S: Serializable,
    Sc: PartialOrd + fmt::Debug,
{
    #[instrument(skip_all, fields(call = self.state.invocations.fetch_add(1, Ordering::Relaxed) + 1))]
    fn run(&self, compute: &ComputeFn<I, S>, instance: &I) -> S {
        let instance_id = match self.upload_instance(instance) {
            Ok(Some(id)) => Some(id),
            Ok(None) => {
                warn!("Instance Upload failed: refused by the server");
                None
            }
            Err(e) => {
                warn!("Uploading instance failed: {e:#}");
                None
            }
        };

        let solution = compute(instance);

        let Some(instance_id) = instance_id else {
            warn!("no instance id, skipping solution upload");
            return solution;
        };

        match self.upload_solution(&solution, &instance_id) {
            Ok(Some(id)) => trace!(%id, "solution uploaded"),
            Ok(None) => warn!("Solution Upload failed: refused by the server"),
            Err(e) => warn!("Uploading solution failed: {e:#}"),
        }

        if !self.improve_solution {
            return solution;
        }

        if !self.improvement_wait.is_zero() {
            trace!(wait = ?self.improvement_wait, "waiting for the server");
            std::thread::sleep(self.improvement_wait);
        }
        improve(
            &*self.service,
            instance,
            &instance_id,
            solution,
            &*self.feasibility,
            &*self.scoring,
            self.objective,
        )
    }

    fn upload_instance(&self, instance: &I) -> anyhow::Result<Option<InstanceId>> {
        let payload = serializer::encode(instance)?;
        self.service
            .upload_instance(&payload, self.state.environment_id.as_ref())
    }

    fn upload_solution(
        &self,
        solution: &S,
        instance_id: &InstanceId,
    ) -> anyhow::Result<Option<crate::remote::SolutionId>> {
        let payload = serializer::encode(solution)?;
        self.service.upload_solution(&payload, instance_id)
    }
}

/// One-call form of [`AlgorithmBuilder`].
///
/// `is_minimization` and `improve_solution` override the corresponding fields of the
/// default [`Configuration`].
pub fn wrap<I, S, Sc, C, F, Sf>(
    compute: C,
    feasibility: F,
    scoring: Sf,
    credentials: Credentials,
    service: impl RemoteService + 'static,
    is_minimization: bool,
    improve_solution: bool,
) -> Algorithm<I, S, Sc>
where
    I: Serializable + 'static,
    S: Serializable + 'static,
    Sc: PartialOrd + fmt::Debug + 'static,
    C: Fn(&I) -> S + Send + Sync + 'static,
    F: Fn(&I, &S) -> bool + Send + Sync + 'static,
    Sf: Fn(&I, &S) -> Sc + Send + Sync + 'static,
{
    AlgorithmBuilder::new(compute, feasibility, scoring)
        .with_credentials(credentials)
        .with_configuration(
            Configuration::new()
                .with_minimization(is_minimization)
                .with_improve_solution(improve_solution),
        )
        .build(service)
}
