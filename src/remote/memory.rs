//! A [`RemoteService`] living in the current process.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{anyhow, bail};
use tracing::trace;

use super::{EnvironmentId, InstanceId, RemoteService, SolutionId};
use crate::{configuration::Credentials, environment::Environment, serializer::SerializedPayload};

/// One operation of [`RemoteService`], used to inject failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// [`RemoteService::authenticate`]
    Authenticate,
    /// [`RemoteService::register_environment`]
    RegisterEnvironment,
    /// [`RemoteService::upload_instance`]
    UploadInstance,
    /// [`RemoteService::upload_solution`]
    UploadSolution,
    /// [`RemoteService::fetch_best_solution`]
    FetchBestSolution,
}

/// An instance stored by [`InMemoryService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredInstance {
    /// Assigned id.
    pub id: InstanceId,
    /// Owning environment, if the upload named one.
    pub environment: Option<EnvironmentId>,
    /// Uploaded content.
    pub payload: SerializedPayload,
}

/// A solution stored by [`InMemoryService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSolution {
    /// Assigned id.
    pub id: SolutionId,
    /// Instance the solution answers.
    pub instance: InstanceId,
    /// Uploaded content.
    pub payload: SerializedPayload,
}

#[derive(Debug, Default)]
struct State {
    api_keys: HashSet<String>,
    next_id: usize,
    environments: Vec<(EnvironmentId, Environment)>,
    instances: Vec<StoredInstance>,
    solutions: Vec<StoredSolution>,
    best_solutions: HashMap<InstanceId, SerializedPayload>,
    default_best_solution: Option<SerializedPayload>,
    failing: HashSet<Operation>,
    refusing: HashSet<Operation>,
    calls: HashMap<Operation, usize>,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

/// Benchmarking server kept in memory.
///
/// Cloning gives another handle to the same store, so a test can keep one handle while the
/// instrumented algorithm owns the other.
///
/// Unlike the hosted service it never evaluates solutions on its own: best solutions are
/// whatever was set with [`set_best_solution`](Self::set_best_solution) or
/// [`set_default_best_solution`](Self::set_default_best_solution).
#[derive(Debug, Clone, Default)]
pub struct InMemoryService {
    state: Arc<Mutex<State>>,
}

impl InMemoryService {
    /// Empty store accepting no API key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `api_key` in [`RemoteService::authenticate`].
    pub fn with_api_key(self, api_key: impl Into<String>) -> Self {
        self.lock().api_keys.insert(api_key.into());
        self
    }

    /// Make every later call of `operation` return an error.
    pub fn fail(&self, operation: Operation) {
        self.lock().failing.insert(operation);
    }

    /// Make every later upload of this kind succeed at the transport level but be refused
    /// (`Ok(None)`). Only meaningful for the two upload operations.
    pub fn refuse(&self, operation: Operation) {
        self.lock().refusing.insert(operation);
    }

    /// Undo [`fail`](Self::fail) and [`refuse`](Self::refuse) for `operation`.
    pub fn recover(&self, operation: Operation) {
        let mut state = self.lock();
        state.failing.remove(&operation);
        state.refusing.remove(&operation);
    }

    /// Best solution returned for `instance`.
    pub fn set_best_solution(&self, instance: InstanceId, payload: SerializedPayload) {
        self.lock().best_solutions.insert(instance, payload);
    }

    /// Best solution returned for instances without a specific one.
    pub fn set_default_best_solution(&self, payload: SerializedPayload) {
        self.lock().default_best_solution = Some(payload);
    }

    /// Number of times `operation` was called, failed calls included.
    pub fn calls(&self, operation: Operation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Total number of calls of any operation.
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// Registered environments with their ids.
    pub fn environments(&self) -> Vec<(EnvironmentId, Environment)> {
        self.lock().environments.clone()
    }

    /// Uploaded instances, oldest first.
    pub fn instances(&self) -> Vec<StoredInstance> {
        self.lock().instances.clone()
    }

    /// Uploaded solutions, oldest first.
    pub fn solutions(&self) -> Vec<StoredSolution> {
        self.lock().solutions.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // a panicking test thread must not hide the store from the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self, operation: Operation) -> anyhow::Result<MutexGuard<'_, State>> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_default() += 1;
        trace!(?operation, "in-memory call");
        if state.failing.contains(&operation) {
            bail!("{operation:?} failed (injected)");
        }
        Ok(state)
    }
}

impl RemoteService for InMemoryService {
    fn authenticate(&self, credentials: &Credentials) -> anyhow::Result<bool> {
        let state = self.enter(Operation::Authenticate)?;
        Ok(!credentials.api_key().is_empty() && state.api_keys.contains(credentials.api_key()))
    }

    fn register_environment(&self, environment: &Environment) -> anyhow::Result<EnvironmentId> {
        let mut state = self.enter(Operation::RegisterEnvironment)?;
        if let Some((id, existing)) = state
            .environments
            .iter_mut()
            .find(|(_, e)| e.name == environment.name)
        {
            *existing = environment.clone();
            return Ok(id.clone());
        }
        let id = EnvironmentId(state.next_id("env"));
        state.environments.push((id.clone(), environment.clone()));
        Ok(id)
    }

    fn upload_instance(
        &self,
        payload: &SerializedPayload,
        environment: Option<&EnvironmentId>,
    ) -> anyhow::Result<Option<InstanceId>> {
        let mut state = self.enter(Operation::UploadInstance)?;
        if state.refusing.contains(&Operation::UploadInstance) {
            return Ok(None);
        }
        if let Some(environment) = environment {
            if !state.environments.iter().any(|(id, _)| id == environment) {
                return Err(anyhow!("unknown environment {environment}"));
            }
        }
        let id = InstanceId(state.next_id("instance"));
        state.instances.push(StoredInstance {
            id: id.clone(),
            environment: environment.cloned(),
            payload: payload.clone(),
        });
        Ok(Some(id))
    }

    fn upload_solution(
        &self,
        payload: &SerializedPayload,
        instance: &InstanceId,
    ) -> anyhow::Result<Option<SolutionId>> {
        let mut state = self.enter(Operation::UploadSolution)?;
        if state.refusing.contains(&Operation::UploadSolution)
            || !state.instances.iter().any(|i| &i.id == instance)
        {
            return Ok(None);
        }
        let id = SolutionId(state.next_id("solution"));
        state.solutions.push(StoredSolution {
            id: id.clone(),
            instance: instance.clone(),
            payload: payload.clone(),
        });
        Ok(Some(id))
    }

    fn fetch_best_solution(
        &self,
        instance: &InstanceId,
    ) -> anyhow::Result<Option<SerializedPayload>> {
        let state = self.enter(Operation::FetchBestSolution)?;
        Ok(state
            .best_solutions
            .get(instance)
            .or(state.default_best_solution.as_ref())
            .cloned())
    }
}
