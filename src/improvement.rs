//! Replacement of a locally computed solution by a better one known to the server.
//!
//! The server solution is only returned when it is feasible according to the user's own
//! feasibility function and strictly better according to the user's own scoring function.
//! Every failure along the way, including a panic in either user function, leaves the local
//! solution in place.

use std::{
    cmp::Ordering,
    fmt::Debug,
    panic::{self, AssertUnwindSafe},
};

use anyhow::anyhow;
use tracing::{debug, info, instrument, warn};

use crate::{
    remote::{InstanceId, RemoteService},
    serializer::{self, Serializable},
};

/// Direction of the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// Lower scores are better.
    Minimize,
    /// Higher scores are better.
    Maximize,
}

impl Objective {
    /// `Minimize` when `is_minimization`, `Maximize` otherwise.
    pub fn from_minimization(is_minimization: bool) -> Self {
        if is_minimization {
            Objective::Minimize
        } else {
            Objective::Maximize
        }
    }

    /// True when `candidate` is strictly better than `incumbent`.
    ///
    /// Ties and incomparable scores (NaN) are not improvements.
    pub fn improves<Sc: PartialOrd>(&self, candidate: &Sc, incumbent: &Sc) -> bool {
        matches!(
            (self, candidate.partial_cmp(incumbent)),
            (Objective::Minimize, Some(Ordering::Less))
                | (Objective::Maximize, Some(Ordering::Greater))
        )
    }
}

/// Returns the server's best solution for `instance_id` if it beats `local`, `local`
/// otherwise. Never fails.
#[instrument(skip_all, fields(instance = %instance_id))]
pub fn improve<I, S, Sc>(
    service: &dyn RemoteService,
    instance: &I,
    instance_id: &InstanceId,
    local: S,
    feasibility: &dyn Fn(&I, &S) -> bool,
    scoring: &dyn Fn(&I, &S) -> Sc,
    objective: Objective,
) -> S
where
    S: Serializable,
    Sc: PartialOrd + Debug,
{
    match challenger(
        service,
        instance,
        instance_id,
        &local,
        feasibility,
        scoring,
        objective,
    ) {
        Ok(Some(better)) => {
            info!("replacing local solution with the server solution");
            better
        }
        Ok(None) => local,
        Err(e) => {
            warn!("solution improvement failed: {e:#}");
            local
        }
    }
}

/// The server solution, when it should replace `local`.
fn challenger<I, S, Sc>(
    service: &dyn RemoteService,
    instance: &I,
    instance_id: &InstanceId,
    local: &S,
    feasibility: &dyn Fn(&I, &S) -> bool,
    scoring: &dyn Fn(&I, &S) -> Sc,
    objective: Objective,
) -> anyhow::Result<Option<S>>
where
    S: Serializable,
    Sc: PartialOrd + Debug,
{
    let Some(payload) = service.fetch_best_solution(instance_id)? else {
        debug!("no solution on the server");
        return Ok(None);
    };

    let candidate: S = serializer::decode(&payload)?;

    if !guarded("feasibility", || feasibility(instance, &candidate))? {
        warn!("server solution is not feasible, keeping the local one");
        return Ok(None);
    }

    let local_score = guarded("scoring", || scoring(instance, local))?;
    let candidate_score = guarded("scoring", || scoring(instance, &candidate))?;
    debug!(?local_score, ?candidate_score, ?objective);

    if objective.improves(&candidate_score, &local_score) {
        Ok(Some(candidate))
    } else {
        Ok(None)
    }
}

/// Runs a user function, turning a panic into an error.
fn guarded<T>(what: &str, f: impl FnOnce() -> T) -> anyhow::Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|_| anyhow!("{what} function panicked"))
}

#[cfg(test)]
mod improvement_tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::remote::memory::{InMemoryService, Operation};
    use crate::serializer::{encode, SerializedPayload};

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    struct Route {
        cost: i64,
        valid: bool,
    }

    impl Serializable for Route {
        const JSON_MODEL: bool = true;
    }

    fn feasible(_: &(), route: &Route) -> bool {
        route.valid
    }

    fn cost(_: &(), route: &Route) -> i64 {
        route.cost
    }

    fn server_with(route: &Route) -> (InMemoryService, InstanceId) {
        let service = InMemoryService::new();
        let id = InstanceId::from("instance-1");
        service.set_best_solution(id.clone(), encode(route).unwrap());
        (service, id)
    }

    fn run(service: &InMemoryService, id: &InstanceId, local: Route, objective: Objective) -> Route {
        improve(service, &(), id, local, &feasible, &cost, objective)
    }

    #[test]
    fn lower_server_score_wins_when_minimizing() {
        let server = Route { cost: 5, valid: true };
        let local = Route { cost: 10, valid: true };
        let (service, id) = server_with(&server);

        assert_eq!(run(&service, &id, local.clone(), Objective::Minimize), server);
        assert_eq!(run(&service, &id, local.clone(), Objective::Maximize), local);
    }

    #[test]
    fn infeasible_server_solution_is_ignored() {
        let (service, id) = server_with(&Route { cost: 1, valid: false });
        let local = Route { cost: 10, valid: true };
        assert_eq!(run(&service, &id, local.clone(), Objective::Minimize), local);
    }

    #[test]
    fn ties_keep_the_local_solution() {
        let (service, id) = server_with(&Route { cost: 10, valid: true });
        let local = Route { cost: 10, valid: false };
        // identical score, the local one is kept even though it differs
        assert_eq!(run(&service, &id, local.clone(), Objective::Minimize), local);
        assert_eq!(run(&service, &id, local.clone(), Objective::Maximize), local);
    }

    #[test]
    fn missing_or_unreadable_server_solution_keeps_local() {
        let service = InMemoryService::new();
        let id = InstanceId::from("instance-1");
        let local = Route { cost: 3, valid: true };
        assert_eq!(run(&service, &id, local.clone(), Objective::Minimize), local);

        service.set_best_solution(id.clone(), SerializedPayload::json("[1, 2]"));
        assert_eq!(run(&service, &id, local.clone(), Objective::Minimize), local);

        service.fail(Operation::FetchBestSolution);
        assert_eq!(run(&service, &id, local.clone(), Objective::Minimize), local);
    }

    #[test]
    fn panicking_user_function_keeps_local() {
        let (service, id) = server_with(&Route { cost: 1, valid: true });
        let local = Route { cost: 10, valid: true };
        let exploding = |_: &(), _: &Route| -> i64 { panic!("score exploded") };

        let result = improve(
            &service,
            &(),
            &id,
            local.clone(),
            &feasible,
            &exploding,
            Objective::Minimize,
        );
        assert_eq!(result, local);
    }

    #[test]
    fn nan_scores_never_improve() {
        assert!(!Objective::Minimize.improves(&f64::NAN, &1.0));
        assert!(!Objective::Maximize.improves(&f64::NAN, &1.0));
        assert!(Objective::Maximize.improves(&2.0, &1.0));
        assert_eq!(Objective::from_minimization(true), Objective::Minimize);
    }
}
