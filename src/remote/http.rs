//! REST client of the hosted benchmarking service.
//!
//! Every request carries `Authorization: ApiKey <key>`. Endpoints:
//!
//! - `GET  /api/environments?name=<name>`: authentication and lookup by name
//! - `POST /api/environments/`, `PUT /api/environments/<id>/`: registration
//! - `POST /api/instances/`, `POST /api/solutions/`: uploads
//! - `GET  /api/instances/<id>/best_solution/`: best known solution

use std::{sync::RwLock, time::Duration};

use anyhow::{bail, Context};
use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{EnvironmentId, InstanceId, RemoteService, SolutionId};
use crate::{
    configuration::Credentials,
    environment::Environment,
    serializer::{Encoding, SerializedPayload},
};

/// Default address of the service.
pub const DEFAULT_URL: &str = "http://localhost:8000";

/// Blocking HTTP implementation of [`RemoteService`].
#[derive(Debug)]
pub struct HttpService {
    client: Client,
    base_url: String,
    credentials: RwLock<Credentials>,
}

#[derive(Serialize)]
struct EnvironmentBody<'a> {
    name: &'a str,
    code: &'a str,
    python_version: &'a str,
    requirements: &'a str,
    algorithm_function_name: &'a str,
    feasibility_function_name: &'a str,
    score_function_name: &'a str,
    is_minimization: bool,
    active: bool,
}

#[derive(Serialize)]
struct UploadBody<'a> {
    content: &'a str,
    data_type: Encoding,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<&'a EnvironmentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instance: Option<&'a InstanceId>,
}

#[derive(Deserialize)]
struct Created {
    id: Value,
}

#[derive(Deserialize)]
struct WireSolution {
    content: String,
    data_type: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BestSolution {
    One(WireSolution),
    Many(Vec<WireSolution>),
    Other(Value),
}

/// Ids are integers or strings depending on the server version.
fn id_to_string(id: Value) -> String {
    match id {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

impl HttpService {
    /// Client of the service at `base_url`, with a 30 s request timeout.
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("cannot build http client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            credentials: RwLock::new(Credentials::default()),
        })
    }

    /// Client of the service at `ALGOBENCH_URL`, or [`DEFAULT_URL`].
    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(std::env::var("ALGOBENCH_URL").unwrap_or_else(|_| DEFAULT_URL.to_owned()))
    }

    fn credentials(&self) -> Credentials {
        self.credentials
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(
            "Authorization",
            format!("ApiKey {}", self.credentials().api_key()),
        )
    }

    fn find_environment(&self, name: &str) -> anyhow::Result<Option<EnvironmentId>> {
        let response = self
            .authorized(self.client.get(format!("{}/api/environments", self.base_url)))
            .query(&[("name", name)])
            .send()?;
        if response.status() != StatusCode::OK {
            bail!("environment lookup failed: {}", describe(response));
        }
        let environments: Vec<Value> = response.json()?;
        Ok(environments
            .into_iter()
            .find(|e| e.get("name").and_then(Value::as_str) == Some(name))
            .and_then(|mut e| e.get_mut("id").map(Value::take))
            .map(|id| EnvironmentId(id_to_string(id))))
    }

    fn upload(&self, endpoint: &str, body: &UploadBody<'_>) -> anyhow::Result<Option<String>> {
        let response = self
            .authorized(
                self.client
                    .post(format!("{}/api/{endpoint}/", self.base_url)),
            )
            .json(body)
            .send()?;
        if response.status() != StatusCode::CREATED {
            warn!("{endpoint} upload failed. {}", describe(response));
            return Ok(None);
        }
        let created: Created = response.json()?;
        Ok(Some(id_to_string(created.id)))
    }
}

fn describe(response: Response) -> String {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    format!("status {status}: {body}")
}

impl RemoteService for HttpService {
    fn authenticate(&self, credentials: &Credentials) -> anyhow::Result<bool> {
        if credentials.api_key().is_empty() {
            return Ok(false);
        }
        match self.credentials.write() {
            Ok(mut guard) => *guard = credentials.clone(),
            Err(poisoned) => *poisoned.into_inner() = credentials.clone(),
        }
        let response = self
            .authorized(self.client.get(format!("{}/api/environments", self.base_url)))
            .query(&[("name", credentials.env_name())])
            .send()?;
        Ok(response.status() == StatusCode::OK)
    }

    #[instrument(skip_all, fields(name = %environment.name))]
    fn register_environment(&self, environment: &Environment) -> anyhow::Result<EnvironmentId> {
        let body = EnvironmentBody {
            name: &environment.name,
            code: &environment.source_code,
            python_version: &environment.runtime_version,
            requirements: &environment.dependency_manifest,
            algorithm_function_name: &environment.algorithm_function_name,
            feasibility_function_name: &environment.feasibility_function_name,
            score_function_name: &environment.score_function_name,
            is_minimization: environment.is_minimization,
            active: environment.active,
        };

        if let Some(id) = self.find_environment(&environment.name)? {
            let response = self
                .authorized(
                    self.client
                        .put(format!("{}/api/environments/{id}/", self.base_url)),
                )
                .json(&body)
                .send()?;
            if response.status() == StatusCode::OK {
                info!("environment updated");
            } else {
                warn!("environment update failed, keeping {id}. {}", describe(response));
            }
            return Ok(id);
        }

        let response = self
            .authorized(
                self.client
                    .post(format!("{}/api/environments/", self.base_url)),
            )
            .json(&body)
            .send()?;
        if response.status() != StatusCode::CREATED {
            bail!("environment upload failed: {}", describe(response));
        }
        let created: Created = response.json()?;
        info!("environment uploaded");
        Ok(EnvironmentId(id_to_string(created.id)))
    }

    fn upload_instance(
        &self,
        payload: &SerializedPayload,
        environment: Option<&EnvironmentId>,
    ) -> anyhow::Result<Option<InstanceId>> {
        let body = UploadBody {
            content: &payload.content,
            data_type: payload.encoding,
            environment,
            instance: None,
        };
        Ok(self.upload("instances", &body)?.map(InstanceId))
    }

    fn upload_solution(
        &self,
        payload: &SerializedPayload,
        instance: &InstanceId,
    ) -> anyhow::Result<Option<SolutionId>> {
        let body = UploadBody {
            content: &payload.content,
            data_type: payload.encoding,
            environment: None,
            instance: Some(instance),
        };
        Ok(self.upload("solutions", &body)?.map(SolutionId))
    }

    fn fetch_best_solution(
        &self,
        instance: &InstanceId,
    ) -> anyhow::Result<Option<SerializedPayload>> {
        let response = self
            .authorized(self.client.get(format!(
                "{}/api/instances/{instance}/best_solution/",
                self.base_url
            )))
            .send()?;
        if response.status() != StatusCode::OK {
            warn!("solution pull failed. {}", describe(response));
            return Ok(None);
        }

        let solution = match response.json::<BestSolution>()? {
            BestSolution::One(solution) => Some(solution),
            BestSolution::Many(solutions) => solutions.into_iter().next(),
            BestSolution::Other(data) => {
                warn!("no solution in response for instance {instance}: {data}");
                None
            }
        };
        let Some(solution) = solution else {
            return Ok(None);
        };
        let encoding = solution
            .data_type
            .parse::<Encoding>()
            .with_context(|| format!("best solution of instance {instance}"))?;
        Ok(Some(SerializedPayload {
            content: solution.content,
            encoding,
        }))
    }
}
