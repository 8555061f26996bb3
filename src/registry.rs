//! Job type and queue registration.
//!
//! Everything dispatchable is declared up front: job types (a stable string
//! key mapped to a typed handler) and queue definitions (name, label,
//! priority, dedup policy). The registry is built once at start-up and is
//! immutable afterwards; components receive it by `Arc` instead of reaching
//! into global state.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{JobError, Result};

pub type JobFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

type RunnerFn = Arc<dyn Fn(Value) -> JobFuture + Send + Sync>;
type ValidateFn = Arc<dyn Fn(&Value) -> Result<()> + Send + Sync>;

/// A registered job type: name, display label, and the type-erased handler.
///
/// The handler's argument type is fixed at registration; the stored
/// validator lets `push` reject a malformed payload before it is persisted
/// instead of failing later inside the worker.
#[derive(Clone)]
pub struct JobType {
    name: String,
    label: String,
    runner: RunnerFn,
    validator: ValidateFn,
}

impl JobType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Deserialize-check a payload without running anything.
    pub fn validate(&self, kwargs: &Value) -> Result<()> {
        (*self.validator)(kwargs)
    }

    /// Build the job future for a payload. The single invocation boundary:
    /// the worker awaits this and nothing else.
    pub fn invoke(&self, kwargs: Value) -> JobFuture {
        (*self.runner)(kwargs)
    }
}

impl std::fmt::Debug for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobType")
            .field("name", &self.name)
            .field("label", &self.label)
            .finish()
    }
}

/// Declared shape of a queue, upserted into the store at start-up.
#[derive(Debug, Clone)]
pub struct QueueDefinition {
    pub name: String,
    pub label: String,
    pub priority: i32,
    pub unique_jobs: bool,
}

/// Immutable registry of job types and queue definitions.
pub struct Registry {
    job_types: HashMap<String, JobType>,
    queues: HashMap<String, QueueDefinition>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn job_type(&self, name: &str) -> Result<&JobType> {
        self.job_types
            .get(name)
            .ok_or_else(|| JobError::UnknownJobType(name.to_string()))
    }

    pub fn queue_definitions(&self) -> impl Iterator<Item = &QueueDefinition> {
        self.queues.values()
    }

    /// Display label for a queue. Labels live here, never in the store.
    pub fn queue_label(&self, name: &str) -> Option<&str> {
        self.queues.get(name).map(|q| q.label.as_str())
    }

    pub fn job_type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.job_types.keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    job_types: HashMap<String, JobType>,
    queues: HashMap<String, QueueDefinition>,
}

impl RegistryBuilder {
    /// Register a job type with a typed payload.
    ///
    /// Fails fast on a name collision so a misconfigured start-up dies
    /// before any job is accepted.
    pub fn job_type<A, F, Fut>(mut self, name: &str, label: &str, handler: F) -> Result<Self>
    where
        A: DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if self.job_types.contains_key(name) {
            return Err(JobError::DuplicateJobType(name.to_string()));
        }

        let handler = Arc::new(handler);
        let type_name = name.to_string();
        let runner: RunnerFn = Arc::new(move |kwargs: Value| -> JobFuture {
            match serde_json::from_value::<A>(kwargs) {
                Ok(args) => Box::pin((*handler)(args)),
                Err(e) => {
                    let err = JobError::InvalidPayload {
                        job_type: type_name.clone(),
                        reason: e.to_string(),
                    };
                    Box::pin(async move { Err(err) })
                }
            }
        });

        let type_name = name.to_string();
        let validator: ValidateFn = Arc::new(move |kwargs: &Value| {
            serde_json::from_value::<A>(kwargs.clone())
                .map(|_| ())
                .map_err(|e| JobError::InvalidPayload {
                    job_type: type_name.clone(),
                    reason: e.to_string(),
                })
        });

        self.job_types.insert(
            name.to_string(),
            JobType {
                name: name.to_string(),
                label: label.to_string(),
                runner,
                validator,
            },
        );
        tracing::debug!(job_type = name, "Job type registered");
        Ok(self)
    }

    /// Declare a queue. Fails fast on a name collision.
    pub fn queue(mut self, name: &str, label: &str, priority: i32, unique_jobs: bool) -> Result<Self> {
        if self.queues.contains_key(name) {
            return Err(JobError::DuplicateQueue(name.to_string()));
        }
        self.queues.insert(
            name.to_string(),
            QueueDefinition {
                name: name.to_string(),
                label: label.to_string(),
                priority,
                unique_jobs,
            },
        );
        tracing::debug!(queue = name, priority, unique_jobs, "Queue registered");
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            job_types: self.job_types,
            queues: self.queues,
        }
    }
}
