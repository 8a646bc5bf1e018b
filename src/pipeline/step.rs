use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::errors::AppError;
use crate::models::payload::JsonObject;

/// The mutable context a pipeline execution threads through its steps.
pub type StepContext = JsonObject;

/// A serializable step reference: an executor kind plus the parameters the
/// pipeline factory baked in. Pipelines built from descriptors are plain
/// data, so they can be logged, inspected, and persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub kind: String,
    #[serde(default)]
    pub params: JsonObject,
}

impl StepDescriptor {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: JsonObject::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// One unit of pipeline work. Receives the descriptor's baked-in parameters
/// and the current context, and returns the entries to merge back in. May
/// suspend on I/O; cancellation lands at its next await point.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, params: &JsonObject, ctx: StepContext)
        -> Result<StepContext, AppError>;
}

/// Process-wide map from step kind to executor, owned by the pipeline
/// manager's composition root rather than any global.
#[derive(Default)]
pub struct StepRegistry {
    executors: RwLock<HashMap<String, Arc<dyn StepExecutor>>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: impl Into<String>, executor: Arc<dyn StepExecutor>) {
        let kind = kind.into();
        info!("Step executor '{}' registered", kind);
        self.executors.write().insert(kind, executor);
    }

    pub fn resolve(&self, kind: &str) -> Option<Arc<dyn StepExecutor>> {
        self.executors.read().get(kind).cloned()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.executors.read().keys().cloned().collect()
    }
}
