use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::{StepStatus, StepTrace};
use crate::pipeline::step::{StepContext, StepDescriptor, StepRegistry};

/// A named, ordered list of steps executed against a shared context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    pub description: String,
    pub steps: Vec<StepDescriptor>,
}

/// What one execution produced: the final context, the per-step trace, and
/// the failure message if a step halted the run.
#[derive(Debug)]
pub struct ExecutionReport {
    pub context: StepContext,
    pub trace: Vec<StepTrace>,
    pub error: Option<String>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps: Vec::new(),
        }
    }

    pub fn add_step(mut self, step: StepDescriptor) -> Self {
        self.steps.push(step);
        self
    }

    /// Runs steps strictly in order on one context seeded from `params`.
    /// Each step's returned map merges into the context before the next step
    /// runs. The first error halts the run; there is no retry and no
    /// rollback of earlier steps' side effects.
    pub async fn execute(&self, registry: &StepRegistry, params: StepContext) -> ExecutionReport {
        let mut ctx = params;
        let mut trace = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let Some(executor) = registry.resolve(&step.kind) else {
                let message = format!("no executor registered for step kind '{}'", step.kind);
                error!("Error in step {} of pipeline {}: {}", step.kind, self.name, message);
                trace.push(StepTrace {
                    name: step.kind.clone(),
                    status: StepStatus::Error,
                    duration_secs: 0.0,
                    error: Some(message.clone()),
                });
                return ExecutionReport {
                    context: ctx,
                    trace,
                    error: Some(AppError::step(&step.kind, message).to_string()),
                };
            };

            info!("Executing step {} in pipeline {}", step.kind, self.name);
            let started = Instant::now();

            match executor.execute(&step.params, ctx.clone()).await {
                Ok(output) => {
                    for (key, value) in output {
                        ctx.insert(key, value);
                    }
                    trace.push(StepTrace {
                        name: step.kind.clone(),
                        status: StepStatus::Success,
                        duration_secs: started.elapsed().as_secs_f64(),
                        error: None,
                    });
                }
                Err(e) => {
                    error!("Error in step {} of pipeline {}: {}", step.kind, self.name, e);
                    let message = e.to_string();
                    trace.push(StepTrace {
                        name: step.kind.clone(),
                        status: StepStatus::Error,
                        duration_secs: started.elapsed().as_secs_f64(),
                        error: Some(message.clone()),
                    });
                    return ExecutionReport {
                        context: ctx,
                        trace,
                        error: Some(AppError::step(&step.kind, message).to_string()),
                    };
                }
            }
        }

        ExecutionReport {
            context: ctx,
            trace,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::step::StepExecutor;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct PutValue {
        key: &'static str,
        value: Value,
    }

    #[async_trait]
    impl StepExecutor for PutValue {
        async fn execute(
            &self,
            _params: &crate::models::JsonObject,
            mut ctx: StepContext,
        ) -> Result<StepContext, AppError> {
            ctx.insert(self.key.to_string(), self.value.clone());
            Ok(ctx)
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl StepExecutor for AlwaysFails {
        async fn execute(
            &self,
            _params: &crate::models::JsonObject,
            _ctx: StepContext,
        ) -> Result<StepContext, AppError> {
            Err(AppError::External("provider unreachable".into()))
        }
    }

    fn registry() -> StepRegistry {
        let registry = StepRegistry::new();
        registry.register(
            "put_a",
            Arc::new(PutValue {
                key: "a",
                value: json!(1),
            }),
        );
        registry.register(
            "put_b",
            Arc::new(PutValue {
                key: "b",
                value: json!(2),
            }),
        );
        registry.register("boom", Arc::new(AlwaysFails));
        registry
    }

    #[tokio::test]
    async fn merges_step_output_into_context_in_order() {
        let registry = registry();
        let pipeline = Pipeline::new("demo", "")
            .add_step(StepDescriptor::new("put_a"))
            .add_step(StepDescriptor::new("put_b"));

        let mut params = StepContext::new();
        params.insert("seed".into(), json!("x"));

        let report = pipeline.execute(&registry, params).await;
        assert!(report.error.is_none());
        assert_eq!(report.trace.len(), 2);
        assert!(report
            .trace
            .iter()
            .all(|t| t.status == StepStatus::Success));
        assert_eq!(report.context["seed"], json!("x"));
        assert_eq!(report.context["a"], json!(1));
        assert_eq!(report.context["b"], json!(2));
    }

    #[tokio::test]
    async fn halts_on_first_error_without_running_later_steps() {
        let registry = registry();
        let pipeline = Pipeline::new("demo", "")
            .add_step(StepDescriptor::new("boom"))
            .add_step(StepDescriptor::new("put_a"));

        let report = pipeline.execute(&registry, StepContext::new()).await;
        assert!(report.error.is_some());
        assert_eq!(report.trace.len(), 1);
        assert_eq!(report.trace[0].status, StepStatus::Error);
        assert!(!report.context.contains_key("a"));
    }

    #[tokio::test]
    async fn unregistered_step_kind_fails_the_run() {
        let registry = registry();
        let pipeline = Pipeline::new("demo", "").add_step(StepDescriptor::new("missing"));

        let report = pipeline.execute(&registry, StepContext::new()).await;
        assert!(report.error.unwrap().contains("missing"));
        assert_eq!(report.trace.len(), 1);
        assert_eq!(report.trace[0].status, StepStatus::Error);
    }
}
