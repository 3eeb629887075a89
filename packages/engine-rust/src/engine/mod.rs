//! Batch execution engine.
//!
//! A run moves every operation through the same stages:
//!
//! 1. **Pre-flight** (`crate::validation`): structural and schema checks
//! 2. **Grouping** (`grouper`): partition by `(action, target_type)`
//! 3. **Execution** (`executor`): chunked bulk calls, groups joined concurrently
//! 4. **Fallback** (`fallback`): recovery of failed chunks
//! 5. **Aggregation** (`aggregate`): fold into the caller's report

pub mod aggregate;
pub mod executor;
pub mod fallback;
pub mod grouper;

use std::sync::Arc;
use std::time::Duration;

use batchwise_core::{
    BatchReport, BatchRequest, FallbackStrategy, IntakeError, Operation, Validator,
};
use futures_util::future::join_all;
use tracing::{info, info_span, Instrument};

pub use aggregate::aggregate;
pub use executor::{BatchExecutor, ChunkSubmitter, GroupRun};
pub use fallback::FallbackController;
pub use grouper::{Entry, Group, GroupKey};

use crate::config::EngineConfig;
use crate::service::{StoreClient, StoreRegistry};
use crate::validation::preflight;

/// Final operations of a run, in input order.
#[derive(Debug)]
pub struct EngineRun {
    pub operations: Vec<Operation>,
    /// Strategy applied, present only when a fallback fired in some group.
    pub fallback_used: Option<FallbackStrategy>,
}

impl EngineRun {
    #[must_use]
    pub fn report(&self) -> BatchReport {
        aggregate(&self.operations, self.fallback_used)
    }
}

/// Entry point for batch runs.
///
/// Holds the store registry, the shared call pipeline, the default
/// configuration, and an optional validator. One engine serves any number
/// of sequential runs; calls from all runs share its in-flight cap.
pub struct BatchEngine {
    registry: Arc<StoreRegistry>,
    client: StoreClient,
    config: EngineConfig,
    validator: Option<Arc<dyn Validator>>,
}

impl BatchEngine {
    #[must_use]
    pub fn new(registry: Arc<StoreRegistry>, config: EngineConfig) -> Self {
        let client = StoreClient::new(registry.clone(), &config);
        Self {
            registry,
            client,
            config,
            validator: None,
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    /// Run `operations` with the engine's default configuration.
    pub async fn execute(&self, operations: Vec<Operation>) -> BatchReport {
        self.run(operations, &self.config).await.report()
    }

    /// Run a decoded request; its options override the engine defaults.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError`] when the request holds no operations or
    /// repeats an operation id.
    pub async fn execute_request(&self, request: BatchRequest) -> Result<BatchReport, IntakeError> {
        let (operations, options) = request.into_parts()?;
        let config = self.config.with_request(&options);
        Ok(self.run(operations, &config).await.report())
    }

    /// Decode and run a JSON request.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError`] when the request cannot be decoded, holds
    /// no operations or repeats an operation id. Failures of individual
    /// operations are part of the report, not errors.
    pub async fn execute_json(&self, json: &str) -> Result<BatchReport, IntakeError> {
        self.execute_request(BatchRequest::from_json(json)?).await
    }

    /// Drive every operation to a terminal state.
    pub async fn run(&self, operations: Vec<Operation>, config: &EngineConfig) -> EngineRun {
        let span = info_span!(
            "batch_run",
            operations = operations.len(),
            strategy = config.fallback_strategy.as_str(),
        );
        self.run_inner(operations, config).instrument(span).await
    }

    async fn run_inner(&self, operations: Vec<Operation>, config: &EngineConfig) -> EngineRun {
        let validator = if config.auto_validate {
            self.validator.as_deref()
        } else {
            None
        };

        let mut finished = Vec::with_capacity(operations.len());
        let mut submittable = Vec::with_capacity(operations.len());
        for (position, mut op) in operations.into_iter().enumerate() {
            if preflight(&mut op, validator) {
                submittable.push(Entry::new(position, op));
            } else {
                finished.push(Entry::new(position, op));
            }
        }

        let groups = grouper::group(submittable);
        info!(
            groups = groups.len(),
            rejected = finished.len(),
            "executing batch"
        );

        let runs = join_all(groups.into_iter().map(|group| self.run_group(group, config))).await;

        let mut fired = false;
        for run in runs {
            fired |= run.fallback_fired;
            finished.extend(run.entries);
        }
        finished.sort_by_key(|entry| entry.position);

        EngineRun {
            operations: finished.into_iter().map(|entry| entry.op).collect(),
            fallback_used: fired.then_some(config.fallback_strategy),
        }
    }

    async fn run_group(&self, group: Group, config: &EngineConfig) -> GroupRun {
        let budget = self.client.concurrency_budget(&group.key.target_type);
        let workers = config.chunk_workers.min(budget).max(1);
        let submitter = ChunkSubmitter::new(self.client.clone(), group.key.clone());
        let fallback = config.retry_failed.then(|| {
            FallbackController::new(
                config.fallback_strategy,
                submitter.clone(),
                workers,
                Duration::from_millis(config.retry_backoff_ms),
            )
        });

        BatchExecutor::new(submitter, config.effective_batch_size(), workers, fallback)
            .run(group)
            .await
    }
}
