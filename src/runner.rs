use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::aggregate::{Aggregates, Aggregator};
use crate::config::{Config, JudgeMapping};
use crate::error::{ErrorKind, JudgeError, JudgeResult};
use crate::evaluation::{JudgeClient, JudgeRegistry, ScoringRequest};
use crate::judge;
use crate::models::{Dimension, EvaluationRecord, Example, Report, Score, SkippedEntry, Stage};
use crate::retry::RetryExecutor;

/// Shared, read-only state every scoring task needs
struct ScoringContext {
    mapping: JudgeMapping,
    judges: JudgeRegistry,
    executor: RetryExecutor,
}

/// Why an example stopped before producing a record
#[derive(Debug)]
struct ExampleFailure {
    stage: Stage,
    error: JudgeError,
}

/// Records and failures produced by one scoring pass
#[derive(Debug)]
pub struct RunOutcome {
    pub records: Vec<EvaluationRecord>,
    pub failed: Vec<SkippedEntry>,
    pub aggregates: Aggregates,
}

impl RunOutcome {
    /// Combine with the loader's validation skips into the final report
    pub fn into_report(self, mut skipped: Vec<SkippedEntry>) -> Report {
        skipped.extend(self.failed);
        Report {
            results: self.records,
            skipped,
            aggregates: self.aggregates,
        }
    }
}

/// Orchestrates judge routing, scoring and aggregation for a batch of examples
pub struct Runner {
    context: Arc<ScoringContext>,
    semaphore: Arc<Semaphore>,
}

impl Runner {
    /// Create a runner; at most `concurrency` examples are scored at once
    pub fn new(
        mapping: JudgeMapping,
        judges: JudgeRegistry,
        executor: RetryExecutor,
        concurrency: usize,
    ) -> Self {
        tracing::debug!(
            concurrency,
            max_attempts = executor.policy().max_attempts,
            "runner configured"
        );
        Self {
            context: Arc::new(ScoringContext {
                mapping,
                judges,
                executor,
            }),
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Create a runner with judge clients and retry policy taken from the config
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.mapping.clone(),
            JudgeRegistry::from_config(config),
            RetryExecutor::new(config.retry.policy()),
            config.concurrency,
        )
    }

    /// Score every example. Never fails as a whole: each example ends up either
    /// as a record or as a failed entry, in input order.
    pub async fn run(&self, examples: Vec<Example>) -> RunOutcome {
        let total = examples.len();
        let mut handles = Vec::with_capacity(total);

        for example in examples {
            let id = example.id.clone();
            let context = Arc::clone(&self.context);
            let semaphore = Arc::clone(&self.semaphore);

            let handle = tokio::spawn(async move {
                // the semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                evaluate_example(&context, &example).await
            });
            handles.push((id, handle));
        }

        let mut aggregator = Aggregator::new();
        let mut records = Vec::new();
        let mut failed = Vec::new();

        for (position, (id, handle)) in handles.into_iter().enumerate() {
            let progress = position + 1;
            match handle.await {
                Ok(Ok(record)) => {
                    tracing::info!(
                        id = %id,
                        progress,
                        total,
                        relevance = record.relevance.value(),
                        tone = record.tone.value(),
                        "example scored"
                    );
                    aggregator.update(&record);
                    records.push(record);
                }
                Ok(Err(failure)) => {
                    tracing::warn!(
                        id = %id,
                        progress,
                        total,
                        stage = %failure.stage,
                        error = %failure.error,
                        "example failed"
                    );
                    failed.push(SkippedEntry::Failed {
                        id,
                        stage: failure.stage,
                        error_kind: failure.error.kind(),
                        reason: failure.error.to_string(),
                    });
                }
                Err(join_error) => {
                    tracing::error!(id = %id, progress, total, error = %join_error, "scoring task aborted");
                    failed.push(SkippedEntry::Failed {
                        id,
                        stage: Stage::Pending,
                        error_kind: ErrorKind::Internal,
                        reason: format!("scoring task aborted: {}", join_error),
                    });
                }
            }
        }

        RunOutcome {
            records,
            failed,
            aggregates: aggregator.into_aggregates(),
        }
    }
}

/// Drive one example through resolve -> relevance -> tone
async fn evaluate_example(
    context: &ScoringContext,
    example: &Example,
) -> Result<EvaluationRecord, ExampleFailure> {
    let failed_at = |stage: Stage| move |error: JudgeError| ExampleFailure { stage, error };

    let judge = judge::resolve(&example.model, &context.mapping).map_err(failed_at(Stage::Pending))?;
    let client = context
        .judges
        .get(judge.provider)
        .map_err(failed_at(Stage::Pending))?;
    tracing::debug!(
        id = %example.id,
        judge_provider = %judge.provider,
        judge_model = %judge.model,
        "judge resolved"
    );

    let relevance = score_dimension(context, &**client, &judge.model, example, Dimension::Relevance)
        .await
        .map_err(failed_at(Stage::JudgeResolved))?;

    let tone = score_dimension(context, &**client, &judge.model, example, Dimension::Tone)
        .await
        .map_err(failed_at(Stage::RelevanceScored))?;
    tracing::debug!(id = %example.id, stage = %Stage::ToneScored, "both dimensions scored");

    Ok(EvaluationRecord {
        id: example.id.clone(),
        model: example.model.clone(),
        prompt_version: example.prompt_version.clone(),
        relevance,
        tone,
    })
}

async fn score_dimension(
    context: &ScoringContext,
    client: &dyn JudgeClient,
    judge_model: &str,
    example: &Example,
    dimension: Dimension,
) -> JudgeResult<Score> {
    let request = ScoringRequest {
        ticket: &example.ticket,
        response: &example.response,
        dimension,
    };
    let request = &request;

    context
        .executor
        .execute(move || client.score(judge_model, request))
        .await
}
