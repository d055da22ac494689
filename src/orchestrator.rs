//! Orchestration: records → work items → prompt → service → question records
//!
//! Work items are processed strictly one after another. A failure on one item is
//! recorded in the run summary and the run moves on to the next item.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::classifier::Classifier;
use crate::clients::CompletionClient;
use crate::config::Config;
use crate::error::{QuizError, Result};
use crate::extractor::extract;
use crate::invoker::{GenerationInvoker, GenerationSettings};
use crate::model::{EntityKind, QuestionRecord, QuestionType, TtpRecord, WorkItem};
use crate::prompts::build_prompt;
use crate::response_parser::parse_response;
use crate::throttle::Throttle;

/// Where an item failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    InputShape,
    Generation,
    Parse,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FailureStage::InputShape => "input_shape",
            FailureStage::Generation => "generation",
            FailureStage::Parse => "parse",
        })
    }
}

/// Enough detail to find the entity again and re-process it
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub record_index: usize,
    pub entity_id: String,
    pub entity_title: String,
    pub entity_kind: Option<EntityKind>,
    pub stage: FailureStage,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindTally {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Statistics for an orchestration run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub records_seen: usize,
    pub records_rejected: usize,
    pub by_kind: BTreeMap<EntityKind, KindTally>,
    pub questions_by_type: BTreeMap<QuestionType, usize>,
    /// Work items not started because the run was cancelled
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
}

impl RunSummary {
    pub fn attempted(&self) -> usize {
        self.by_kind.values().map(|t| t.attempted).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.by_kind.values().map(|t| t.succeeded).sum()
    }

    /// Work items that failed at generation or parse (rejected records excluded)
    pub fn failed(&self) -> usize {
        self.by_kind.values().map(|t| t.failed).sum()
    }

    pub fn questions(&self) -> usize {
        self.questions_by_type.values().sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub questions: Vec<QuestionRecord>,
    pub summary: RunSummary,
}

pub struct Orchestrator {
    classifier: Classifier,
    invoker: GenerationInvoker,
    settings: GenerationSettings,
    throttle: Throttle,
}

impl Orchestrator {
    pub fn new(
        invoker: GenerationInvoker,
        settings: GenerationSettings,
        classifier: Classifier,
        throttle: Throttle,
    ) -> Self {
        Self {
            classifier,
            invoker,
            settings,
            throttle,
        }
    }

    pub fn from_config(client: Arc<dyn CompletionClient>, config: &Config) -> Self {
        Self::new(
            GenerationInvoker::new(client),
            GenerationSettings::from(&config.generation),
            Classifier::new(config.classification.ambiguous_fallback),
            Throttle::from_cooldown_ms(config.scheduling.cooldown_ms),
        )
    }

    /// Process one record or an array of records to completion
    pub async fn run(&self, input: &Value) -> RunReport {
        self.run_until_cancelled(input, &CancellationToken::new())
            .await
    }

    /// Like [`Orchestrator::run`], but stops starting new work items once `cancel` fires
    pub async fn run_until_cancelled(&self, input: &Value, cancel: &CancellationToken) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id);
        self.run_inner(run_id, input, cancel).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, input: &Value, cancel: &CancellationToken) -> RunReport {
        let records: Vec<&Value> = match input {
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };
        tracing::info!("Processing {} record(s)", records.len());

        let mut summary = RunSummary {
            run_id,
            ..Default::default()
        };
        let mut questions = Vec::new();

        for (index, raw) in records.iter().enumerate() {
            summary.records_seen += 1;

            let record = match TtpRecord::from_value(raw) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Record {} rejected: {}", index + 1, e);
                    summary.records_rejected += 1;
                    summary.failures.push(ItemFailure {
                        record_index: index,
                        entity_id: raw_field(raw, "id"),
                        entity_title: raw_field(raw, "title"),
                        entity_kind: None,
                        stage: FailureStage::InputShape,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let kind = self.classifier.classify(&record);
            let items = extract(&record, kind);
            tracing::info!(
                "Record {}/{}: {} '{}' -> {} work item(s)",
                index + 1,
                records.len(),
                kind,
                record.title,
                items.len()
            );

            for item in &items {
                if cancel.is_cancelled() {
                    summary.skipped += 1;
                    continue;
                }

                let item_kind = EntityKind::from(item.entity_kind);
                summary.by_kind.entry(item_kind).or_default().attempted += 1;

                match self.process_item(item).await {
                    Ok(generated) => {
                        tracing::info!(
                            "Generated {} question(s) for {} '{}'",
                            generated.len(),
                            item_kind,
                            item.entity_title
                        );
                        summary.by_kind.entry(item_kind).or_default().succeeded += 1;
                        for q in &generated {
                            *summary.questions_by_type.entry(q.question_type).or_default() += 1;
                        }
                        questions.extend(generated);
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Failed {} '{}' ({}): {}",
                            item_kind,
                            item.entity_title,
                            item.entity_id,
                            e
                        );
                        summary.by_kind.entry(item_kind).or_default().failed += 1;
                        summary.failures.push(ItemFailure {
                            record_index: index,
                            entity_id: item.entity_id.clone(),
                            entity_title: item.entity_title.clone(),
                            entity_kind: Some(item_kind),
                            stage: stage_of(&e),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        tracing::info!(
            attempted = summary.attempted(),
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            rejected = summary.records_rejected,
            skipped = summary.skipped,
            "Run complete: {} question(s)",
            questions.len()
        );

        RunReport { questions, summary }
    }

    /// Build prompt, invoke, parse for a single work item
    pub async fn process_item(&self, item: &WorkItem) -> Result<Vec<QuestionRecord>> {
        let prompt = build_prompt(item);
        tracing::debug!(
            template = %prompt.template,
            checksum = prompt.template.template().checksum(),
            user_bytes = prompt.user_content.len(),
            "Prompt built for '{}'",
            item.entity_title
        );

        self.throttle.ready().await;
        let raw = self
            .invoker
            .invoke(prompt.system_instructions, &prompt.user_content, &self.settings)
            .await?;
        parse_response(&raw, item)
    }
}

fn stage_of(err: &QuizError) -> FailureStage {
    match err {
        e if e.is_generation() => FailureStage::Generation,
        QuizError::InputShape { .. } => FailureStage::InputShape,
        _ => FailureStage::Parse,
    }
}

fn raw_field(raw: &Value, key: &str) -> String {
    raw.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_classification() {
        assert_eq!(
            stage_of(&QuizError::Generation {
                message: "x".into()
            }),
            FailureStage::Generation
        );
        assert_eq!(
            stage_of(&QuizError::Timeout {
                operation: "x".into(),
                timeout_ms: 1
            }),
            FailureStage::Generation
        );
        assert_eq!(stage_of(&QuizError::parse("x")), FailureStage::Parse);
    }

    #[test]
    fn summary_totals_sum_over_kinds() {
        let mut summary = RunSummary::default();
        summary.by_kind.insert(
            EntityKind::Technique,
            KindTally {
                attempted: 3,
                succeeded: 2,
                failed: 1,
            },
        );
        summary.by_kind.insert(
            EntityKind::Procedure,
            KindTally {
                attempted: 1,
                succeeded: 1,
                failed: 0,
            },
        );
        assert_eq!(summary.attempted(), 4);
        assert_eq!(summary.succeeded(), 3);
        assert_eq!(summary.failed(), 1);
    }
}
