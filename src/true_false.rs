//! True/False question batches built from chunks of procedure records

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::TrueFalseConfig;
use crate::error::{QuizError, Result};
use crate::invoker::{GenerationInvoker, GenerationSettings};
use crate::prompts::{PayloadShape, TemplateId, render};
use crate::response_parser::extract_json_payload;
use crate::throttle::Throttle;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(?:json)?").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrueFalseOptions {
    #[serde(rename = "T")]
    pub t: String,
    #[serde(rename = "F")]
    pub f: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrueFalseAnswer {
    T,
    F,
}

/// One T/F question with a justification for each option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrueFalseQuestion {
    pub question: String,
    pub options: TrueFalseOptions,
    pub correct_answer: TrueFalseAnswer,
    #[serde(alias = "Explanation")]
    pub explanation: TrueFalseOptions,
    #[serde(default)]
    pub source_procedures: Vec<String>,
}

/// Result of one chunk file
#[derive(Debug)]
pub struct ChunkOutcome {
    pub path: PathBuf,
    pub result: Result<Vec<TrueFalseQuestion>>,
}

pub struct TrueFalseGenerator {
    invoker: GenerationInvoker,
    settings: GenerationSettings,
    max_questions: usize,
    throttle: Throttle,
}

impl TrueFalseGenerator {
    pub fn new(invoker: GenerationInvoker, config: &TrueFalseConfig, throttle: Throttle) -> Self {
        Self {
            invoker,
            settings: GenerationSettings {
                model: config.model.clone(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
            },
            max_questions: config.max_questions,
            throttle,
        }
    }

    /// Instructions and dataset sent as a single user message
    pub fn build_request(&self, chunk: &Value) -> Result<String> {
        let template = TemplateId::TrueFalse.template();
        let max = self.max_questions.to_string();
        let instructions = render(template.instructions, &[("max_questions", &max)]);
        let dataset = serde_json::to_string_pretty(chunk)?;
        let frame = render(template.user_frame, &[("dataset", &dataset)]);
        Ok(format!("{}\n\n{}", instructions.trim_end(), frame))
    }

    /// One request for the whole chunk
    pub async fn generate(&self, chunk: &Value) -> Result<Vec<TrueFalseQuestion>> {
        if !chunk.is_array() {
            return Err(QuizError::input_shape("true/false chunk must be a JSON array"));
        }
        let user_content = self.build_request(chunk)?;

        self.throttle.ready().await;
        let raw = self.invoker.invoke("", &user_content, &self.settings).await?;

        let mut questions = parse_true_false(&raw)?;
        if questions.len() > self.max_questions {
            tracing::warn!(
                "Reply held {} questions, keeping the first {}",
                questions.len(),
                self.max_questions
            );
            questions.truncate(self.max_questions);
        }
        Ok(questions)
    }

    /// Chunks are processed in order; a failed chunk does not stop the rest
    pub async fn generate_chunks(&self, paths: &[PathBuf]) -> Vec<ChunkOutcome> {
        let mut outcomes = Vec::with_capacity(paths.len());
        for (i, path) in paths.iter().enumerate() {
            tracing::info!("Chunk {}/{}: {}", i + 1, paths.len(), path.display());
            let result = match read_chunk(path) {
                Ok(chunk) => self.generate(&chunk).await,
                Err(e) => Err(e),
            };
            match &result {
                Ok(qs) => tracing::info!("Chunk {} produced {} question(s)", path.display(), qs.len()),
                Err(e) => tracing::warn!("Chunk {} failed: {}", path.display(), e),
            }
            outcomes.push(ChunkOutcome {
                path: path.clone(),
                result,
            });
        }
        outcomes
    }
}

fn read_chunk(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path).map_err(|e| QuizError::InputShape {
        message: format!("cannot read {}: {e}", path.display()),
    })?;
    serde_json::from_str(&text).map_err(|e| QuizError::InputShape {
        message: format!("{} is not valid JSON: {e}", path.display()),
    })
}

/// Strip code fences, slice the array and validate every element
pub fn parse_true_false(raw: &str) -> Result<Vec<TrueFalseQuestion>> {
    let cleaned = CODE_FENCE.replace_all(raw, "");
    let payload = extract_json_payload(&cleaned, PayloadShape::Array)?;
    let items: Vec<Value> = serde_json::from_str(payload)
        .map_err(|e| QuizError::parse(format!("payload is not a JSON array: {e}")))?;

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            let q: TrueFalseQuestion = serde_json::from_value(item)
                .map_err(|e| QuizError::parse(format!("question {}: {e}", idx + 1)))?;
            if q.question.trim().is_empty() {
                return Err(QuizError::parse(format!("question {}: empty statement", idx + 1)));
            }
            Ok(q)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r#"```json
[
  {
    "question": "Injecting frames on the OBD-II port can disable adaptive cruise control.",
    "options": {"T": "True", "F": "False"},
    "correct_answer": "T",
    "Explanation": {"T": "stated in ATM-P0034", "F": "contradicts ATM-P0034"},
    "source_procedures": ["ATM-P0034"]
  }
]
```"#;

    #[test]
    fn parses_fenced_reply_with_capitalised_explanation() {
        let qs = parse_true_false(REPLY).unwrap();
        assert_eq!(qs.len(), 1);
        assert_eq!(qs[0].correct_answer, TrueFalseAnswer::T);
        assert_eq!(qs[0].explanation.f, "contradicts ATM-P0034");
        assert_eq!(qs[0].source_procedures, vec!["ATM-P0034".to_string()]);
    }

    #[test]
    fn rejects_answer_outside_t_f() {
        let raw = r#"[{"question":"x","options":{"T":"True","F":"False"},"correct_answer":"A","explanation":{"T":"a","F":"b"}}]"#;
        assert!(matches!(parse_true_false(raw), Err(QuizError::Parse { .. })));
    }

    #[test]
    fn rejects_reply_without_array() {
        assert!(parse_true_false("no questions today").is_err());
    }

    #[test]
    fn serialises_lowercase_explanation_key() {
        let q = &parse_true_false(REPLY).unwrap()[0];
        let v = serde_json::to_value(q).unwrap();
        assert!(v.get("explanation").is_some());
        assert_eq!(v["options"]["T"], "True");
    }
}
