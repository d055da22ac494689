//! Ask one or more models to answer generated questions and tally the results

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::AnsweringConfig;
use crate::invoker::{GenerationInvoker, GenerationSettings};
use crate::throttle::Throttle;

const ANSWER_INSTRUCTIONS: &str = "You are answering a multiple choice question about automotive cybersecurity. Reply with ONLY the label of the correct option (for example: A). Do not explain.";

/// What a model answered for one question
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    Label(String),
    /// The reply held no letter
    Unknown,
    /// The call itself failed
    Error,
}

impl AnswerOutcome {
    /// First alphabetic character of the reply, uppercased
    pub fn from_reply(reply: &str) -> Self {
        match reply.chars().find(|c| c.is_alphabetic()) {
            Some(c) => AnswerOutcome::Label(c.to_uppercase().collect()),
            None => AnswerOutcome::Unknown,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AnswerOutcome::Label(l) => l,
            AnswerOutcome::Unknown => "UNKNOWN",
            AnswerOutcome::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModelTally {
    pub correct: usize,
    pub incorrect: usize,
    pub unknown: usize,
    pub error: usize,
}

impl ModelTally {
    pub fn accuracy(&self) -> f64 {
        let graded = self.correct + self.incorrect;
        if graded == 0 {
            0.0
        } else {
            self.correct as f64 / graded as f64
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnswerReport {
    pub questions_answered: usize,
    /// Entries without a `question` and `options` object
    pub skipped: usize,
    pub by_model: BTreeMap<String, ModelTally>,
}

pub struct QuestionAnswerer {
    invoker: GenerationInvoker,
    models: Vec<String>,
    temperature: f32,
    max_tokens: u32,
    throttle: Throttle,
}

impl QuestionAnswerer {
    pub fn new(invoker: GenerationInvoker, config: &AnsweringConfig) -> Self {
        Self {
            invoker,
            models: config.models.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            throttle: Throttle::from_cooldown_ms(config.cooldown_ms),
        }
    }

    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Ask `model` to answer `prompt`; failures become [`AnswerOutcome::Error`]
    pub async fn ask(&self, model: &str, prompt: &str) -> AnswerOutcome {
        let settings = GenerationSettings {
            model: model.to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        self.throttle.ready().await;
        match self.invoker.invoke(ANSWER_INSTRUCTIONS, prompt, &settings).await {
            Ok(reply) => AnswerOutcome::from_reply(&reply),
            Err(e) => {
                tracing::warn!("{} failed to answer: {}", model, e);
                AnswerOutcome::Error
            }
        }
    }

    /// Every model answers every question. Output keeps each entry's original fields and
    /// adds `answers: {model: label}`.
    pub async fn answer_all(&self, questions: &[Value]) -> (Vec<Value>, AnswerReport) {
        let mut report = AnswerReport::default();
        for model in &self.models {
            report.by_model.entry(model.clone()).or_default();
        }

        let mut out = Vec::with_capacity(questions.len());
        for (i, entry) in questions.iter().enumerate() {
            let Some(prompt) = question_prompt(entry) else {
                tracing::warn!("Entry {} has no question/options, passing through", i + 1);
                report.skipped += 1;
                out.push(entry.clone());
                continue;
            };
            let expected = entry
                .get("correct_answer")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_uppercase());

            let mut answers = Map::new();
            for model in &self.models {
                let outcome = self.ask(model, &prompt).await;
                let tally = report.by_model.entry(model.clone()).or_default();
                match (&outcome, &expected) {
                    (AnswerOutcome::Error, _) => tally.error += 1,
                    (AnswerOutcome::Unknown, _) => tally.unknown += 1,
                    (AnswerOutcome::Label(l), Some(exp)) if l == exp => tally.correct += 1,
                    (AnswerOutcome::Label(_), Some(_)) => tally.incorrect += 1,
                    (AnswerOutcome::Label(_), None) => {}
                }
                answers.insert(model.clone(), Value::String(outcome.as_str().to_string()));
            }

            let mut annotated = entry.clone();
            if let Value::Object(obj) = &mut annotated {
                obj.insert("answers".to_string(), Value::Object(answers));
            }
            out.push(annotated);
            report.questions_answered += 1;
            tracing::info!("Answered {}/{}", i + 1, questions.len());
        }

        (out, report)
    }
}

/// Render a question and its options as "Question: ...\nOptions:\nA: ..." text
pub fn question_prompt(entry: &Value) -> Option<String> {
    let question = entry.get("question")?.as_str()?;
    let options = entry.get("options")?.as_object()?;
    let mut text = format!("Question: {question}\n\nOptions:\n");
    for (label, option) in options {
        let option = option.as_str().map(str::to_string).unwrap_or_else(|| option.to_string());
        text.push_str(&format!("{label}: {option}\n"));
    }
    text.push_str("\nAnswer with the option label only.");
    Some(text)
}
