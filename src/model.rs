//! Data model: TTP input records, per-question work items and emitted question records

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::deserializers::{
    de_option_string_forgiving, de_string_forgiving, de_vec_or_null, json_kind,
};
use crate::error::{QuizError, Result};

/// The three levels of the TTP taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Tactic,
    Technique,
    Procedure,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Tactic => "tactic",
            EntityKind::Technique => "technique",
            EntityKind::Procedure => "procedure",
        }
    }

    /// Case-insensitive parse of a declared `type` value
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tactic" => Some(EntityKind::Tactic),
            "technique" => Some(EntityKind::Technique),
            "procedure" => Some(EntityKind::Procedure),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of the TTP knowledge base, as exported.
///
/// Unknown fields (`createdAt`, `updatedAt`, ...) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TtpRecord {
    #[serde(default, deserialize_with = "de_option_string_forgiving")]
    pub id: Option<String>,
    #[serde(
        default,
        rename = "mitreId",
        deserialize_with = "de_option_string_forgiving",
        skip_serializing_if = "Option::is_none"
    )]
    pub mitre_id: Option<String>,
    #[serde(default, deserialize_with = "de_string_forgiving")]
    pub title: String,
    #[serde(default, rename = "type", deserialize_with = "de_option_string_forgiving")]
    pub declared_type: Option<String>,
    #[serde(default, deserialize_with = "de_string_forgiving")]
    pub description: String,
    #[serde(default, rename = "technique", deserialize_with = "de_vec_or_null")]
    pub children: Vec<TtpRecord>,
}

impl TtpRecord {
    /// Interpret a raw JSON value as a TTP record.
    ///
    /// Fails with [`QuizError::InputShape`] when the value is not an object or its
    /// fields cannot be read as text.
    pub fn from_value(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(QuizError::input_shape(format!(
                "expected a TTP record object, found {}",
                json_kind(value)
            )));
        }
        TtpRecord::deserialize(value)
            .map_err(|e| QuizError::input_shape(format!("unreadable TTP record: {e}")))
    }

    /// `id`, falling back to the MITRE identifier, or empty
    pub fn identifier(&self) -> String {
        self.id
            .clone()
            .or_else(|| self.mitre_id.clone())
            .unwrap_or_default()
    }
}

/// Kinds a work item can carry; tactics are always expanded into their techniques
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Technique,
    Procedure,
}

impl From<ItemKind> for EntityKind {
    fn from(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Technique => EntityKind::Technique,
            ItemKind::Procedure => EntityKind::Procedure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParentTactic {
    pub id: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechniqueRef {
    pub id: String,
    pub title: String,
    pub description: String,
}

/// The normalized per-question-generation unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkItem {
    pub entity_id: String,
    pub entity_title: String,
    pub entity_kind: ItemKind,
    pub entity_description: String,
    /// Present when the technique was drawn from a tactic's children
    pub parent_tactic: Option<ParentTactic>,
    /// Populated for procedures only
    pub associated_techniques: Vec<TechniqueRef>,
    /// Nested entries of a standalone technique, kept as auxiliary context
    pub sub_techniques: Vec<TtpRecord>,
}

/// Question style requested from the generation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub enum QuestionType {
    FactualRecall,
    ScenarioBased,
    Diagnostic,
}

impl QuestionType {
    pub fn label(&self) -> &'static str {
        match self {
            QuestionType::FactualRecall => "Factual Recall",
            QuestionType::ScenarioBased => "Scenario-Based",
            QuestionType::Diagnostic => "Diagnostic",
        }
    }

    /// Accepts the canonical labels with or without a trailing "MCQ", any case
    pub fn parse_label(value: &str) -> Option<Self> {
        let lower = value.trim().to_ascii_lowercase();
        let base = lower.strip_suffix("mcq").unwrap_or(&lower).trim();
        match base {
            "factual recall" => Some(QuestionType::FactualRecall),
            "scenario-based" | "scenario based" => Some(QuestionType::ScenarioBased),
            "diagnostic" => Some(QuestionType::Diagnostic),
            _ => None,
        }
    }
}

impl TryFrom<String> for QuestionType {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        QuestionType::parse_label(&value).ok_or_else(|| format!("unknown question_type '{value}'"))
    }
}

impl Serialize for QuestionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The pipeline's output unit. `correct_answer` always names a key of `options`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedQuestionRecord")]
pub struct QuestionRecord {
    pub entity_id: String,
    pub entity_title: String,
    pub entity_kind: EntityKind,
    pub question_type: QuestionType,
    pub question: String,
    pub options: BTreeMap<String, String>,
    pub correct_answer: String,
    pub explanation: String,
}

#[derive(Deserialize)]
struct UncheckedQuestionRecord {
    entity_id: String,
    entity_title: String,
    entity_kind: EntityKind,
    question_type: QuestionType,
    question: String,
    options: BTreeMap<String, String>,
    correct_answer: String,
    explanation: String,
}

impl TryFrom<UncheckedQuestionRecord> for QuestionRecord {
    type Error = QuizError;

    fn try_from(raw: UncheckedQuestionRecord) -> Result<Self> {
        QuestionRecord::new(
            raw.entity_id,
            raw.entity_title,
            raw.entity_kind,
            raw.question_type,
            raw.question,
            raw.options,
            raw.correct_answer,
            raw.explanation,
        )
    }
}

impl QuestionRecord {
    /// Build a record, rejecting a `correct_answer` that is not an option key
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entity_id: String,
        entity_title: String,
        entity_kind: EntityKind,
        question_type: QuestionType,
        question: String,
        options: BTreeMap<String, String>,
        correct_answer: String,
        explanation: String,
    ) -> Result<Self> {
        if !options.contains_key(&correct_answer) {
            return Err(QuizError::parse(format!(
                "correct_answer '{}' is not one of the option labels [{}]",
                correct_answer,
                options.keys().cloned().collect::<Vec<_>>().join(", ")
            )));
        }
        Ok(Self {
            entity_id,
            entity_title,
            entity_kind,
            question_type,
            question,
            options,
            correct_answer,
            explanation,
        })
    }
}
