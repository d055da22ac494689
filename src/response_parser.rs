//! Reply parsing: pull the JSON payload out of free-form service text and turn it into
//! validated question records.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::deserializers::de_option_string_forgiving;
use crate::error::{QuizError, Result};
use crate::model::{ItemKind, QuestionRecord, QuestionType, WorkItem};
use crate::prompts::PayloadShape;
use crate::utils::truncate_chars;

pub const MCQ_LABELS: [&str; 4] = ["A", "B", "C", "D"];

const SNIPPET_CHARS: usize = 200;

/// Best-effort structured extraction.
///
/// Slices from the first opening bracket of the expected shape to the last matching
/// closing bracket, discarding prose and code fences around it. This is the only
/// place that guesses at payload boundaries.
pub fn extract_json_payload(raw: &str, shape: PayloadShape) -> Result<&str> {
    let (open, close) = shape.brackets();
    let start = raw.find(open);
    let end = raw.rfind(close);
    match (start, end) {
        (Some(s), Some(e)) if s < e => Ok(&raw[s..=e]),
        _ => Err(QuizError::parse(format!(
            "no '{open}...{close}' payload found in reply: {}",
            truncate_chars(raw.trim(), SNIPPET_CHARS)
        ))),
    }
}

/// One question as drafted by the service, before validation
#[derive(Debug, Deserialize)]
struct DraftQuestion {
    // Echoes are optional and sometimes come back as numbers
    #[serde(default, deserialize_with = "de_option_string_forgiving")]
    technique_id: Option<String>,
    #[serde(default, deserialize_with = "de_option_string_forgiving")]
    technique_title: Option<String>,
    #[serde(default, deserialize_with = "de_option_string_forgiving")]
    procedure_id: Option<String>,
    #[serde(default, deserialize_with = "de_option_string_forgiving")]
    procedure_title: Option<String>,
    question_type: Option<String>,
    question: Option<String>,
    options: Option<BTreeMap<String, String>>,
    correct_answer: Option<String>,
    explanation: Option<String>,
}

/// Parse a service reply for `item` into one or more question records.
///
/// Technique items expect a single JSON object, procedure items a non-empty array.
/// Any structural or schema problem fails the whole reply.
pub fn parse_response(raw: &str, item: &WorkItem) -> Result<Vec<QuestionRecord>> {
    let shape = match item.entity_kind {
        ItemKind::Technique => PayloadShape::Object,
        ItemKind::Procedure => PayloadShape::Array,
    };
    let payload = extract_json_payload(raw, shape)?;
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| QuizError::parse(format!("payload is not valid JSON: {e}")))?;

    let drafts: Vec<Value> = match (shape, value) {
        (PayloadShape::Object, v @ Value::Object(_)) => vec![v],
        (PayloadShape::Array, Value::Array(items)) => items,
        (_, other) => {
            return Err(QuizError::parse(format!(
                "expected a JSON {shape:?}, found {other}"
            )));
        }
    };
    if drafts.is_empty() {
        return Err(QuizError::parse("reply contained an empty question array"));
    }

    drafts
        .into_iter()
        .enumerate()
        .map(|(idx, draft)| {
            validate_draft(draft, item)
                .map_err(|e| QuizError::parse(format!("question {}: {}", idx + 1, inner(e))))
        })
        .collect()
}

fn inner(err: QuizError) -> String {
    match err {
        QuizError::Parse { message } => message,
        other => other.to_string(),
    }
}

fn validate_draft(value: Value, item: &WorkItem) -> Result<QuestionRecord> {
    let draft: DraftQuestion = serde_json::from_value(value)
        .map_err(|e| QuizError::parse(format!("malformed question object: {e}")))?;

    let raw_type = required(draft.question_type, "question_type")?;
    let question_type = QuestionType::parse_label(&raw_type)
        .ok_or_else(|| QuizError::parse(format!("unknown question_type '{raw_type}'")))?;
    let question = required(draft.question, "question")?;
    let options = draft
        .options
        .ok_or_else(|| QuizError::parse("missing field `options`"))?;
    let correct_answer = required(draft.correct_answer, "correct_answer")?;
    let explanation = required(draft.explanation, "explanation")?;

    check_mcq_labels(&options)?;

    let (echoed_id, echoed_title) = match item.entity_kind {
        ItemKind::Technique => (draft.technique_id, draft.technique_title),
        ItemKind::Procedure => (draft.procedure_id, draft.procedure_title),
    };

    QuestionRecord::new(
        non_blank(echoed_id).unwrap_or_else(|| item.entity_id.clone()),
        non_blank(echoed_title).unwrap_or_else(|| item.entity_title.clone()),
        item.entity_kind.into(),
        question_type,
        question,
        options,
        correct_answer,
        explanation,
    )
}

fn required(field: Option<String>, name: &str) -> Result<String> {
    non_blank(field).ok_or_else(|| QuizError::parse(format!("missing field `{name}`")))
}

fn non_blank(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.trim().is_empty())
}

fn check_mcq_labels(options: &BTreeMap<String, String>) -> Result<()> {
    let labels_ok =
        options.len() == MCQ_LABELS.len() && MCQ_LABELS.iter().all(|l| options.contains_key(*l));
    if labels_ok {
        Ok(())
    } else {
        Err(QuizError::parse(format!(
            "expected options labelled A, B, C, D; got [{}]",
            options.keys().cloned().collect::<Vec<_>>().join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityKind, ParentTactic};

    fn technique_item() -> WorkItem {
        WorkItem {
            entity_id: "ATM-T0038".into(),
            entity_title: "Network Sniffing".into(),
            entity_kind: ItemKind::Technique,
            entity_description: "sniff".into(),
            parent_tactic: Some(ParentTactic {
                id: "TA0006".into(),
                title: "Credential Access".into(),
                description: "steal".into(),
            }),
            associated_techniques: Vec::new(),
            sub_techniques: Vec::new(),
        }
    }

    fn procedure_item() -> WorkItem {
        WorkItem {
            entity_id: "ATM-P0034".into(),
            entity_title: "CAN Message Injection".into(),
            entity_kind: ItemKind::Procedure,
            entity_description: "replay".into(),
            parent_tactic: None,
            associated_techniques: Vec::new(),
            sub_techniques: Vec::new(),
        }
    }

    const FENCED: &str = "Here is the result:\n```json\n{\"technique_id\":\"X1\",\"question_type\":\"Factual Recall MCQ\",\"question\":\"Q?\",\"options\":{\"A\":\"a\",\"B\":\"b\",\"C\":\"c\",\"D\":\"d\"},\"correct_answer\":\"B\",\"explanation\":\"e\"}\n```\nDone.";

    #[test]
    fn parses_object_wrapped_in_prose_and_fences() {
        let records = parse_response(FENCED, &technique_item()).unwrap();
        assert_eq!(records.len(), 1);
        let q = &records[0];
        assert_eq!(q.entity_id, "X1");
        assert_eq!(q.correct_answer, "B");
        assert_eq!(q.question_type, QuestionType::FactualRecall);
        assert_eq!(q.entity_kind, EntityKind::Technique);
        // title was not echoed, so the work item's title is used
        assert_eq!(q.entity_title, "Network Sniffing");
    }

    #[test]
    fn reply_without_brackets_is_parse_failure() {
        let err = parse_response("I cannot help with that.", &technique_item()).unwrap_err();
        assert!(matches!(err, QuizError::Parse { .. }));
    }

    #[test]
    fn reversed_brackets_are_rejected() {
        assert!(extract_json_payload("} oops {", PayloadShape::Object).is_err());
    }

    #[test]
    fn extraction_spans_first_open_to_last_close() {
        let raw = "x [1, [2]] y ] z";
        assert_eq!(
            extract_json_payload(raw, PayloadShape::Array).unwrap(),
            "[1, [2]] y ]"
        );
    }

    #[test]
    fn dangling_correct_answer_is_rejected() {
        let raw = r#"{"question_type":"Diagnostic MCQ","question":"Q?","options":{"A":"a","B":"b","C":"c","D":"d"},"correct_answer":"E","explanation":"e"}"#;
        let err = parse_response(raw, &technique_item()).unwrap_err();
        assert!(err.to_string().contains("correct_answer 'E'"));
    }

    #[test]
    fn wrong_option_cardinality_is_rejected() {
        let raw = r#"{"question_type":"Diagnostic","question":"Q?","options":{"A":"a","B":"b","C":"c"},"correct_answer":"A","explanation":"e"}"#;
        let err = parse_response(raw, &technique_item()).unwrap_err();
        assert!(err.to_string().contains("expected options labelled A, B, C, D"));
    }

    #[test]
    fn missing_field_is_rejected() {
        let raw = r#"{"question_type":"Diagnostic","options":{"A":"a","B":"b","C":"c","D":"d"},"correct_answer":"A","explanation":"e"}"#;
        let err = parse_response(raw, &technique_item()).unwrap_err();
        assert!(err.to_string().contains("missing field `question`"));
    }

    #[test]
    fn unknown_question_type_is_rejected() {
        let raw = r#"{"question_type":"Essay","question":"Q?","options":{"A":"a","B":"b","C":"c","D":"d"},"correct_answer":"A","explanation":"e"}"#;
        assert!(parse_response(raw, &technique_item()).is_err());
    }

    #[test]
    fn procedure_reply_yields_each_question_in_order() {
        let raw = r#"Sure!
[
  {"procedure_id":"ATM-P0034","procedure_title":"CAN Message Injection","question_type":"Factual Recall MCQ","question":"Q1","options":{"A":"a","B":"b","C":"c","D":"d"},"correct_answer":"B","explanation":"e1"},
  {"question_type":"Diagnostic MCQ","question":"Q2","options":{"A":"a","B":"b","C":"c","D":"d"},"correct_answer":"C","explanation":"e2"}
]"#;
        let records = parse_response(raw, &procedure_item()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].question, "Q1");
        assert_eq!(records[1].question, "Q2");
        assert_eq!(records[1].entity_id, "ATM-P0034");
        assert!(records.iter().all(|r| r.entity_kind == EntityKind::Procedure));
    }

    #[test]
    fn one_bad_procedure_question_fails_the_reply() {
        let raw = r#"[
  {"question_type":"Factual Recall","question":"Q1","options":{"A":"a","B":"b","C":"c","D":"d"},"correct_answer":"B","explanation":"e1"},
  {"question_type":"Diagnostic","question":"Q2","options":{"A":"a","B":"b","C":"c","D":"d"},"correct_answer":"Z","explanation":"e2"}
]"#;
        let err = parse_response(raw, &procedure_item()).unwrap_err();
        assert!(err.to_string().contains("question 2"));
    }

    #[test]
    fn empty_procedure_array_is_rejected() {
        assert!(parse_response("[]", &procedure_item()).is_err());
    }

    #[test]
    fn procedure_reply_must_be_an_array() {
        assert!(parse_response(FENCED, &procedure_item()).is_err());
    }

    #[test]
    fn numeric_echoed_id_is_accepted_as_text() {
        let raw = r#"{"technique_id":38,"technique_title":null,"question_type":"Diagnostic","question":"Q?","options":{"A":"a","B":"b","C":"c","D":"d"},"correct_answer":"A","explanation":"e"}"#;
        let records = parse_response(raw, &technique_item()).unwrap();
        assert_eq!(records[0].entity_id, "38");
        assert_eq!(records[0].entity_title, "Network Sniffing");
    }

    #[test]
    fn numeric_procedure_echo_does_not_fail_the_reply() {
        let raw = r#"[{"procedure_id":34,"procedure_title":7,"question_type":"Factual Recall","question":"Q1","options":{"A":"a","B":"b","C":"c","D":"d"},"correct_answer":"B","explanation":"e1"}]"#;
        let records = parse_response(raw, &procedure_item()).unwrap();
        assert_eq!(records[0].entity_id, "34");
        assert_eq!(records[0].entity_title, "7");
    }

    #[test]
    fn blank_echoed_id_falls_back_to_work_item() {
        let raw = r#"{"technique_id":"  ","question_type":"Scenario-Based","question":"Q?","options":{"A":"a","B":"b","C":"c","D":"d"},"correct_answer":"D","explanation":"e"}"#;
        let records = parse_response(raw, &technique_item()).unwrap();
        assert_eq!(records[0].entity_id, "ATM-T0038");
    }
}
