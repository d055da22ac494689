//! Entity classification: which of the three TTP shapes a record represents

use crate::model::{EntityKind, TtpRecord};

/// Total classifier over TTP records.
///
/// A recognized declared `type` (case-insensitive) is authoritative. Otherwise the
/// record is classified structurally: a non-empty child-technique list means tactic,
/// anything else gets `ambiguous_fallback`. The fallback defaults to technique and is
/// configurable because malformed exports land there silently.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    ambiguous_fallback: EntityKind,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(EntityKind::Technique)
    }
}

impl Classifier {
    pub fn new(ambiguous_fallback: EntityKind) -> Self {
        Self { ambiguous_fallback }
    }

    pub fn classify(&self, record: &TtpRecord) -> EntityKind {
        if let Some(kind) = record.declared_type.as_deref().and_then(EntityKind::parse) {
            return kind;
        }

        if !record.children.is_empty() {
            tracing::debug!(
                "Record '{}' has no recognized type; {} children => tactic",
                record.title,
                record.children.len()
            );
            return EntityKind::Tactic;
        }

        tracing::debug!(
            "Record '{}' has no recognized type and no children; falling back to {}",
            record.title,
            self.ambiguous_fallback
        );
        self.ambiguous_fallback
    }
}

/// Classify with the default (technique) fallback
pub fn classify(record: &TtpRecord) -> EntityKind {
    Classifier::default().classify(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(declared: Option<&str>, children: usize) -> TtpRecord {
        TtpRecord {
            title: "r".into(),
            declared_type: declared.map(str::to_string),
            children: (0..children)
                .map(|i| TtpRecord {
                    title: format!("child {i}"),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn declared_type_is_case_insensitive() {
        assert_eq!(classify(&record(Some("TACTIC"), 0)), EntityKind::Tactic);
        assert_eq!(classify(&record(Some("Procedure"), 0)), EntityKind::Procedure);
        assert_eq!(classify(&record(Some("technique"), 0)), EntityKind::Technique);
    }

    #[test]
    fn declared_type_wins_over_structure() {
        // a procedure listing its techniques is still a procedure
        assert_eq!(classify(&record(Some("procedure"), 3)), EntityKind::Procedure);
        assert_eq!(classify(&record(Some("technique"), 2)), EntityKind::Technique);
    }

    #[test]
    fn children_without_type_means_tactic() {
        assert_eq!(classify(&record(None, 2)), EntityKind::Tactic);
        assert_eq!(classify(&record(Some("unspecified"), 1)), EntityKind::Tactic);
    }

    #[test]
    fn fully_ambiguous_falls_back() {
        assert_eq!(classify(&record(None, 0)), EntityKind::Technique);
        assert_eq!(classify(&record(Some("weird"), 0)), EntityKind::Technique);
        let strict = Classifier::new(EntityKind::Procedure);
        assert_eq!(strict.classify(&record(None, 0)), EntityKind::Procedure);
    }

    #[test]
    fn classification_is_total() {
        let cases = [
            record(None, 0),
            record(None, 4),
            record(Some(""), 0),
            record(Some("tactic"), 0),
            TtpRecord::default(),
        ];
        for case in &cases {
            let kind = classify(case);
            assert!(matches!(
                kind,
                EntityKind::Tactic | EntityKind::Technique | EntityKind::Procedure
            ));
        }
    }
}
