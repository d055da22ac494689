//! Work item extraction from classified TTP records

use crate::model::{EntityKind, ItemKind, ParentTactic, TechniqueRef, TtpRecord, WorkItem};

/// Expand a classified record into the work items the templates need.
///
/// * tactic: one technique item per child, each carrying the tactic as parent context
/// * procedure: a single item with the children copied as associated techniques
/// * technique: a single item; nested children are kept as auxiliary context
pub fn extract(record: &TtpRecord, kind: EntityKind) -> Vec<WorkItem> {
    match kind {
        EntityKind::Tactic => {
            let parent = ParentTactic {
                id: record.identifier(),
                title: record.title.clone(),
                description: record.description.clone(),
            };
            record
                .children
                .iter()
                .map(|technique| WorkItem {
                    entity_id: technique.identifier(),
                    entity_title: technique.title.clone(),
                    entity_kind: ItemKind::Technique,
                    entity_description: technique.description.clone(),
                    parent_tactic: Some(parent.clone()),
                    associated_techniques: Vec::new(),
                    sub_techniques: Vec::new(),
                })
                .collect()
        }
        EntityKind::Procedure => vec![WorkItem {
            entity_id: record.identifier(),
            entity_title: record.title.clone(),
            entity_kind: ItemKind::Procedure,
            entity_description: record.description.clone(),
            parent_tactic: None,
            associated_techniques: record
                .children
                .iter()
                .map(|t| TechniqueRef {
                    id: t.identifier(),
                    title: t.title.clone(),
                    description: t.description.clone(),
                })
                .collect(),
            sub_techniques: Vec::new(),
        }],
        EntityKind::Technique => vec![WorkItem {
            entity_id: record.identifier(),
            entity_title: record.title.clone(),
            entity_kind: ItemKind::Technique,
            entity_description: record.description.clone(),
            parent_tactic: None,
            associated_techniques: Vec::new(),
            sub_techniques: record.children.clone(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tactic() -> TtpRecord {
        TtpRecord::from_value(&json!({
            "title": "Credential Access",
            "type": "tactic",
            "description": "<p>steal vehicle network credentials</p>",
            "mitreId": "TA0006",
            "technique": [
                {"title": "Network Sniffing", "type": "technique", "description": "sniff", "id": "ATM-T0038"},
                {"title": "Input Capture", "type": "technique", "description": "capture", "mitreId": "T0036"},
                {"title": "Unnamed", "type": "technique"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn tactic_yields_one_item_per_child_with_shared_parent() {
        let items = extract(&tactic(), EntityKind::Tactic);
        assert_eq!(items.len(), 3);
        let expected_parent = ParentTactic {
            id: "TA0006".into(),
            title: "Credential Access".into(),
            description: "<p>steal vehicle network credentials</p>".into(),
        };
        for item in &items {
            assert_eq!(item.entity_kind, ItemKind::Technique);
            assert_eq!(item.parent_tactic.as_ref(), Some(&expected_parent));
        }
        assert_eq!(items[0].entity_id, "ATM-T0038");
        assert_eq!(items[1].entity_id, "T0036");
        assert_eq!(items[2].entity_id, "");
        assert_eq!(items[2].entity_description, "");
    }

    #[test]
    fn tactic_without_children_yields_nothing() {
        let record = TtpRecord {
            title: "Impact".into(),
            declared_type: Some("tactic".into()),
            ..Default::default()
        };
        assert!(extract(&record, EntityKind::Tactic).is_empty());
    }

    #[test]
    fn procedure_copies_associated_techniques_verbatim() {
        let record = TtpRecord::from_value(&json!({
            "title": "CAN Message Injection",
            "type": "procedure",
            "id": "ATM-P0034",
            "description": "replay collision messages",
            "technique": [
                {"title": "Disable ACC", "description": "turn off adaptive cruise", "id": "ATM-T0010"},
                {"title": "Replay", "description": "replay frames"}
            ]
        }))
        .unwrap();
        let items = extract(&record, EntityKind::Procedure);
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.entity_kind, ItemKind::Procedure);
        assert!(item.parent_tactic.is_none());
        assert_eq!(item.associated_techniques.len(), record.children.len());
        for (copied, source) in item.associated_techniques.iter().zip(&record.children) {
            assert_eq!(copied.title, source.title);
            assert_eq!(copied.description, source.description);
            assert_eq!(copied.id, source.identifier());
        }
    }

    #[test]
    fn procedure_without_techniques_has_empty_list() {
        let record = TtpRecord {
            id: Some("ATM-P0001".into()),
            title: "Key fob relay".into(),
            ..Default::default()
        };
        let items = extract(&record, EntityKind::Procedure);
        assert_eq!(items.len(), 1);
        assert!(items[0].associated_techniques.is_empty());
    }

    #[test]
    fn technique_keeps_nested_children_as_context() {
        let mut record = tactic();
        record.declared_type = Some("technique".into());
        let items = extract(&record, EntityKind::Technique);
        assert_eq!(items.len(), 1);
        assert!(items[0].parent_tactic.is_none());
        assert_eq!(items[0].sub_techniques.len(), 3);
        assert_eq!(items[0].entity_id, "TA0006");
    }
}
