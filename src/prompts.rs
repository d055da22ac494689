//! Instruction templates and prompt rendering.
//!
//! Template text is data: each variant pairs fixed instructions (compiled in from
//! `prompts/*.md`) with a user frame whose `{{placeholders}}` are filled from a work
//! item. Which template applies is a pure function of the item kind and whether it
//! carries a parent tactic.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::model::{ItemKind, WorkItem};

/// JSON shape a template asks the service to reply with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadShape {
    Object,
    Array,
}

impl PayloadShape {
    pub fn brackets(&self) -> (char, char) {
        match self {
            PayloadShape::Object => ('{', '}'),
            PayloadShape::Array => ('[', ']'),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateId {
    TacticIntegrated,
    StandaloneTechnique,
    Procedure,
    TrueFalse,
}

/// A versioned instruction template
#[derive(Debug)]
pub struct PromptTemplate {
    pub id: TemplateId,
    /// Stable identifier (format: name-v1)
    pub name: &'static str,
    pub version: &'static str,
    pub shape: PayloadShape,
    pub instructions: &'static str,
    pub user_frame: &'static str,
}

const TACTIC_FRAME: &str = "Generate a multiple choice question for the following technique within its tactic context.

Tactic context:
- ID: {{tactic_id}}
- Title: {{tactic_title}}
- Description: {{tactic_description}}

Technique details:
- ID: {{entity_id}}
- Title: {{entity_title}}
- Description: {{entity_description}}

Generate exactly one question following the specified format and requirements.";

const TECHNIQUE_FRAME: &str = "Generate a multiple choice question for the following technique.

Technique details:
- ID: {{entity_id}}
- Title: {{entity_title}}
- Description: {{entity_description}}

Generate exactly one question following the specified format and requirements.";

const PROCEDURE_FRAME: &str = "Generate 2-3 multiple choice questions for the following procedure.

Procedure details:
- ID: {{entity_id}}
- Title: {{entity_title}}
- Description: {{entity_description}}

Associated techniques:
{{associated_techniques}}

Generate 2-3 questions following the specified format and requirements.";

const TRUE_FALSE_FRAME: &str = "{{dataset}}
--- End dataset ---";

static TEMPLATES: [PromptTemplate; 4] = [
    PromptTemplate {
        id: TemplateId::TacticIntegrated,
        name: "tactic-integrated-v1",
        version: "1.0.0",
        shape: PayloadShape::Object,
        instructions: include_str!("../prompts/tactic_integrated_v1.md"),
        user_frame: TACTIC_FRAME,
    },
    PromptTemplate {
        id: TemplateId::StandaloneTechnique,
        name: "technique-standalone-v1",
        version: "1.0.0",
        shape: PayloadShape::Object,
        instructions: include_str!("../prompts/technique_standalone_v1.md"),
        user_frame: TECHNIQUE_FRAME,
    },
    PromptTemplate {
        id: TemplateId::Procedure,
        name: "procedure-v1",
        version: "1.0.0",
        shape: PayloadShape::Array,
        instructions: include_str!("../prompts/procedure_v1.md"),
        user_frame: PROCEDURE_FRAME,
    },
    PromptTemplate {
        id: TemplateId::TrueFalse,
        name: "true-false-v1",
        version: "1.0.0",
        shape: PayloadShape::Array,
        instructions: include_str!("../prompts/true_false_v1.md"),
        user_frame: TRUE_FALSE_FRAME,
    },
];

static CHECKSUMS: Lazy<HashMap<TemplateId, String>> = Lazy::new(|| {
    TEMPLATES
        .iter()
        .map(|t| (t.id, sha1_checksum(t.instructions)))
        .collect()
});

impl TemplateId {
    pub fn template(self) -> &'static PromptTemplate {
        match self {
            TemplateId::TacticIntegrated => &TEMPLATES[0],
            TemplateId::StandaloneTechnique => &TEMPLATES[1],
            TemplateId::Procedure => &TEMPLATES[2],
            TemplateId::TrueFalse => &TEMPLATES[3],
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.template().name)
    }
}

impl PromptTemplate {
    /// SHA1 of the instruction text, for tracing which revision produced a reply
    pub fn checksum(&self) -> &'static str {
        CHECKSUMS.get(&self.id).map(String::as_str).unwrap_or_default()
    }
}

/// Generate a SHA1 checksum of prompt content
fn sha1_checksum(content: &str) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Select the template for a work item.
///
/// | kind      | parent context | template              |
/// |-----------|----------------|-----------------------|
/// | technique | yes            | tactic-integrated     |
/// | technique | no             | standalone technique  |
/// | procedure | either         | procedure             |
pub fn select_template(kind: ItemKind, has_parent_context: bool) -> TemplateId {
    match (kind, has_parent_context) {
        (ItemKind::Technique, true) => TemplateId::TacticIntegrated,
        (ItemKind::Technique, false) => TemplateId::StandaloneTechnique,
        (ItemKind::Procedure, _) => TemplateId::Procedure,
    }
}

/// A rendered completion request: fixed instructions plus record data
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub template: TemplateId,
    pub system_instructions: &'static str,
    pub user_content: String,
}

impl Prompt {
    pub fn expected_shape(&self) -> PayloadShape {
        self.template.template().shape
    }
}

pub fn build_prompt(item: &WorkItem) -> Prompt {
    let id = select_template(item.entity_kind, item.parent_tactic.is_some());
    let template = id.template();

    let (tactic_id, tactic_title, tactic_description) = match &item.parent_tactic {
        Some(p) => (p.id.as_str(), p.title.as_str(), p.description.as_str()),
        None => ("", "", ""),
    };
    let associated = item
        .associated_techniques
        .iter()
        .map(|t| format!("- {}: {}", t.title, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    let user_content = render(
        template.user_frame,
        &[
            ("entity_id", &item.entity_id),
            ("entity_title", &item.entity_title),
            ("entity_description", &item.entity_description),
            ("tactic_id", tactic_id),
            ("tactic_title", tactic_title),
            ("tactic_description", tactic_description),
            ("associated_techniques", &associated),
        ],
    );

    Prompt {
        template: id,
        system_instructions: template.instructions,
        user_content,
    }
}

/// Substitute `{{key}}` placeholders in a single pass.
///
/// Substituted values are never rescanned, and unknown placeholders are left as-is.
pub fn render(frame: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(frame.len());
    let mut rest = frame;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match vars.iter().find(|(k, _)| *k == key) {
                    Some((_, value)) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
