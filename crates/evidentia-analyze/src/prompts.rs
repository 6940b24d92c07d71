//! The prompt and schema registry.
//!
//! Every prompt the toolkit sends to the LLM lives here, keyed by case
//! type. Prompts are configuration: changing analysis behaviour for a
//! case type means editing this module, not the analyzers.

use serde_json::{Value, json};

/// Case domain steering prompt wording.
///
/// `employment` is accepted as a synonym of `workplace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseType {
    #[default]
    Generic,
    Workplace,
    Contract,
}

impl CaseType {
    /// Parses a case-type label; unknown labels fall back to generic.
    pub fn parse(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "workplace" | "employment" => Self::Workplace,
            "contract" => Self::Contract,
            _ => Self::Generic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Workplace => "workplace",
            Self::Contract => "contract",
        }
    }

    /// Domain framing prepended to every analysis prompt.
    fn framing(&self) -> &'static str {
        match self {
            Self::Generic => {
                "You are a forensic analyst preparing evidence for legal review."
            }
            Self::Workplace => {
                "You are a forensic analyst preparing evidence for an employment \
                 tribunal. Pay particular attention to retaliation, harassment, \
                 discrimination, and changes in tone after protected disclosures."
            }
            Self::Contract => {
                "You are a forensic analyst preparing evidence for a contract \
                 dispute. Pay particular attention to obligations, deadlines, \
                 variations, and notices of breach."
            }
        }
    }
}

/// Prompt for structured document analysis.
pub fn document_prompt(case_type: CaseType, text: &str) -> String {
    format!(
        "{framing}\n\n\
         Analyze the following document. Produce a concise summary, extract \
         every person, organization, date and legal term (with verbatim \
         quoted_text where a person is quoted, relationship strings such as \
         \"supervisor of Jane Doe\" where stated, and associated_event for \
         each date), classify the document type and sentiment, assess its \
         legal significance, and raise any applicable risk flags.\n\n\
         Document:\n{text}",
        framing = case_type.framing(),
    )
}

/// Prompt for image scene/text/object analysis over a base64 payload.
pub fn image_prompt(case_type: CaseType, base64_payload: &str, media_type: &str) -> String {
    format!(
        "{framing}\n\n\
         Analyze the image below. Describe the scene, transcribe any visible \
         text exactly, list detected objects, state whether people or visible \
         timestamps appear, estimate its potential evidence value, and raise \
         quality or integrity risk flags where warranted.\n\n\
         Image ({media_type}, base64):\n{base64_payload}",
        framing = case_type.framing(),
    )
}

/// Prompt for email-thread analysis over a normalised thread digest.
pub fn email_prompt(case_type: CaseType, thread_digest: &str) -> String {
    format!(
        "{framing}\n\n\
         Analyze the email thread below. Emails are numbered from 0 in \
         chronological order. Summarise the thread, profile each participant \
         (role, authority level, message count, deference score where 0 is \
         highly dominant and 1 is highly deferential, dominant topics), \
         classify the communication pattern, give one sentiment score per \
         email in order (sentiment_progression must have exactly one entry \
         per email), identify escalation events by email position, assess \
         legal significance, raise risk flags, and reconstruct the timeline \
         as short statements.\n\n\
         Thread:\n{thread_digest}",
        framing = case_type.framing(),
    )
}

/// Prompt for cross-evidence legal-pattern detection.
pub fn legal_patterns_prompt(case_type: CaseType, case_digest: &str) -> String {
    format!(
        "{framing}\n\n\
         Below is a digest of an evidence collection: correlated entities, \
         a timeline skeleton, and quoted statements. Identify contradictions \
         between pieces of evidence (with severity from 0 to 1), claims \
         corroborated by multiple independent pieces, and gaps where evidence \
         one would expect is absent. Summarise the overall pattern.\n\n\
         Case digest:\n{case_digest}",
        framing = case_type.framing(),
    )
}

/// Prompt asking the model to arbitrate one merged entity cluster.
/// The model may split the cluster; it must never merge in new names.
pub fn entity_resolution_prompt(case_type: CaseType, cluster_digest: &str) -> String {
    format!(
        "{framing}\n\n\
         The following name variants were merged into one entity cluster by \
         string canonicalisation. Decide whether they genuinely refer to the \
         same entity. If not, split the cluster into groups. Only use the \
         variants given; never introduce new ones.\n\n\
         Cluster:\n{cluster_digest}",
        framing = case_type.framing(),
    )
}

/// Direct executive-summary prompt over the full aggregates.
pub fn executive_summary_prompt(case_type: CaseType, assessment_digest: &str) -> String {
    format!(
        "{framing}\n\n\
         Using the aggregated case assessment below, write an executive \
         summary for legal counsel, then give a forensic opinion (summary, \
         legal implications, recommended actions, risk assessment) and a \
         financial risk view (tribunal probability from 0 to 1, financial \
         exposure, claim strength, settlement recommendation).\n\n\
         Case assessment:\n{assessment_digest}",
        framing = case_type.framing(),
    )
}

/// Map step: summarise one chunk of evidence summaries.
pub fn chunk_summary_prompt(case_type: CaseType, chunk_digest: &str) -> String {
    format!(
        "{framing}\n\n\
         Summarise the key facts, actors, and risks in this portion of the \
         evidence collection in at most 200 words.\n\n\
         Evidence:\n{chunk_digest}",
        framing = case_type.framing(),
    )
}

/// Reduce step: combine chunk summaries with the aggregates.
pub fn reduce_summary_prompt(
    case_type: CaseType,
    chunk_summaries: &str,
    assessment_digest: &str,
) -> String {
    format!(
        "{framing}\n\n\
         The evidence collection was summarised in portions below. Combine \
         them with the aggregated assessment into an executive summary for \
         legal counsel, a forensic opinion (summary, legal implications, \
         recommended actions, risk assessment), and a financial risk view \
         (tribunal probability from 0 to 1, financial exposure, claim \
         strength, settlement recommendation).\n\n\
         Portion summaries:\n{chunk_summaries}\n\n\
         Case assessment:\n{assessment_digest}",
        framing = case_type.framing(),
    )
}

fn confidence_schema() -> Value {
    json!({"type": "number", "minimum": 0, "maximum": 1})
}

/// Response schema for [`document_prompt`].
pub fn document_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "summary", "entities", "document_type", "sentiment",
            "legal_significance", "risk_flags", "confidence_overall"
        ],
        "properties": {
            "summary": {"type": "string"},
            "entities": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["name", "type", "confidence", "context"],
                    "properties": {
                        "name": {"type": "string"},
                        "type": {"enum": ["person", "organization", "date", "legal_term"]},
                        "confidence": confidence_schema(),
                        "context": {"type": "string"},
                        "relationship": {"type": "string"},
                        "quoted_text": {"type": "string"},
                        "associated_event": {"type": "string"}
                    }
                }
            },
            "document_type": {"enum": ["email", "letter", "contract", "filing", "unknown"]},
            "sentiment": {"enum": ["hostile", "neutral", "professional"]},
            "legal_significance": {"enum": ["critical", "high", "medium", "low"]},
            "risk_flags": {
                "type": "array",
                "items": {"enum": [
                    "threatening", "deadline", "pii", "confidential",
                    "time_sensitive", "retaliation_indicators",
                    "harassment", "discrimination"
                ]}
            },
            "confidence_overall": confidence_schema()
        }
    })
}

/// Response schema for [`image_prompt`].
pub fn image_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "scene_description", "people_present", "timestamps_visible",
            "potential_evidence_value", "analysis_notes",
            "confidence_overall", "risk_flags"
        ],
        "properties": {
            "scene_description": {"type": "string"},
            "detected_text": {"type": "string"},
            "detected_objects": {"type": "array", "items": {"type": "string"}},
            "people_present": {"type": "boolean"},
            "timestamps_visible": {"type": "boolean"},
            "potential_evidence_value": {"enum": ["low", "medium", "high"]},
            "analysis_notes": {"type": "string"},
            "confidence_overall": confidence_schema(),
            "risk_flags": {
                "type": "array",
                "items": {"enum": [
                    "low_quality", "tampering_suspected",
                    "metadata_missing", "unclear_content"
                ]}
            }
        }
    })
}

/// Response schema for [`email_prompt`].
pub fn email_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "thread_summary", "participants", "communication_pattern",
            "sentiment_progression", "escalation_events", "legal_significance",
            "risk_flags", "timeline_reconstruction", "confidence_overall"
        ],
        "properties": {
            "thread_summary": {"type": "string"},
            "participants": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": [
                        "email_address", "role", "authority_level",
                        "confidence", "message_count", "deference_score"
                    ],
                    "properties": {
                        "email_address": {"type": "string"},
                        "display_name": {"type": "string"},
                        "role": {"enum": ["sender", "recipient", "cc", "bcc"]},
                        "authority_level": {"enum": ["executive", "management", "employee", "external"]},
                        "confidence": confidence_schema(),
                        "message_count": {"type": "integer", "minimum": 0},
                        "deference_score": confidence_schema(),
                        "dominant_topics": {"type": "array", "items": {"type": "string"}}
                    }
                }
            },
            "communication_pattern": {"enum": ["professional", "escalating", "hostile", "retaliatory"]},
            "sentiment_progression": {"type": "array", "items": {"type": "number", "minimum": -1, "maximum": 1}},
            "escalation_events": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["email_position", "escalation_type", "confidence", "description", "context"],
                    "properties": {
                        "email_position": {"type": "integer", "minimum": 0},
                        "escalation_type": {"enum": ["tone_change", "new_recipient", "authority_escalation", "threat", "deadline"]},
                        "confidence": confidence_schema(),
                        "description": {"type": "string"},
                        "context": {"type": "string"}
                    }
                }
            },
            "legal_significance": {"enum": ["critical", "high", "medium", "low"]},
            "risk_flags": {
                "type": "array",
                "items": {"enum": [
                    "threatening", "deadline", "pii", "confidential",
                    "time_sensitive", "retaliation_indicators",
                    "harassment", "discrimination"
                ]}
            },
            "timeline_reconstruction": {"type": "array", "items": {"type": "string"}},
            "confidence_overall": confidence_schema()
        }
    })
}

/// Response schema for [`legal_patterns_prompt`].
pub fn legal_patterns_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["contradictions", "corroboration", "evidence_gaps", "pattern_summary", "confidence"],
        "properties": {
            "contradictions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["summary", "conflicting_evidence", "severity", "explanation"],
                    "properties": {
                        "summary": {"type": "string"},
                        "conflicting_evidence": {"type": "array", "items": {"type": "string"}},
                        "severity": confidence_schema(),
                        "explanation": {"type": "string"}
                    }
                }
            },
            "corroboration": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["claim", "supporting_evidence", "strength", "explanation"],
                    "properties": {
                        "claim": {"type": "string"},
                        "supporting_evidence": {"type": "array", "items": {"type": "string"}},
                        "strength": confidence_schema(),
                        "explanation": {"type": "string"}
                    }
                }
            },
            "evidence_gaps": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["description", "significance"],
                    "properties": {
                        "description": {"type": "string"},
                        "significance": {"enum": ["critical", "high", "medium", "low"]}
                    }
                }
            },
            "pattern_summary": {"type": "string"},
            "confidence": confidence_schema()
        }
    })
}

/// Response schema for entity-cluster arbitration.
pub fn entity_resolution_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["same_entity", "groups"],
        "properties": {
            "same_entity": {"type": "boolean"},
            "groups": {
                "type": "array",
                "items": {"type": "array", "items": {"type": "string"}}
            }
        }
    })
}

/// Response schema for the executive summary and its forensic/financial
/// annexes.
pub fn executive_summary_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["executive_summary"],
        "properties": {
            "executive_summary": {"type": "string"},
            "forensic_summary": {"type": "string"},
            "forensic_legal_implications": {"type": "array", "items": {"type": "string"}},
            "forensic_recommended_actions": {"type": "array", "items": {"type": "string"}},
            "forensic_risk_assessment": {"type": "string"},
            "tribunal_probability": confidence_schema(),
            "financial_exposure_summary": {"type": "string"},
            "claim_strength_summary": {"type": "string"},
            "settlement_recommendation": {"type": "string"}
        }
    })
}

/// Response schema for the map step of a chunked summary.
pub fn chunk_summary_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["summary"],
        "properties": {"summary": {"type": "string"}}
    })
}
