//! Chain-of-custody events.
//!
//! Every handling of a piece of evidence appends exactly one event to the
//! per-hash `chain_of_custody.json`. Events are never removed; re-analysis
//! appends rather than replaces.

use crate::validate::{Validate, check_non_empty};
use crate::CoreResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The closed set of custody event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyEventType {
    Ingest,
    Analyze,
    Export,
    CaseAssociation,
}

impl CustodyEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Analyze => "analyze",
            Self::Export => "export",
            Self::CaseAssociation => "case_association",
        }
    }
}

impl std::fmt::Display for CustodyEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit event on a piece of evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainOfCustodyEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: CustodyEventType,
    /// Who performed the action (operator name or system component).
    pub actor: String,
    pub description: String,
    /// Free-form annotations, e.g. `case_id`, `link_mode`, `status`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

impl ChainOfCustodyEvent {
    /// Creates an event stamped with the current time.
    pub fn new(
        event_type: CustodyEventType,
        actor: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            actor: actor.into(),
            description: description.into(),
            metadata: None,
        }
    }

    /// Attaches a metadata key to the event.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }

    /// Convenience accessor for a string-valued metadata key.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(key)?.as_str()
    }
}

impl Validate for ChainOfCustodyEvent {
    fn validate(&self) -> CoreResult<()> {
        check_non_empty("chain_of_custody.actor", &self.actor)?;
        check_non_empty("chain_of_custody.description", &self.description)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_construction() {
        let event = ChainOfCustodyEvent::new(
            CustodyEventType::Ingest,
            "analyst",
            "Evidence ingested into case CASE-1",
        )
        .with_metadata("case_id", serde_json::json!("CASE-1"));

        assert!(event.validate().is_ok());
        assert_eq!(event.metadata_str("case_id"), Some("CASE-1"));
        assert_eq!(event.metadata_str("missing"), None);
    }

    #[test]
    fn test_event_type_wire_names() {
        let json = serde_json::to_string(&CustodyEventType::CaseAssociation).unwrap();
        assert_eq!(json, "\"case_association\"");
    }

    #[test]
    fn test_empty_actor_rejected() {
        let event = ChainOfCustodyEvent::new(CustodyEventType::Analyze, "", "analysis");
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_roundtrip() {
        let event = ChainOfCustodyEvent::new(CustodyEventType::Export, "system", "bundle export")
            .with_metadata("link_mode", serde_json::json!("copy"));
        let json = serde_json::to_string(&event).unwrap();
        let back: ChainOfCustodyEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
