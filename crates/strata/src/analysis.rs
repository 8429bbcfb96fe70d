//! Typed view of the tender analysis block
//!
//! The extracted object stays opaque JSON at the protocol level. This module
//! decodes it leniently for callers that want fields: anything missing or of
//! an unexpected shape falls back to a default.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenderAnalysis {
    pub tender_metadata: TenderMetadata,
    pub executive_summary: ExecutiveSummary,
    pub top_blockers: Vec<Blocker>,
    pub next_actions: Vec<String>,
    pub mandatory_requirements: Vec<Requirement>,
    pub required_documents: Vec<RequiredDocument>,
    pub risks_flagged: Vec<String>,
    pub evaluation_criteria: Vec<EvaluationCriterion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenderMetadata {
    pub title: Option<String>,
    pub issuing_authority: Option<String>,
    pub deadline: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutiveSummary {
    pub brief_explanation: Option<String>,
    /// 0-100
    pub bid_readiness_score: Option<f64>,
    pub overall_readiness_statement: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Blocker {
    pub blocker: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requirement {
    pub requirement: String,
    pub criticality: Option<String>,
    pub source_clause: Option<String>,
    pub status: Option<String>,
}

impl Requirement {
    pub fn is_high_criticality(&self) -> bool {
        self.criticality
            .as_deref()
            .is_some_and(|c| c.trim().eq_ignore_ascii_case("high"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequiredDocument {
    pub document_name: String,
    pub mandatory: bool,
    pub present: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationCriterion {
    pub criterion: String,
    /// Free text, usually a percentage
    pub weight: Option<Value>,
}

impl EvaluationCriterion {
    /// Numeric part of the weight, e.g. 30.0 for "30%"
    pub fn weight_percent(&self) -> Option<f64> {
        match self.weight.as_ref()? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => {
                let digits: String = s
                    .chars()
                    .filter(|c| c.is_ascii_digit() || *c == '.')
                    .collect();
                digits.parse().ok()
            }
            _ => None,
        }
    }
}

impl TenderAnalysis {
    /// Decode an extracted object. Returns None only if the value is not an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        match serde_json::from_value(value.clone()) {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                tracing::debug!(error = %e, "Analysis block has unexpected field types, decoding per section");
                Some(Self::from_sections(value))
            }
        }
    }

    fn from_sections(value: &Value) -> Self {
        fn section<T: serde::de::DeserializeOwned + Default>(value: &Value, key: &str) -> T {
            value
                .get(key)
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default()
        }

        Self {
            tender_metadata: section(value, "tender_metadata"),
            executive_summary: section(value, "executive_summary"),
            top_blockers: section(value, "top_blockers"),
            next_actions: section(value, "next_actions"),
            mandatory_requirements: section(value, "mandatory_requirements"),
            required_documents: section(value, "required_documents"),
            risks_flagged: section(value, "risks_flagged"),
            evaluation_criteria: section(value, "evaluation_criteria"),
        }
    }

    /// Mandatory documents not yet provided
    pub fn missing_mandatory_documents(&self) -> impl Iterator<Item = &RequiredDocument> {
        self.required_documents
            .iter()
            .filter(|d| d.mandatory && !d.present)
    }

    pub fn high_criticality_count(&self) -> usize {
        self.mandatory_requirements
            .iter()
            .filter(|r| r.is_high_criticality())
            .count()
    }

    pub fn readiness_score(&self) -> Option<f64> {
        self.executive_summary
            .bid_readiness_score
            .map(|s| s.clamp(0.0, 100.0))
    }
}
