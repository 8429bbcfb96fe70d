//! Streaming tasks and their request bodies
//!
//! Each task is validated from its HTTP body and turned into a chat request
//! for the inference backend.

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::backend::{ChatMessage, ChatRequest};
use crate::config::InferenceConfig;
use crate::prompts;
use crate::protocol::BandedStages;

/// The three uses of the streaming protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    TenderAnalysis,
    Draft,
    Rewrite,
}

impl TaskKind {
    /// Progress stages shown while this kind of task streams
    pub fn stages(&self, chars_per_stage: usize) -> BandedStages {
        match self {
            TaskKind::TenderAnalysis => BandedStages::analysis(chars_per_stage),
            TaskKind::Draft => BandedStages::drafting(chars_per_stage),
            TaskKind::Rewrite => BandedStages::rewriting(chars_per_stage),
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskKind::TenderAnalysis => "tender_analysis",
            TaskKind::Draft => "draft",
            TaskKind::Rewrite => "rewrite",
        };
        f.write_str(name)
    }
}

/// Body of the tender analysis endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub text: Option<String>,
}

/// Body of the drafting endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

/// Body of the rewrite endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewriteRequest {
    #[serde(default)]
    pub selection: Option<String>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

/// Request body validation failures, reported to the client verbatim
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Tender text is required")]
    MissingText,
    #[error("Prompt and context are required")]
    MissingPromptOrContext,
    #[error("Selection and instruction are required")]
    MissingSelectionOrInstruction,
}

/// A validated streaming task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTask {
    TenderAnalysis {
        text: String,
    },
    Draft {
        prompt: String,
        context: String,
    },
    Rewrite {
        selection: String,
        instruction: String,
        context: Option<String>,
    },
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TryFrom<AnalyzeRequest> for StreamTask {
    type Error = ValidationError;

    fn try_from(req: AnalyzeRequest) -> Result<Self, Self::Error> {
        let text = present(req.text).ok_or(ValidationError::MissingText)?;
        Ok(StreamTask::TenderAnalysis { text })
    }
}

impl TryFrom<DraftRequest> for StreamTask {
    type Error = ValidationError;

    fn try_from(req: DraftRequest) -> Result<Self, Self::Error> {
        match (present(req.prompt), present(req.context)) {
            (Some(prompt), Some(context)) => Ok(StreamTask::Draft { prompt, context }),
            _ => Err(ValidationError::MissingPromptOrContext),
        }
    }
}

impl TryFrom<RewriteRequest> for StreamTask {
    type Error = ValidationError;

    fn try_from(req: RewriteRequest) -> Result<Self, Self::Error> {
        match (present(req.selection), present(req.instruction)) {
            (Some(selection), Some(instruction)) => Ok(StreamTask::Rewrite {
                selection,
                instruction,
                context: present(req.context),
            }),
            _ => Err(ValidationError::MissingSelectionOrInstruction),
        }
    }
}

impl StreamTask {
    pub fn kind(&self) -> TaskKind {
        match self {
            StreamTask::TenderAnalysis { .. } => TaskKind::TenderAnalysis,
            StreamTask::Draft { .. } => TaskKind::Draft,
            StreamTask::Rewrite { .. } => TaskKind::Rewrite,
        }
    }

    /// Server path of the streaming endpoint for this task
    pub fn path(&self) -> &'static str {
        match self.kind() {
            TaskKind::TenderAnalysis => "/api/tender/analyze/stream",
            TaskKind::Draft => "/api/proposal/draft/stream",
            TaskKind::Rewrite => "/api/proposal/rewrite/stream",
        }
    }

    /// JSON body to POST to [`StreamTask::path`]
    pub fn payload(&self) -> serde_json::Value {
        match self {
            StreamTask::TenderAnalysis { text } => json!({ "text": text }),
            StreamTask::Draft { prompt, context } => json!({ "prompt": prompt, "context": context }),
            StreamTask::Rewrite {
                selection,
                instruction,
                context,
            } => json!({
                "selection": selection,
                "instruction": instruction,
                "context": context,
            }),
        }
    }

    /// Chat request for the streaming endpoint
    pub fn streaming_request(&self, config: &InferenceConfig) -> ChatRequest {
        let (system, user, temperature) = match self {
            StreamTask::TenderAnalysis { text } => (
                prompts::ANALYSIS_STREAM_PROMPT,
                text.clone(),
                config.analysis_temperature,
            ),
            StreamTask::Draft { prompt, context } => (
                prompts::DRAFT_PROMPT,
                prompts::draft_user_message(context, prompt),
                config.draft_temperature,
            ),
            StreamTask::Rewrite {
                selection,
                instruction,
                context,
            } => (
                prompts::REWRITE_PROMPT,
                prompts::rewrite_user_message(selection, instruction, context.as_deref()),
                config.draft_temperature,
            ),
        };

        ChatRequest {
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature,
            json_mode: false,
        }
    }
}

/// JSON-mode analysis request for the non-streaming endpoint
pub fn json_analysis_request(text: &str, config: &InferenceConfig) -> ChatRequest {
    ChatRequest {
        messages: vec![
            ChatMessage::system(prompts::ANALYSIS_JSON_PROMPT),
            ChatMessage::user(text),
        ],
        temperature: config.json_analysis_temperature,
        json_mode: true,
    }
}

/// Plain drafting request for the non-streaming endpoint
pub fn plain_draft_request(prompt: &str, context: &str, config: &InferenceConfig) -> ChatRequest {
    ChatRequest {
        messages: vec![
            ChatMessage::system(prompts::DRAFT_PLAIN_PROMPT),
            ChatMessage::user(prompts::draft_user_message(context, prompt)),
        ],
        temperature: config.draft_temperature,
        json_mode: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Role;

    #[test]
    fn test_analyze_validation() {
        let missing = StreamTask::try_from(AnalyzeRequest { text: None });
        assert_eq!(missing, Err(ValidationError::MissingText));

        let blank = StreamTask::try_from(AnalyzeRequest {
            text: Some("   \n".to_string()),
        });
        assert_eq!(blank, Err(ValidationError::MissingText));

        let ok = StreamTask::try_from(AnalyzeRequest {
            text: Some("Tender 42".to_string()),
        })
        .unwrap();
        assert_eq!(ok.kind(), TaskKind::TenderAnalysis);
        assert_eq!(ok.path(), "/api/tender/analyze/stream");
    }

    #[test]
    fn test_draft_validation_requires_both() {
        let err = StreamTask::try_from(DraftRequest {
            prompt: Some("write".to_string()),
            context: None,
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "Prompt and context are required");
    }

    #[test]
    fn test_rewrite_context_is_optional() {
        let task = StreamTask::try_from(RewriteRequest {
            selection: Some("old".to_string()),
            instruction: Some("shorter".to_string()),
            context: Some("".to_string()),
        })
        .unwrap();
        assert_eq!(
            task,
            StreamTask::Rewrite {
                selection: "old".to_string(),
                instruction: "shorter".to_string(),
                context: None,
            }
        );
        assert_eq!(task.path(), "/api/proposal/rewrite/stream");
    }

    #[test]
    fn test_payload_round_trips_through_request_body() {
        let task = StreamTask::Draft {
            prompt: "p".to_string(),
            context: "c".to_string(),
        };
        let body: DraftRequest = serde_json::from_value(task.payload()).unwrap();
        assert_eq!(StreamTask::try_from(body).unwrap(), task);
    }

    #[test]
    fn test_streaming_request_uses_task_temperature() {
        let config = InferenceConfig::default();
        let analysis = StreamTask::TenderAnalysis {
            text: "doc".to_string(),
        }
        .streaming_request(&config);
        assert!((analysis.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(analysis.messages[0].role, Role::System);
        assert_eq!(analysis.messages[1].content, "doc");
        assert!(!analysis.json_mode);

        let draft = StreamTask::Draft {
            prompt: "p".to_string(),
            context: "c".to_string(),
        }
        .streaming_request(&config);
        assert!((draft.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(draft.messages[1].content, "Context:\nc\n\nTask:\np");
    }

    #[test]
    fn test_json_analysis_request() {
        let request = json_analysis_request("doc", &InferenceConfig::default());
        assert!(request.json_mode);
        assert!((request.temperature - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_json_analysis_temperature_is_independent() {
        let config = InferenceConfig {
            analysis_temperature: 0.05,
            json_analysis_temperature: 0.3,
            ..InferenceConfig::default()
        };
        let request = json_analysis_request("doc", &config);
        assert!((request.temperature - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_task_kind_stages() {
        use crate::protocol::StageEstimator;

        let draft = TaskKind::Draft.stages(400);
        assert_eq!(draft.stage_count(), 4);
        assert_eq!(draft.stage_name(0), Some("Reading the tender context"));
        assert_eq!(TaskKind::Rewrite.stages(400).stage_count(), 3);
        assert_eq!(TaskKind::TenderAnalysis.stages(400).stage_count(), 6);
    }

    #[test]
    fn test_task_kind_display() {
        assert_eq!(TaskKind::TenderAnalysis.to_string(), "tender_analysis");
        assert_eq!(TaskKind::Rewrite.to_string(), "rewrite");
    }
}
