use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
}

/// One scored axis of a COACH FEEDBACK block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreDelta {
    pub score: i32,
    pub justification: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub professionalism: ScoreDelta,
    pub de_escalation: ScoreDelta,
    pub current_score: i32,
}

/// Per-area scores of an after-action report, each 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetrics {
    #[serde(default)]
    pub de_escalation_score: i32,
    #[serde(default)]
    pub legal_procedure_score: i32,
    #[serde(default)]
    pub officer_safety_score: i32,
    #[serde(default)]
    pub contextual_awareness: i32,
}

/// Terminal end-of-scenario report.
///
/// Coached summaries fill the first four fields; after-action reports
/// requested with `/end` may also carry an outcome, metrics and learning points.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub final_score: i32,
    pub performance_grade: String,
    #[serde(default)]
    pub key_strengths: Vec<String>,
    #[serde(default)]
    pub areas_for_improvement: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub final_outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_metrics: Option<KeyMetrics>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub critical_learning_points: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToneKind {
    Positive,
    Critique,
    Informational,
}

/// Real-time note on how the officer's last line came across.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneFeedback {
    pub kind: ToneKind,
    pub message: String,
}

/// Parsed content for one model message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// Spoken text, the only part replayed into later prompts.
    pub dialogue: String,
    /// Stress-band scene description shown above the dialogue.
    pub narration: Option<String>,
    pub feedback: Option<Feedback>,
}

impl Reply {
    pub fn plain(dialogue: impl Into<String>) -> Self {
        Self {
            dialogue: dialogue.into(),
            ..Self::default()
        }
    }

    /// Narration line, blank line, dialogue.
    pub fn rendered(&self) -> String {
        with_narration(self.narration.as_deref(), &self.dialogue)
    }
}

fn with_narration(narration: Option<&str>, dialogue: &str) -> String {
    match narration {
        Some(line) => format!("{line}\n\n{dialogue}"),
        None => dialogue.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<ToneFeedback>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: format!("user-{}", Uuid::new_v4()),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            feedback: None,
            narration: None,
            tone: None,
        }
    }

    /// Model message whose content arrives later.
    pub fn placeholder() -> Self {
        Self {
            id: format!("model-{}", Uuid::new_v4()),
            role: Role::Model,
            content: String::new(),
            timestamp: Utc::now(),
            feedback: None,
            narration: None,
            tone: None,
        }
    }

    pub fn initial(content: impl Into<String>) -> Self {
        Self {
            id: "init-1".into(),
            role: Role::Model,
            content: content.into(),
            timestamp: Utc::now(),
            feedback: None,
            narration: None,
            tone: None,
        }
    }

    /// Text as shown to the trainee, narration included.
    pub fn display_text(&self) -> String {
        with_narration(self.narration.as_deref(), &self.content)
    }

    pub fn is_placeholder(&self) -> bool {
        self.role == Role::Model && self.content.is_empty()
    }
}
