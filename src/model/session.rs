use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::approach::{
    analyze_officer_approach, stress_level, tone_feedback, PerformanceMetrics, Tone, BASELINE_STRESS,
};
use crate::model::message::{Message, Reply, Role, SummaryReport};
use crate::model::scenario::{ScenarioDefinition, Scoring};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("a model reply is already pending ({0})")]
    ReplyPending(String),

    #[error("scenario is complete; restart to play again")]
    Complete,

    #[error("no pending placeholder with id {0}")]
    UnknownPlaceholder(String),

    #[error("reply for epoch {got} arrived after restart (current epoch {current})")]
    StaleEpoch { got: u64, current: u64 },
}

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub scenario_id: String,
    pub epoch: u64,
    pub messages: Vec<Message>,
    pub score: i32,
    pub stress_level: i32,
    pub scoring: Scoring,
    pub pending: bool,
    pub complete: bool,
    pub summary: Option<SummaryReport>,
    pub metrics: PerformanceMetrics,
}

/// One in-memory play-through of a scenario.
#[derive(Debug)]
pub struct Session {
    scenario: ScenarioDefinition,
    messages: Vec<Message>,
    score: i32,
    stress: i32,
    summary: Option<SummaryReport>,
    pending: Option<String>,
    epoch: u64,
    metrics: PerformanceMetrics,
    last_sent_at: Option<DateTime<Utc>>,
    last_tone: Option<Tone>,
}

impl Session {
    pub fn new(scenario: ScenarioDefinition) -> Self {
        let mut session = Self {
            messages: Vec::new(),
            score: scenario.starting_score(),
            stress: BASELINE_STRESS,
            summary: None,
            pending: None,
            epoch: 0,
            metrics: PerformanceMetrics::default(),
            last_sent_at: None,
            last_tone: None,
            scenario,
        };
        session.reset_state();
        session
    }

    pub fn scenario(&self) -> &ScenarioDefinition {
        &self.scenario
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn stress_level(&self) -> i32 {
        self.stress
    }

    /// The number the response parser bands on.
    pub fn gauge(&self) -> i32 {
        match self.scenario.scoring {
            Scoring::Coached => self.score,
            Scoring::Stress => self.stress,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.summary.is_some()
    }

    pub fn summary(&self) -> Option<&SummaryReport> {
        self.summary.as_ref()
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_complete() {
            return Err(SessionError::Complete);
        }
        if let Some(id) = &self.pending {
            return Err(SessionError::ReplyPending(id.clone()));
        }
        Ok(())
    }

    /// Records the officer's line and refreshes the stress gauge and metrics.
    pub fn append_user_message(&mut self, text: &str) -> Result<(), SessionError> {
        self.ensure_open()?;

        let message = Message::user(text);
        let response_ms = self
            .last_sent_at
            .map(|at| (message.timestamp - at).num_milliseconds().max(0) as u64)
            .unwrap_or(0);

        let approach = analyze_officer_approach(text);
        self.metrics.record(&approach, response_ms);
        self.last_tone = Some(approach.tone);
        self.last_sent_at = Some(message.timestamp);
        self.messages.push(message);
        self.stress = stress_level(&self.messages);
        Ok(())
    }

    /// Pushes an empty model message and returns its id. Only one may be pending.
    pub fn append_placeholder_model_message(&mut self) -> Result<String, SessionError> {
        self.ensure_open()?;

        let placeholder = Message::placeholder();
        let id = placeholder.id.clone();
        self.messages.push(placeholder);
        self.pending = Some(id.clone());
        Ok(id)
    }

    pub fn check_epoch(&self, epoch: u64) -> Result<(), SessionError> {
        if epoch != self.epoch {
            return Err(SessionError::StaleEpoch {
                got: epoch,
                current: self.epoch,
            });
        }
        Ok(())
    }

    fn take_pending(&mut self, id: &str) -> Result<(), SessionError> {
        match self.pending.as_deref() {
            Some(pending) if pending == id => {
                self.pending = None;
                Ok(())
            }
            _ => Err(SessionError::UnknownPlaceholder(id.to_string())),
        }
    }

    /// Fills the pending placeholder. Role-play replies also get a note on the
    /// tone of the officer line they answer.
    pub fn fill_model_message(&mut self, id: &str, reply: Reply) -> Result<(), SessionError> {
        self.take_pending(id)?;

        let tone = match self.scenario.scoring {
            Scoring::Stress => self.last_tone.map(tone_feedback),
            Scoring::Coached => None,
        };
        let message = self
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| SessionError::UnknownPlaceholder(id.to_string()))?;

        if let Some(fb) = &reply.feedback {
            self.score = fb.current_score;
        }
        message.content = reply.dialogue;
        message.narration = reply.narration;
        message.feedback = reply.feedback;
        message.tone = tone;
        Ok(())
    }

    /// Report built from the locally tracked metrics, used when the model
    /// cannot produce an after-action report.
    pub fn metrics_report(&self) -> SummaryReport {
        let m = &self.metrics;
        let score = ((m.empathy_score + m.professionalism_score + m.effectiveness_score) / 3) as i32;

        let mut strengths = Vec::new();
        if m.empathy_score > 0 {
            strengths.push("Showed empathy toward the subject.".to_string());
        }
        if m.professionalism_score > 0 {
            strengths.push("Kept a professional tone.".to_string());
        }
        let mut improvements = Vec::new();
        if m.technique_variety.len() < 3 {
            improvements.push("Use a wider range of communication techniques.".to_string());
        }

        SummaryReport {
            final_score: score,
            performance_grade: letter_grade(score).to_string(),
            key_strengths: strengths,
            areas_for_improvement: improvements,
            final_outcome: "Scenario ended by the officer.".to_string(),
            ..SummaryReport::default()
        }
    }

    /// Ends the session. The placeholder `id` is dropped from the transcript.
    pub fn apply_summary(&mut self, id: &str, summary: SummaryReport) -> Result<(), SessionError> {
        self.take_pending(id)?;

        self.messages.retain(|m| m.id != id);
        self.score = summary.final_score;
        self.summary = Some(summary);
        Ok(())
    }

    pub fn restart(&mut self) {
        self.epoch += 1;
        self.reset_state();
    }

    fn reset_state(&mut self) {
        self.messages = vec![Message::initial(self.scenario.initial_message.clone())];
        self.score = self.scenario.starting_score();
        self.stress = BASELINE_STRESS;
        self.summary = None;
        self.pending = None;
        self.metrics = PerformanceMetrics::default();
        self.last_sent_at = None;
        self.last_tone = None;
    }

    /// History handed to the prompt builder: everything except the pending placeholder
    /// and the officer line currently being answered.
    pub fn transcript_for_prompt(&self) -> &[Message] {
        let mut end = self.messages.len();
        if self.pending.is_some() {
            end = end.saturating_sub(1);
        }
        if end > 0 && self.messages[end - 1].role == Role::User {
            end -= 1;
        }
        &self.messages[..end]
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            scenario_id: self.scenario.id.clone(),
            epoch: self.epoch,
            messages: self.messages.clone(),
            score: self.score,
            stress_level: self.stress,
            scoring: self.scenario.scoring,
            pending: self.pending.is_some(),
            complete: self.is_complete(),
            summary: self.summary.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

fn letter_grade(score: i32) -> &'static str {
    match score {
        s if s >= 90 => "A",
        s if s >= 80 => "B",
        s if s >= 70 => "C",
        s if s >= 60 => "D",
        _ => "F",
    }
}
