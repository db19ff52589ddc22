use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::model::message::{Message, Role, ToneFeedback, ToneKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Tone {
    Professional,
    Aggressive,
    Empathetic,
    Rushed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approach {
    pub tone: Tone,
    pub techniques: Vec<String>,
}

const TECHNIQUES: &[(&str, &[&str])] = &[
    ("empathy", &["understand", "feel"]),
    ("open-ended questions", &["can you", "would you"]),
    ("assistance", &["let me", "help"]),
    ("active listening", &["what happened", "tell me"]),
    ("acknowledgment", &["okay", "i see"]),
    ("de-escalation", &["calm", "relax"]),
];

/// Keyword heuristic over the officer's line. Cheap and local, no model call.
pub fn analyze_officer_approach(text: &str) -> Approach {
    let msg = text.to_lowercase();

    let tone = if msg.contains("need to") || msg.contains("have to") || msg.contains('!') {
        Tone::Aggressive
    } else if msg.contains("understand") || msg.contains("sorry") || msg.contains("help") {
        Tone::Empathetic
    } else if msg.chars().count() < 20 || msg.split(' ').count() < 4 {
        Tone::Rushed
    } else {
        Tone::Professional
    };

    let techniques = TECHNIQUES
        .iter()
        .filter(|(_, keys)| keys.iter().any(|k| msg.contains(k)))
        .map(|(name, _)| name.to_string())
        .collect();

    Approach { tone, techniques }
}

/// The per-turn tone note attached to role-play replies.
pub fn tone_feedback(tone: Tone) -> ToneFeedback {
    let (kind, effect) = match tone {
        Tone::Empathetic => (ToneKind::Positive, "de-escalate"),
        Tone::Professional => (ToneKind::Informational, "de-escalate"),
        Tone::Rushed => (ToneKind::Informational, "escalate"),
        Tone::Aggressive => (ToneKind::Critique, "escalate"),
    };
    ToneFeedback {
        kind,
        message: format!("Your tone was perceived as {tone}. This is likely to {effect} the situation."),
    }
}

pub const BASELINE_STRESS: i32 = 5;

/// Stress gauge from the last four messages, clamped to 1..=10.
pub fn stress_level(messages: &[Message]) -> i32 {
    let start = messages.len().saturating_sub(4);
    let mut stress = BASELINE_STRESS as f32;

    for msg in messages[start..].iter().filter(|m| m.role == Role::User) {
        let analysis = analyze_officer_approach(&msg.content);
        match analysis.tone {
            Tone::Aggressive => stress += 1.0,
            Tone::Empathetic => stress -= 1.0,
            Tone::Rushed => stress += 0.5,
            Tone::Professional => {}
        }
        if analysis.techniques.iter().any(|t| t == "empathy") {
            stress -= 1.0;
        }
    }

    (stress.round() as i32).clamp(1, 10)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub empathy_score: u32,
    pub professionalism_score: u32,
    pub effectiveness_score: u32,
    /// Milliseconds since the officer's previous line; 0 for the first line.
    pub response_times_ms: Vec<u64>,
    pub technique_variety: BTreeSet<String>,
}

impl PerformanceMetrics {
    pub fn record(&mut self, approach: &Approach, response_time_ms: u64) {
        self.technique_variety
            .extend(approach.techniques.iter().cloned());

        match approach.tone {
            Tone::Empathetic => self.empathy_score = (self.empathy_score + 5).min(100),
            Tone::Professional => {
                self.professionalism_score = (self.professionalism_score + 5).min(100)
            }
            _ => {}
        }
        if approach.techniques.len() > 1 {
            self.effectiveness_score = (self.effectiveness_score + 3).min(100);
        }

        self.response_times_ms.push(response_time_ms);
    }

    pub fn average_response_ms(&self) -> Option<u64> {
        if self.response_times_ms.is_empty() {
            return None;
        }
        let total: u64 = self.response_times_ms.iter().sum();
        Some(total / self.response_times_ms.len() as u64)
    }
}
