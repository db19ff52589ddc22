use serde::Deserialize;
use serde_json::Value;

use crate::model::message::{Feedback, KeyMetrics, SummaryReport};

/// Structured reply requested when the backend supports JSON output.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredTurn {
    #[serde(default)]
    pub dialogue: String,
    #[serde(default)]
    pub feedback: Option<Feedback>,
    #[serde(default)]
    pub summary: Option<SummaryReport>,
}

/// Decode raw LLM JSON into a typed turn.
pub fn decode_structured_turn(raw: &str) -> Result<StructuredTurn, String> {
    let body = strip_code_fence(raw.trim());

    let value: Value =
        serde_json::from_str(body).map_err(|e| format!("Invalid LLM output: {}", e))?;

    let Value::Object(_) = value else {
        return Err("structured reply must be a JSON object".to_string());
    };

    let turn: StructuredTurn =
        serde_json::from_value(value).map_err(|e| format!("Unexpected reply shape: {}", e))?;

    if turn.summary.is_none() && turn.dialogue.trim().is_empty() {
        return Err("structured reply has neither dialogue nor summary".to_string());
    }

    Ok(turn)
}

/// List entries arrive either as bare strings or as `{ "id", "text" }` objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ReportItem {
    Text(String),
    Entry { text: String },
}

impl ReportItem {
    fn into_text(self) -> String {
        match self {
            ReportItem::Text(text) | ReportItem::Entry { text } => text,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AfterActionReport {
    #[serde(default)]
    final_outcome: String,
    performance_score: i32,
    #[serde(default)]
    performance_grade: String,
    #[serde(default)]
    key_metrics: Option<KeyMetrics>,
    #[serde(default)]
    key_strengths: Vec<ReportItem>,
    #[serde(default)]
    areas_for_improvement: Vec<ReportItem>,
    #[serde(default)]
    critical_learning_points: Vec<ReportItem>,
}

fn texts(items: Vec<ReportItem>) -> Vec<String> {
    items
        .into_iter()
        .map(ReportItem::into_text)
        .filter(|t| !t.trim().is_empty())
        .collect()
}

/// Decode an after-action report. `performanceScore` is required; the rest may be missing.
/// The report may also arrive wrapped as `{ "afterActionReport": { ... } }`.
pub fn decode_after_action(raw: &str) -> Result<SummaryReport, String> {
    let body = strip_code_fence(raw.trim());

    let value: Value =
        serde_json::from_str(body).map_err(|e| format!("Invalid LLM output: {}", e))?;
    let value = match value {
        Value::Object(mut map) if map.contains_key("afterActionReport") => {
            map.remove("afterActionReport").unwrap_or_default()
        }
        other => other,
    };

    let report: AfterActionReport =
        serde_json::from_value(value).map_err(|e| format!("Unexpected report shape: {}", e))?;

    Ok(SummaryReport {
        final_score: report.performance_score,
        performance_grade: report.performance_grade.trim().to_string(),
        key_strengths: texts(report.key_strengths),
        areas_for_improvement: texts(report.areas_for_improvement),
        final_outcome: report.final_outcome.trim().to_string(),
        key_metrics: report.key_metrics,
        critical_learning_points: texts(report.critical_learning_points),
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_turn_with_feedback() {
        let raw = r#"{
            "dialogue": "Fine, here's my license.",
            "feedback": {
                "professionalism": {"score": 2, "justification": "Polite."},
                "deEscalation": {"score": 5, "justification": "Calm tone."},
                "currentScore": 107
            }
        }"#;
        let turn = decode_structured_turn(raw).unwrap();
        assert_eq!(turn.dialogue, "Fine, here's my license.");
        assert_eq!(turn.feedback.unwrap().current_score, 107);
        assert!(turn.summary.is_none());
    }

    #[test]
    fn tolerates_code_fences() {
        let raw = "```json\n{\"dialogue\": \"ok\"}\n```";
        assert_eq!(decode_structured_turn(raw).unwrap().dialogue, "ok");
    }

    #[test]
    fn rejects_non_objects_and_empty_turns() {
        assert!(decode_structured_turn("[1, 2]").is_err());
        assert!(decode_structured_turn("{\"dialogue\": \"  \"}").is_err());
        assert!(decode_structured_turn("plain words").is_err());
    }

    #[test]
    fn decodes_wrapped_after_action_report() {
        let raw = r#"```json
{"afterActionReport": {
    "scenarioId": "rp-elderly-confused",
    "finalOutcome": "Margaret was escorted home.",
    "performanceScore": 91,
    "performanceGrade": "A-",
    "keyMetrics": {"deEscalationScore": 95, "legalProcedureScore": 80, "officerSafetyScore": 88, "contextualAwareness": 92},
    "keyStrengths": [{"id": "KS1", "text": "Spoke slowly and clearly."}],
    "areasForImprovement": ["Ask about medication sooner."],
    "criticalLearningPoints": [{"id": "CL1", "text": "Confusion is not defiance."}]
}, "error": null}
```"#;
        let report = decode_after_action(raw).unwrap();
        assert_eq!(report.final_score, 91);
        assert_eq!(report.performance_grade, "A-");
        assert_eq!(report.final_outcome, "Margaret was escorted home.");
        assert_eq!(report.key_metrics.unwrap().de_escalation_score, 95);
        assert_eq!(report.key_strengths, vec!["Spoke slowly and clearly."]);
        assert_eq!(report.areas_for_improvement, vec!["Ask about medication sooner."]);
        assert_eq!(report.critical_learning_points, vec!["Confusion is not defiance."]);
    }

    #[test]
    fn report_without_score_is_rejected() {
        assert!(decode_after_action(r#"{"performanceGrade": "B"}"#).is_err());
        assert!(decode_after_action("no json here").is_err());
    }
}
