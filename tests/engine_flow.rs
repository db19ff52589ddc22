use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use scenario_trainer::engine::engine::{EngineHandle, EngineOptions};
use scenario_trainer::engine::fallback::{error_line, StressBand, COACHED_APOLOGY};
use scenario_trainer::engine::llm_client::{GenerationRequest, TextModel};
use scenario_trainer::engine::protocol::EngineResponse;
use scenario_trainer::error::{Result, TrainerError};
use scenario_trainer::model::catalog::Catalog;
use scenario_trainer::model::message::{Role, ToneKind};
use scenario_trainer::model::scenario::{ScenarioDefinition, ScenarioType};
use scenario_trainer::model::session::SessionSnapshot;

const WAIT: Duration = Duration::from_secs(5);

/// Replays queued replies in order. `Err` entries become provider failures.
struct ScriptedModel {
    replies: Mutex<VecDeque<std::result::Result<Value, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(replies: Vec<std::result::Result<Value, String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

impl TextModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<Value> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(body)) => Err(TrainerError::Provider {
                provider: "scripted".into(),
                status: 500,
                body,
            }),
            None => Ok(json!("")),
        }
    }
}

/// Holds its first call until the test releases it.
struct GatedModel {
    gate: Mutex<Option<Receiver<()>>>,
}

impl GatedModel {
    fn new() -> (Arc<Self>, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        (
            Arc::new(Self {
                gate: Mutex::new(Some(rx)),
            }),
            tx,
        )
    }
}

impl TextModel for GatedModel {
    fn name(&self) -> &str {
        "gated"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<Value> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(rx) = gate {
            let _ = rx.recv();
        }
        if request.prompt.contains("first question") {
            Ok(json!({ "text": "stale reply" }))
        } else {
            Ok(json!({ "text": "fresh reply" }))
        }
    }
}

/// Emits the reply in two fragments.
struct StreamingModel;

impl TextModel for StreamingModel {
    fn name(&self) -> &str {
        "streaming"
    }

    fn generate(&self, _request: &GenerationRequest) -> Result<Value> {
        Ok(json!("Hello there."))
    }

    fn generate_stream(
        &self,
        _request: &GenerationRequest,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<String> {
        on_chunk("Hello ");
        on_chunk("there.");
        Ok("Hello there.".into())
    }
}

fn scenario(id: &str) -> ScenarioDefinition {
    Catalog::builtin().get(id).cloned().unwrap()
}

fn next(handle: &EngineHandle) -> EngineResponse {
    handle
        .recv_timeout(WAIT)
        .unwrap()
        .expect("engine did not answer in time")
}

fn next_snapshot(handle: &EngineHandle) -> SessionSnapshot {
    loop {
        if let EngineResponse::SessionUpdated(snap) = next(handle) {
            return snap;
        }
    }
}

/// Waits for the first snapshot with no reply outstanding.
fn settled(handle: &EngineHandle) -> SessionSnapshot {
    loop {
        let snap = next_snapshot(handle);
        if !snap.pending {
            return snap;
        }
    }
}

#[test]
fn initial_snapshot_holds_opening_line() {
    let s = scenario("deco-traffic-dui");
    let handle = EngineHandle::spawn(s.clone(), ScriptedModel::new(vec![]), EngineOptions::default());

    let snap = next_snapshot(&handle);
    assert_eq!(snap.epoch, 0);
    assert_eq!(snap.score, 100);
    assert_eq!(snap.messages.len(), 1);
    assert_eq!(snap.messages[0].id, "init-1");
    assert_eq!(snap.messages[0].content, s.initial_message);
}

#[test]
fn coached_feedback_updates_score() {
    let reply = "\"Fine, here's my license.\"\n\n**COACH FEEDBACK:**\n\
* **Professionalism:** [+2] - Courteous greeting.\n\
* **De-Escalation:** [+2] - Calm tone.\n\
* **Current Score:** [104]";
    let model = ScriptedModel::new(vec![Ok(json!({ "text": reply }))]);
    let handle = EngineHandle::spawn(scenario("deco-traffic-dui"), model.clone(), EngineOptions::default());
    next_snapshot(&handle);

    handle.send_input("Good evening, sir. May I see your license?").unwrap();
    let snap = settled(&handle);

    assert_eq!(snap.score, 104);
    assert_eq!(snap.messages.len(), 3);
    assert_eq!(snap.messages[1].role, Role::User);
    let answer = &snap.messages[2];
    assert_eq!(answer.content, "\"Fine, here's my license.\"");
    assert_eq!(answer.feedback.as_ref().unwrap().professionalism.score, 2);

    let prompts = model.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("* **Officer's Current Score:** 100"));
}

#[test]
fn summary_completes_session_and_blocks_input() {
    let reply = "**SCENARIO COMPLETE**\n* **Final Score:** 87\n* **Performance Grade:** Excellent";
    let handle = EngineHandle::spawn(
        scenario("deco-traffic-dui"),
        ScriptedModel::new(vec![Ok(json!(reply))]),
        EngineOptions::default(),
    );
    next_snapshot(&handle);

    handle.send_input("Thank you, you're free to go.").unwrap();
    let snap = settled(&handle);

    assert!(snap.complete);
    assert_eq!(snap.score, 87);
    let summary = snap.summary.unwrap();
    assert_eq!(summary.performance_grade, "Excellent");
    assert!(summary.key_strengths.is_empty());
    assert!(snap.messages.iter().all(|m| !m.is_placeholder()));
    assert_eq!(snap.messages.len(), 2);

    handle.send_input("One more thing").unwrap();
    assert!(matches!(next(&handle), EngineResponse::InputIgnored { .. }));
}

#[test]
fn invocation_failure_fills_apology() {
    let handle = EngineHandle::spawn(
        scenario("deco-domestic-verbal"),
        ScriptedModel::new(vec![Err("upstream unavailable".into())]),
        EngineOptions::default(),
    );
    next_snapshot(&handle);

    handle.send_input("Police, is everyone okay in there?").unwrap();
    let snap = settled(&handle);

    assert_eq!(snap.score, 100);
    let last = snap.messages.last().unwrap();
    assert_eq!(last.role, Role::Model);
    assert_eq!(last.content, COACHED_APOLOGY);
    assert!(last.feedback.is_none());
}

#[test]
fn empty_roleplay_reply_uses_canned_line() {
    let handle = EngineHandle::spawn(
        scenario("rp-elderly-confused"),
        ScriptedModel::new(vec![Ok(json!({ "text": "" }))]),
        EngineOptions::default(),
    );
    next_snapshot(&handle);

    handle
        .send_input("Good afternoon ma'am, is this your car parked here")
        .unwrap();
    let snap = settled(&handle);

    assert_eq!(snap.stress_level, 5);
    let last = snap.messages.last().unwrap();
    assert_eq!(last.narration.as_deref(), Some(StressBand::Medium.narrator()));
    assert!(last.content.starts_with("Oh... hello dear..."));
    assert!(last.display_text().starts_with(StressBand::Medium.narrator()));
    assert_eq!(last.tone.as_ref().unwrap().kind, ToneKind::Informational);
}

#[test]
fn roleplay_invocation_failure_uses_character_error_line() {
    let handle = EngineHandle::spawn(
        scenario("rp-elderly-confused"),
        ScriptedModel::new(vec![Err("quota exceeded".into())]),
        EngineOptions::default(),
    );
    next_snapshot(&handle);

    handle
        .send_input("Good afternoon ma'am, is this your car parked here")
        .unwrap();
    let pending = next_snapshot(&handle);
    assert!(pending.pending);
    let snap = settled(&handle);

    assert_eq!(snap.stress_level, pending.stress_level);
    let last = snap.messages.last().unwrap();
    assert_eq!(last.role, Role::Model);
    assert_eq!(last.content, error_line(ScenarioType::ElderlyConfused));
    assert!(last.narration.is_none());
    assert!(last.feedback.is_none());
}

#[test]
fn end_scenario_applies_after_action_report() {
    let report = json!({
        "finalOutcome": "Margaret was escorted home.",
        "performanceScore": 88,
        "performanceGrade": "B+",
        "keyMetrics": {
            "deEscalationScore": 90,
            "legalProcedureScore": 80,
            "officerSafetyScore": 85,
            "contextualAwareness": 92
        },
        "keyStrengths": [{ "id": "KS1", "text": "Patient tone" }],
        "areasForImprovement": ["Ask about medication"],
        "criticalLearningPoints": ["Confusion is not defiance"]
    });
    let model = ScriptedModel::new(vec![
        Ok(json!({ "text": "I think so, dear" })),
        Ok(json!({ "text": report.to_string() })),
    ]);
    let handle = EngineHandle::spawn(scenario("rp-elderly-confused"), model.clone(), EngineOptions::default());
    next_snapshot(&handle);

    handle.send_input("Ma'am, do you know where you are?").unwrap();
    settled(&handle);

    handle.end_scenario().unwrap();
    let snap = settled(&handle);

    assert!(snap.complete);
    assert_eq!(snap.score, 88);
    let summary = snap.summary.unwrap();
    assert_eq!(summary.performance_grade, "B+");
    assert_eq!(summary.final_outcome, "Margaret was escorted home.");
    assert_eq!(summary.key_metrics.unwrap().contextual_awareness, 92);
    assert_eq!(summary.key_strengths, vec!["Patient tone"]);
    assert!(snap.messages.iter().all(|m| !m.is_placeholder()));

    let prompts = model.prompts.lock().unwrap();
    assert!(prompts[1].contains("FULL CONVERSATION TRANSCRIPT"));
    assert!(prompts[1].contains("Officer: \"Ma'am, do you know where you are?\""));
    assert!(!prompts[1].contains("*The subject"));

    handle.send_input("Anything else?").unwrap();
    assert!(matches!(next(&handle), EngineResponse::InputIgnored { .. }));
}

#[test]
fn unusable_report_falls_back_to_local_metrics() {
    let handle = EngineHandle::spawn(
        scenario("rp-hostile-intoxicated"),
        ScriptedModel::new(vec![Err("timeout".into())]),
        EngineOptions::default(),
    );
    next_snapshot(&handle);

    handle.end_scenario().unwrap();
    let snap = settled(&handle);

    assert!(snap.complete);
    let summary = snap.summary.unwrap();
    assert_eq!(summary.final_score, 0);
    assert_eq!(summary.performance_grade, "F");
    assert!(!summary.final_outcome.is_empty());
}

#[test]
fn second_input_while_pending_is_ignored() {
    let (model, release) = GatedModel::new();
    let handle = EngineHandle::spawn(scenario("deco-traffic-dui"), model, EngineOptions::default());
    next_snapshot(&handle);

    handle.send_input("first question").unwrap();
    assert!(next_snapshot(&handle).pending);

    handle.send_input("are you there?").unwrap();
    match next(&handle) {
        EngineResponse::InputIgnored { reason } => assert!(reason.contains("pending")),
        other => panic!("expected InputIgnored, got {other:?}"),
    }

    release.send(()).unwrap();
    let snap = settled(&handle);
    assert_eq!(snap.messages.len(), 3);
    assert_eq!(snap.messages[2].content, "stale reply");
}

#[test]
fn reply_from_before_restart_is_discarded() {
    let (model, release) = GatedModel::new();
    let handle = EngineHandle::spawn(scenario("deco-traffic-dui"), model, EngineOptions::default());
    next_snapshot(&handle);

    handle.send_input("first question").unwrap();
    assert!(next_snapshot(&handle).pending);

    handle.restart().unwrap();
    let snap = next_snapshot(&handle);
    assert_eq!(snap.epoch, 1);
    assert!(!snap.pending);
    assert_eq!(snap.messages.len(), 1);

    release.send(()).unwrap();
    match next(&handle) {
        EngineResponse::ReplyDiscarded { epoch } => assert_eq!(epoch, 0),
        other => panic!("expected ReplyDiscarded, got {other:?}"),
    }

    handle.send_input("second question").unwrap();
    let snap = settled(&handle);
    assert_eq!(snap.epoch, 1);
    let contents: Vec<&str> = snap.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents[1..], ["second question", "fresh reply"]);
}

#[test]
fn streamed_fragments_are_forwarded() {
    let options = EngineOptions {
        structured: false,
        streaming: true,
    };
    let handle = EngineHandle::spawn(scenario("deco-traffic-dui"), Arc::new(StreamingModel), options);
    next_snapshot(&handle);

    handle.send_input("Evening, sir.").unwrap();

    let mut fragments = Vec::new();
    let snap = loop {
        match next(&handle) {
            EngineResponse::PartialReply { text, .. } => fragments.push(text),
            EngineResponse::SessionUpdated(snap) if !snap.pending => break snap,
            _ => {}
        }
    };

    assert_eq!(fragments, ["Hello ", "there."]);
    assert_eq!(snap.messages.last().unwrap().content, "Hello there.");
}

#[test]
fn structured_json_reply_is_applied() {
    let reply = json!({
        "candidates": [{ "content": { "parts": [{
            "text": "{\"dialogue\": \"Okay, okay.\", \"feedback\": {\"professionalism\": {\"score\": 5, \"justification\": \"Clear\"}, \"deEscalation\": {\"score\": 0, \"justification\": \"Neutral\"}, \"currentScore\": 105}, \"summary\": null}"
        }] } }]
    });
    let options = EngineOptions {
        structured: true,
        streaming: false,
    };
    let handle = EngineHandle::spawn(
        scenario("deco-traffic-dui"),
        ScriptedModel::new(vec![Ok(reply)]),
        options,
    );
    next_snapshot(&handle);

    handle.send_input("Step out of the car, please.").unwrap();
    let snap = settled(&handle);

    assert_eq!(snap.score, 105);
    assert_eq!(snap.messages.last().unwrap().content, "Okay, okay.");
}
