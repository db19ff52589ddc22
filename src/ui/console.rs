use std::io::{self, BufRead, Write};

use anyhow::Result;

use crate::engine::engine::EngineHandle;
use crate::engine::protocol::EngineResponse;
use crate::engine::response_parser::{COMPLETE_MARKER, FEEDBACK_MARKER};
use crate::model::message::{Feedback, Message, Role, SummaryReport, ToneFeedback, ToneKind};
use crate::model::scenario::{ScenarioDefinition, Scoring};
use crate::model::session::SessionSnapshot;

fn signed(n: i32) -> String {
    if n > 0 {
        format!("+{n}")
    } else {
        n.to_string()
    }
}

pub fn render_message(msg: &Message) -> String {
    match msg.role {
        Role::User => format!("You: {}", msg.content),
        Role::Model => msg.display_text(),
    }
}

pub fn render_feedback(fb: &Feedback) -> String {
    format!(
        "COACH FEEDBACK\n  Professionalism: [{}] - {}\n  De-Escalation: [{}] - {}\n  Current Score: {}",
        signed(fb.professionalism.score),
        fb.professionalism.justification,
        signed(fb.de_escalation.score),
        fb.de_escalation.justification,
        fb.current_score
    )
}

pub fn render_tone(tone: &ToneFeedback) -> String {
    let label = match tone.kind {
        ToneKind::Positive => "Positive",
        ToneKind::Critique => "Critique",
        ToneKind::Informational => "Info",
    };
    format!("[{label}] {}", tone.message)
}

pub fn render_summary(title: &str, summary: &SummaryReport) -> String {
    let mut out = format!(
        "=== Scenario Complete: {} ===\nFinal Score: {}\nGrade: {}\n",
        title, summary.final_score, summary.performance_grade
    );
    if !summary.final_outcome.is_empty() {
        out.push_str(&format!("Outcome: {}\n", summary.final_outcome));
    }
    if let Some(m) = &summary.key_metrics {
        out.push_str(&format!(
            "De-escalation: {}  Legal procedure: {}  Officer safety: {}  Contextual awareness: {}\n",
            m.de_escalation_score,
            m.legal_procedure_score,
            m.officer_safety_score,
            m.contextual_awareness
        ));
    }

    out.push_str("Key Strengths:\n");
    list(&mut out, &summary.key_strengths);
    out.push_str("Areas for Improvement:\n");
    list(&mut out, &summary.areas_for_improvement);
    if !summary.critical_learning_points.is_empty() {
        out.push_str("Critical Learning Points:\n");
        list(&mut out, &summary.critical_learning_points);
    }
    out
}

fn list(out: &mut String, items: &[String]) {
    if items.is_empty() {
        out.push_str("  None\n");
    }
    for item in items {
        out.push_str(&format!("  • {item}\n"));
    }
}

pub fn render_status(snap: &SessionSnapshot) -> String {
    match snap.scoring {
        Scoring::Coached => format!("[Score: {}]", snap.score),
        Scoring::Stress => format!("[Subject stress: {}/10]", snap.stress_level),
    }
}

pub fn render_metrics(snap: &SessionSnapshot) -> String {
    let m = &snap.metrics;
    let techniques: Vec<&str> = m.technique_variety.iter().map(String::as_str).collect();
    format!(
        "Empathy: {}  Professionalism: {}  Effectiveness: {}\nAvg response: {}\nTechniques used: {}",
        m.empathy_score,
        m.professionalism_score,
        m.effectiveness_score,
        m.average_response_ms()
            .map(|ms| format!("{:.1}s", ms as f64 / 1000.0))
            .unwrap_or_else(|| "n/a".into()),
        if techniques.is_empty() {
            "none".to_string()
        } else {
            techniques.join(", ")
        }
    )
}

/// End of the streamed text that is safe to show: stops before any marker
/// and holds back a trailing partial marker.
fn preview_end(buf: &str) -> usize {
    let mut end = buf.len();
    for marker in [FEEDBACK_MARKER, COMPLETE_MARKER] {
        if let Some(i) = buf.find(marker) {
            end = end.min(i);
        }
        if let Some(k) = (1..marker.len()).rev().find(|&k| buf.ends_with(&marker[..k])) {
            end = end.min(buf.len() - k);
        }
    }
    end
}

/// Terminal front end. Prints only what changed since the last snapshot.
///
/// Streamed fragments are shown as a live preview of the spoken part only;
/// when the parsed message differs from the preview it is printed in full.
pub struct Console<W: Write> {
    out: W,
    title: String,
    shown: usize,
    epoch: u64,
    preview: bool,
    streamed: String,
    printed: usize,
    last: Option<SessionSnapshot>,
}

impl<W: Write> Console<W> {
    pub fn new(scenario: &ScenarioDefinition, out: W) -> Self {
        Self {
            out,
            title: scenario.title.clone(),
            shown: 0,
            epoch: 0,
            // Role-play replies gain narration and a speaker prefix after parsing.
            preview: scenario.scoring == Scoring::Coached,
            streamed: String::new(),
            printed: 0,
            last: None,
        }
    }

    /// JSON replies are never previewed.
    pub fn structured(mut self, structured: bool) -> Self {
        self.preview &= !structured;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn reset_stream(&mut self) {
        self.streamed.clear();
        self.printed = 0;
    }

    pub fn show_snapshot(&mut self, snap: SessionSnapshot) -> io::Result<()> {
        if snap.epoch != self.epoch {
            self.epoch = snap.epoch;
            self.shown = 0;
            self.reset_stream();
            writeln!(self.out, "\n--- scenario restarted ---")?;
        }

        for msg in snap.messages.iter().skip(self.shown) {
            if msg.is_placeholder() {
                break;
            }
            let previewed = self.streamed[..self.printed].trim();
            if msg.role == Role::Model && !previewed.is_empty() {
                let matches = previewed == msg.display_text().trim();
                writeln!(self.out)?;
                if !matches {
                    writeln!(self.out, "\n{}", render_message(msg))?;
                }
                self.reset_stream();
            } else {
                writeln!(self.out, "\n{}", render_message(msg))?;
            }
            if let Some(tone) = &msg.tone {
                writeln!(self.out, "{}", render_tone(tone))?;
            }
            if let Some(fb) = &msg.feedback {
                writeln!(self.out, "\n{}", render_feedback(fb))?;
            }
            self.shown += 1;
        }

        if !snap.pending {
            if self.printed > 0 {
                writeln!(self.out)?;
            }
            self.reset_stream();
        }

        if let Some(summary) = &snap.summary {
            writeln!(self.out, "\n{}", render_summary(&self.title, summary))?;
        } else if !snap.pending {
            writeln!(self.out, "{}", render_status(&snap))?;
        }

        self.last = Some(snap);
        self.out.flush()
    }

    pub fn show_chunk(&mut self, text: &str) -> io::Result<()> {
        if !self.preview {
            return Ok(());
        }
        self.streamed.push_str(text);

        let end = preview_end(&self.streamed).max(self.printed);
        if end > self.printed {
            if self.printed == 0 {
                writeln!(self.out)?;
            }
            write!(self.out, "{}", &self.streamed[self.printed..end])?;
            self.printed = end;
        }
        self.out.flush()
    }

    pub fn show_response(&mut self, resp: EngineResponse) -> io::Result<()> {
        match resp {
            EngineResponse::SessionUpdated(snap) => self.show_snapshot(snap),
            EngineResponse::PartialReply { text, .. } => self.show_chunk(&text),
            EngineResponse::InputIgnored { reason } => writeln!(self.out, "({reason})"),
            EngineResponse::ReplyDiscarded { .. } => Ok(()),
        }
    }

    pub fn show_stats(&mut self) -> io::Result<()> {
        match &self.last {
            Some(snap) => writeln!(self.out, "{}", render_metrics(snap)),
            None => writeln!(self.out, "No session yet."),
        }
    }
}

/// Reads officer lines from `input` until `/quit` or EOF.
pub fn run_repl<R: BufRead, W: Write>(
    handle: &EngineHandle,
    console: &mut Console<W>,
    input: R,
) -> Result<()> {
    // Initial snapshot published by the engine on start.
    console.show_response(handle.recv()?)?;

    for line in input.lines() {
        let line = line?;
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/stats" => {
                console.show_stats()?;
                continue;
            }
            "/restart" => handle.restart()?,
            "/end" => handle.end_scenario()?,
            text => handle.send_input(text)?,
        }

        loop {
            let resp = handle.recv()?;
            let done = match &resp {
                EngineResponse::SessionUpdated(snap) => !snap.pending,
                EngineResponse::PartialReply { .. } | EngineResponse::ReplyDiscarded { .. } => false,
                EngineResponse::InputIgnored { .. } => true,
            };
            console.show_response(resp)?;
            if done {
                break;
            }
        }
    }

    Ok(())
}
