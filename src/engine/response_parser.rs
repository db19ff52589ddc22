use once_cell::sync::Lazy;
use regex::Regex;

use crate::engine::fallback::{canned_line, StressBand};
use crate::model::llm_decode::{decode_after_action, decode_structured_turn};
use crate::model::message::{Feedback, Reply, ScoreDelta, SummaryReport};
use crate::model::scenario::{ScenarioType, Scoring};
use crate::model::session::Session;

pub const COMPLETE_MARKER: &str = "**SCENARIO COMPLETE**";
pub const FEEDBACK_MARKER: &str = "**COACH FEEDBACK:**";

static FINAL_SCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*[ \t]*\*\*Final Score:\*\*[ \t]*\[?(-?\d+)").unwrap());
static GRADE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*[ \t]*\*\*Performance Grade:\*\*[ \t]*(.*)").unwrap());
static STRENGTHS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\*[ \t]*\*\*Key Strengths:\*\*[ \t]*\r?\n((?:[ \t]+[*-][ \t].*\r?\n?)*)").unwrap()
});
static IMPROVEMENTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\*[ \t]*\*\*Areas for Improvement:\*\*[ \t]*\r?\n((?:[ \t]+[*-][ \t].*\r?\n?)*)")
        .unwrap()
});

static PROFESSIONALISM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\*[ \t]*\*\*Professionalism:\*\*[ \t]*\[?([+-]?\d+)\]?.*?-[ \t]+(.+)").unwrap()
});
static DE_ESCALATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\*[ \t]*\*\*De-Escalation:\*\*[ \t]*\[?([+-]?\d+)\]?.*?-[ \t]+(.+)").unwrap()
});
static CURRENT_SCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*[ \t]*\*\*Current Score:\*\*[ \t]*\[?(-?\d+)").unwrap());

/// What the parser needs to know about the session at reply time.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext {
    pub scenario_type: ScenarioType,
    pub scoring: Scoring,
    /// Score (coached) or stress level (role-play).
    pub gauge: i32,
    /// Whether a JSON reply was requested.
    pub structured: bool,
}

impl ParseContext {
    pub fn for_session(session: &Session, structured: bool) -> Self {
        let scenario = session.scenario();
        Self {
            scenario_type: scenario.scenario_type,
            scoring: scenario.scoring,
            gauge: session.gauge(),
            structured,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReply {
    Summary(SummaryReport),
    Turn(Reply),
}

/// Which rung of the ladder produced the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseTier {
    Structured,
    Complete,
    FeedbackAttached,
    PlainDialogue,
    EmptyFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    pub reply: ParsedReply,
    pub tier: ParseTier,
}

impl ParseOutcome {
    fn turn(mut reply: Reply, feedback: Option<Feedback>, tier: ParseTier) -> Self {
        reply.feedback = feedback;
        Self {
            reply: ParsedReply::Turn(reply),
            tier,
        }
    }
}

/// Turns a free-text model reply into exactly one of a summary or a turn.
///
/// Precedence is fixed: structured JSON (when requested), then the
/// completion marker, then the feedback marker, then plain dialogue, and
/// finally a canned line when nothing usable is left.
pub fn parse_reply(raw: &str, ctx: &ParseContext) -> ParseOutcome {
    let text = raw.trim();

    if text.is_empty() {
        tracing::warn!(scenario_type = %ctx.scenario_type, "empty model reply; using canned line");
        return fallback(ctx);
    }

    if ctx.structured {
        match decode_structured_turn(text) {
            Ok(turn) => {
                if let Some(summary) = turn.summary {
                    return ParseOutcome {
                        reply: ParsedReply::Summary(summary),
                        tier: ParseTier::Structured,
                    };
                }
                let reply = present(turn.dialogue.trim(), ctx);
                return ParseOutcome::turn(reply, turn.feedback, ParseTier::Structured);
            }
            Err(e) => {
                tracing::warn!("structured reply rejected ({e}); falling back to text markers");
            }
        }
    }

    if text.contains(COMPLETE_MARKER) {
        return ParseOutcome {
            reply: ParsedReply::Summary(parse_summary(text)),
            tier: ParseTier::Complete,
        };
    }

    if let Some(index) = text.find(FEEDBACK_MARKER) {
        let narrative = text[..index].trim();
        match parse_feedback(&text[index..]) {
            Some(feedback) => {
                let reply = if narrative.is_empty() {
                    tracing::warn!("feedback block without dialogue; using canned line");
                    canned(ctx)
                } else {
                    present(narrative, ctx)
                };
                return ParseOutcome::turn(reply, Some(feedback), ParseTier::FeedbackAttached);
            }
            None => {
                tracing::warn!("malformed COACH FEEDBACK block; showing reply as plain text");
            }
        }
    }

    ParseOutcome::turn(present(text, ctx), None, ParseTier::PlainDialogue)
}

fn fallback(ctx: &ParseContext) -> ParseOutcome {
    ParseOutcome::turn(canned(ctx), None, ParseTier::EmptyFallback)
}

fn canned(ctx: &ParseContext) -> Reply {
    let line = canned_line(ctx.scenario_type, ctx.gauge);
    match ctx.scoring {
        Scoring::Coached => Reply::plain(line),
        Scoring::Stress => narrate(line.to_string(), ctx.gauge),
    }
}

/// Role-play replies get a speaker prefix and a stress-band narrator line.
fn present(dialogue: &str, ctx: &ParseContext) -> Reply {
    match ctx.scoring {
        Scoring::Coached => Reply::plain(dialogue),
        Scoring::Stress => {
            let spoken = if !dialogue.contains(':') && !dialogue.starts_with('*') {
                format!("{}: \"{}\"", ctx.scenario_type.display_name(), dialogue)
            } else {
                dialogue.to_string()
            };
            narrate(spoken, ctx.gauge)
        }
    }
}

/// Narration stays out of `dialogue` so it is never replayed as speech.
fn narrate(dialogue: String, level: i32) -> Reply {
    let band = StressBand::from_level(level);
    tracing::debug!(band = band.key(), level, "narrating role-play reply");
    Reply {
        dialogue,
        narration: Some(band.narrator().to_string()),
        feedback: None,
    }
}

/// After-action replies: a JSON report first, then a SCENARIO COMPLETE block.
/// `None` when neither is usable.
pub fn parse_report(raw: &str) -> Option<SummaryReport> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    match decode_after_action(text) {
        Ok(report) => return Some(report),
        Err(e) => tracing::warn!("after-action report rejected ({e}); trying text markers"),
    }
    text.contains(COMPLETE_MARKER).then(|| parse_summary(text))
}

/// Missing fields degrade to zero or empty; this never fails.
pub fn parse_summary(text: &str) -> SummaryReport {
    let final_score = FINAL_SCORE
        .captures(text)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0);

    let performance_grade = GRADE
        .captures(text)
        .map(|c| {
            c[1].trim()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .trim()
                .to_string()
        })
        .unwrap_or_default();

    SummaryReport {
        final_score,
        performance_grade,
        key_strengths: bullet_list(&STRENGTHS, text),
        areas_for_improvement: bullet_list(&IMPROVEMENTS, text),
        ..SummaryReport::default()
    }
}

fn bullet_list(re: &Regex, text: &str) -> Vec<String> {
    let Some(caps) = re.captures(text) else {
        return Vec::new();
    };
    caps[1]
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(['*', '-'])
                .trim()
                .to_string()
        })
        .filter(|item| !item.is_empty())
        .collect()
}

/// All three fields must match or no feedback is produced.
pub fn parse_feedback(block: &str) -> Option<Feedback> {
    let professionalism = PROFESSIONALISM.captures(block)?;
    let de_escalation = DE_ESCALATION.captures(block)?;
    let current = CURRENT_SCORE.captures(block)?;

    Some(Feedback {
        professionalism: ScoreDelta {
            score: professionalism[1].parse().ok()?,
            justification: professionalism[2].trim().to_string(),
        },
        de_escalation: ScoreDelta {
            score: de_escalation[1].parse().ok()?,
            justification: de_escalation[2].trim().to_string(),
        },
        current_score: current[1].parse().ok()?,
    })
}
