use crate::engine::fallback::StressBand;
use crate::engine::response_parser::FEEDBACK_MARKER;
use crate::model::message::{Message, Role};
use crate::model::scenario::{HistoryPolicy, ScenarioDefinition, Scoring};

/// Builds the full prompt sent to the LLM.
/// This struct only formats text: no parsing, no networking, no session logic.
pub struct PromptBuilder;

impl PromptBuilder {
    /// `history` excludes the officer line being answered.
    pub fn build(
        scenario: &ScenarioDefinition,
        history: &[Message],
        officer_input: &str,
        gauge: i32,
        structured: bool,
    ) -> String {
        match scenario.scoring {
            Scoring::Coached => {
                CoachedPromptBuilder::build(scenario, history, officer_input, gauge, structured)
            }
            Scoring::Stress => {
                RoleplayPromptBuilder::build(scenario, history, officer_input, gauge, structured)
            }
        }
    }

    /// Asks for a JSON after-action report over the whole transcript.
    pub fn after_action(scenario: &ScenarioDefinition, transcript: &[Message]) -> String {
        let mut prompt = String::new();

        prompt.push_str(
            "You are an AI training analyst for Florida law enforcement. \
The following simulation has concluded.\n\n",
        );
        prompt.push_str(&format!("SCENARIO: {}\n", scenario.title));
        prompt.push_str(&format!("CHARACTER: {}\n", scenario.persona));
        if !scenario.skills.is_empty() {
            prompt.push_str(&format!("SKILLS UNDER TEST: {}\n", scenario.skills.join(", ")));
        }

        prompt.push_str("\nFULL CONVERSATION TRANSCRIPT:\n");
        push_history_lines(&mut prompt, transcript, HistoryPolicy::unbounded(), "Officer", "Subject");

        prompt.push_str(
            "\nAnalyze the officer's performance across the entire transcript and respond with a \
single JSON object and nothing else:\n\
{\"finalOutcome\": string, \"performanceScore\": int 0-100, \"performanceGrade\": string (A+, B-, ...), \
\"keyMetrics\": {\"deEscalationScore\": int, \"legalProcedureScore\": int, \"officerSafetyScore\": int, \
\"contextualAwareness\": int}, \"keyStrengths\": [string], \"areasForImprovement\": [string], \
\"criticalLearningPoints\": [string]}\n\
List one or two items in each array.\n",
        );

        prompt
    }
}

struct CoachedPromptBuilder;

impl CoachedPromptBuilder {
    fn build(
        scenario: &ScenarioDefinition,
        history: &[Message],
        officer_input: &str,
        score: i32,
        structured: bool,
    ) -> String {
        let mut prompt = String::new();

        push_coach_master_prompt(&mut prompt);
        push_scenario_section(&mut prompt, scenario);

        prompt.push_str("## CURRENT STATE\n");
        prompt.push_str(&format!("* **Officer's Current Score:** {}\n", score));
        prompt.push_str("* **Conversation History:**\n");
        push_history_lines(&mut prompt, history, scenario.history_policy(), "Officer", "NPC");
        prompt.push('\n');

        push_coach_task(&mut prompt, officer_input);
        if structured {
            push_structured_contract(&mut prompt, true);
        }
        prompt.push_str("\nYour response:\n");

        prompt
    }
}

struct RoleplayPromptBuilder;

impl RoleplayPromptBuilder {
    fn build(
        scenario: &ScenarioDefinition,
        history: &[Message],
        officer_input: &str,
        stress: i32,
        structured: bool,
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str(&scenario.system_prompt);
        prompt.push_str("\n\n");

        prompt.push_str(&format!("SCENARIO: {}\n", scenario.title));
        prompt.push_str(&format!("YOUR CHARACTER: {}\n", scenario.persona));
        if !scenario.situation.is_empty() {
            prompt.push_str(&format!("SITUATION: {}\n", scenario.situation));
        }
        prompt.push_str(&format!(
            "CURRENT STRESS LEVEL: {}/10 ({})\n\n",
            stress,
            stress_description(StressBand::from_level(stress))
        ));

        if !history.is_empty() {
            prompt.push_str("RECENT CONVERSATION:\n");
            push_history_lines(&mut prompt, history, scenario.history_policy(), "Officer", "You");
            prompt.push('\n');
        }

        prompt.push_str(&format!("The officer now says: \"{}\"\n\n", officer_input.trim()));

        push_roleplay_reminder(&mut prompt);
        if structured {
            push_structured_contract(&mut prompt, false);
        }

        prompt
    }
}

fn stress_description(band: StressBand) -> &'static str {
    match band {
        StressBand::Low => "calm, able to cooperate",
        StressBand::Medium => "uneasy, guarded",
        StressBand::High => "highly agitated, struggling to cooperate",
    }
}

fn push_coach_master_prompt(prompt: &mut String) {
    prompt.push_str(
        "## ROLE & GOAL\n\
You are 'DECO,' the Dynamic Engagement & Crisis Officer simulation engine. You are an interactive \
training partner for Florida law enforcement officers. You play every non-player character (NPC) \
in the scenario and give real-time, constructive feedback on the officer's responses.\n\n\
## CORE DIRECTIVES\n\
- Interactive dialogue: the officer gives a response, you reply in character as the NPC.\n\
- Dynamic NPCs: give characters distinct personalities, emotional states and motivations. Never \
make reactions identical across playthroughs.\n\
- Real-time feedback: after each officer response, provide a COACH FEEDBACK block analyzing the \
officer's last input on two axes, Professionalism and De-escalation.\n\
- Context-aware scoring: maintain a running score for the whole scenario.\n\
- Florida specificity: ground scenarios and legal references in Florida law.\n\n\
## FEEDBACK FORMAT\n\
After the NPC response, output exactly:\n\
**COACH FEEDBACK:**\n\
* **Professionalism:** [score modifier, e.g. +2] - [brief justification]\n\
* **De-Escalation:** [score modifier, e.g. -3] - [brief justification]\n\
* **Current Score:** [updated score]\n\n\
## SCORING MATRIX\n\
Every scenario starts at 100 points.\n\
* +5 (Excellent): exemplary communication, textbook de-escalation, builds rapport.\n\
* +2 (Good): effective and professional language.\n\
* 0 (Neutral): no significant impact.\n\
* -3 (Needs Improvement): unintentionally escalating or unprofessional.\n\
* -5 (Poor): directly confrontational, illegal, or dangerously unprofessional.\n\n\
## CONCLUSION & SUMMARY REPORT\n\
When the scenario reaches a logical conclusion, respond ONLY with:\n\
**SCENARIO COMPLETE**\n\
* **Final Score:** [final numerical score]\n\
* **Performance Grade:** [Excellent, Good, Needs Improvement, Poor]\n\
* **Key Strengths:**\n    \
* [what the officer did well]\n\
* **Areas for Improvement:**\n    \
* [actionable advice]\n\n",
    );
}

fn push_scenario_section(prompt: &mut String, scenario: &ScenarioDefinition) {
    prompt.push_str("## CURRENT SCENARIO\n");
    prompt.push_str(&format!("* **Title:** {}\n", scenario.title));
    if !scenario.location.is_empty() {
        prompt.push_str(&format!("* **Location:** {}\n", scenario.location));
    }
    if !scenario.situation.is_empty() {
        prompt.push_str(&format!("* **Situation:** {}\n", scenario.situation));
    }
    prompt.push_str(&format!("* **Initial Prompt:** {}\n", scenario.initial_message));
    if !scenario.skills.is_empty() {
        prompt.push_str(&format!(
            "* **Key Skills to Test:** {}\n",
            scenario.skills.join(", ")
        ));
    }
    if !scenario.system_prompt.is_empty() {
        prompt.push_str(&format!("* **NPC Notes:** {}\n", scenario.system_prompt));
    }
    prompt.push('\n');
}

fn push_coach_task(prompt: &mut String, officer_input: &str) {
    prompt.push_str("## YOUR TASK\n");
    prompt.push_str(&format!(
        "The officer has just said: \"{}\"\n\n",
        officer_input.trim()
    ));
    prompt.push_str(
        "1. As the NPC, provide a realistic, in-character response.\n\
2. After the NPC response, provide the **COACH FEEDBACK** block analyzing the officer's last message.\n\
3. Calculate the new score and include it in the feedback block.\n\
4. If the scenario has reached a logical conclusion, provide the **SCENARIO COMPLETE** summary \
instead of the NPC/feedback response.\n",
    );
}

fn push_roleplay_reminder(prompt: &mut String) {
    prompt.push_str(
        "Rules:\n\
- Stay in character and answer in one to three sentences.\n\
- Let your stress level shape tone and cooperation.\n\
- Never speak or act for the officer.\n\
- Do not add coaching, scores or explanations.\n",
    );
}

fn push_structured_contract(prompt: &mut String, coached: bool) {
    prompt.push_str("\n## RESPONSE FORMAT\nRespond with a single JSON object and nothing else:\n");
    if coached {
        prompt.push_str(
            "{\"dialogue\": string, \
\"feedback\": {\"professionalism\": {\"score\": int, \"justification\": string}, \
\"deEscalation\": {\"score\": int, \"justification\": string}, \"currentScore\": int}, \
\"summary\": null | {\"finalScore\": int, \"performanceGrade\": string, \
\"keyStrengths\": [string], \"areasForImprovement\": [string]}}\n\
Set \"summary\" only when the scenario has concluded.\n",
        );
    } else {
        prompt.push_str("{\"dialogue\": string}\n");
    }
}

/// Renders `speaker: "content"` lines, honoring the scenario's history window.
fn push_history_lines(
    prompt: &mut String,
    history: &[Message],
    policy: HistoryPolicy,
    officer: &str,
    npc: &str,
) {
    let start = policy
        .max_messages
        .map(|max| history.len().saturating_sub(max))
        .unwrap_or(0);

    for msg in &history[start..] {
        let speaker = match msg.role {
            Role::User => officer,
            Role::Model => npc,
        };
        let content = spoken_part(&msg.content);
        let content = match policy.max_chars {
            Some(max) => content.chars().take(max).collect::<String>(),
            None => content.to_string(),
        };
        prompt.push_str(&format!("{}: \"{}\"\n", speaker, content));
    }
}

/// Drops a trailing COACH FEEDBACK block so only the spoken line is replayed.
fn spoken_part(content: &str) -> &str {
    content
        .split(FEEDBACK_MARKER)
        .next()
        .unwrap_or(content)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::response_parser::{parse_reply, ParseContext, ParsedReply};
    use crate::model::catalog::Catalog;
    use crate::model::session::Session;

    fn scenario(id: &str) -> ScenarioDefinition {
        Catalog::builtin().get(id).cloned().unwrap()
    }

    #[test]
    fn coached_prompt_has_state_history_and_task() {
        let s = scenario("deco-traffic-dui");
        let history = vec![
            Message::initial(s.initial_message.clone()),
            Message::user("Good evening, sir."),
            Message::initial("What do you want?\n**COACH FEEDBACK:**\n* **Professionalism:** [+2] - ok"),
        ];
        let prompt = PromptBuilder::build(&s, &history, "License and registration, please.", 97, false);

        assert!(prompt.contains("## ROLE & GOAL"));
        assert!(prompt.contains("* **Officer's Current Score:** 97"));
        assert!(prompt.contains("Officer: \"Good evening, sir.\""));
        assert!(prompt.contains("NPC: \"What do you want?\""));
        assert!(!prompt.contains("[+2] - ok"));
        assert!(prompt.contains("The officer has just said: \"License and registration, please.\""));
        assert!(prompt.contains("* **Key Skills to Test:** Calm, patient tone"));
        assert!(!prompt.contains("## RESPONSE FORMAT"));
    }

    #[test]
    fn roleplay_prompt_windows_and_truncates_history() {
        let s = scenario("rp-elderly-confused");
        let mut history = vec![Message::initial("first line that should fall out of the window")];
        for i in 0..6 {
            history.push(Message::user(format!("question {i}")));
        }
        history.push(Message::user("x".repeat(400)));

        let prompt = PromptBuilder::build(&s, &history, "Ma'am, are you okay?", 5, false);

        assert!(prompt.starts_with("You are Margaret"));
        assert!(prompt.contains("CURRENT STRESS LEVEL: 5/10 (uneasy, guarded)"));
        assert!(!prompt.contains("first line that should fall out"));
        assert!(!prompt.contains("question 0"));
        assert!(prompt.contains("question 1"));
        assert!(prompt.contains(&format!("Officer: \"{}\"", "x".repeat(150))));
        assert!(!prompt.contains(&"x".repeat(151)));
        assert!(prompt.contains("The officer now says: \"Ma'am, are you okay?\""));
    }

    #[test]
    fn roleplay_history_replays_speech_without_narration() {
        let s = scenario("rp-elderly-confused");
        let mut session = Session::new(s.clone());
        session.append_user_message("Good afternoon ma'am, is this your car").unwrap();
        let id = session.append_placeholder_model_message().unwrap();

        let ctx = ParseContext::for_session(&session, false);
        let ParsedReply::Turn(reply) = parse_reply("I think so, dear", &ctx).reply else {
            panic!("expected turn");
        };
        session.fill_model_message(&id, reply).unwrap();
        session.append_user_message("Do you know where you live?").unwrap();

        let prompt = PromptBuilder::build(
            &s,
            session.transcript_for_prompt(),
            "Do you know where you live?",
            session.gauge(),
            false,
        );

        assert!(!prompt.contains("*The subject"));
        assert!(prompt.contains("You: \"Elderly Confused: \"I think so, dear\"\"\n"));
    }

    #[test]
    fn after_action_prompt_lists_whole_transcript() {
        let s = scenario("rp-hostile-intoxicated");
        let mut history = vec![Message::initial("What do you want?")];
        for i in 0..10 {
            history.push(Message::user(format!("line {i}")));
        }
        let prompt = PromptBuilder::after_action(&s, &history);

        assert!(prompt.contains("Subject: \"What do you want?\""));
        assert!(prompt.contains("Officer: \"line 0\""));
        assert!(prompt.contains("Officer: \"line 9\""));
        assert!(prompt.contains("\"performanceScore\""));
    }

    #[test]
    fn structured_mode_appends_json_contract() {
        let s = scenario("deco-domestic-verbal");
        let prompt = PromptBuilder::build(&s, &[], "Hello", 100, true);
        assert!(prompt.contains("## RESPONSE FORMAT"));
        assert!(prompt.contains("\"currentScore\": int"));
    }
}
