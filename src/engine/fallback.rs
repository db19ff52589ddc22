use crate::model::scenario::ScenarioType;

/// Canned lines used when the model says nothing usable, ordered by escalating severity.
pub fn canned_lines(kind: ScenarioType) -> &'static [&'static str] {
    match kind {
        ScenarioType::MentalHealthCrisis => &[
            "*looking confused and distressed* I'm sorry, I'm having trouble focusing right now. What did you ask?",
            "*rocking slowly* I... I heard you. I just can't keep my thoughts straight.",
            "*voice shaking* Stop, please. Everything is too loud right now.",
        ],
        ScenarioType::HostileIntoxicated => &[
            "*swaying slightly* What? I didn't catch that... what are you trying to say?",
            "*squinting* Say that again, slower. You're talkin' too fast.",
            "*raising voice* I don't gotta listen to this! What do you want?",
        ],
        ScenarioType::EmotionallyDistraught => &[
            "*wiping tears* I'm sorry, I'm just so overwhelmed. Could you repeat that?",
            "*sniffling* I'm trying, I really am. What did you need?",
            "*sobbing* I can't... I can't do this right now.",
        ],
        ScenarioType::JuvenileContact => &[
            "*nervously fidgeting* I'm sorry, I'm really confused right now. Are you going to call my parents?",
            "*looking at the ground* I don't know... what am I supposed to say?",
            "*panicking* I didn't do anything! Why is everyone looking at me?",
        ],
        ScenarioType::ElderlyConfused => &[
            "*looking puzzled* I'm sorry dear, my mind isn't as sharp as it used to be. What was that?",
            "Oh... hello dear... I'm sorry, what were we talking about?",
            "*clutching her purse* Who are you? Where is my husband? I want to go home.",
        ],
        ScenarioType::LanguageBarrier => &[
            "*struggling with English* Sorry, sorry... no understand good. You speak slow please?",
            "*shaking head* No entiendo... more slow, please.",
            "*frustrated* I no understand! Why you shout?",
        ],
        ScenarioType::AgitatedUncooperative => &[
            "*frustrated* This whole day has been a disaster. What exactly do you want from me?",
            "*crossing arms* I already told you. Are you even listening?",
            "*pacing* I'm done talking. Either arrest me or leave me alone!",
        ],
        ScenarioType::DomesticDispute => &[
            "*defensive* Look, can we just handle this quietly? I don't want the whole neighborhood involved.",
            "*glancing toward the apartment* It's nothing. We were just arguing, that's all.",
            "*shouting past you* Tell them! Tell them it was you who started it!",
        ],
        ScenarioType::CalmCooperative => &[
            "I'm sorry, I got a bit distracted. Could you repeat your question?",
            "Sure, I can try to explain that again.",
            "Honestly, I'm starting to feel a little uncomfortable. Is something wrong?",
        ],
        ScenarioType::NervousCitizen => &[
            "*anxiously* I'm sorry, I'm just really nervous. What did you need to know?",
            "*hands trembling* Am I in trouble? I didn't mean to do anything wrong.",
            "*breathing fast* I think I need to sit down. This is too much.",
        ],
        ScenarioType::BusinessComplaint => &[
            "*impatiently* Sorry, I'm just frustrated with this whole situation. What were you asking?",
            "*tapping the counter* I've been waiting for an hour. Can we get to the point?",
            "*pointing at the door* I want that person out of my store, now!",
        ],
        ScenarioType::DeceptiveEvasive => &[
            "*hesitating* Uh... I'm not sure I understand what you're asking exactly.",
            "*avoiding eye contact* I don't really remember. It was a while ago.",
            "*folding arms* I think I want a lawyer before I say anything else.",
        ],
        ScenarioType::General => GENERIC_LINES,
    }
}

const GENERIC_LINES: &[&str] = &[
    "I'm here. What did you need to talk to me about?",
    "Sorry, could you say that again?",
    "*shifting uneasily* I... I don't know what you want me to say.",
];

/// Picks a variant by `gauge / 4`, clamped to the table.
pub fn canned_line(kind: ScenarioType, gauge: i32) -> &'static str {
    let lines = canned_lines(kind);
    let index = (gauge.max(0) / 4) as usize;
    lines[index.min(lines.len() - 1)]
}

/// In-character line shown when the model call itself failed.
pub fn error_line(kind: ScenarioType) -> &'static str {
    match kind {
        ScenarioType::MentalHealthCrisis => {
            "*becoming more agitated* I can't... I can't think straight right now. Everything's so confusing."
        }
        ScenarioType::HostileIntoxicated => {
            "*slurring* What the hell is going on? I can't... this doesn't make sense."
        }
        ScenarioType::EmotionallyDistraught => {
            "*breaking down* I'm sorry, I just can't handle any more right now."
        }
        ScenarioType::JuvenileContact => {
            "*panic in voice* Oh no, oh no... am I in big trouble? Is something wrong with the system?"
        }
        ScenarioType::ElderlyConfused => {
            "*very confused* I don't understand what's happening. Is everything alright, officer?"
        }
        ScenarioType::LanguageBarrier => "*frustrated* No comprendo... system no work? Computer broken?",
        ScenarioType::AgitatedUncooperative => {
            "*angry* Great, now even the computer's not working! This day just keeps getting worse!"
        }
        ScenarioType::DomesticDispute => {
            "*worried* Is there a problem with the system? Are you recording this?"
        }
        ScenarioType::CalmCooperative => {
            "I'm sorry, there seems to be a technical issue. Should we try again?"
        }
        ScenarioType::NervousCitizen => {
            "*very anxiously* Oh no, did I break something? I didn't mean to cause any problems!"
        }
        ScenarioType::BusinessComplaint => {
            "*frustrated* Now even the technology isn't working? This is exactly the kind of thing I'm dealing with!"
        }
        ScenarioType::DeceptiveEvasive => "*suspicious* Is this some kind of trick? Why isn't it working?",
        ScenarioType::General => {
            "I apologize, I'm having difficulty responding right now. Could you try asking again?"
        }
    }
}

pub const COACHED_APOLOGY: &str =
    "I'm sorry, there was a system error. Please try again or restart the scenario.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StressBand {
    Low,
    Medium,
    High,
}

impl StressBand {
    pub fn from_level(level: i32) -> Self {
        if level >= 7 {
            StressBand::High
        } else if level >= 4 {
            StressBand::Medium
        } else {
            StressBand::Low
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            StressBand::Low => "low_stress",
            StressBand::Medium => "medium_stress",
            StressBand::High => "high_stress",
        }
    }

    pub fn narrator(&self) -> &'static str {
        match self {
            StressBand::Low => "*The subject appears calm and is listening closely.*",
            StressBand::Medium => "*The subject seems uneasy, glancing around before answering.*",
            StressBand::High => "*The subject is visibly agitated, breathing fast and avoiding eye contact.*",
        }
    }
}
