use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Persona tag driving canned fallback lines and the character-name prefix.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, EnumIter, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(from = "String", into = "String")]
pub enum ScenarioType {
    MentalHealthCrisis,
    HostileIntoxicated,
    EmotionallyDistraught,
    JuvenileContact,
    ElderlyConfused,
    LanguageBarrier,
    AgitatedUncooperative,
    DomesticDispute,
    CalmCooperative,
    NervousCitizen,
    BusinessComplaint,
    DeceptiveEvasive,
    General,
}

impl ScenarioType {
    /// Accepts `elderly-confused`, `Elderly_Confused`, etc. Unknown tags map to `General`.
    pub fn from_tag(tag: &str) -> Self {
        let normalized = tag.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        normalized.parse().unwrap_or(ScenarioType::General)
    }

    /// `elderly_confused` -> `Elderly Confused`
    pub fn display_name(&self) -> String {
        if *self == ScenarioType::General {
            return "Character".into();
        }
        self.as_ref()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for ScenarioType {
    fn default() -> Self {
        ScenarioType::General
    }
}

impl From<String> for ScenarioType {
    fn from(tag: String) -> Self {
        ScenarioType::from_tag(&tag)
    }
}

impl From<ScenarioType> for String {
    fn from(kind: ScenarioType) -> Self {
        kind.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    /// Running score with per-turn COACH FEEDBACK and a final summary.
    Coached,
    /// Persona role-play tracked by a 1..=10 stress gauge.
    Stress,
}

impl Scoring {
    pub fn default_score(&self) -> i32 {
        match self {
            Scoring::Coached => 100,
            Scoring::Stress => 5,
        }
    }
}

/// Transcript window used when assembling prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HistoryPolicy {
    pub max_messages: Option<usize>,
    pub max_chars: Option<usize>,
}

impl HistoryPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn roleplay() -> Self {
        Self {
            max_messages: Some(6),
            max_chars: Some(150),
        }
    }

    pub fn for_scoring(scoring: Scoring) -> Self {
        match scoring {
            Scoring::Coached => Self::unbounded(),
            Scoring::Stress => Self::roleplay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub id: String,
    pub title: String,
    pub persona: String,
    pub system_prompt: String,
    pub initial_message: String,
    #[serde(default)]
    pub scenario_type: ScenarioType,
    pub scoring: Scoring,

    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub situation: String,
    #[serde(default)]
    pub skills: Vec<String>,

    /// Overrides the scoring mode's default starting score.
    #[serde(default)]
    pub default_score: Option<i32>,
    #[serde(default)]
    pub history: Option<HistoryPolicy>,
}

impl ScenarioDefinition {
    pub fn starting_score(&self) -> i32 {
        self.default_score
            .unwrap_or_else(|| self.scoring.default_score())
    }

    pub fn history_policy(&self) -> HistoryPolicy {
        self.history
            .unwrap_or_else(|| HistoryPolicy::for_scoring(self.scoring))
    }
}
