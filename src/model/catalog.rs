use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::scenario::{ScenarioDefinition, ScenarioType, Scoring};

/// Static scenario records, keyed by id.
#[derive(Debug, Clone)]
pub struct Catalog {
    scenarios: BTreeMap<String, ScenarioDefinition>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    List(Vec<ScenarioDefinition>),
    Wrapped { scenarios: Vec<ScenarioDefinition> },
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    pub fn builtin() -> Self {
        let mut catalog = Self {
            scenarios: BTreeMap::new(),
        };
        for scenario in builtin_scenarios() {
            catalog.insert(scenario);
        }
        catalog
    }

    pub fn insert(&mut self, scenario: ScenarioDefinition) {
        self.scenarios.insert(scenario.id.clone(), scenario);
    }

    /// Merges a JSON file (a list, or `{ "scenarios": [...] }`) over the current set.
    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading scenario file {}", path.display()))?;
        let parsed: CatalogFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing scenario file {}", path.display()))?;

        let list = match parsed {
            CatalogFile::List(list) => list,
            CatalogFile::Wrapped { scenarios } => scenarios,
        };

        let count = list.len();
        for scenario in list {
            tracing::debug!(id = %scenario.id, "loaded scenario from file");
            self.insert(scenario);
        }
        Ok(count)
    }

    pub fn get(&self, id: &str) -> Option<&ScenarioDefinition> {
        self.scenarios.get(id)
    }

    pub fn list(&self) -> impl Iterator<Item = &ScenarioDefinition> {
        self.scenarios.values()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

fn builtin_scenarios() -> Vec<ScenarioDefinition> {
    vec![
        ScenarioDefinition {
            id: "deco-traffic-dui".into(),
            title: "Failure to Maintain Lane on US-1".into(),
            persona: "Intoxicated driver".into(),
            system_prompt: String::new(),
            initial_message: "Dispatch: You have stopped a silver sedan on US-1 near Orange Ave \
                after watching it drift across the lane line three times. The driver rolls the \
                window down halfway and stares straight ahead."
                .into(),
            scenario_type: ScenarioType::HostileIntoxicated,
            scoring: Scoring::Coached,
            location: "US Highway 1 near Orange Ave, Fort Pierce, FL".into(),
            situation: "Routine traffic stop that may escalate into a DUI investigation. The \
                driver slurs, fumbles for documents and denies drinking."
                .into(),
            skills: vec![
                "Calm, patient tone".into(),
                "Explaining each step clearly".into(),
                "Officer safety".into(),
            ],
            default_score: None,
            history: None,
        },
        ScenarioDefinition {
            id: "deco-domestic-verbal".into(),
            title: "Verbal Argument at Apartment Complex".into(),
            persona: "Agitated partner".into(),
            system_prompt: String::new(),
            initial_message: "Dispatch: Neighbors report screaming from unit 2B. No weapons seen. \
                A man opens the door before you knock and says, \"Nobody called you. This is \
                private.\""
                .into(),
            scenario_type: ScenarioType::DomesticDispute,
            scoring: Scoring::Coached,
            location: "Apartment complex, St. Cloud, FL".into(),
            situation: "Heated verbal dispute between partners. Determine whether a crime \
                occurred without taking sides."
                .into(),
            skills: vec![
                "Active listening".into(),
                "Acknowledging frustration".into(),
                "Separating parties".into(),
            ],
            default_score: None,
            history: None,
        },
        ScenarioDefinition {
            id: "rp-elderly-confused".into(),
            title: "Elderly Confused Individual".into(),
            persona: "Margaret, Senior Citizen".into(),
            system_prompt: "You are Margaret, a 78-year-old woman who is experiencing some \
                confusion and memory issues. You are not intentionally difficult, but you may \
                repeat questions, seem uncertain about details, and need patient, clear \
                communication. You become more cooperative when the officer shows empathy and \
                speaks slowly. Higher stress means more confusion and repetition; lower stress \
                means more clarity and cooperation."
                .into(),
            initial_message: "Oh my... Officer, I'm not sure why you're here. Did something \
                happen? I was just... well, I think I was going to the store, but now I can't \
                remember if I locked my door."
                .into(),
            scenario_type: ScenarioType::ElderlyConfused,
            scoring: Scoring::Stress,
            location: String::new(),
            situation: "Welfare check on a senior found wandering near a grocery store.".into(),
            skills: vec!["Patience".into(), "Clear, simple instructions".into()],
            default_score: None,
            history: None,
        },
        ScenarioDefinition {
            id: "rp-hostile-intoxicated".into(),
            title: "Hostile Intoxicated Person".into(),
            persona: "Intoxicated Individual".into(),
            system_prompt: "You are a visibly intoxicated man outside a bar at closing time. You \
                are loud, defensive and insist you are fine to walk home. You calm down when the \
                officer stays patient and respectful, and you get louder when threatened with \
                jail."
                .into(),
            initial_message: "*swaying* What? I didn't do nothin'. I'm just standin' here, \
                officer."
                .into(),
            scenario_type: ScenarioType::HostileIntoxicated,
            scoring: Scoring::Stress,
            location: String::new(),
            situation: "Disturbance call outside a bar at 2 AM.".into(),
            skills: vec!["Officer safety".into(), "Patience".into()],
            default_score: None,
            history: None,
        },
        ScenarioDefinition {
            id: "rp-mental-health-crisis".into(),
            title: "Mental Health Crisis Response".into(),
            persona: "Person in Mental Health Crisis".into(),
            system_prompt: "You are a person in acute emotional crisis sitting on a bridge \
                railing. You feel unheard and overwhelmed. You respond to genuine empathy, \
                slow speech and open questions. Commands and rushed promises make you withdraw."
                .into(),
            initial_message: "*staring at the water* Don't come any closer. Nobody ever \
                listens anyway."
                .into(),
            scenario_type: ScenarioType::MentalHealthCrisis,
            scoring: Scoring::Stress,
            location: String::new(),
            situation: "Crisis call; subject on a pedestrian bridge.".into(),
            skills: vec!["Empathy".into(), "Active listening".into()],
            default_score: None,
            history: None,
        },
    ]
}
