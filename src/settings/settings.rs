use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendSettings {
    LmStudio { base_url: String, model: String },
    Gemini { model: String, api_key_env: String },
}

impl BackendSettings {
    pub fn lm_studio() -> Self {
        BackendSettings::LmStudio {
            base_url: "http://localhost:1234".into(),
            model: "local-model".into(),
        }
    }

    pub fn gemini() -> Self {
        BackendSettings::Gemini {
            model: "gemini-1.5-flash".into(),
            api_key_env: "GOOGLE_GENAI_API_KEY".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backend: BackendSettings,

    /// Ask for JSON replies; the marker parser stays as fallback.
    pub structured_output: bool,
    pub streaming: bool,

    /// Default filter when RUST_LOG is unset.
    pub log_level: String,

    /// Extra scenarios merged over the built-in set.
    pub scenarios_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendSettings::lm_studio(),
            structured_output: false,
            streaming: false,
            log_level: "info".into(),
            scenarios_file: None,
        }
    }
}
