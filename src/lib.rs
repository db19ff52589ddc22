//! Conversational training simulator core: prompt assembly, model invocation,
//! reply parsing and per-session state for officer role-play scenarios.

pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod settings;
pub mod ui;

pub use engine::engine::{EngineHandle, EngineOptions};
pub use error::TrainerError;
