use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use scenario_trainer::engine::llm_client::{build_model, LmStudioClient};
use scenario_trainer::logging::init_logger;
use scenario_trainer::model::catalog::Catalog;
use scenario_trainer::settings::settings::BackendSettings;
use scenario_trainer::settings::settings_io::{load_settings, save_settings, settings_path};
use scenario_trainer::ui::console::{run_repl, Console};
use scenario_trainer::{EngineHandle, EngineOptions, TrainerError};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    LmStudio,
    Gemini,
}

#[derive(Parser, Debug)]
#[command(name = "scenario_trainer", version, about = "Conversational officer training simulator")]
struct Cli {
    /// Scenario id to play
    #[arg(short, long)]
    scenario: Option<String>,

    /// List available scenarios and exit
    #[arg(long)]
    list: bool,

    /// Settings file (defaults to the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured model backend
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Probe the backend and exit
    #[arg(long)]
    check: bool,

    /// Request JSON replies from the model
    #[arg(long)]
    structured: bool,

    /// Print replies as they stream in
    #[arg(long)]
    stream: bool,

    /// Write the effective settings back to the settings file
    #[arg(long)]
    save: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings(&path);
    init_logger(&settings.log_level);

    match cli.backend {
        Some(Backend::LmStudio) if !matches!(settings.backend, BackendSettings::LmStudio { .. }) => {
            settings.backend = BackendSettings::lm_studio();
        }
        Some(Backend::Gemini) if !matches!(settings.backend, BackendSettings::Gemini { .. }) => {
            settings.backend = BackendSettings::gemini();
        }
        _ => {}
    }
    settings.structured_output |= cli.structured;
    settings.streaming |= cli.stream;

    if cli.save {
        save_settings(&path, &settings)?;
        tracing::info!(path = %path.display(), "settings saved");
    }

    let mut catalog = Catalog::builtin();
    if let Some(file) = &settings.scenarios_file {
        let count = catalog.load_file(file)?;
        tracing::info!(count, "merged scenarios from {}", file.display());
    }

    if cli.list {
        for s in catalog.list() {
            println!("{:<26} {:?}\t{}", s.id, s.scoring, s.title);
        }
        return Ok(());
    }

    if cli.check {
        return match &settings.backend {
            BackendSettings::LmStudio { base_url, model } => {
                let client = LmStudioClient::new(base_url.clone(), model.clone())?;
                println!("{}", client.check_connection()?);
                Ok(())
            }
            BackendSettings::Gemini { .. } => {
                build_model(&settings.backend)?;
                println!("Gemini API key found");
                Ok(())
            }
        };
    }

    let Some(id) = cli.scenario.as_deref() else {
        bail!("no scenario given; use --list to see ids and --scenario <id> to play");
    };
    let scenario = catalog
        .get(id)
        .cloned()
        .ok_or_else(|| TrainerError::UnknownScenario(id.to_string()))?;

    let model = build_model(&settings.backend).context("building model client")?;
    tracing::info!(scenario = %scenario.id, model = model.name(), "starting session");

    let options = EngineOptions {
        structured: settings.structured_output,
        streaming: settings.streaming,
    };
    let handle = EngineHandle::spawn(scenario.clone(), model, options);

    println!("{}\nCommands: /end, /restart, /stats, /quit", scenario.title);
    let mut console = Console::new(&scenario, io::stdout()).structured(settings.structured_output);
    run_repl(&handle, &mut console, io::stdin().lock())
}
