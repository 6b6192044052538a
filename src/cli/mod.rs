//! TZ-013: CLI subcommands — validate, parse, classify, infer, extract.

use crate::core::config::EngineConfig;
use crate::core::types::{PlanStep, Record};
use crate::core::Engine;
use crate::recovery;
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the configuration tables without resolving anything
    Validate {
        /// Configuration directory
        #[arg(short, long, default_value = "config")]
        config_dir: PathBuf,
    },

    /// Recover a typed decision from a raw model response file
    Parse {
        /// File containing the raw response text
        file: PathBuf,

        /// Decision id to assign
        #[arg(long, default_value = "decision-1")]
        id: String,

        /// Print the dependency-ordered step ids instead of the decision
        #[arg(long)]
        order: bool,

        /// Configuration directory
        #[arg(short, long, default_value = "config")]
        config_dir: PathBuf,
    },

    /// Show the registered action classification of a tool
    Classify {
        /// Tool name
        tool: String,

        /// Configuration directory
        #[arg(short, long, default_value = "config")]
        config_dir: PathBuf,
    },

    /// Infer the value type of a step from its name and description
    Infer {
        /// Step name
        name: String,

        /// Step description
        description: String,

        /// Configuration directory
        #[arg(short, long, default_value = "config")]
        config_dir: PathBuf,
    },

    /// Extract the resource id from a step and its tool result
    Extract {
        /// File containing the plan step as JSON
        step: PathBuf,

        /// File containing the tool result as JSON
        result: PathBuf,

        /// Configuration directory
        #[arg(short, long, default_value = "config")]
        config_dir: PathBuf,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Validate { config_dir } => cmd_validate(&config_dir),
        Commands::Parse {
            file,
            id,
            order,
            config_dir,
        } => cmd_parse(&file, &id, order, &config_dir),
        Commands::Classify { tool, config_dir } => cmd_classify(&tool, &config_dir),
        Commands::Infer {
            name,
            description,
            config_dir,
        } => cmd_infer(&name, &description, &config_dir),
        Commands::Extract {
            step,
            result,
            config_dir,
        } => cmd_extract(&step, &result, &config_dir),
    }
}

fn load_engine(config_dir: &Path) -> Result<Engine, String> {
    Engine::load(config_dir).map_err(|e| e.to_string())
}

fn cmd_validate(config_dir: &Path) -> Result<(), String> {
    let config = EngineConfig::load_dir(config_dir)?;
    let errors = config.validate();

    if errors.is_empty() {
        let types = config.known_resource_types();
        println!(
            "OK: {} resource types, {} registered tools, {} value types",
            types.len(),
            config.extraction.tool_actions.len(),
            config.patterns.value_type_inference.len()
        );
        // Construction catches what structural validation cannot, e.g. a
        // pattern that fails to compile.
        Engine::from_config(&config).map_err(|e| e.to_string())?;
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

fn cmd_parse(file: &Path, id: &str, order: bool, config_dir: &Path) -> Result<(), String> {
    // Parsing itself needs no tables, but a bad config should fail loudly
    // before anyone trusts the output.
    let _engine = load_engine(config_dir)?;

    let raw = std::fs::read_to_string(file)
        .map_err(|e| format!("cannot read {}: {}", file.display(), e))?;
    let decision = recovery::parse_decision(id, &raw).map_err(|e| e.to_string())?;

    if order {
        let ordered = recovery::order_steps(&decision.execution_plan).map_err(|e| e.to_string())?;
        for step in &ordered {
            println!("{}", step.id);
        }
        return Ok(());
    }

    let rendered = serde_json::to_string_pretty(&decision)
        .map_err(|e| format!("cannot render decision: {}", e))?;
    println!("{}", rendered);
    Ok(())
}

fn cmd_classify(tool: &str, config_dir: &Path) -> Result<(), String> {
    let engine = load_engine(config_dir)?;
    let kind = engine.extractor.classify(tool).map_err(|e| e.to_string())?;
    println!("{}: {}", tool, kind);
    Ok(())
}

fn cmd_infer(name: &str, description: &str, config_dir: &Path) -> Result<(), String> {
    let engine = load_engine(config_dir)?;
    let value_type = engine
        .inferrer
        .infer(name, description)
        .map_err(|e| e.to_string())?;
    println!("{}", value_type);
    Ok(())
}

fn cmd_extract(step_file: &Path, result_file: &Path, config_dir: &Path) -> Result<(), String> {
    let engine = load_engine(config_dir)?;

    let step: PlanStep = read_json(step_file)?;
    let result: Record = read_json(result_file)?;

    let id = engine
        .extractor
        .extract_resource_id(&step, &result)
        .map_err(|e| e.to_string())?;
    println!("{}", id);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    serde_json::from_str(&content).map_err(|e| format!("{}: JSON parse error: {}", path.display(), e))
}
